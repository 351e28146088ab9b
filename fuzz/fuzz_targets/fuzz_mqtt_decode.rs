#![no_main]

use libfuzzer_sys::fuzz_target;
use packet_channel::core::codec::{Decoded, PacketCodec};
use packet_channel::protocol::mqtt::MqttFrameCodec;

fuzz_target!(|data: &[u8]| {
    // Walk the input frame by frame - test for panics and out-of-range cursors
    let mut codec = MqttFrameCodec::new().with_max_packet_size(1 << 20);
    let mut offset = 0;
    while offset < data.len() {
        match codec.decode(&data[offset..]) {
            Ok(Decoded::Complete { consumed, .. }) => {
                assert!(consumed > 0 && consumed <= data.len() - offset);
                offset += consumed;
            }
            Ok(Decoded::NeedMoreData { examined }) => {
                assert!(examined <= data.len() - offset);
                break;
            }
            Err(_) => break,
        }
    }
});
