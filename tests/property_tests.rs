//! Property-based tests using proptest
//!
//! These tests check the channel's framing invariants over randomly
//! generated packets and randomly chosen chunk boundaries.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use bytes::BytesMut;
use common::{TagCodec, TagPacket};
use packet_channel::channel::{PacketChannel, Received, Sent};
use packet_channel::core::buffer::ReceiveBuffer;
use packet_channel::core::codec::{Decoded, PacketCodec};
use packet_channel::protocol::mqtt::{
    read_remaining_length, write_remaining_length, MqttFrame, MqttFrameCodec,
    MAX_REMAINING_LENGTH,
};
use packet_channel::transport::memory::MemoryTransport;
use packet_channel::transport::TransportInfo;
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn packet_strategy() -> impl Strategy<Value = TagPacket> {
    (0u8..0xF0, prop::collection::vec(any::<u8>(), 0..64))
        .prop_map(|(tag, payload)| TagPacket::new(tag, payload))
}

/// Cut `wire` at the given (unsorted, possibly repeated) offsets.
fn split(wire: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut points: Vec<usize> = cuts
        .iter()
        .map(|cut| cut % (wire.len() + 1))
        .collect();
    points.push(0);
    points.push(wire.len());
    points.sort_unstable();
    points.dedup();
    points
        .windows(2)
        .map(|pair| wire[pair[0]..pair[1]].to_vec())
        .collect()
}

// Property: decoded packets do not depend on how the stream was chunked
proptest! {
    #[test]
    fn prop_chunking_invariance(
        packets in prop::collection::vec(packet_strategy(), 1..12),
        cuts in prop::collection::vec(any::<usize>(), 0..24),
    ) {
        let wire: Vec<u8> = packets.iter().flat_map(TagPacket::to_wire).collect();
        let chunks = split(&wire, &cuts);

        let received = runtime().block_on(async {
            let (transport, peer) = MemoryTransport::pair(TransportInfo::byte_stream());
            let channel = PacketChannel::new(transport, TagCodec::new());
            for chunk in chunks {
                peer.send_chunk(chunk);
            }
            peer.finish();

            let cancel = CancellationToken::new();
            let mut received = Vec::new();
            loop {
                let outcome = channel.receive(&cancel).await.expect("receive");

                let (cursor, buffered) = channel.receive_cursor().expect("no receive running");
                assert!(cursor.consumed <= cursor.examined, "{cursor:?}");
                assert!(cursor.examined <= buffered, "{cursor:?} over {buffered}");

                match outcome {
                    Received::Packet(packet) => {
                        assert_eq!(cursor.examined, cursor.consumed, "examined collapses");
                        received.push(packet);
                    }
                    Received::EndOfStream => break,
                    Received::Cancelled => unreachable!("token never fires"),
                }
            }
            assert_eq!(channel.bytes_received(), wire.len() as u64);
            received
        });

        prop_assert_eq!(received, packets);
    }
}

// Property: consumed <= examined <= len after every buffer operation
proptest! {
    #[test]
    fn prop_cursor_invariant(
        ops in prop::collection::vec((0u8..3, 0usize..64), 1..64),
    ) {
        let mut buffer = ReceiveBuffer::with_capacity(16);
        for (op, amount) in ops {
            match op {
                0 => buffer.extend_from_slice(&vec![0xAB; amount]),
                1 => buffer.mark_examined(amount),
                _ => {
                    let available = buffer.unconsumed_len();
                    let result = buffer.consume(amount);
                    prop_assert_eq!(result.is_ok(), amount > 0 && amount <= available);
                }
            }
            if amount % 7 == 0 {
                buffer.compact();
            }

            let cursor = buffer.cursor();
            prop_assert!(cursor.consumed <= cursor.examined);
            prop_assert!(cursor.examined <= buffer.len());
        }
    }
}

// Property: every write strategy puts exactly the encoded bytes on the wire
proptest! {
    #[test]
    fn prop_send_writes_encoded_bytes(
        packet in packet_strategy(),
        allow_fragmentation in any::<bool>(),
    ) {
        let (written, calls, sent) = runtime().block_on(async {
            let (transport, peer) = MemoryTransport::pair(TransportInfo::byte_stream());
            let channel = PacketChannel::new(transport, TagCodec::new());
            channel.set_allow_packet_fragmentation(allow_fragmentation);
            let sent = channel
                .send(&packet, &CancellationToken::new())
                .await
                .expect("send");
            (peer.written(), peer.write_calls(), sent)
        });

        let wire = packet.to_wire();
        let expected_calls = if allow_fragmentation && !packet.payload.is_empty() { 2 } else { 1 };
        prop_assert_eq!(sent, Sent::Written(wire.len()));
        prop_assert_eq!(written, wire);
        prop_assert_eq!(calls, expected_calls);
    }
}

// Property: remaining length survives encoding for the whole legal range
proptest! {
    #[test]
    fn prop_remaining_length_roundtrip(value in 0usize..=MAX_REMAINING_LENGTH) {
        let mut dst = BytesMut::new();
        write_remaining_length(value, &mut dst);
        prop_assert!(dst.len() <= 4);
        prop_assert_eq!(read_remaining_length(&dst).expect("valid"), Some((value, dst.len())));
    }
}

// Property: an MQTT frame is only complete once its last byte is present
proptest! {
    #[test]
    fn prop_mqtt_prefixes_need_more_data(
        packet_type in 1u8..16,
        body in prop::collection::vec(any::<u8>(), 0..300),
    ) {
        let frame = MqttFrame::new(packet_type << 4, body);
        let mut codec = MqttFrameCodec::new();
        let wire = codec.encode(&frame).expect("encode").to_contiguous();

        for end in 0..wire.len() {
            match codec.decode(&wire[..end]).expect("prefix decodes") {
                Decoded::NeedMoreData { examined } => prop_assert_eq!(examined, end),
                Decoded::Complete { .. } => prop_assert!(false, "complete at {} of {}", end, wire.len()),
            }
        }
        match codec.decode(&wire).expect("decode") {
            Decoded::Complete { packet, consumed } => {
                prop_assert_eq!(consumed, wire.len());
                prop_assert_eq!(packet, frame);
            }
            Decoded::NeedMoreData { .. } => prop_assert!(false, "full frame incomplete"),
        }
    }
}
