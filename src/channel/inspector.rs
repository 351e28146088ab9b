//! Packet inspection hooks.
//!
//! An inspector sees the raw bytes of every packet the channel decodes and
//! the encoded segments of every packet it sends. Hooks run inline on the
//! receive and send paths and must not block.

use crate::core::codec::EncodedPacket;
use tracing::trace;

pub trait PacketInspector: Send + Sync {
    /// A receive call is about to start.
    fn begin_receive(&self) {}

    /// `raw` holds exactly the bytes of the packet just decoded.
    fn end_receive(&self, _raw: &[u8]) {}

    /// `encoded` is about to be written.
    fn begin_send(&self, _encoded: &EncodedPacket) {}
}

/// Traces every packet as hex at `TRACE` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInspector;

impl PacketInspector for LoggingInspector {
    fn end_receive(&self, raw: &[u8]) {
        trace!(
            direction = "inbound",
            length = raw.len(),
            bytes = %hex::encode(raw),
            "Packet inspected"
        );
    }

    fn begin_send(&self, encoded: &EncodedPacket) {
        let flat = encoded.to_contiguous();
        trace!(
            direction = "outbound",
            length = flat.len(),
            bytes = %hex::encode(&flat),
            "Packet inspected"
        );
    }
}
