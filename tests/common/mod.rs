//! Shared fixtures for the channel integration tests.
//!
//! `TagCodec` frames packets as `[tag:1][len:2 BE][payload:len]`. A tag of
//! `0xFF` is a malformed header and a tag of `0xFE` cannot be encoded.
//! Clones share their call counters so tests can observe both directions.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use packet_channel::channel::PacketInspector;
use packet_channel::core::codec::{Decoded, EncodedPacket, PacketCodec};
use packet_channel::error::{ChannelError, Result};

pub const HEADER_LEN: usize = 3;
pub const MALFORMED_TAG: u8 = 0xFF;
pub const UNENCODABLE_TAG: u8 = 0xFE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPacket {
    pub tag: u8,
    pub payload: Bytes,
}

impl TagPacket {
    pub fn new(tag: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    pub fn to_wire(&self) -> Vec<u8> {
        let len = self.payload.len() as u16;
        let mut wire = vec![self.tag];
        wire.extend_from_slice(&len.to_be_bytes());
        wire.extend_from_slice(&self.payload);
        wire
    }
}

#[derive(Debug, Default)]
pub struct CodecCounters {
    pub decode_calls: AtomicUsize,
    pub encode_calls: AtomicUsize,
    pub cleanup_calls: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
pub struct TagCodec {
    pub counters: Arc<CodecCounters>,
}

impl TagCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode_calls(&self) -> usize {
        self.counters.decode_calls.load(Ordering::SeqCst)
    }

    pub fn cleanup_calls(&self) -> usize {
        self.counters.cleanup_calls.load(Ordering::SeqCst)
    }

    pub fn encode_calls(&self) -> usize {
        self.counters.encode_calls.load(Ordering::SeqCst)
    }
}

impl PacketCodec for TagCodec {
    type Packet = TagPacket;

    fn decode(&mut self, buffer: &[u8]) -> Result<Decoded<TagPacket>> {
        self.counters.decode_calls.fetch_add(1, Ordering::SeqCst);

        if buffer.first() == Some(&MALFORMED_TAG) {
            return Err(ChannelError::violation("malformed header"));
        }
        if buffer.len() < HEADER_LEN {
            return Ok(Decoded::NeedMoreData {
                examined: buffer.len(),
            });
        }

        let len = u16::from_be_bytes([buffer[1], buffer[2]]) as usize;
        let total = HEADER_LEN + len;
        if buffer.len() < total {
            return Ok(Decoded::NeedMoreData {
                examined: buffer.len(),
            });
        }

        Ok(Decoded::Complete {
            packet: TagPacket {
                tag: buffer[0],
                payload: Bytes::copy_from_slice(&buffer[HEADER_LEN..total]),
            },
            consumed: total,
        })
    }

    fn encode(&mut self, packet: &TagPacket) -> Result<EncodedPacket> {
        self.counters.encode_calls.fetch_add(1, Ordering::SeqCst);

        if packet.tag == UNENCODABLE_TAG {
            return Err(ChannelError::violation("unencodable tag"));
        }

        let len = packet.payload.len() as u16;
        let mut header = vec![packet.tag];
        header.extend_from_slice(&len.to_be_bytes());

        let payload = if packet.payload.is_empty() {
            Vec::new()
        } else {
            vec![packet.payload.clone()]
        };
        Ok(EncodedPacket::new(Bytes::from(header), payload))
    }

    fn cleanup(&mut self) {
        self.counters.cleanup_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Codec that reports whatever `consumed` it was built with.
#[derive(Debug, Clone)]
pub struct LyingCodec {
    pub consumed: usize,
}

impl PacketCodec for LyingCodec {
    type Packet = ();

    fn decode(&mut self, _buffer: &[u8]) -> Result<Decoded<()>> {
        Ok(Decoded::Complete {
            packet: (),
            consumed: self.consumed,
        })
    }

    fn encode(&mut self, _packet: &()) -> Result<EncodedPacket> {
        Ok(EncodedPacket::default())
    }
}

/// Inspector that records what it saw.
#[derive(Debug, Default)]
pub struct RecordingInspector {
    pub receives_started: AtomicUsize,
    pub received: Mutex<Vec<Vec<u8>>>,
    pub sent: Mutex<Vec<Vec<u8>>>,
}

impl PacketInspector for RecordingInspector {
    fn begin_receive(&self) {
        self.receives_started.fetch_add(1, Ordering::SeqCst);
    }

    fn end_receive(&self, raw: &[u8]) {
        self.received.lock().unwrap().push(raw.to_vec());
    }

    fn begin_send(&self, encoded: &EncodedPacket) {
        self.sent.lock().unwrap().push(encoded.to_contiguous().to_vec());
    }
}
