//! # MQTT Control Packet Framing
//!
//! A [`PacketCodec`] that splits a byte stream into MQTT control packets.
//! Only the fixed header is interpreted:
//!
//! ```text
//! [type:4 | flags:4] [remaining length: 1-4 bytes, base-128] [body: remaining length bytes]
//! ```
//!
//! The body is handed over untouched. Validating variable headers, flags
//! or properties is left to whoever consumes the frames.

use bytes::{BufMut, Bytes, BytesMut};

use crate::core::codec::{Decoded, EncodedPacket, PacketCodec};
use crate::error::{ChannelError, Result};

/// Largest value the remaining-length field can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Fixed header: one type byte plus up to four length bytes.
pub const MAX_FIXED_HEADER_LEN: usize = 5;

/// Control packet type numbers (upper nibble of the first byte).
pub mod packet_type {
    pub const CONNECT: u8 = 1;
    pub const CONNACK: u8 = 2;
    pub const PUBLISH: u8 = 3;
    pub const PUBACK: u8 = 4;
    pub const PUBREC: u8 = 5;
    pub const PUBREL: u8 = 6;
    pub const PUBCOMP: u8 = 7;
    pub const SUBSCRIBE: u8 = 8;
    pub const SUBACK: u8 = 9;
    pub const UNSUBSCRIBE: u8 = 10;
    pub const UNSUBACK: u8 = 11;
    pub const PINGREQ: u8 = 12;
    pub const PINGRESP: u8 = 13;
    pub const DISCONNECT: u8 = 14;
    pub const AUTH: u8 = 15;
}

/// One framed control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttFrame {
    first_byte: u8,
    body: Bytes,
}

impl MqttFrame {
    pub fn new(first_byte: u8, body: impl Into<Bytes>) -> Self {
        Self {
            first_byte,
            body: body.into(),
        }
    }

    pub fn first_byte(&self) -> u8 {
        self.first_byte
    }

    pub fn packet_type(&self) -> u8 {
        self.first_byte >> 4
    }

    pub fn flags(&self) -> u8 {
        self.first_byte & 0x0F
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Size on the wire, fixed header included.
    pub fn encoded_len(&self) -> usize {
        1 + remaining_length_size(self.body.len()) + self.body.len()
    }
}

#[derive(Debug, Clone)]
pub struct MqttFrameCodec {
    max_packet_size: usize,
}

impl Default for MqttFrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl MqttFrameCodec {
    pub fn new() -> Self {
        Self {
            max_packet_size: MAX_REMAINING_LENGTH + MAX_FIXED_HEADER_LEN,
        }
    }

    /// Reject frames whose total size exceeds `max_packet_size` as soon as
    /// their fixed header is readable.
    pub fn with_max_packet_size(mut self, max_packet_size: usize) -> Self {
        self.max_packet_size = max_packet_size;
        self
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }
}

impl PacketCodec for MqttFrameCodec {
    type Packet = MqttFrame;

    fn decode(&mut self, buffer: &[u8]) -> Result<Decoded<MqttFrame>> {
        let Some(&first_byte) = buffer.first() else {
            return Ok(Decoded::NeedMoreData { examined: 0 });
        };
        if first_byte >> 4 == 0 {
            return Err(ChannelError::violation(format!(
                "reserved packet type 0 in fixed header (0x{first_byte:02x})"
            )));
        }

        let (remaining, header_len) = match read_remaining_length(&buffer[1..])? {
            Some((value, size)) => (value, 1 + size),
            None => {
                return Ok(Decoded::NeedMoreData {
                    examined: buffer.len(),
                })
            }
        };

        let total = header_len + remaining;
        if total > self.max_packet_size {
            return Err(ChannelError::violation(format!(
                "packet of {total} bytes exceeds limit of {} bytes",
                self.max_packet_size
            )));
        }
        if buffer.len() < total {
            return Ok(Decoded::NeedMoreData {
                examined: buffer.len(),
            });
        }

        Ok(Decoded::Complete {
            packet: MqttFrame {
                first_byte,
                body: Bytes::copy_from_slice(&buffer[header_len..total]),
            },
            consumed: total,
        })
    }

    fn encode(&mut self, packet: &MqttFrame) -> Result<EncodedPacket> {
        let body_len = packet.body.len();
        if body_len > MAX_REMAINING_LENGTH {
            return Err(ChannelError::violation(format!(
                "body of {body_len} bytes exceeds the remaining length limit"
            )));
        }

        let mut header = BytesMut::with_capacity(MAX_FIXED_HEADER_LEN);
        header.put_u8(packet.first_byte);
        write_remaining_length(body_len, &mut header);

        let payload = if body_len == 0 {
            Vec::new()
        } else {
            vec![packet.body.clone()]
        };
        Ok(EncodedPacket::new(header.freeze(), payload))
    }
}

/// Parse the base-128 remaining length at the start of `bytes`.
///
/// Returns the value and the number of bytes it occupied, or `None` when
/// the field is still incomplete.
pub fn read_remaining_length(bytes: &[u8]) -> Result<Option<(usize, usize)>> {
    let mut value = 0usize;
    for (index, &byte) in bytes.iter().take(MAX_FIXED_HEADER_LEN - 1).enumerate() {
        value |= usize::from(byte & 0x7F) << (7 * index);
        if byte & 0x80 == 0 {
            return Ok(Some((value, index + 1)));
        }
    }

    if bytes.len() >= MAX_FIXED_HEADER_LEN - 1 {
        return Err(ChannelError::violation(
            "malformed remaining length: more than 4 bytes",
        ));
    }
    Ok(None)
}

pub fn write_remaining_length(mut value: usize, dst: &mut BytesMut) {
    loop {
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= 0x80;
        }
        dst.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

fn remaining_length_size(value: usize) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}
