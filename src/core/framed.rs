//! Bridge from [`PacketCodec`] to `tokio_util::codec`.
//!
//! Wrapping a packet codec in [`FramedCodec`] lets it drive a
//! `tokio_util::codec::Framed` directly, for callers that prefer the
//! `Stream`/`Sink` interface over a [`crate::channel::PacketChannel`].
//!
//! ```rust
//! use futures::{SinkExt, StreamExt};
//! use packet_channel::core::framed::FramedCodec;
//! use packet_channel::protocol::mqtt::{MqttFrame, MqttFrameCodec};
//! use tokio_util::codec::Framed;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> packet_channel::Result<()> {
//! let (left, right) = tokio::io::duplex(256);
//! let mut client = Framed::new(left, FramedCodec::new(MqttFrameCodec::new()));
//! let mut server = Framed::new(right, FramedCodec::new(MqttFrameCodec::new()));
//!
//! client.send(MqttFrame::new(0x30, &b"hello"[..])).await?;
//! let frame = server.next().await.transpose()?.map(|f| f.body().clone());
//! assert_eq!(frame.as_deref(), Some(&b"hello"[..]));
//! # Ok(())
//! # }
//! ```

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::codec::{Decoded, PacketCodec};
use crate::config::MAX_PACKET_SIZE;
use crate::error::{constants, ChannelError, Result};

/// A [`PacketCodec`] exposed as a `tokio_util` `Decoder` + `Encoder`.
#[derive(Debug, Clone)]
pub struct FramedCodec<C> {
    codec: C,
    max_packet_size: usize,
}

impl<C: PacketCodec> FramedCodec<C> {
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            max_packet_size: MAX_PACKET_SIZE,
        }
    }

    pub fn with_max_packet_size(mut self, max_packet_size: usize) -> Self {
        self.max_packet_size = max_packet_size;
        self
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn into_inner(self) -> C {
        self.codec
    }
}

impl<C: PacketCodec> Decoder for FramedCodec<C> {
    type Item = C::Packet;
    type Error = ChannelError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.is_empty() {
            return Ok(None);
        }

        match self.codec.decode(src)? {
            Decoded::Complete { packet, consumed } => {
                if consumed == 0 || consumed > src.len() {
                    return Err(ChannelError::violation(
                        constants::ERR_CONSUMED_OUT_OF_RANGE,
                    ));
                }
                src.advance(consumed);
                Ok(Some(packet))
            }
            Decoded::NeedMoreData { .. } => {
                if src.len() > self.max_packet_size {
                    return Err(ChannelError::violation(constants::ERR_PACKET_TOO_LARGE));
                }
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(packet) => Ok(Some(packet)),
            None if src.is_empty() => Ok(None),
            None => Err(ChannelError::aborted(constants::ERR_PARTIAL_FRAME)),
        }
    }
}

impl<C: PacketCodec> Encoder<C::Packet> for FramedCodec<C> {
    type Error = ChannelError;

    fn encode(&mut self, item: C::Packet, dst: &mut BytesMut) -> Result<()> {
        let result = self
            .codec
            .encode(&item)
            .map(|encoded| encoded.copy_to(dst));
        self.codec.cleanup();
        result
    }
}
