//! # Packet Codec Contract
//!
//! A [`PacketCodec`] is the pluggable framing strategy of a channel. It
//! decodes at most one packet from the front of the receive buffer and
//! renders outbound packets as an [`EncodedPacket`]: one header segment
//! followed by any number of payload segments.
//!
//! Decoding reports *how much* it used so the channel can keep its cursor:
//! - [`Decoded::Complete`] carries the packet and the bytes it consumed
//! - [`Decoded::NeedMoreData`] carries how far the codec looked
//! - a malformed frame is returned as [`ChannelError::ProtocolViolation`]
//!
//! [`ChannelError::ProtocolViolation`]: crate::error::ChannelError::ProtocolViolation

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Result;

/// Outcome of a single decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<P> {
    /// A whole packet was parsed from the first `consumed` bytes.
    Complete { packet: P, consumed: usize },
    /// No complete packet yet; the codec scanned the first `examined` bytes.
    NeedMoreData { examined: usize },
}

/// Framing strategy shared by the receive loop and the send path.
///
/// The channel clones the codec once per direction, so decode and encode
/// never contend. Implementations should be cheap to clone.
pub trait PacketCodec: Clone + Send + 'static {
    type Packet: Send + 'static;

    /// Try to parse one packet from the start of `buffer`.
    fn decode(&mut self, buffer: &[u8]) -> Result<Decoded<Self::Packet>>;

    /// Render `packet` for the wire.
    fn encode(&mut self, packet: &Self::Packet) -> Result<EncodedPacket>;

    /// Release any scratch state claimed by the most recent [`encode`](Self::encode).
    ///
    /// Runs after every send attempt, successful or not.
    fn cleanup(&mut self) {}
}

/// Wire rendering of one packet.
///
/// Segments are reference counted; building or cloning an `EncodedPacket`
/// never copies packet bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedPacket {
    header: Bytes,
    payload: Vec<Bytes>,
}

impl EncodedPacket {
    pub fn new(header: Bytes, payload: Vec<Bytes>) -> Self {
        Self { header, payload }
    }

    /// A packet made only of a header segment.
    pub fn header_only(header: Bytes) -> Self {
        Self {
            header,
            payload: Vec::new(),
        }
    }

    pub fn header(&self) -> &Bytes {
        &self.header
    }

    pub fn payload(&self) -> &[Bytes] {
        &self.payload
    }

    /// Total bytes across all payload segments.
    pub fn payload_len(&self) -> usize {
        self.payload.iter().map(Bytes::len).sum()
    }

    /// Total encoded length: header plus every payload segment.
    pub fn len(&self) -> usize {
        self.header.len() + self.payload_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy every segment, in order, into `dst`.
    ///
    /// `dst` is grown to fit the whole packet before the first copy.
    pub fn copy_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.len());
        dst.put_slice(&self.header);
        for segment in &self.payload {
            dst.put_slice(segment);
        }
    }

    /// Flatten into a single contiguous buffer.
    pub fn to_contiguous(&self) -> Bytes {
        if self.payload_len() == 0 {
            return self.header.clone();
        }
        let mut dst = BytesMut::with_capacity(self.len());
        self.copy_to(&mut dst);
        dst.freeze()
    }
}
