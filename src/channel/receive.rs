//! Receive loop.
//!
//! The buffer is decoded before the transport is read again, so a read that
//! delivered several packets yields them on consecutive calls without
//! further I/O. Bytes the codec examined are not handed back to it until
//! new data arrives.

use futures::stream::{self, Stream};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use super::{deadline_after, sleep_until_opt, PacketChannel, ReadState};
use crate::core::buffer::DEFAULT_READ_CAPACITY;
use crate::core::codec::{Decoded, PacketCodec};
use crate::error::{classify, constants, ChannelError, Result};
use crate::transport::Transport;

/// Outcome of a successful [`PacketChannel::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received<P> {
    Packet(P),
    /// The peer closed cleanly on a packet boundary.
    EndOfStream,
    /// The caller's token fired. Buffered bytes are kept for the next call.
    Cancelled,
}

impl<P> Received<P> {
    pub fn into_packet(self) -> Option<P> {
        match self {
            Received::Packet(packet) => Some(packet),
            _ => None,
        }
    }
}

impl<T, C> PacketChannel<T, C>
where
    T: Transport,
    C: PacketCodec,
{
    /// Receive the next complete packet.
    ///
    /// Only one receive runs at a time; concurrent callers queue behind it.
    /// A failure other than cancellation, a timeout or a closed channel
    /// closes both directions before it is returned.
    pub async fn receive(&self, cancel: &CancellationToken) -> Result<Received<C::Packet>> {
        self.ensure_open()?;

        let mut reader = self.reader.lock().await;
        if reader.half.is_none() {
            return Err(ChannelError::ChannelClosed);
        }

        if let Some(inspector) = &self.inspector {
            inspector.begin_receive();
        }

        let deadline = deadline_after(self.settings.receive_timeout);
        match self.receive_locked(&mut reader, cancel, deadline).await {
            Ok(received) => Ok(received),
            Err(ChannelError::Cancelled) => Ok(Received::Cancelled),
            Err(error) => {
                if error.is_terminal() {
                    warn!(
                        error = %error,
                        peer = ?self.info.peer_addr,
                        "Receive failed, closing channel"
                    );
                    self.abort_from_receive(&mut reader).await;
                }
                Err(error)
            }
        }
    }

    async fn receive_locked(
        &self,
        reader: &mut ReadState<T, C>,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<Received<C::Packet>> {
        let ReadState {
            half,
            codec,
            buffer,
        } = reader;

        loop {
            if cancel.is_cancelled() {
                return Ok(Received::Cancelled);
            }

            if buffer.has_undecoded() {
                match codec.decode(buffer.unconsumed())? {
                    Decoded::Complete { packet, consumed } => {
                        let raw = buffer.consume(consumed)?;
                        if let Some(inspector) = &self.inspector {
                            inspector.end_receive(raw);
                        }
                        self.statistics.packet_received(consumed as u64);
                        trace!(consumed, "Packet received");
                        return Ok(Received::Packet(packet));
                    }
                    Decoded::NeedMoreData { examined } => {
                        buffer.mark_examined(examined);
                        if buffer.unconsumed_len() > self.settings.max_packet_size {
                            return Err(ChannelError::violation(constants::ERR_PACKET_TOO_LARGE));
                        }
                    }
                }
            }

            let stream = half.as_mut().ok_or(ChannelError::ChannelClosed)?;
            let read = stream.read_buf(buffer.prepare_read(DEFAULT_READ_CAPACITY));

            let count = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Received::Cancelled),
                _ = self.shutdown.cancelled() => return Err(ChannelError::ChannelClosed),
                _ = sleep_until_opt(deadline) => return Err(ChannelError::CommunicationTimedOut),
                result = read => result.map_err(classify)?,
            };

            if count == 0 {
                if buffer.unconsumed_len() == 0 {
                    trace!("End of stream");
                    return Ok(Received::EndOfStream);
                }
                return Err(ChannelError::aborted(constants::ERR_PARTIAL_FRAME));
            }
            trace!(count, buffered = buffer.unconsumed_len(), "Read from transport");
        }
    }

    /// Stream of received packets.
    ///
    /// Ends after end-of-stream or cancellation; a failure is yielded once
    /// and then the stream ends.
    pub fn packets(
        self: Arc<Self>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<C::Packet>> + Send {
        stream::unfold(Some((self, cancel)), |state| async move {
            let (channel, cancel) = state?;
            match channel.receive(&cancel).await {
                Ok(Received::Packet(packet)) => Some((Ok(packet), Some((channel, cancel)))),
                Ok(Received::EndOfStream) | Ok(Received::Cancelled) => None,
                Err(error) => Some((Err(error), None)),
            }
        })
    }
}
