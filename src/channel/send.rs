//! Send path.
//!
//! Sends are serialized by the channel's write lock: one encoded packet is
//! written and flushed completely before the next sender may start, so
//! bytes of different packets never interleave on the wire.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use super::{deadline_after, sleep_until_opt, PacketChannel, WriteState};
use crate::core::codec::{EncodedPacket, PacketCodec};
use crate::core::write_lock::LockInterrupted;
use crate::error::{classify, ChannelError, Result};
use crate::transport::Transport;

/// Scratch buffers larger than this are released after use.
const SCRATCH_RETAIN_LIMIT: usize = 64 * 1024;

/// Outcome of a successful [`PacketChannel::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sent {
    /// The packet was written and flushed; carries its encoded length.
    Written(usize),
    /// The caller's token fired. If the transport had already accepted
    /// part of the packet the channel is closed as well.
    Cancelled,
}

/// How an encoded packet is handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStrategy {
    /// No payload: the header is written as is.
    ZeroCopy,
    /// Header and payload segments as consecutive writes.
    Fragmented,
    /// Everything copied into one buffer and written once.
    FrameCompatible,
}

impl WriteStrategy {
    pub fn select(encoded: &EncodedPacket, allow_fragmentation: bool) -> Self {
        if encoded.payload_len() == 0 {
            WriteStrategy::ZeroCopy
        } else if allow_fragmentation {
            WriteStrategy::Fragmented
        } else {
            WriteStrategy::FrameCompatible
        }
    }
}

impl<T, C> PacketChannel<T, C>
where
    T: Transport,
    C: PacketCodec,
{
    /// Encode `packet` and write it to the transport.
    ///
    /// The codec's `cleanup` runs before the write lock is released, on
    /// success and on failure. A send interrupted after the transport
    /// accepted some of its bytes closes the channel, since the peer may have
    /// seen part of a packet. Interrupted before that, the channel stays open.
    pub async fn send(&self, packet: &C::Packet, cancel: &CancellationToken) -> Result<Sent> {
        self.ensure_open()?;

        let deadline = deadline_after(self.settings.send_timeout);
        let mut writer = tokio::select! {
            biased;
            entered = self.writer.enter(cancel, &self.shutdown) => match entered {
                Ok(guard) => guard,
                Err(LockInterrupted::Cancelled) => return Ok(Sent::Cancelled),
                Err(LockInterrupted::Shutdown) => return Err(ChannelError::ChannelClosed),
            },
            _ = sleep_until_opt(deadline) => return Err(ChannelError::CommunicationTimedOut),
        };

        let accepted = AtomicUsize::new(0);
        let result = self
            .send_locked(&mut writer, packet, cancel, deadline, &accepted)
            .await;
        writer.codec.cleanup();

        match result {
            Ok(length) => {
                self.statistics.packet_sent(length as u64);
                trace!(length, "Packet sent");
                Ok(Sent::Written(length))
            }
            Err(error) => {
                let accepted = accepted.load(Ordering::Acquire);
                if accepted > 0 || error.is_terminal() {
                    warn!(
                        error = %error,
                        accepted,
                        peer = ?self.info.peer_addr,
                        "Send failed, closing channel"
                    );
                    self.abort_from_send(&mut writer).await;
                }
                drop(writer);

                match error {
                    ChannelError::Cancelled => Ok(Sent::Cancelled),
                    error => Err(error),
                }
            }
        }
    }

    async fn send_locked(
        &self,
        writer: &mut WriteState<T, C>,
        packet: &C::Packet,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
        accepted: &AtomicUsize,
    ) -> Result<usize> {
        let WriteState {
            half,
            codec,
            scratch,
        } = writer;

        let stream = half.as_mut().ok_or(ChannelError::ChannelClosed)?;
        let encoded = codec.encode(packet)?;

        if let Some(inspector) = &self.inspector {
            inspector.begin_send(&encoded);
        }

        let strategy = WriteStrategy::select(&encoded, self.allow_packet_fragmentation());
        trace!(?strategy, length = encoded.len(), "Writing packet");

        let write = write_encoded(stream, &encoded, strategy, scratch, accepted);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ChannelError::Cancelled),
            _ = self.shutdown.cancelled() => Err(ChannelError::ChannelClosed),
            _ = sleep_until_opt(deadline) => Err(ChannelError::CommunicationTimedOut),
            result = write => result.map(|()| encoded.len()).map_err(classify),
        }
    }
}

async fn write_encoded<W>(
    out: &mut W,
    encoded: &EncodedPacket,
    strategy: WriteStrategy,
    scratch: &mut BytesMut,
    accepted: &AtomicUsize,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match strategy {
        WriteStrategy::ZeroCopy => write_counted(out, encoded.header(), accepted).await?,
        WriteStrategy::Fragmented => {
            write_counted(out, encoded.header(), accepted).await?;
            for segment in encoded.payload() {
                write_counted(out, segment, accepted).await?;
            }
        }
        WriteStrategy::FrameCompatible => {
            scratch.clear();
            encoded.copy_to(scratch);
            let written = write_counted(out, &scratch[..], accepted).await;
            if scratch.capacity() > SCRATCH_RETAIN_LIMIT {
                *scratch = BytesMut::new();
            } else {
                scratch.clear();
            }
            written?
        }
    }

    out.flush().await
}

/// `write_all`, recording each byte count the transport accepts.
async fn write_counted<W>(out: &mut W, mut buf: &[u8], accepted: &AtomicUsize) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while !buf.is_empty() {
        let count = out.write(buf).await?;
        if count == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        accepted.fetch_add(count, Ordering::Release);
        buf = &buf[count..];
    }
    Ok(())
}
