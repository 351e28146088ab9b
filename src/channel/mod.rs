//! # Packet Channel
//!
//! Turns a duplex byte stream into a sequence of packets and serializes
//! packet writes back onto it.
//!
//! ## Responsibilities
//! - Pull-based receive loop with a consumed/examined cursor
//! - Exclusive send path with a per-transport write strategy
//! - Classification of transport failures into [`ChannelError`]
//! - Byte counters and an `Open -> Closing -> Closed` lifecycle
//!
//! A channel is shared through an `Arc`: one task drives [`receive`], any
//! number of tasks call [`send`].
//!
//! ```rust
//! use std::sync::Arc;
//! use packet_channel::channel::{PacketChannel, Received, Sent};
//! use packet_channel::protocol::mqtt::{MqttFrame, MqttFrameCodec};
//! use packet_channel::transport::memory::MemoryTransport;
//! use packet_channel::transport::TransportInfo;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> packet_channel::Result<()> {
//! let (transport, peer) = MemoryTransport::pair(TransportInfo::byte_stream());
//! let channel = Arc::new(PacketChannel::new(transport, MqttFrameCodec::new()));
//! let cancel = CancellationToken::new();
//!
//! // PINGREQ arrives split over two reads
//! peer.send_chunk(vec![0xC0]);
//! peer.send_chunk(vec![0x00]);
//! match channel.receive(&cancel).await? {
//!     Received::Packet(frame) => assert_eq!(frame.first_byte(), 0xC0),
//!     other => panic!("unexpected {other:?}"),
//! }
//!
//! // PINGRESP goes out in one piece
//! let sent = channel.send(&MqttFrame::new(0xD0, Vec::<u8>::new()), &cancel).await?;
//! assert_eq!(sent, Sent::Written(2));
//! assert_eq!(peer.written(), vec![0xD0, 0x00]);
//!
//! channel.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`receive`]: PacketChannel::receive
//! [`send`]: PacketChannel::send

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::config::ChannelSettings;
use crate::core::buffer::{ReceiveBuffer, ReceiveCursor};
use crate::core::codec::PacketCodec;
use crate::core::write_lock::WriteLock;
use crate::error::{classify, ChannelError, Result};
use crate::transport::{Transport, TransportInfo};
use crate::utils::metrics::{ChannelStatistics, StatisticsSnapshot};

pub mod inspector;
mod receive;
mod send;

pub use inspector::{LoggingInspector, PacketInspector};
pub use receive::Received;
pub use send::{Sent, WriteStrategy};

/// Lifecycle of a channel. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelState::Open,
            1 => ChannelState::Closing,
            _ => ChannelState::Closed,
        }
    }
}

struct ReadState<T, C> {
    half: Option<ReadHalf<T>>,
    codec: C,
    buffer: ReceiveBuffer,
}

impl<T, C> ReadState<T, C> {
    fn complete(&mut self) {
        self.half.take();
    }
}

struct WriteState<T, C> {
    half: Option<WriteHalf<T>>,
    codec: C,
    scratch: BytesMut,
}

impl<T, C> WriteState<T, C>
where
    T: Transport,
{
    async fn complete(&mut self) -> io::Result<()> {
        match self.half.take() {
            Some(mut half) => half.shutdown().await,
            None => Ok(()),
        }
    }
}

/// Packet framing over one transport, bound to one codec.
pub struct PacketChannel<T, C>
where
    T: Transport,
    C: PacketCodec,
{
    reader: Mutex<ReadState<T, C>>,
    writer: WriteLock<WriteState<T, C>>,
    state: AtomicU8,
    shutdown: CancellationToken,
    statistics: ChannelStatistics,
    allow_fragmentation: AtomicBool,
    settings: ChannelSettings,
    info: TransportInfo,
    inspector: Option<Arc<dyn PacketInspector>>,
}

impl<T, C> PacketChannel<T, C>
where
    T: Transport,
    C: PacketCodec,
{
    pub fn new(transport: T, codec: C) -> Self {
        Self::with_settings(transport, codec, &ChannelSettings::default())
    }

    /// Build a channel; fragmentation follows the transport's declared
    /// framing unless `settings` overrides it.
    pub fn with_settings(transport: T, codec: C, settings: &ChannelSettings) -> Self {
        let info = transport.info();
        let allow_fragmentation = settings
            .allow_packet_fragmentation
            .unwrap_or_else(|| info.framing.allows_fragmentation());

        debug!(
            framing = ?info.framing,
            peer = ?info.peer_addr,
            secure = info.secure,
            allow_fragmentation,
            "Packet channel created"
        );

        let (read_half, write_half) = tokio::io::split(transport);

        Self {
            reader: Mutex::new(ReadState {
                half: Some(read_half),
                codec: codec.clone(),
                buffer: ReceiveBuffer::with_capacity(settings.initial_buffer_capacity),
            }),
            writer: WriteLock::new(WriteState {
                half: Some(write_half),
                codec,
                scratch: BytesMut::new(),
            }),
            state: AtomicU8::new(ChannelState::Open as u8),
            shutdown: CancellationToken::new(),
            statistics: ChannelStatistics::new(),
            allow_fragmentation: AtomicBool::new(allow_fragmentation),
            settings: settings.clone(),
            info,
            inspector: None,
        }
    }

    /// Attach an inspector that observes raw inbound and outbound packets.
    pub fn with_inspector(mut self, inspector: Arc<dyn PacketInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn info(&self) -> &TransportInfo {
        &self.info
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.info.peer_addr
    }

    pub fn is_secure(&self) -> bool {
        self.info.secure
    }

    pub fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.statistics.snapshot()
    }

    pub fn bytes_received(&self) -> u64 {
        self.statistics.bytes_received()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.statistics.bytes_sent()
    }

    /// Zero the counters. The connection is not affected.
    pub fn reset_statistics(&self) {
        self.statistics.reset();
    }

    /// Log the counters as one structured event.
    pub fn log_statistics(&self) {
        self.statistics.log_statistics();
    }

    /// Receive cursor and buffered byte count, or `None` while a receive is
    /// in progress.
    pub fn receive_cursor(&self) -> Option<(ReceiveCursor, usize)> {
        let reader = self.reader.try_lock().ok()?;
        Some((reader.buffer.cursor(), reader.buffer.len()))
    }

    pub fn allow_packet_fragmentation(&self) -> bool {
        self.allow_fragmentation.load(Ordering::Relaxed)
    }

    /// Permit (true) or forbid (false) sending a packet as several writes.
    ///
    /// Only enable this for transports that reassemble a packet split over
    /// multiple writes.
    pub fn set_allow_packet_fragmentation(&self, allow: bool) {
        self.allow_fragmentation.store(allow, Ordering::Relaxed);
    }

    /// Complete the read direction, then the write direction.
    ///
    /// Idempotent: closing a channel that is already closing or closed is a
    /// no-op. A pending receive or a send waiting for the write lock returns
    /// [`ChannelError::ChannelClosed`].
    #[instrument(skip(self), fields(peer = ?self.info.peer_addr))]
    pub async fn close(&self) -> Result<()> {
        if !self.begin_close() {
            return Ok(());
        }

        let mut reader = self.reader.lock().await;
        reader.complete();
        drop(reader);

        let mut writer = self.writer.enter_unconditionally().await;
        let outcome = writer.complete().await;
        drop(writer);

        self.finish_close(outcome)
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            ChannelState::Open => Ok(()),
            _ => Err(ChannelError::ChannelClosed),
        }
    }

    /// Move `Open -> Closing` and wake every task blocked on the transport.
    ///
    /// Only the caller that wins the transition performs the close.
    fn begin_close(&self) -> bool {
        let won = self
            .state
            .compare_exchange(
                ChannelState::Open as u8,
                ChannelState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if won {
            self.shutdown.cancel();
            debug!("Closing packet channel");
        }
        won
    }

    fn finish_close(&self, outcome: io::Result<()>) -> Result<()> {
        self.state
            .store(ChannelState::Closed as u8, Ordering::Release);

        match outcome.map_err(classify) {
            Ok(()) | Err(ChannelError::Cancelled) => {
                debug!("Packet channel closed");
                Ok(())
            }
            Err(error) => {
                debug!(error = %error, "Packet channel closed with error");
                Err(error)
            }
        }
    }

    /// Close after a receive failure, with the reader already held.
    async fn abort_from_receive(&self, reader: &mut ReadState<T, C>) {
        reader.complete();
        if !self.begin_close() {
            return;
        }

        let mut writer = self.writer.enter_unconditionally().await;
        let outcome = writer.complete().await;
        drop(writer);

        if let Err(error) = self.finish_close(outcome) {
            debug!(error = %error, "Ignoring close failure after receive error");
        }
    }

    /// Close after a send failure, with the writer already held.
    async fn abort_from_send(&self, writer: &mut WriteState<T, C>) {
        let outcome = writer.complete().await;
        if !self.begin_close() {
            return;
        }

        let mut reader = self.reader.lock().await;
        reader.complete();
        drop(reader);

        if let Err(error) = self.finish_close(outcome) {
            debug!(error = %error, "Ignoring close failure after send error");
        }
    }
}

impl<T, C> fmt::Debug for PacketChannel<T, C>
where
    T: Transport,
    C: PacketCodec,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketChannel")
            .field("state", &self.state())
            .field("info", &self.info)
            .field("allow_fragmentation", &self.allow_packet_fragmentation())
            .field("statistics", &self.statistics())
            .finish()
    }
}

/// Sleep until `deadline`, or forever when there is none.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn deadline_after(timeout: Option<std::time::Duration>) -> Option<Instant> {
    timeout.map(|timeout| Instant::now() + timeout)
}
