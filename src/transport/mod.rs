//! # Transports
//!
//! A transport is any async duplex byte stream that can also describe
//! itself. The description matters for the send path: a raw byte stream can
//! take a packet in several writes, while a message-oriented stream (for
//! instance a WebSocket adapter, where each write becomes one frame) needs
//! every packet in exactly one write.
//!
//! ## Provided implementations
//! - `tokio::net::TcpStream` and `tokio::net::UnixStream`: byte streams
//! - [`Declared`]: wraps any stream with caller-supplied [`TransportInfo`]
//! - [`memory::MemoryTransport`]: scripted in-process transport for tests

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

pub mod memory;

/// How the layer beneath the channel treats write boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Writes are concatenated into one byte stream; packets may be split
    /// across any number of writes.
    #[default]
    ByteStream,
    /// Every write becomes one frame on the wire; a packet must be written
    /// in a single call.
    MessageOriented,
}

impl Framing {
    /// Whether a packet may be sent as several independent writes.
    pub fn allows_fragmentation(self) -> bool {
        matches!(self, Framing::ByteStream)
    }
}

/// Facts a transport declares about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportInfo {
    pub framing: Framing,
    pub peer_addr: Option<SocketAddr>,
    /// Whether the stream is encrypted (TLS or equivalent).
    pub secure: bool,
}

impl TransportInfo {
    pub fn byte_stream() -> Self {
        Self::default()
    }

    pub fn message_oriented() -> Self {
        Self {
            framing: Framing::MessageOriented,
            ..Self::default()
        }
    }

    pub fn with_peer_addr(mut self, peer_addr: SocketAddr) -> Self {
        self.peer_addr = Some(peer_addr);
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

/// Duplex byte stream a [`crate::channel::PacketChannel`] can run on.
pub trait Transport: AsyncRead + AsyncWrite + Send + 'static {
    fn info(&self) -> TransportInfo;
}

impl Transport for tokio::net::TcpStream {
    fn info(&self) -> TransportInfo {
        let info = TransportInfo::byte_stream();
        match self.peer_addr() {
            Ok(addr) => info.with_peer_addr(addr),
            Err(_) => info,
        }
    }
}

#[cfg(unix)]
impl Transport for tokio::net::UnixStream {
    fn info(&self) -> TransportInfo {
        TransportInfo::byte_stream()
    }
}

/// Any async stream paired with an explicit [`TransportInfo`].
///
/// ```rust
/// use packet_channel::transport::{Declared, Framing, Transport, TransportInfo};
///
/// let (stream, _peer) = tokio::io::duplex(64);
/// let declared = Declared::new(stream, TransportInfo::message_oriented().with_secure(true));
/// assert_eq!(declared.info().framing, Framing::MessageOriented);
/// ```
#[derive(Debug)]
pub struct Declared<T> {
    inner: T,
    info: TransportInfo,
}

impl<T> Declared<T> {
    pub fn new(inner: T, info: TransportInfo) -> Self {
        Self { inner, info }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> Transport for Declared<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn info(&self) -> TransportInfo {
        self.info.clone()
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for Declared<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for Declared<T> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_decides_fragmentation() {
        assert!(Framing::ByteStream.allows_fragmentation());
        assert!(!Framing::MessageOriented.allows_fragmentation());
        assert!(TransportInfo::default().framing.allows_fragmentation());
    }

    #[tokio::test]
    async fn tcp_stream_reports_peer() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (client, accepted) = tokio::join!(tokio::net::TcpStream::connect(addr), listener.accept());
        let client = client.expect("connect");
        let _server = accepted.expect("accept");

        let info = client.info();
        assert_eq!(info.peer_addr, Some(addr));
        assert_eq!(info.framing, Framing::ByteStream);
        assert!(!info.secure);
    }
}
