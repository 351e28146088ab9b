//! # In-Memory Transport
//!
//! A scripted, in-process transport. The [`MemoryPeer`] decides exactly
//! which chunks the channel reads (one chunk per read when the read buffer
//! is large enough) and records every individual write call the channel
//! makes, which lets tests observe chunking and write strategies precisely.
//!
//! ## Usage
//! ```rust
//! use packet_channel::transport::memory::MemoryTransport;
//! use packet_channel::transport::TransportInfo;
//!
//! let (transport, peer) = MemoryTransport::pair(TransportInfo::byte_stream());
//! peer.send_chunk(vec![0xC0, 0x00]);
//! peer.finish();
//! # drop(transport);
//! ```

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;

use super::{Transport, TransportInfo};

type Chunk = io::Result<Bytes>;

#[derive(Debug, Default)]
struct Shared {
    writes: Mutex<Vec<Bytes>>,
    flushes: AtomicUsize,
    shutdown: AtomicBool,
    write_error: Mutex<Option<io::ErrorKind>>,
    write_paused: AtomicBool,
    // bytes still accepted before writes pause on their own
    write_budget: Mutex<Option<usize>>,
    write_waker: Mutex<Option<Waker>>,
    // 0 means unlimited
    max_write: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Channel-side end of an in-memory connection.
#[derive(Debug)]
pub struct MemoryTransport {
    incoming: mpsc::UnboundedReceiver<Chunk>,
    pending: Bytes,
    shared: Arc<Shared>,
    info: TransportInfo,
}

/// Test-side end: feeds reads and inspects writes.
#[derive(Debug)]
pub struct MemoryPeer {
    outgoing: Mutex<Option<mpsc::UnboundedSender<Chunk>>>,
    shared: Arc<Shared>,
}

impl MemoryTransport {
    pub fn pair(info: TransportInfo) -> (MemoryTransport, MemoryPeer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        let transport = MemoryTransport {
            incoming: rx,
            pending: Bytes::new(),
            shared: shared.clone(),
            info,
        };
        let peer = MemoryPeer {
            outgoing: Mutex::new(Some(tx)),
            shared,
        };
        (transport, peer)
    }
}

impl MemoryPeer {
    /// Queue one chunk for the channel to read. Empty chunks are ignored.
    ///
    /// Returns `false` once the stream was finished or the transport dropped.
    pub fn send_chunk(&self, chunk: impl Into<Bytes>) -> bool {
        self.push(Ok(chunk.into()))
    }

    /// Make the next read fail with `error`.
    pub fn send_error(&self, error: io::Error) -> bool {
        self.push(Err(error))
    }

    /// Signal end-of-stream once queued chunks are drained.
    pub fn finish(&self) {
        lock(&self.outgoing).take();
    }

    fn push(&self, chunk: Chunk) -> bool {
        match lock(&self.outgoing).as_ref() {
            Some(tx) => tx.send(chunk).is_ok(),
            None => false,
        }
    }

    /// Every write call, in order, with exactly the bytes it carried.
    pub fn writes(&self) -> Vec<Bytes> {
        lock(&self.shared.writes).clone()
    }

    pub fn write_calls(&self) -> usize {
        lock(&self.shared.writes).len()
    }

    /// All written bytes concatenated.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.shared.writes)
            .iter()
            .flat_map(|chunk| chunk.iter().copied())
            .collect()
    }

    pub fn flushes(&self) -> usize {
        self.shared.flushes.load(Ordering::SeqCst)
    }

    /// Whether the channel completed its write direction.
    pub fn is_write_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    /// Make every following write fail with `kind`.
    pub fn fail_writes(&self, kind: io::ErrorKind) {
        *lock(&self.shared.write_error) = Some(kind);
    }

    /// Accept at most `max` bytes per write call (0 restores unlimited).
    pub fn limit_write_size(&self, max: usize) {
        self.shared.max_write.store(max, Ordering::SeqCst);
    }

    /// Hold every following write until [`resume_writes`](Self::resume_writes).
    pub fn pause_writes(&self) {
        self.shared.write_paused.store(true, Ordering::SeqCst);
    }

    /// Accept `count` more bytes, then hold writes as [`pause_writes`](Self::pause_writes) does.
    pub fn pause_writes_after(&self, count: usize) {
        *lock(&self.shared.write_budget) = Some(count);
    }

    pub fn resume_writes(&self) {
        lock(&self.shared.write_budget).take();
        self.shared.write_paused.store(false, Ordering::SeqCst);
        if let Some(waker) = lock(&self.shared.write_waker).take() {
            waker.wake();
        }
    }
}

impl Transport for MemoryTransport {
    fn info(&self) -> TransportInfo {
        self.info.clone()
    }
}

impl AsyncRead for MemoryTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        while this.pending.is_empty() {
            match this.incoming.poll_recv(cx) {
                Poll::Ready(Some(Ok(chunk))) => this.pending = chunk,
                Poll::Ready(Some(Err(error))) => return Poll::Ready(Err(error)),
                // sender gone: end of stream
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }

        let count = this.pending.len().min(buf.remaining());
        buf.put_slice(&this.pending[..count]);
        this.pending.advance(count);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MemoryTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let shared = &self.shared;

        if shared.shutdown.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        if let Some(kind) = *lock(&shared.write_error) {
            return Poll::Ready(Err(kind.into()));
        }
        if *lock(&shared.write_budget) == Some(0) {
            shared.write_paused.store(true, Ordering::SeqCst);
        }
        if shared.write_paused.load(Ordering::SeqCst) {
            *lock(&shared.write_waker) = Some(cx.waker().clone());
            // re-check after registering to avoid a lost wakeup
            if shared.write_paused.load(Ordering::SeqCst) {
                return Poll::Pending;
            }
        }

        let max = shared.max_write.load(Ordering::SeqCst);
        let mut count = if max == 0 { buf.len() } else { buf.len().min(max) };
        if let Some(budget) = lock(&shared.write_budget).as_mut() {
            count = count.min(*budget);
            *budget -= count;
        }
        lock(&shared.writes).push(Bytes::copy_from_slice(&buf[..count]));
        Poll::Ready(Ok(count))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shared.flushes.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}
