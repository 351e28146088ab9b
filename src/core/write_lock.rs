//! Asynchronous exclusive-access primitive for the send path.
//!
//! At most one guard exists at a time. Waiters are not served in any
//! promised order; only exclusivity is guaranteed. Waiting can be abandoned
//! through a [`CancellationToken`].

use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Why a lock acquisition gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockInterrupted {
    /// The caller's token fired.
    Cancelled,
    /// The owner of the lock is shutting down.
    Shutdown,
}

#[derive(Debug)]
pub struct WriteLock<T> {
    inner: Mutex<T>,
}

pub type WriteGuard<'a, T> = MutexGuard<'a, T>;

impl<T> WriteLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Wait for exclusive access.
    ///
    /// Returns early if either token fires before the lock is obtained. An
    /// already-cancelled `cancel` token wins even if the lock is free.
    pub async fn enter(
        &self,
        cancel: &CancellationToken,
        shutdown: &CancellationToken,
    ) -> Result<WriteGuard<'_, T>, LockInterrupted> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LockInterrupted::Cancelled),
            _ = shutdown.cancelled() => Err(LockInterrupted::Shutdown),
            guard = self.inner.lock() => Ok(guard),
        }
    }

    /// Wait for exclusive access without a way to give up.
    pub async fn enter_unconditionally(&self) -> WriteGuard<'_, T> {
        self.inner.lock().await
    }

    pub fn try_enter(&self) -> Option<WriteGuard<'_, T>> {
        self.inner.try_lock().ok()
    }
}
