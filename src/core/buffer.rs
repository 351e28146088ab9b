//! # Receive Buffer
//!
//! Growable byte arena used by the receive loop, plus the cursor that
//! separates parsed bytes from bytes the codec has merely looked at.
//!
//! ```text
//! 0            consumed           examined              len
//! |--parsed----|--looked at, no frame--|--not yet shown--|
//! ```
//!
//! Consumed bytes are kept until the next transport read, then compacted
//! away. The codec is only re-run once bytes arrive past the point where it
//! last asked for more data, which bounds decoding to one pass per byte.

use bytes::{Buf, BytesMut};

use crate::error::{constants, ChannelError, Result};

/// Default capacity reserved for each transport read.
pub const DEFAULT_READ_CAPACITY: usize = 4096;

/// Position of the receive loop inside its buffer.
///
/// Always satisfies `consumed <= examined <= len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiveCursor {
    pub consumed: usize,
    pub examined: usize,
}

#[derive(Debug, Default)]
pub struct ReceiveBuffer {
    data: BytesMut,
    cursor: ReceiveCursor,
    // buffer length when the codec last reported NeedMoreData
    starved_at: Option<usize>,
}

impl ReceiveBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            cursor: ReceiveCursor::default(),
            starved_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn cursor(&self) -> ReceiveCursor {
        self.cursor
    }

    /// Bytes the codec has not consumed yet.
    pub fn unconsumed(&self) -> &[u8] {
        &self.data[self.cursor.consumed..]
    }

    pub fn unconsumed_len(&self) -> usize {
        self.data.len() - self.cursor.consumed
    }

    /// Whether there are bytes the codec has not been shown since it last
    /// asked for more data.
    pub fn has_undecoded(&self) -> bool {
        self.unconsumed_len() > 0 && self.starved_at.map_or(true, |len| self.data.len() > len)
    }

    /// Mark the first `count` unconsumed bytes as parsed and return them.
    ///
    /// Examined collapses onto the new consumed offset.
    pub fn consume(&mut self, count: usize) -> Result<&[u8]> {
        if count == 0 || count > self.unconsumed_len() {
            return Err(ChannelError::violation(format!(
                "{} ({count} of {} bytes)",
                constants::ERR_CONSUMED_OUT_OF_RANGE,
                self.unconsumed_len()
            )));
        }

        let start = self.cursor.consumed;
        self.cursor.consumed += count;
        self.cursor.examined = self.cursor.consumed;
        self.starved_at = None;
        self.check_invariant();

        Ok(&self.data[start..start + count])
    }

    /// Record an incomplete decode that scanned `examined` unconsumed bytes.
    ///
    /// The offset is clamped to the buffer and never moves backwards.
    pub fn mark_examined(&mut self, examined: usize) {
        let absolute = self
            .cursor
            .consumed
            .saturating_add(examined)
            .min(self.data.len());
        self.cursor.examined = self.cursor.examined.max(absolute);
        self.starved_at = Some(self.data.len());
        self.check_invariant();
    }

    /// Discard consumed bytes, shifting the cursor to match.
    pub fn compact(&mut self) {
        let consumed = self.cursor.consumed;
        if consumed == 0 {
            return;
        }
        self.data.advance(consumed);
        self.cursor.examined -= consumed;
        self.cursor.consumed = 0;
        self.starved_at = self.starved_at.map(|len| len.saturating_sub(consumed));
        self.check_invariant();
    }

    /// Compact and reserve room for the next transport read.
    pub fn prepare_read(&mut self, additional: usize) -> &mut BytesMut {
        self.compact();
        self.data.reserve(additional);
        &mut self.data
    }

    /// Append bytes directly (used by tests and adapters).
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    #[inline]
    fn check_invariant(&self) {
        debug_assert!(
            self.cursor.consumed <= self.cursor.examined && self.cursor.examined <= self.data.len(),
            "cursor invariant violated: {:?} over {} bytes",
            self.cursor,
            self.data.len()
        );
    }
}
