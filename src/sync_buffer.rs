//! Buffer shared between the reader thread and blocking `receive` calls.
//!
//! The reader appends every inbound chunk while synchronous mode is active.
//! Callers block in [`SyncBuffer::search`] until a terminator shows up, enough
//! bytes have arrived, or their wait runs out. Each append bumps a generation
//! counter under the same lock and notifies the condvar, so waiters sleep
//! until something actually changes instead of polling.

use memchr::memmem;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Inner {
    data: Vec<u8>,
    /// Wake token; replaced on every non-empty append.
    generation: u64,
    /// Bytes before this offset are known not to start `cursor_pattern`.
    cursor: usize,
    cursor_pattern: Vec<u8>,
}

impl Inner {
    fn drain_front(&mut self, count: usize) -> Vec<u8> {
        let count = count.min(self.data.len());
        self.cursor = self.cursor.saturating_sub(count);
        if count == self.data.len() {
            return std::mem::take(&mut self.data);
        }
        self.data.drain(..count).collect()
    }
}

/// Append-only accumulator with a blocking pattern search.
#[derive(Debug, Default)]
pub struct SyncBuffer {
    inner: Mutex<Inner>,
    appended: Condvar,
}

impl SyncBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and wake every waiting searcher. Empty input is ignored.
    pub fn append(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        inner.data.extend_from_slice(bytes);
        inner.generation = inner.generation.wrapping_add(1);
        drop(inner);
        self.appended.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().data.is_empty()
    }

    /// Remove and return the first `count` bytes, or everything if `count`
    /// is at least the buffered length.
    pub fn take(&self, count: usize) -> Vec<u8> {
        self.inner.lock().drain_front(count)
    }

    /// Remove and return everything buffered.
    pub fn take_all(&self) -> Vec<u8> {
        self.inner.lock().drain_front(usize::MAX)
    }

    /// Drop buffered data and forget the scan position.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.data.clear();
        inner.cursor = 0;
        inner.cursor_pattern.clear();
    }

    /// Wait until the buffer satisfies a receive condition.
    ///
    /// With an empty `pattern`, succeeds with `Some(0)` once at least
    /// `min_len` bytes are buffered. Otherwise returns the offset just past
    /// the first occurrence of `pattern`, once `min_len` bytes are present.
    /// Returns `None` when `max_wait` elapses first; a zero `max_wait` checks
    /// once and never blocks.
    ///
    /// Scanning resumes where the previous search for the same pattern
    /// stopped, keeping only the last `pattern.len() - 1` bytes as overlap for
    /// a terminator split across appends.
    pub fn search(&self, pattern: &[u8], min_len: usize, max_wait: Duration) -> Option<usize> {
        let deadline = if max_wait.is_zero() {
            None
        } else {
            Instant::now().checked_add(max_wait)
        };

        let mut inner = self.inner.lock();
        if inner.cursor_pattern != pattern {
            inner.cursor_pattern = pattern.to_vec();
            inner.cursor = 0;
        }

        loop {
            if inner.data.len() >= min_len {
                if pattern.is_empty() {
                    return Some(0);
                }
                let start = inner.cursor.min(inner.data.len());
                if let Some(i) = memmem::find(&inner.data[start..], pattern) {
                    return Some(start + i + pattern.len());
                }
                let overlap = pattern.len() - 1;
                inner.cursor = inner.data.len().saturating_sub(overlap).max(start);
            }

            let deadline = deadline?;
            let seen = inner.generation;
            while inner.generation == seen {
                if self.appended.wait_until(&mut inner, deadline).timed_out() {
                    if inner.generation != seen {
                        break;
                    }
                    return None;
                }
            }
        }
    }

    #[cfg(test)]
    fn cursor(&self) -> usize {
        self.inner.lock().cursor
    }
}
