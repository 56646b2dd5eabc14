//! Thread-safe counter for page request ids and continuation-slot tickets.
//!
//! # Why ids at all? (for beginners)
//!
//! A browser callback can fire long after the call that started it, and a
//! misbehaving page can fire it twice.  Tagging every launched operation with
//! a fresh number lets the receiver tell "the completion I am waiting for"
//! apart from "a late echo of an older call", and drop the latter.
//!
//! The counter uses `AtomicU64`, so several threads can draw ids at once
//! without a lock and without ever seeing the same value twice.

use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing id source.
///
/// Ids start at 1 so that 0 can mean "no id" on the wire.
///
/// # Examples
///
/// ```rust
/// use callbridge_core::sequence::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(1),
        }
    }

    /// Returns the next id.
    ///
    /// `Relaxed` ordering is enough: ids are only compared for equality, they
    /// never publish other memory.
    pub fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// The id the next call to [`next`](Self::next) will return.
    pub fn peek(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
