//! [`MessageWrapper`]: the cached unit. Holds a zero-copy slice of a fetched
//! batch plus enough locality metadata to serve as an eviction hint (§3).

use bytes::Bytes;
use std::sync::atomic::{AtomicU32, Ordering};

/// A single cached message, plus the bounds of the batch it was produced by.
pub struct MessageWrapper {
    pub body: Bytes,
    pub cur_offset: i64,
    /// Logical offset range of the batch this entry was fetched in. A
    /// locality hint only — wrappers may be partially evicted, so callers
    /// must not assume every offset in `[min_offset, max_offset]` is still
    /// cached (§9, open question).
    pub min_offset: i64,
    pub max_offset: i64,
    /// Size in bytes of the batch that produced this entry; used as the
    /// cache's eviction weight.
    pub size: u64,
    access_count: AtomicU32,
}

impl MessageWrapper {
    pub fn new(body: Bytes, cur_offset: i64, min_offset: i64, max_offset: i64, size: u64, used: bool) -> Self {
        Self {
            body,
            cur_offset,
            min_offset,
            max_offset,
            size,
            access_count: AtomicU32::new(if used { 1 } else { 0 }),
        }
    }

    /// Record a cache hit on this wrapper, returning the new access count.
    pub fn record_access(&self) -> u32 {
        self.access_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn access_count(&self) -> u32 {
        self.access_count.load(Ordering::Acquire)
    }

    /// Eviction weight: this wrapper's own buffer size, not `size` (which is
    /// a locality hint describing the whole batch it was fetched in).
    pub fn weight(&self) -> u64 {
        self.body.len() as u64
    }
}

impl std::fmt::Debug for MessageWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageWrapper")
            .field("cur_offset", &self.cur_offset)
            .field("min_offset", &self.min_offset)
            .field("max_offset", &self.max_offset)
            .field("size", &self.size)
            .field("access_count", &self.access_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_unused_wrapper_starts_at_zero_access() {
        let w = MessageWrapper::new(Bytes::from_static(b"x"), 0, 0, 9, 100, false);
        assert_eq!(w.access_count(), 0);
    }

    #[test]
    fn new_used_wrapper_starts_at_one_access() {
        let w = MessageWrapper::new(Bytes::from_static(b"x"), 0, 0, 9, 100, true);
        assert_eq!(w.access_count(), 1);
    }

    #[test]
    fn record_access_increments_monotonically() {
        let w = MessageWrapper::new(Bytes::from_static(b"x"), 0, 0, 9, 100, false);
        assert_eq!(w.record_access(), 1);
        assert_eq!(w.record_access(), 2);
        assert_eq!(w.access_count(), 2);
    }

    #[test]
    fn weight_is_this_wrappers_own_body_length_not_the_batch_size_hint() {
        let w = MessageWrapper::new(Bytes::from_static(b"hello"), 0, 0, 9, 9999, false);
        assert_eq!(w.weight(), 5);
    }
}
