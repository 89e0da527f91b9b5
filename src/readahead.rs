//! Per-flat-file read-ahead factor (§4.3): how many extra batches the
//! prefetch engine should fetch beyond what a caller actually asked for.
//!
//! A factor of 1 means "prefetch disabled" — the floor every policy is
//! constructed with and the value it decays back down to.

use std::sync::atomic::{AtomicU32, Ordering};

const MAX_FACTOR: u32 = 32;

pub struct ReadAheadPolicy {
    min_factor: u32,
    factor: AtomicU32,
}

impl ReadAheadPolicy {
    pub fn new(min_factor: u32) -> Self {
        let min_factor = min_factor.max(1);
        Self {
            min_factor,
            factor: AtomicU32::new(min_factor),
        }
    }

    pub fn factor(&self) -> u32 {
        self.factor.load(Ordering::Relaxed)
    }

    /// A prefetch batch hit before it expired: widen the window, capped at
    /// [`MAX_FACTOR`].
    pub fn increase(&self) -> u32 {
        let prev = self
            .factor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |f| {
                Some((f + 1).min(MAX_FACTOR))
            })
            .unwrap_or(self.min_factor);
        (prev + 1).min(MAX_FACTOR)
    }

    /// A prefetch batch expired unread: narrow the window back toward
    /// `min_factor`, never below it.
    pub fn decrease(&self) -> u32 {
        let floor = self.min_factor;
        self.factor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |f| {
                Some(if f > floor { f - 1 } else { floor })
            })
            .unwrap_or(floor)
    }

    /// `true` only when the factor has decayed to `1` — the spec disables
    /// prefetch at exactly that value (§4.3, §4.5 step 1), not merely at
    /// whatever floor this policy was configured with.
    pub fn is_disabled(&self) -> bool {
        self.factor() <= 1
    }
}
