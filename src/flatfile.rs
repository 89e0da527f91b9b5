//! Per-flat-file state the core layers on top of the external [`FlatFile`]
//! handle: the read-ahead factor, the in-flight registry, and per-group
//! access bookkeeping (§3).
//!
//! [`FlatFileState`] is the thing [`crate::cache::CacheKey`] actually
//! compares by identity — two [`FlatFileState`]s are the same flat-file iff
//! they're the same `Arc`, which the [`FlatFileRegistry`] guarantees by
//! caching one per [`MessageQueue`] for as long as the manager keeps
//! reporting a handle for it.

use crate::external::{FlatFileHandle, FlatFileManager};
use crate::inflight::InflightRegistry;
use crate::model::MessageQueue;
use crate::readahead::ReadAheadPolicy;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// The core's extension of an external flat-file handle.
pub struct FlatFileState {
    pub handle: FlatFileHandle,
    pub read_ahead: ReadAheadPolicy,
    pub inflight: InflightRegistry,
    group_offsets: DashMap<String, AtomicI64>,
}

impl FlatFileState {
    fn new(handle: FlatFileHandle, min_factor: u32) -> Self {
        Self {
            handle,
            read_ahead: ReadAheadPolicy::new(min_factor),
            inflight: InflightRegistry::new(),
            group_offsets: DashMap::new(),
        }
    }

    /// Record that `group`'s latest served offset is `offset`. Idempotent
    /// and safe under concurrent readers of different groups (§5).
    pub fn record_group_access(&self, group: &str, offset: i64) {
        match self.group_offsets.get(group) {
            Some(existing) => {
                existing.fetch_max(offset, Ordering::Relaxed);
            }
            None => {
                self.group_offsets
                    .entry(group.to_string())
                    .or_insert_with(|| AtomicI64::new(offset));
            }
        }
        self.handle.record_group_access(group, offset);
    }

    /// Last offset recorded for `group`, if any.
    pub fn last_served_offset(&self, group: &str) -> Option<i64> {
        self.group_offsets.get(group).map(|v| v.load(Ordering::Relaxed))
    }

    /// Build a throwaway state backed by a no-op handle, for tests that only
    /// care about `Arc` identity (e.g. `CacheKey` equality) rather than
    /// real backend behavior.
    #[cfg(test)]
    pub fn for_test() -> Self {
        Self::new(Arc::new(crate::testutil::NoopFlatFile::default()), 1)
    }

    /// Like [`Self::for_test`] but with a configurable `min_factor`, for
    /// tests that need the read-ahead factor to start above 1 (e.g. to
    /// exercise `increase`/`decrease` without tripping `is_disabled`).
    #[cfg(test)]
    pub fn for_test_with_min_factor(min_factor: u32) -> Self {
        Self::new(Arc::new(crate::testutil::NoopFlatFile::default()), min_factor)
    }
}

/// Caches one [`FlatFileState`] per [`MessageQueue`] so that repeated lookups
/// for the same queue observe the same `Arc` identity — required for
/// [`crate::cache::CacheKey`] equality and for the in-flight registry to
/// actually coalesce callers (§9).
pub struct FlatFileRegistry {
    manager: Arc<dyn FlatFileManager>,
    states: DashMap<MessageQueue, Arc<FlatFileState>>,
    min_factor: u32,
}

impl FlatFileRegistry {
    pub fn new(manager: Arc<dyn FlatFileManager>, min_factor: u32) -> Self {
        Self {
            manager,
            states: DashMap::new(),
            min_factor,
        }
    }

    /// Resolve the flat-file state for `queue`, creating and caching a fresh
    /// [`FlatFileState`] on first lookup. Returns `None` if the manager has
    /// no flat-file for this queue.
    pub async fn resolve(&self, queue: &MessageQueue) -> Option<Arc<FlatFileState>> {
        if let Some(existing) = self.states.get(queue) {
            return Some(existing.clone());
        }
        let handle = self.manager.get_flat_file(queue).await?;
        let state = Arc::new(FlatFileState::new(handle, self.min_factor));
        self.states.insert(queue.clone(), state.clone());
        Some(state)
    }

    /// Drop the cached state for `queue`. Callers that invalidate or retire
    /// a flat-file must pair this with a `CacheStore` invalidation sweep for
    /// that handle — see the design note on handle lifetime (§9) — otherwise
    /// stale cache entries would keep referencing a state nobody can look up
    /// again by queue identity.
    pub fn forget(&self, queue: &MessageQueue) -> Option<Arc<FlatFileState>> {
        self.states.remove(queue).map(|(_, v)| v)
    }
}
