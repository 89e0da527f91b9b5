//! In-flight fetch coalescing (§4.2, "starvation guard"): concurrent callers
//! for the same group asking at the same offset share one backend fetch
//! instead of issuing redundant ones.
//!
//! Grounded on the singleflight shape — a registry of keyed
//! [`futures::future::Shared`] futures that late arrivals clone rather than
//! re-drive — adapted to tokio/async rather than the thread-blocking
//! variants the reference material uses elsewhere.

use crate::model::GetMessageResult;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;

/// Coalescing key: a group sharing the same next-read offset on the same
/// flat-file is assumed to be reading in lockstep and gets folded into one
/// fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InflightKey {
    pub group: String,
    pub begin_offset: i64,
}

impl InflightKey {
    pub fn new(group: impl Into<String>, begin_offset: i64) -> Self {
        Self {
            group: group.into(),
            begin_offset,
        }
    }
}

pub type InflightFuture = Shared<BoxFuture<'static, Arc<GetMessageResult>>>;

/// Registry of in-progress fetches for a single flat-file. One instance
/// lives inside each [`crate::flatfile::FlatFileState`].
#[derive(Default)]
pub struct InflightRegistry {
    entries: Arc<DashMap<InflightKey, InflightFuture>>,
}

impl InflightRegistry {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// A fetch for `key` already in flight, if any. Callers clone it and
    /// await their own handle — the original driver still makes progress
    /// even if every coalesced caller is later dropped (§4.2).
    pub fn get(&self, key: &InflightKey) -> Option<InflightFuture> {
        self.entries.get(key).map(|f| f.clone())
    }

    /// Register `produce` as the driver for `key` unless another caller
    /// already won the race; either way returns the future now on record.
    /// Schedules cleanup so the entry is removed once the fetch settles,
    /// regardless of how many (if any) callers are still waiting on it.
    pub fn get_or_insert<F>(&self, key: InflightKey, produce: F) -> InflightFuture
    where
        F: Future<Output = Arc<GetMessageResult>> + Send + 'static,
    {
        if let Some(existing) = self.entries.get(&key) {
            return existing.clone();
        }
        let boxed: BoxFuture<'static, Arc<GetMessageResult>> = produce.boxed();
        let shared = boxed.shared();
        let installed = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| shared.clone())
            .clone();
        self.spawn_cleanup(key, installed.clone());
        installed
    }

    /// Spawns a task that waits for `fut` to settle and then removes its
    /// entry, so the registry never accumulates completed fetches. Holds an
    /// `Arc` clone of the map rather than `self`, since the driver for a
    /// fetch frequently outlives the `get_or_insert` call that started it.
    fn spawn_cleanup(&self, key: InflightKey, fut: InflightFuture) {
        let entries = self.entries.clone();
        tokio::spawn(async move {
            fut.await;
            entries.remove(&key);
        });
    }

    pub fn remove(&self, key: &InflightKey) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
