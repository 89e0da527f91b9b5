//! `CacheStore`: a weight-bounded, time-expiring map from [`CacheKey`] to
//! [`MessageWrapper`] (§4.1).
//!
//! Sharded 64 ways so that unrelated flat-files never contend on the same
//! lock. Per-shard
//! ordering is least-recently-used; eviction triggers independently per
//! shard against an even share of the configured weight ceiling, which is an
//! approximation of a single global bound but keeps every operation
//! lock-local and non-blocking (no operation here ever awaits).

use super::key::CacheKey;
use super::wrapper::MessageWrapper;
use crate::flatfile::FlatFileState;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

const CACHE_SHARD_COUNT: usize = 64;

struct CacheRecord {
    wrapper: Arc<MessageWrapper>,
    inserted_at: Instant,
}

struct CacheShard {
    entries: IndexMap<CacheKey, CacheRecord>,
    weight: u64,
}

impl CacheShard {
    fn new() -> Self {
        Self {
            entries: IndexMap::new(),
            weight: 0,
        }
    }

    fn evict_front(&mut self) -> Option<(CacheKey, CacheRecord)> {
        self.entries.shift_remove_index(0).map(|(k, v)| {
            self.weight = self.weight.saturating_sub(v.wrapper.weight());
            (k, v)
        })
    }
}

/// Hit/miss/eviction counters for metrics export (§4.1).
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

struct CacheStoreInner {
    shards: Box<[RwLock<CacheShard>; CACHE_SHARD_COUNT]>,
    max_weight_per_shard: u64,
    ttl: Duration,
    stats: CacheStats,
}

/// Weight-bounded, time-expiring cache. Cheaply cloneable — every clone
/// shares the same shards and stats via an inner `Arc`.
#[derive(Clone)]
pub struct CacheStore(Arc<CacheStoreInner>);

impl CacheStore {
    pub fn new(max_weight_bytes: u64, ttl: Duration) -> Self {
        let shards: Vec<RwLock<CacheShard>> = (0..CACHE_SHARD_COUNT).map(|_| RwLock::new(CacheShard::new())).collect();
        let shards: Box<[RwLock<CacheShard>; CACHE_SHARD_COUNT]> = shards.into_boxed_slice().try_into().unwrap_or_else(|_| {
            unreachable!("CACHE_SHARD_COUNT shards were just allocated")
        });
        Self(Arc::new(CacheStoreInner {
            shards,
            max_weight_per_shard: (max_weight_bytes / CACHE_SHARD_COUNT as u64).max(1),
            ttl,
            stats: CacheStats::default(),
        }))
    }

    #[inline]
    fn shard_for(&self, key: &CacheKey) -> &RwLock<CacheShard> {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        &self.0.shards[(hasher.finish() as usize) % CACHE_SHARD_COUNT]
    }

    /// Look up `key`, promoting it to most-recently-used on hit. Returns
    /// `None` (and counts a miss) if absent or past its TTL; an expired
    /// entry is removed eagerly rather than left for the sweeper.
    pub fn get_if_present(&self, key: &CacheKey) -> Option<Arc<MessageWrapper>> {
        let shard_lock = self.shard_for(key);
        let mut shard = shard_lock.write();
        let expired = match shard.entries.get(key) {
            Some(record) => record.inserted_at.elapsed() > self.0.ttl,
            None => {
                self.0.stats.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        if expired {
            if let Some((_, _, record)) = shard.entries.shift_remove_full(key) {
                shard.weight = shard.weight.saturating_sub(record.wrapper.weight());
                self.0.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
            self.0.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        // Move to back (most recently used).
        let (_, _, record) = shard.entries.shift_remove_full(key).unwrap();
        let wrapper = record.wrapper.clone();
        shard.entries.insert(key.clone(), CacheRecord {
            wrapper: wrapper.clone(),
            inserted_at: record.inserted_at,
        });
        self.0.stats.hits.fetch_add(1, Ordering::Relaxed);
        Some(wrapper)
    }

    /// Insert or replace the wrapper at `key`, evicting least-recently-used
    /// entries in the same shard until the shard's weight share is
    /// satisfied (§3: at most one unevicted wrapper per key at a time).
    pub fn put(&self, key: CacheKey, wrapper: Arc<MessageWrapper>) {
        let shard_lock = self.shard_for(&key);
        let mut shard = shard_lock.write();
        if let Some(old) = shard.entries.shift_remove(&key) {
            shard.weight = shard.weight.saturating_sub(old.wrapper.weight());
        }
        let new_weight = wrapper.weight();
        shard.entries.insert(key, CacheRecord {
            wrapper,
            inserted_at: Instant::now(),
        });
        shard.weight += new_weight;

        while shard.weight > self.0.max_weight_per_shard && !shard.entries.is_empty() {
            if shard.evict_front().is_some() {
                self.0.stats.evictions.fetch_add(1, Ordering::Relaxed);
            } else {
                break;
            }
        }
    }

    /// Remove a single entry, e.g. once every active group has observed it
    /// (`access_count >= active_group_count`, §3).
    pub fn invalidate(&self, key: &CacheKey) {
        let shard_lock = self.shard_for(key);
        let mut shard = shard_lock.write();
        if let Some(removed) = shard.entries.shift_remove(key) {
            shard.weight = shard.weight.saturating_sub(removed.wrapper.weight());
        }
    }

    /// Remove every entry belonging to `flat_file`. Must be called before
    /// the last external reference to a flat-file is released, or stale
    /// wrappers outlive the handle they point into (§9).
    pub fn invalidate_flat_file(&self, flat_file: &Arc<FlatFileState>) {
        for shard_lock in self.0.shards.iter() {
            let mut shard = shard_lock.write();
            let before = shard.entries.len();
            let mut removed_weight = 0u64;
            shard.entries.retain(|k, v| {
                let keep = !Arc::ptr_eq(&k.flat_file, flat_file);
                if !keep {
                    removed_weight += v.wrapper.weight();
                }
                keep
            });
            shard.weight = shard.weight.saturating_sub(removed_weight);
            let removed = before - shard.entries.len();
            if removed > 0 {
                debug!(removed, "invalidated cache entries for retired flat-file");
            }
        }
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.0.stats.snapshot()
    }

    /// Sweep every shard, removing entries whose TTL has elapsed
    /// independent of weight pressure (§4.1, §5). Intended to run on a
    /// periodic `tokio::spawn`ed task.
    pub fn sweep_expired(&self) {
        for shard_lock in self.0.shards.iter() {
            let mut shard = shard_lock.write();
            let ttl = self.0.ttl;
            let mut expired_weight = 0u64;
            let mut expired_count = 0u64;
            shard.entries.retain(|_, v| {
                let keep = v.inserted_at.elapsed() <= ttl;
                if !keep {
                    expired_weight += v.wrapper.weight();
                    expired_count += 1;
                }
                keep
            });
            shard.weight = shard.weight.saturating_sub(expired_weight);
            if expired_count > 0 {
                self.0.stats.evictions.fetch_add(expired_count, Ordering::Relaxed);
            }
        }
    }

    /// Spawn a background task that periodically calls [`sweep_expired`].
    /// Runs independently of readers/writers — an eviction it performs may
    /// race a concurrent `get_if_present`, which is fine: both agree on
    /// "absent" the instant either one wins (§5).
    ///
    /// [`sweep_expired`]: CacheStore::sweep_expired
    pub fn spawn_ttl_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                store.sweep_expired();
            }
        })
    }
}
