//! `PrefetchEngine` (§4.5): turns a predicted next offset into one or more
//! background backend fetches, widening or narrowing the read-ahead factor
//! based on whether the previous prefetch was actually consumed.

use crate::backend::BackendReader;
use crate::cache::{CacheKey, CacheStore, MessageWrapper};
use crate::flatfile::FlatFileState;
use crate::inflight::InflightKey;
use crate::metrics::FetcherMetrics;
use crate::model::{GetMessageStatus, Message};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct PrefetchEngine {
    reader: Arc<BackendReader>,
    cache: CacheStore,
    read_ahead_message_count_threshold: u32,
    batch_size_factor_threshold: u32,
    metrics: Option<Arc<FetcherMetrics>>,
}

impl PrefetchEngine {
    pub fn new(
        reader: Arc<BackendReader>,
        cache: CacheStore,
        read_ahead_message_count_threshold: u32,
        batch_size_factor_threshold: u32,
    ) -> Self {
        Self {
            reader,
            cache,
            read_ahead_message_count_threshold,
            batch_size_factor_threshold,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<FetcherMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Fire-and-forget: called after every cache-hit serving path. Never
    /// awaited by the caller — all I/O happens on spawned tasks.
    pub async fn trigger(&self, flat_file: &Arc<FlatFileState>, group: &str, max_count: u32, next_begin_offset: i64) {
        if max_count <= 1 || flat_file.read_ahead.is_disabled() {
            return;
        }

        let factor = flat_file.read_ahead.factor();
        let capped_factor = factor.min(self.read_ahead_message_count_threshold / max_count.max(1)).max(1);
        let wide_count = (max_count * capped_factor).min(self.read_ahead_message_count_threshold);
        let wide_key = InflightKey::new(group, next_begin_offset);
        if flat_file.inflight.get(&wide_key).is_some() {
            return;
        }

        let probe_key = CacheKey::new(flat_file.clone(), next_begin_offset);
        let (queue_offset, factor_after) = if self.cache.get_if_present(&probe_key).is_none() {
            flat_file.read_ahead.decrease();
            (next_begin_offset, flat_file.read_ahead.factor())
        } else {
            // The consumer has advanced exactly to the window we predicted,
            // so the cache hit confirms the prefetch was useful (§4.5 step 4).
            flat_file.read_ahead.increase();
            (next_begin_offset, flat_file.read_ahead.factor())
        };

        let factor = factor_after.min(self.read_ahead_message_count_threshold / max_count.max(1)).max(1);
        let per_batch = max_count * factor.min(self.batch_size_factor_threshold);
        let concurrency = factor.div_ceil(self.batch_size_factor_threshold.max(1)).max(1);

        debug!(
            group,
            queue_offset,
            factor,
            concurrency,
            per_batch,
            wide_count,
            "issuing prefetch batch(es)"
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_prefetch_issued();
        }

        let key = InflightKey::new(group, queue_offset);
        let reader = self.reader.clone();
        let cache = self.cache.clone();
        let ff = flat_file.clone();
        let group_owned = group.to_string();

        let fut = async move {
            let mut last_offset = -1i64;
            let mut offset = queue_offset;
            for _ in 0..concurrency {
                let result = reader.fetch_range(&ff.handle, offset, per_batch.max(1)).await;
                if result.status != GetMessageStatus::Found {
                    warn!(group = %group_owned, offset, status = ?result.status, "prefetch batch returned abnormal status");
                    break;
                }
                if result.message_list.len() as u32 != per_batch {
                    warn!(
                        group = %group_owned,
                        offset,
                        requested = per_batch,
                        got = result.message_list.len(),
                        "prefetch batch size mismatch"
                    );
                }
                let batch_bytes: u64 = result.message_list.iter().map(|m| m.body.len() as u64).sum();
                populate_cache(&cache, &ff, &result.message_list, result.min_offset, result.max_offset, batch_bytes);
                if let Some(last) = result.message_list.last() {
                    last_offset = last.queue_offset;
                    offset = last.queue_offset + 1;
                } else {
                    break;
                }
            }
            Arc::new(crate::model::GetMessageResult::empty(
                if last_offset >= 0 { GetMessageStatus::Found } else { GetMessageStatus::OffsetFoundNull },
                queue_offset,
                last_offset,
                last_offset + 1,
            ))
        };

        flat_file.inflight.get_or_insert(key, fut);
    }
}

fn populate_cache(cache: &CacheStore, flat_file: &Arc<FlatFileState>, messages: &[Message], min_offset: i64, max_offset: i64, size: u64) {
    for msg in messages {
        let key = CacheKey::new(flat_file.clone(), msg.queue_offset);
        let wrapper = Arc::new(MessageWrapper::new(msg.body.clone(), msg.queue_offset, min_offset, max_offset, size, false));
        cache.put(key, wrapper);
    }
}
