//! `FetchCoordinator` (§4.6): the top-level read-path entry point. Owns the
//! cache/registry/policy triad for every flat-file it resolves and is the
//! only place that decides cache vs. in-flight vs. cold-fetch.

use crate::backend::BackendReader;
use crate::cache::{CacheKey, CacheStore, MessageWrapper};
use crate::codec;
use crate::flatfile::FlatFileRegistry;
use crate::inflight::InflightKey;
use crate::metrics::FetcherMetrics;
use crate::model::{GetMessageResult, GetMessageStatus, Message, MessageFilter, MessageQueue};
use crate::prefetch::PrefetchEngine;
use std::sync::Arc;
use tracing::instrument;

pub struct FetchCoordinatorConfig {
    pub min_factor: u32,
    pub read_ahead_message_size_threshold: u64,
    pub read_ahead_message_count_threshold: u32,
    pub batch_size_factor_threshold: u32,
}

pub struct FetchCoordinator {
    registry: FlatFileRegistry,
    cache: CacheStore,
    reader: Arc<BackendReader>,
    prefetch: PrefetchEngine,
    min_factor: u32,
    metrics: Option<Arc<FetcherMetrics>>,
}

impl FetchCoordinator {
    pub fn new(manager: Arc<dyn crate::external::FlatFileManager>, cache: CacheStore, config: FetchCoordinatorConfig) -> Self {
        let reader = Arc::new(BackendReader::new(config.read_ahead_message_size_threshold));
        let prefetch = PrefetchEngine::new(
            reader.clone(),
            cache.clone(),
            config.read_ahead_message_count_threshold,
            config.batch_size_factor_threshold,
        );
        Self {
            registry: FlatFileRegistry::new(manager, config.min_factor),
            cache,
            reader,
            prefetch,
            min_factor: config.min_factor,
            metrics: None,
        }
    }

    /// Attach a [`FetcherMetrics`] sink. Counters are bumped on the
    /// streaming read path only — `IndexQuery` is a separate, unmetered
    /// entry point (§4.7).
    pub fn with_metrics(mut self, metrics: Arc<FetcherMetrics>) -> Self {
        self.prefetch = self.prefetch.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    #[instrument(skip(self, filter), fields(%group, %topic, queue_id, queue_offset, max_count))]
    pub async fn get_message_async(
        &self,
        group: &str,
        topic: &str,
        queue_id: u32,
        queue_offset: i64,
        max_count: u32,
        filter: &MessageFilter,
    ) -> GetMessageResult {
        let _ = filter;
        self.get_message_inner(group, topic, queue_id, queue_offset, max_count, true).await
    }

    async fn get_message_inner(
        &self,
        group: &str,
        topic: &str,
        queue_id: u32,
        queue_offset: i64,
        max_count: u32,
        wait_inflight_request: bool,
    ) -> GetMessageResult {
        let queue = MessageQueue::new(topic, "", queue_id);
        let flat_file = match self.registry.resolve(&queue).await {
            Some(ff) => ff,
            None => return GetMessageResult::empty(GetMessageStatus::NoMatchedLogicQueue, 0, 0, queue_offset),
        };

        let min_offset = flat_file.handle.consume_queue_min_offset();
        let commit_offset = flat_file.handle.consume_queue_commit_offset();

        if commit_offset <= 0 {
            return GetMessageResult::empty(GetMessageStatus::NoMessageInQueue, 0, 0, queue_offset);
        }
        if queue_offset < min_offset {
            return GetMessageResult::empty(GetMessageStatus::OffsetTooSmall, min_offset, commit_offset, min_offset);
        }
        if queue_offset == commit_offset {
            return GetMessageResult::empty(GetMessageStatus::OffsetOverflowOne, min_offset, commit_offset, commit_offset);
        }
        if queue_offset > commit_offset {
            return GetMessageResult::empty(GetMessageStatus::OffsetOverflowBadly, min_offset, commit_offset, commit_offset);
        }

        let mut hits = self.probe_contiguous(&flat_file, queue_offset, max_count);
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_probe(max_count as u64, hits.len() as u64);
        }

        if hits.is_empty() && wait_inflight_request {
            let key = InflightKey::new(group, queue_offset);
            if let Some(fut) = flat_file.inflight.get(&key) {
                if let Some(metrics) = &self.metrics {
                    metrics.record_inflight_coalesced();
                }
                fut.await;
                return Box::pin(self.get_message_inner(group, topic, queue_id, queue_offset, max_count, false)).await;
            }
        }

        if hits.is_empty() {
            hits = self.probe_contiguous(&flat_file, queue_offset, max_count);
        }

        if !hits.is_empty() {
            let active_groups = flat_file.handle.active_group_count();
            let mut last_offset = queue_offset;
            let mut messages = Vec::with_capacity(hits.len());
            for (offset, wrapper) in &hits {
                let access_count = wrapper.record_access();
                if access_count >= active_groups {
                    self.cache.invalidate(&CacheKey::new(flat_file.clone(), *offset));
                }
                messages.push(Message {
                    queue_offset: *offset,
                    body: wrapper.body.clone(),
                });
                last_offset = *offset;
            }
            flat_file.record_group_access(group, last_offset);

            self.prefetch.trigger(&flat_file, group, max_count, last_offset + 1).await;

            let next_begin_offset = queue_offset + messages.len() as i64;
            return GetMessageResult {
                status: GetMessageStatus::Found,
                min_offset,
                max_offset: commit_offset - 1,
                next_begin_offset,
                message_list: messages,
            };
        }

        // Full miss: install one in-flight entry *before* awaiting the fetch
        // so concurrent callers for this range coalesce onto the same
        // physical backend call (§4.6 step 7, §8 property 2).
        let batch_size = max_count * self.min_factor;
        let reader = self.reader.clone();
        let cache = self.cache.clone();
        let driver_flat_file = flat_file.clone();
        let key = InflightKey::new(group, queue_offset);
        let metrics = self.metrics.clone();
        let fut = flat_file.inflight.get_or_insert(key, async move {
            let result = reader.fetch_range(&driver_flat_file.handle, queue_offset, batch_size).await;
            if let Some(metrics) = &metrics {
                metrics.record_backend_fetch(result.status == GetMessageStatus::Found);
            }
            if result.status == GetMessageStatus::Found {
                let batch_bytes: u64 = result.message_list.iter().map(|m| m.body.len() as u64).sum();
                for msg in &result.message_list {
                    let key = CacheKey::new(driver_flat_file.clone(), msg.queue_offset);
                    let wrapper = Arc::new(MessageWrapper::new(
                        msg.body.clone(),
                        msg.queue_offset,
                        result.min_offset,
                        result.max_offset,
                        batch_bytes,
                        true,
                    ));
                    cache.put(key, wrapper);
                }
            }
            Arc::new(result)
        });
        let result = (*fut.await).clone();

        if result.status != GetMessageStatus::Found {
            return GetMessageResult::empty(result.status, min_offset, commit_offset, result.next_begin_offset);
        }

        let returned: Vec<Message> = result.message_list.into_iter().take(max_count as usize).collect();
        let next_begin_offset = queue_offset + returned.len() as i64;
        if let Some(last) = returned.last() {
            flat_file.record_group_access(group, last.queue_offset);
        }

        GetMessageResult {
            status: GetMessageStatus::Found,
            min_offset,
            max_offset: commit_offset - 1,
            next_begin_offset,
            message_list: returned,
        }
    }

    fn probe_contiguous(&self, flat_file: &Arc<crate::flatfile::FlatFileState>, start: i64, max_count: u32) -> Vec<(i64, Arc<MessageWrapper>)> {
        let mut hits = Vec::new();
        for i in 0..max_count as i64 {
            let offset = start + i;
            let key = CacheKey::new(flat_file.clone(), offset);
            match self.cache.get_if_present(&key) {
                Some(wrapper) => hits.push((offset, wrapper)),
                None => break,
            }
        }
        hits
    }

    pub async fn get_earliest_message_time_async(&self, topic: &str, queue_id: u32) -> i64 {
        let queue = MessageQueue::new(topic, "", queue_id);
        let flat_file = match self.registry.resolve(&queue).await {
            Some(ff) => ff,
            None => return -1,
        };
        let min_offset = flat_file.handle.commit_log_min_offset();
        match flat_file.handle.get_commit_log_async(min_offset, 8).await {
            Ok(buf) if buf.len() >= 8 => i64::from_be_bytes(buf[0..8].try_into().unwrap_or([0; 8])),
            _ => -1,
        }
    }

    pub async fn get_message_store_timestamp_async(&self, topic: &str, queue_id: u32, queue_offset: i64) -> i64 {
        let queue = MessageQueue::new(topic, "", queue_id);
        let flat_file = match self.registry.resolve(&queue).await {
            Some(ff) => ff,
            None => return -1,
        };
        let cq_buf = match flat_file.handle.get_consume_queue_async(queue_offset, 1).await {
            Ok(buf) => buf,
            Err(_) => return -1,
        };
        let entries = codec::decode_consume_queue(&cq_buf);
        let entry = match entries.first() {
            Some(e) => e,
            None => return -1,
        };
        match flat_file.handle.get_commit_log_async(entry.commit_log_offset, 8).await {
            Ok(buf) if buf.len() >= 8 => i64::from_be_bytes(buf[0..8].try_into().unwrap_or([0; 8])),
            _ => -1,
        }
    }

    pub async fn get_offset_in_queue_by_time(&self, topic: &str, queue_id: u32, timestamp: i64, boundary: bool) -> i64 {
        let queue = MessageQueue::new(topic, "", queue_id);
        let flat_file = match self.registry.resolve(&queue).await {
            Some(ff) => ff,
            None => return -1,
        };
        flat_file
            .handle
            .get_offset_in_consume_queue_by_time(timestamp, boundary)
            .await
            .unwrap_or(-1)
    }

    pub fn cache_stats(&self) -> crate::cache::CacheStatsSnapshot {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::external::{FlatFile, FlatFileManager, IndexFile, IndexQueryChunk};
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct FakeFlatFile {
        queue: MessageQueue,
        min: i64,
        commit: i64,
        body: Bytes,
        fetch_count: Mutex<u32>,
    }

    #[async_trait]
    impl FlatFile for FakeFlatFile {
        fn message_queue(&self) -> &MessageQueue {
            &self.queue
        }
        async fn get_consume_queue_async(&self, offset: i64, count: u32) -> Result<Bytes, BackendError> {
            *self.fetch_count.lock() += 1;
            let n = count.min((self.commit - offset).max(0) as u32);
            let mut buf = Vec::new();
            for i in 0..n {
                let cl_offset = (offset + i as i64) * 4;
                buf.extend_from_slice(&cl_offset.to_be_bytes());
                buf.extend_from_slice(&4i32.to_be_bytes());
                buf.extend_from_slice(&0i64.to_be_bytes());
            }
            Ok(Bytes::from(buf))
        }
        async fn get_commit_log_async(&self, offset: i64, length: i64) -> Result<Bytes, BackendError> {
            let start = offset as usize;
            let end = (start + length as usize).min(self.body.len());
            Ok(self.body.slice(start.min(self.body.len())..end))
        }
        async fn get_offset_in_consume_queue_by_time(&self, _timestamp: i64, _boundary: bool) -> Option<i64> {
            None
        }
        fn consume_queue_min_offset(&self) -> i64 {
            self.min
        }
        fn consume_queue_commit_offset(&self) -> i64 {
            self.commit
        }
        fn commit_log_min_offset(&self) -> i64 {
            0
        }
        fn active_group_count(&self) -> u32 {
            1
        }
        fn record_group_access(&self, _group: &str, _offset: i64) {}
    }

    struct FakeManager {
        commit: i64,
        body_len: usize,
    }

    #[async_trait]
    impl FlatFileManager for FakeManager {
        async fn get_flat_file(&self, queue: &MessageQueue) -> Option<crate::external::FlatFileHandle> {
            let body = Bytes::from(vec![b'm'; self.body_len]);
            Some(Arc::new(FakeFlatFile {
                queue: queue.clone(),
                min: 0,
                commit: self.commit,
                body,
                fetch_count: Mutex::new(0),
            }))
        }
        fn index_file(&self) -> Arc<dyn IndexFile> {
            struct Noop;
            #[async_trait]
            impl IndexFile for Noop {
                async fn query_async(&self, _: &str, _: &str, _: i64, _: i64) -> Result<Vec<IndexQueryChunk>, BackendError> {
                    Ok(Vec::new())
                }
            }
            Arc::new(Noop)
        }
    }

    fn coordinator(commit: i64) -> FetchCoordinator {
        FetchCoordinator::new(
            Arc::new(FakeManager { commit, body_len: 4096 }),
            CacheStore::new(1 << 20, Duration::from_secs(60)),
            FetchCoordinatorConfig {
                min_factor: 1,
                read_ahead_message_size_threshold: 1 << 20,
                read_ahead_message_count_threshold: 1000,
                batch_size_factor_threshold: 4,
            },
        )
    }

    #[tokio::test]
    async fn requested_offset_equal_to_commit_is_overflow_one() {
        let c = coordinator(100);
        let r = c.get_message_async("g1", "t", 0, 100, 10, &MessageFilter::default()).await;
        assert_eq!(r.status, GetMessageStatus::OffsetOverflowOne);
    }

    #[tokio::test]
    async fn requested_offset_below_min_is_offset_too_small() {
        let c = coordinator(100);
        let r = c.get_message_async("g1", "t", 0, -5, 10, &MessageFilter::default()).await;
        assert_eq!(r.status, GetMessageStatus::OffsetTooSmall);
        assert_eq!(r.next_begin_offset, 0);
    }

    #[tokio::test]
    async fn zero_commit_offset_is_no_message_in_queue() {
        let c = coordinator(0);
        let r = c.get_message_async("g1", "t", 0, 0, 10, &MessageFilter::default()).await;
        assert_eq!(r.status, GetMessageStatus::NoMessageInQueue);
    }

    #[tokio::test]
    async fn cold_miss_then_warm_hit() {
        let c = coordinator(200);
        let r1 = c.get_message_async("g1", "t", 0, 100, 10, &MessageFilter::default()).await;
        assert_eq!(r1.status, GetMessageStatus::Found);
        assert_eq!(r1.message_list.len(), 10);
        assert_eq!(r1.next_begin_offset, 110);

        let r2 = c.get_message_async("g1", "t", 0, 100, 10, &MessageFilter::default()).await;
        assert_eq!(r2.status, GetMessageStatus::Found);
        assert_eq!(r2.message_list.len(), 10);
    }
}
