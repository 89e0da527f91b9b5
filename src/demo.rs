//! In-memory demo backend: a trivial [`FlatFileManager`] that synthesizes a
//! commit log and consume queue in RAM. Used by the CLI for smoke testing
//! and by integration tests as a stand-in for a real tiered backend (§9:
//! "a demo in-memory backend... useful for smoke testing since there is no
//! network RPC facade specified upstream").

use crate::codec::CONSUME_QUEUE_STORE_UNIT_SIZE;
use crate::error::BackendError;
use crate::external::{FlatFile, FlatFileHandle, FlatFileManager, IndexFile, IndexQueryChunk};
use crate::model::{MessageQueue, TopicMetadata};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A single queue's worth of synthetic data: fixed-size messages appended
/// back to back, indexed by a consume-queue built the same way a real flat-
/// file would lay one out.
pub struct DemoFlatFile {
    queue: MessageQueue,
    commit_log: Bytes,
    consume_queue: Bytes,
    message_count: i64,
    active_groups: AtomicU32,
    group_offsets: DashMap<String, i64>,
}

impl DemoFlatFile {
    /// Synthesize `message_count` fixed-size messages of `message_size`
    /// bytes each, each body just its own queue offset repeated as filler.
    pub fn new(queue: MessageQueue, message_count: i64, message_size: usize) -> Self {
        let mut commit_log = BytesMut::with_capacity(message_count as usize * message_size);
        let mut consume_queue = BytesMut::with_capacity(message_count as usize * CONSUME_QUEUE_STORE_UNIT_SIZE);
        for i in 0..message_count {
            let offset_in_log = commit_log.len() as i64;
            let filler = (i % 256) as u8;
            commit_log.extend(std::iter::repeat(filler).take(message_size));
            consume_queue.extend_from_slice(&offset_in_log.to_be_bytes());
            consume_queue.extend_from_slice(&(message_size as i32).to_be_bytes());
            consume_queue.extend_from_slice(&0i64.to_be_bytes());
        }
        Self {
            queue,
            commit_log: commit_log.freeze(),
            consume_queue: consume_queue.freeze(),
            message_count,
            active_groups: AtomicU32::new(1),
            group_offsets: DashMap::new(),
        }
    }

    pub fn with_active_group_count(self, count: u32) -> Self {
        self.active_groups.store(count, Ordering::Relaxed);
        self
    }
}

#[async_trait]
impl FlatFile for DemoFlatFile {
    fn message_queue(&self) -> &MessageQueue {
        &self.queue
    }

    async fn get_consume_queue_async(&self, offset: i64, count: u32) -> Result<Bytes, BackendError> {
        if offset >= self.message_count {
            return Err(BackendError::NoNewData);
        }
        if offset < 0 {
            return Err(BackendError::IllegalOffset(format!("negative offset {offset}")));
        }
        let start = offset as usize * CONSUME_QUEUE_STORE_UNIT_SIZE;
        let available = self.message_count - offset;
        let take = (count as i64).min(available).max(0) as usize;
        let end = start + take * CONSUME_QUEUE_STORE_UNIT_SIZE;
        Ok(self.consume_queue.slice(start..end.min(self.consume_queue.len())))
    }

    async fn get_commit_log_async(&self, offset: i64, length: i64) -> Result<Bytes, BackendError> {
        if offset < 0 || length < 0 {
            return Err(BackendError::IllegalParam(format!("offset={offset} length={length}")));
        }
        let start = (offset as usize).min(self.commit_log.len());
        let end = (start + length as usize).min(self.commit_log.len());
        Ok(self.commit_log.slice(start..end))
    }

    async fn get_offset_in_consume_queue_by_time(&self, _timestamp: i64, _boundary: bool) -> Option<i64> {
        Some(0)
    }

    fn consume_queue_min_offset(&self) -> i64 {
        0
    }

    fn consume_queue_commit_offset(&self) -> i64 {
        self.message_count
    }

    fn commit_log_min_offset(&self) -> i64 {
        0
    }

    fn active_group_count(&self) -> u32 {
        self.active_groups.load(Ordering::Relaxed)
    }

    fn record_group_access(&self, group: &str, offset: i64) {
        self.group_offsets.insert(group.to_string(), offset);
    }
}

pub struct DemoIndexFile;

#[async_trait]
impl IndexFile for DemoIndexFile {
    async fn query_async(&self, _topic: &str, _key: &str, _begin_time: i64, _end_time: i64) -> Result<Vec<IndexQueryChunk>, BackendError> {
        Ok(Vec::new())
    }
}

/// Manager backing a fixed set of demo queues, created up front.
pub struct DemoFlatFileManager {
    flat_files: Mutex<std::collections::HashMap<MessageQueue, FlatFileHandle>>,
    index_file: Arc<dyn IndexFile>,
}

impl DemoFlatFileManager {
    pub fn new() -> Self {
        Self {
            flat_files: Mutex::new(std::collections::HashMap::new()),
            index_file: Arc::new(DemoIndexFile),
        }
    }

    pub fn with_queue(self, queue: MessageQueue, message_count: i64, message_size: usize) -> Self {
        self.flat_files
            .lock()
            .insert(queue.clone(), Arc::new(DemoFlatFile::new(queue, message_count, message_size)));
        self
    }
}

impl Default for DemoFlatFileManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FlatFileManager for DemoFlatFileManager {
    async fn get_flat_file(&self, queue: &MessageQueue) -> Option<FlatFileHandle> {
        self.flat_files.lock().get(queue).cloned()
    }

    fn index_file(&self) -> Arc<dyn IndexFile> {
        self.index_file.clone()
    }
}

pub struct DemoMetadataStore {
    topics: DashMap<String, TopicMetadata>,
}

impl DemoMetadataStore {
    pub fn new() -> Self {
        Self { topics: DashMap::new() }
    }

    pub fn with_topic(self, topic: impl Into<String>, topic_id: i32) -> Self {
        self.topics.insert(topic.into(), TopicMetadata { topic_id });
        self
    }
}

impl Default for DemoMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl crate::external::MetadataStore for DemoMetadataStore {
    async fn get_topic(&self, topic: &str) -> Option<TopicMetadata> {
        self.topics.get(topic).map(|t| t.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_flat_file_round_trips_a_message() {
        let ff = DemoFlatFile::new(MessageQueue::new("t", "b", 0), 10, 16);
        let cq = ff.get_consume_queue_async(0, 1).await.unwrap();
        assert_eq!(cq.len(), CONSUME_QUEUE_STORE_UNIT_SIZE);
        let commit = ff.get_commit_log_async(0, 16).await.unwrap();
        assert_eq!(commit.len(), 16);
    }

    #[tokio::test]
    async fn offset_past_commit_is_no_new_data() {
        let ff = DemoFlatFile::new(MessageQueue::new("t", "b", 0), 5, 16);
        let err = ff.get_consume_queue_async(5, 1).await.unwrap_err();
        assert_eq!(err, BackendError::NoNewData);
    }

    #[tokio::test]
    async fn manager_resolves_registered_queue_only() {
        let queue = MessageQueue::new("orders", "b", 0);
        let manager = DemoFlatFileManager::new().with_queue(queue.clone(), 100, 32);
        assert!(manager.get_flat_file(&queue).await.is_some());
        assert!(manager.get_flat_file(&MessageQueue::new("missing", "b", 0)).await.is_none());
    }
}
