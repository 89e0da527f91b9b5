//! Shared test fixtures used across unit tests in several modules.
//! Not part of the public API; compiled only under `cfg(test)`.

#![cfg(test)]

use crate::error::BackendError;
use crate::external::{FlatFile, IndexFile, IndexQueryChunk};
use crate::model::MessageQueue;
use async_trait::async_trait;
use bytes::Bytes;

/// A [`FlatFile`] that answers every query with empty/default data. Useful
/// wherever a test needs a handle's *identity* (for `CacheKey`,
/// `FlatFileState`) but not its behavior.
pub struct NoopFlatFile {
    pub queue: MessageQueue,
}

impl Default for NoopFlatFile {
    fn default() -> Self {
        Self {
            queue: MessageQueue::new("test-topic", "test-broker", 0),
        }
    }
}

#[async_trait]
impl FlatFile for NoopFlatFile {
    fn message_queue(&self) -> &MessageQueue {
        &self.queue
    }
    async fn get_consume_queue_async(&self, _offset: i64, _count: u32) -> Result<Bytes, BackendError> {
        Ok(Bytes::new())
    }
    async fn get_commit_log_async(&self, _offset: i64, _length: i64) -> Result<Bytes, BackendError> {
        Ok(Bytes::new())
    }
    async fn get_offset_in_consume_queue_by_time(&self, _timestamp: i64, _boundary: bool) -> Option<i64> {
        None
    }
    fn consume_queue_min_offset(&self) -> i64 {
        0
    }
    fn consume_queue_commit_offset(&self) -> i64 {
        0
    }
    fn commit_log_min_offset(&self) -> i64 {
        0
    }
    fn active_group_count(&self) -> u32 {
        1
    }
    fn record_group_access(&self, _group: &str, _offset: i64) {}
}

pub struct NoopIndexFile;

#[async_trait]
impl IndexFile for NoopIndexFile {
    async fn query_async(
        &self,
        _topic: &str,
        _key: &str,
        _begin_time: i64,
        _end_time: i64,
    ) -> Result<Vec<IndexQueryChunk>, BackendError> {
        Ok(Vec::new())
    }
}
