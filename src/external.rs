//! External collaborator ports (§6).
//!
//! These traits define the boundary between the fetcher core and the
//! surrounding broker: flat-file storage, the index file, and topic
//! metadata. Adapters implement them; the core only ever depends on the
//! trait objects. This mirrors the hexagonal "ports" pattern the control
//! plane's own `domain::ports` module used for its backend/platform
//! boundaries.

use crate::error::BackendError;
use crate::model::{MessageQueue, TopicMetadata};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// A logical pair of a consume-queue stream and a commit-log stream for one
/// queue, on the tiered backing store. Implementations must not mutate any
/// backend data in response to reads — that invariant is relied on
/// throughout the core (§3).
#[async_trait]
pub trait FlatFile: Send + Sync {
    /// The queue this flat-file serves.
    fn message_queue(&self) -> &MessageQueue;

    /// Fetch `count` consume-queue entries starting at `offset`.
    async fn get_consume_queue_async(&self, offset: i64, count: u32) -> Result<Bytes, BackendError>;

    /// Fetch `length` commit-log bytes starting at `offset`.
    async fn get_commit_log_async(&self, offset: i64, length: i64) -> Result<Bytes, BackendError>;

    /// Resolve a consume-queue offset near a given timestamp. `boundary`
    /// selects the lower (`true`) or upper (`false`) bound when the
    /// timestamp falls between two entries. Returns `None` on failure.
    async fn get_offset_in_consume_queue_by_time(&self, timestamp: i64, boundary: bool) -> Option<i64>;

    /// Smallest queue offset still retained.
    fn consume_queue_min_offset(&self) -> i64;

    /// One past the largest queue offset ever appended (i.e. the offset a
    /// producer would write to next).
    fn consume_queue_commit_offset(&self) -> i64;

    /// Smallest commit-log byte offset still retained.
    fn commit_log_min_offset(&self) -> i64;

    /// Number of distinct consumer groups currently reading this queue.
    /// Used as the shared-wrapper eviction threshold (§3).
    fn active_group_count(&self) -> u32;

    /// Record that `group` has been served up through `offset`.
    fn record_group_access(&self, group: &str, offset: i64);
}

/// A handle to a [`FlatFile`], shared by identity. Two handles for the same
/// logical queue obtained from the same manager call compare equal by
/// `Arc::ptr_eq`; handles for different queues never collide even if their
/// metadata happens to coincide (§3, §9).
pub type FlatFileHandle = Arc<dyn FlatFile>;

/// Candidate index entry surfaced by [`IndexFile::query_async`]: the
/// timestamp the owning index segment began at, and the raw buffer of
/// fixed-width entries covering the requested time range.
pub type IndexQueryChunk = (i64, Bytes);

/// The backend's by-key index, probed directly by `IndexQuery` without
/// going through the cache (§4.7).
#[async_trait]
pub trait IndexFile: Send + Sync {
    async fn query_async(
        &self,
        topic: &str,
        key: &str,
        begin_time: i64,
        end_time: i64,
    ) -> Result<Vec<IndexQueryChunk>, BackendError>;
}

/// Resolves topic metadata (currently just `topic_id`) for the index path.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get_topic(&self, topic: &str) -> Option<TopicMetadata>;
}

/// Resolves a [`MessageQueue`] to its [`FlatFileHandle`] and exposes the
/// shared index file. The one entry point the coordinator and index query
/// use to reach backend state.
#[async_trait]
pub trait FlatFileManager: Send + Sync {
    async fn get_flat_file(&self, queue: &MessageQueue) -> Option<FlatFileHandle>;

    fn index_file(&self) -> Arc<dyn IndexFile>;
}
