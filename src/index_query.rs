//! `IndexQuery` (§4.7): the by-key read path. Separate from the streaming
//! path — goes straight to the backend's index file and commit log, never
//! touching the cache.

use crate::codec::{build_key, decode_index_entries, index_key_hash};
use crate::external::{FlatFileManager, MetadataStore};
use crate::model::{Message, MessageQueue, QueryMessageResult};
use futures::future::join_all;
use std::sync::Arc;
use tracing::warn;

pub struct IndexQuery {
    manager: Arc<dyn FlatFileManager>,
    metadata: Arc<dyn MetadataStore>,
}

impl IndexQuery {
    pub fn new(manager: Arc<dyn FlatFileManager>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self { manager, metadata }
    }

    pub async fn query_message_async(&self, topic: &str, key: &str, max_count: u32, begin_time: i64, end_time: i64) -> QueryMessageResult {
        let lookup_key = build_key(topic, key);
        let hash = index_key_hash(&lookup_key);

        let topic_meta = match self.metadata.get_topic(topic).await {
            Some(meta) => meta,
            None => return QueryMessageResult::default(),
        };

        let chunks = match self.manager.index_file().query_async(topic, key, begin_time, end_time).await {
            Ok(chunks) => chunks,
            Err(_) => return QueryMessageResult::default(),
        };

        let mut fetches = Vec::new();
        let mut matched = 0u32;

        'outer: for (file_begin_timestamp, buf) in chunks {
            let entries = match decode_index_entries(&buf) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(topic, error = %e, "skipping malformed index buffer");
                    continue;
                }
            };

            for entry in entries {
                if matched >= max_count {
                    break 'outer;
                }
                if entry.hash != hash || entry.topic_id != topic_meta.topic_id {
                    continue;
                }
                let entry_time = file_begin_timestamp + entry.time_diff as i64;
                if entry_time < begin_time || entry_time > end_time {
                    continue;
                }
                let queue = MessageQueue::new(topic, "", entry.queue_id as u32);
                // Flat-file existence is itself a filter (§4.7 step 4) —
                // only count the entry against `max_count` once we know it
                // resolves to something we can actually fetch from.
                let flat_file = match self.manager.get_flat_file(&queue).await {
                    Some(ff) => ff,
                    None => continue,
                };
                let commit_log_offset = entry.commit_log_offset;
                let size = entry.size;
                fetches.push(async move {
                    let body = flat_file.get_commit_log_async(commit_log_offset, size as i64).await.ok()?;
                    Some(Message {
                        queue_offset: commit_log_offset,
                        body,
                    })
                });
                matched += 1;
            }
        }

        let message_list: Vec<Message> = join_all(fetches).await.into_iter().flatten().collect();
        let index_last_update_timestamp = 0;

        QueryMessageResult {
            index_last_update_timestamp,
            message_list,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::external::{FlatFile, FlatFileHandle, IndexFile, IndexQueryChunk};
    use crate::model::TopicMetadata;
    use async_trait::async_trait;
    use bytes::Bytes;

    struct FakeFlatFile {
        queue: MessageQueue,
    }

    #[async_trait]
    impl FlatFile for FakeFlatFile {
        fn message_queue(&self) -> &MessageQueue {
            &self.queue
        }
        async fn get_consume_queue_async(&self, _offset: i64, _count: u32) -> Result<Bytes, BackendError> {
            Ok(Bytes::new())
        }
        async fn get_commit_log_async(&self, _offset: i64, _length: i64) -> Result<Bytes, BackendError> {
            Ok(Bytes::from_static(b"payload"))
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

    struct FakeIndexFile {
        chunks: Vec<IndexQueryChunk>,
    }

    #[async_trait]
    impl IndexFile for FakeIndexFile {
        async fn query_async(&self, _topic: &str, _key: &str, _begin_time: i64, _end_time: i64) -> Result<Vec<IndexQueryChunk>, BackendError> {
            Ok(self.chunks.clone())
        }
    }

    struct FakeManager {
        index: Arc<FakeIndexFile>,
    }

    #[async_trait]
    impl FlatFileManager for FakeManager {
        async fn get_flat_file(&self, queue: &MessageQueue) -> Option<FlatFileHandle> {
            Some(Arc::new(FakeFlatFile { queue: queue.clone() }))
        }
        fn index_file(&self) -> Arc<dyn IndexFile> {
            self.index.clone()
        }
    }

    struct FakeMetadata;
    #[async_trait]
    impl MetadataStore for FakeMetadata {
        async fn get_topic(&self, _topic: &str) -> Option<TopicMetadata> {
            Some(TopicMetadata { topic_id: 7 })
        }
    }

    struct NoTopicMetadata;
    #[async_trait]
    impl MetadataStore for NoTopicMetadata {
        async fn get_topic(&self, _topic: &str) -> Option<TopicMetadata> {
            None
        }
    }

    fn encode_index_entry(hash: i32, topic_id: i32, queue_id: i32, commit_log_offset: i64, size: i32, time_diff: i32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&hash.to_be_bytes());
        buf.extend_from_slice(&topic_id.to_be_bytes());
        buf.extend_from_slice(&queue_id.to_be_bytes());
        buf.extend_from_slice(&commit_log_offset.to_be_bytes());
        buf.extend_from_slice(&size.to_be_bytes());
        buf.extend_from_slice(&time_diff.to_be_bytes());
        buf
    }

    #[tokio::test]
    async fn missing_topic_metadata_yields_empty_result() {
        let index = Arc::new(FakeIndexFile { chunks: vec![] });
        let query = IndexQuery::new(Arc::new(FakeManager { index }), Arc::new(NoTopicMetadata));
        let result = query.query_message_async("t", "k", 10, 0, 1000).await;
        assert!(result.message_list.is_empty());
    }

    #[tokio::test]
    async fn matching_entry_resolves_to_a_message() {
        let hash = index_key_hash(&build_key("t", "k"));
        let entry = encode_index_entry(hash, 7, 0, 42, 7, 5);
        let index = Arc::new(FakeIndexFile {
            chunks: vec![(1000, Bytes::from(entry))],
        });
        let query = IndexQuery::new(Arc::new(FakeManager { index }), Arc::new(FakeMetadata));
        let result = query.query_message_async("t", "k", 10, 0, 2000).await;
        assert_eq!(result.message_list.len(), 1);
        assert_eq!(result.message_list[0].body, Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn entry_with_wrong_hash_is_skipped() {
        let entry = encode_index_entry(999, 7, 0, 42, 7, 5);
        let index = Arc::new(FakeIndexFile {
            chunks: vec![(1000, Bytes::from(entry))],
        });
        let query = IndexQuery::new(Arc::new(FakeManager { index }), Arc::new(FakeMetadata));
        let result = query.query_message_async("t", "k", 10, 0, 2000).await;
        assert!(result.message_list.is_empty());
    }

    #[tokio::test]
    async fn malformed_buffer_is_skipped_without_failing_the_whole_query() {
        let hash = index_key_hash(&build_key("t", "k"));
        let good = encode_index_entry(hash, 7, 0, 42, 7, 5);
        let mut bad = encode_index_entry(hash, 7, 0, 42, 7, 5);
        bad.push(0xFF);
        let index = Arc::new(FakeIndexFile {
            chunks: vec![(1000, Bytes::from(bad)), (1000, Bytes::from(good))],
        });
        let query = IndexQuery::new(Arc::new(FakeManager { index }), Arc::new(FakeMetadata));
        let result = query.query_message_async("t", "k", 10, 0, 2000).await;
        assert_eq!(result.message_list.len(), 1);
    }
}
