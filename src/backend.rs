//! `BackendReader`: the one place the core actually pulls bytes off the
//! tiered backend and turns them into messages (§4.4).

use crate::codec::{decode_consume_queue, CONSUME_QUEUE_STORE_UNIT_SIZE};
use crate::error::BackendError;
use crate::external::FlatFileHandle;
use crate::model::{GetMessageResult, GetMessageStatus, Message};
use bytes::Bytes;
use tracing::{debug, warn};

/// Pulls a consume-queue slice and the commit-log bytes it points into,
/// splitting the result into individual zero-copy messages.
pub struct BackendReader {
    read_ahead_message_size_threshold: u64,
}

impl BackendReader {
    pub fn new(read_ahead_message_size_threshold: u64) -> Self {
        Self {
            read_ahead_message_size_threshold,
        }
    }

    pub async fn fetch_range(&self, flat_file: &FlatFileHandle, queue_offset: i64, batch_size: u32) -> GetMessageResult {
        let cq_buf = match flat_file.get_consume_queue_async(queue_offset, batch_size).await {
            Ok(buf) => buf,
            Err(BackendError::NoNewData) => {
                return GetMessageResult::empty(GetMessageStatus::OffsetOverflowOne, 0, 0, queue_offset);
            }
            Err(_) => {
                return GetMessageResult::empty(GetMessageStatus::OffsetFoundNull, 0, 0, queue_offset);
            }
        };

        let mut entries = decode_consume_queue(&cq_buf);
        if entries.is_empty() {
            return GetMessageResult::empty(GetMessageStatus::OffsetFoundNull, 0, 0, queue_offset);
        }

        let first = entries[0];
        let last = *entries.last().unwrap();
        if last.commit_log_offset < first.commit_log_offset {
            warn!(queue_offset, "consume-queue buffer is out of order");
            return GetMessageResult::empty(GetMessageStatus::OffsetFoundNull, 0, 0, queue_offset);
        }

        let mut length = (last.commit_log_offset - first.commit_log_offset) as i64 + last.size as i64;
        while length as u64 > self.read_ahead_message_size_threshold && entries.len() > 1 {
            entries.pop();
            let new_last = *entries.last().unwrap();
            length = (new_last.commit_log_offset - first.commit_log_offset) as i64 + new_last.size as i64;
            debug!(queue_offset, remaining = entries.len(), "truncated batch to fit size threshold");
        }

        let commit_log_buf = match flat_file.get_commit_log_async(first.commit_log_offset, length).await {
            Ok(buf) => buf,
            Err(_) => {
                return GetMessageResult::empty(GetMessageStatus::OffsetFoundNull, 0, 0, queue_offset);
            }
        };

        let mut messages = Vec::with_capacity(entries.len());
        let mut cursor = 0usize;
        for (i, entry) in entries.iter().enumerate() {
            let size = entry.size as usize;
            if cursor + size > commit_log_buf.len() {
                warn!(queue_offset, entry_index = i, "commit-log buffer shorter than consume-queue entries claim");
                break;
            }
            let slice: Bytes = commit_log_buf.slice(cursor..cursor + size);
            messages.push(Message {
                queue_offset: queue_offset + i as i64,
                body: slice,
            });
            cursor += size;
        }

        if messages.is_empty() {
            return GetMessageResult::empty(GetMessageStatus::MessageWasRemoving, 0, 0, queue_offset + entries.len() as i64);
        }

        if messages.len() != entries.len() {
            warn!(queue_offset, parsed = messages.len(), expected = entries.len(), "possible data loss splitting commit-log buffer");
        }
        if entries.len() != batch_size as usize {
            warn!(queue_offset, requested = batch_size, got = entries.len(), "consume-queue returned fewer entries than requested (dispatch delay?)");
        }

        let next_begin_offset = queue_offset + messages.len() as i64;
        GetMessageResult {
            status: GetMessageStatus::Found,
            min_offset: queue_offset,
            max_offset: queue_offset + messages.len() as i64 - 1,
            next_begin_offset,
            message_list: messages,
        }
    }
}

/// Byte length of `count` fixed-width consume-queue entries, a convenience
/// used when a caller wants to size a buffer before fetching.
pub fn consume_queue_byte_span(count: u32) -> u32 {
    count * CONSUME_QUEUE_STORE_UNIT_SIZE as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CONSUME_QUEUE_STORE_UNIT_SIZE;
    use crate::error::BackendError;
    use crate::external::FlatFile;
    use crate::model::MessageQueue;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct FakeFlatFile {
        queue: MessageQueue,
        cq_entries: Vec<(i64, i32, i64)>,
        commit_log: Bytes,
        cq_error: Option<BackendError>,
        requested_batches: Mutex<Vec<u32>>,
    }

    fn encode_cq(entries: &[(i64, i32, i64)]) -> Bytes {
        let mut buf = Vec::with_capacity(entries.len() * CONSUME_QUEUE_STORE_UNIT_SIZE);
        for (offset, size, tag) in entries {
            buf.extend_from_slice(&offset.to_be_bytes());
            buf.extend_from_slice(&size.to_be_bytes());
            buf.extend_from_slice(&tag.to_be_bytes());
        }
        Bytes::from(buf)
    }

    #[async_trait]
    impl FlatFile for FakeFlatFile {
        fn message_queue(&self) -> &MessageQueue {
            &self.queue
        }
        async fn get_consume_queue_async(&self, _offset: i64, count: u32) -> Result<Bytes, BackendError> {
            self.requested_batches.lock().push(count);
            if let Some(e) = &self.cq_error {
                return Err(e.clone());
            }
            Ok(encode_cq(&self.cq_entries))
        }
        async fn get_commit_log_async(&self, offset: i64, length: i64) -> Result<Bytes, BackendError> {
            let start = offset as usize;
            let end = start + length as usize;
            Ok(self.commit_log.slice(start.min(self.commit_log.len())..end.min(self.commit_log.len())))
        }
        async fn get_offset_in_consume_queue_by_time(&self, _timestamp: i64, _boundary: bool) -> Option<i64> {
            None
        }
        fn consume_queue_min_offset(&self) -> i64 {
            0
        }
        fn consume_queue_commit_offset(&self) -> i64 {
            self.cq_entries.len() as i64
        }
        fn commit_log_min_offset(&self) -> i64 {
            0
        }
        fn active_group_count(&self) -> u32 {
            1
        }
        fn record_group_access(&self, _group: &str, _offset: i64) {}
    }

    #[tokio::test]
    async fn happy_path_splits_commit_log_into_messages() {
        let commit_log = Bytes::from_static(b"helloworld");
        let ff: FlatFileHandle = Arc::new(FakeFlatFile {
            queue: MessageQueue::new("t", "b", 0),
            cq_entries: vec![(0, 5, 0), (5, 5, 0)],
            commit_log,
            cq_error: None,
            requested_batches: Mutex::new(Vec::new()),
        });
        let reader = BackendReader::new(1 << 20);
        let result = reader.fetch_range(&ff, 100, 2).await;
        assert_eq!(result.status, GetMessageStatus::Found);
        assert_eq!(result.message_list.len(), 2);
        assert_eq!(result.message_list[0].body, Bytes::from_static(b"hello"));
        assert_eq!(result.message_list[1].body, Bytes::from_static(b"world"));
        assert_eq!(result.next_begin_offset, 102);
    }

    #[tokio::test]
    async fn no_new_data_maps_to_offset_overflow_one() {
        let ff: FlatFileHandle = Arc::new(FakeFlatFile {
            queue: MessageQueue::new("t", "b", 0),
            cq_entries: vec![],
            commit_log: Bytes::new(),
            cq_error: Some(BackendError::NoNewData),
            requested_batches: Mutex::new(Vec::new()),
        });
        let reader = BackendReader::new(1 << 20);
        let result = reader.fetch_range(&ff, 50, 10).await;
        assert_eq!(result.status, GetMessageStatus::OffsetOverflowOne);
        assert_eq!(result.next_begin_offset, 50);
    }

    #[tokio::test]
    async fn out_of_order_consume_queue_yields_offset_found_null() {
        let ff: FlatFileHandle = Arc::new(FakeFlatFile {
            queue: MessageQueue::new("t", "b", 0),
            cq_entries: vec![(100, 5, 0), (50, 5, 0)],
            commit_log: Bytes::from_static(b"xxxxxxxxxx"),
            cq_error: None,
            requested_batches: Mutex::new(Vec::new()),
        });
        let reader = BackendReader::new(1 << 20);
        let result = reader.fetch_range(&ff, 7, 2).await;
        assert_eq!(result.status, GetMessageStatus::OffsetFoundNull);
        assert_eq!(result.next_begin_offset, 7);
    }

    #[tokio::test]
    async fn size_threshold_truncates_trailing_entries() {
        let entries: Vec<(i64, i32, i64)> = (0..5).map(|i| (i * 10, 10, 0)).collect();
        let commit_log = Bytes::from(vec![b'a'; 50]);
        let ff: FlatFileHandle = Arc::new(FakeFlatFile {
            queue: MessageQueue::new("t", "b", 0),
            cq_entries: entries,
            commit_log,
            cq_error: None,
            requested_batches: Mutex::new(Vec::new()),
        });
        // Threshold only leaves room for 2 of the 5 entries (10 bytes each).
        let reader = BackendReader::new(20);
        let result = reader.fetch_range(&ff, 0, 5).await;
        assert_eq!(result.status, GetMessageStatus::Found);
        assert!(result.message_list.len() < 5);
        assert!(result.message_list.len() >= 1);
    }
}
