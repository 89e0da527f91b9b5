//! Fixed-width binary layouts used by the flat-file backend.
//!
//! The wire/file formats are owned by the flat-file layer (§6); the core
//! only needs to decode the two fixed-size records it reads directly:
//! consume-queue entries and index-file entries. Both are decoded with
//! plain big-endian reads rather than a general-purpose parser — the
//! layouts never change shape, so a parser would be pure overhead.

use crate::error::{FetcherError, Result};
use bytes::Bytes;

/// Size in bytes of one consume-queue entry: `(commit_log_offset:8, size:4, tag_hash:8)`.
pub const CONSUME_QUEUE_STORE_UNIT_SIZE: usize = 20;

/// Size in bytes of one index-file entry:
/// `[hash:4][topic_id:4][queue_id:4][commit_log_offset:8][size:4][time_diff:4]`.
pub const INDEX_FILE_HASH_COMPACT_INDEX_SIZE: usize = 28;

/// A decoded consume-queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeQueueEntry {
    pub commit_log_offset: i64,
    pub size: i32,
    pub tag_hash: i64,
}

/// Decode every whole entry in `buf`. A trailing partial entry (fewer than
/// [`CONSUME_QUEUE_STORE_UNIT_SIZE`] bytes) is silently dropped — the backend
/// never hands back a partial record, but defensive slicing keeps this
/// decoder total rather than panicking.
pub fn decode_consume_queue(buf: &Bytes) -> Vec<ConsumeQueueEntry> {
    let mut entries = Vec::with_capacity(buf.len() / CONSUME_QUEUE_STORE_UNIT_SIZE);
    let mut offset = 0usize;
    while offset + CONSUME_QUEUE_STORE_UNIT_SIZE <= buf.len() {
        let chunk = &buf[offset..offset + CONSUME_QUEUE_STORE_UNIT_SIZE];
        let commit_log_offset = i64::from_be_bytes(chunk[0..8].try_into().unwrap());
        let size = i32::from_be_bytes(chunk[8..12].try_into().unwrap());
        let tag_hash = i64::from_be_bytes(chunk[12..20].try_into().unwrap());
        entries.push(ConsumeQueueEntry {
            commit_log_offset,
            size,
            tag_hash,
        });
        offset += CONSUME_QUEUE_STORE_UNIT_SIZE;
    }
    entries
}

/// A decoded index-file entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub hash: i32,
    pub topic_id: i32,
    pub queue_id: i32,
    pub commit_log_offset: i64,
    pub size: i32,
    pub time_diff: i32,
}

/// Decode every entry in `buf`. Returns an error if `buf`'s length is not a
/// multiple of [`INDEX_FILE_HASH_COMPACT_INDEX_SIZE`] — the index-query path
/// treats that as a malformed buffer and skips it with a warning rather than
/// propagating this error (§4.7 step 3).
pub fn decode_index_entries(buf: &Bytes) -> Result<Vec<IndexEntry>> {
    if buf.len() % INDEX_FILE_HASH_COMPACT_INDEX_SIZE != 0 {
        return Err(FetcherError::MalformedIndexEntry(format!(
            "buffer length {} is not a multiple of {}",
            buf.len(),
            INDEX_FILE_HASH_COMPACT_INDEX_SIZE
        )));
    }
    let mut entries = Vec::with_capacity(buf.len() / INDEX_FILE_HASH_COMPACT_INDEX_SIZE);
    let mut offset = 0usize;
    while offset < buf.len() {
        let chunk = &buf[offset..offset + INDEX_FILE_HASH_COMPACT_INDEX_SIZE];
        let hash = i32::from_be_bytes(chunk[0..4].try_into().unwrap());
        let topic_id = i32::from_be_bytes(chunk[4..8].try_into().unwrap());
        let queue_id = i32::from_be_bytes(chunk[8..12].try_into().unwrap());
        let commit_log_offset = i64::from_be_bytes(chunk[12..20].try_into().unwrap());
        let size = i32::from_be_bytes(chunk[20..24].try_into().unwrap());
        let time_diff = i32::from_be_bytes(chunk[24..28].try_into().unwrap());
        entries.push(IndexEntry {
            hash,
            topic_id,
            queue_id,
            commit_log_offset,
            size,
            time_diff,
        });
        offset += INDEX_FILE_HASH_COMPACT_INDEX_SIZE;
    }
    Ok(entries)
}

/// Hash used to key index entries by `topic#key`. Not cryptographic — just
/// needs to be stable and cheap; `DefaultHasher` truncated to 32 bits matches
/// the 4-byte `hash` field in [`IndexEntry`].
pub fn index_key_hash(s: &str) -> i32 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut hasher);
    (hasher.finish() as u32) as i32
}

/// Build the canonical `topic#key` string hashed by [`index_key_hash`].
pub fn build_key(topic: &str, key: &str) -> String {
    format!("{topic}#{key}")
}
