//! Core data model: queue identity, status taxonomy, and request/response
//! types shared by the streaming and by-key read paths.

use bytes::Bytes;
use std::fmt;

/// Identity of a message queue: `(topic, brokerName, queueId)`. Immutable,
/// used as the lookup key into the flat-file manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageQueue {
    pub topic: String,
    pub broker_name: String,
    pub queue_id: u32,
}

impl MessageQueue {
    pub fn new(topic: impl Into<String>, broker_name: impl Into<String>, queue_id: u32) -> Self {
        Self {
            topic: topic.into(),
            broker_name: broker_name.into(),
            queue_id,
        }
    }
}

impl fmt::Display for MessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.topic, self.broker_name, self.queue_id)
    }
}

/// Identity of a consumer group. A thin newtype rather than a bare `String`
/// so that call sites can't accidentally swap a group for a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Status taxonomy surfaced in [`GetMessageResult`] (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetMessageStatus {
    Found,
    NoMessageInQueue,
    NoMatchedLogicQueue,
    OffsetTooSmall,
    OffsetOverflowOne,
    OffsetOverflowBadly,
    OffsetFoundNull,
    MessageWasRemoving,
}

impl GetMessageStatus {
    /// Whether this status carries a non-empty `message_list`.
    pub fn is_found(&self) -> bool {
        matches!(self, GetMessageStatus::Found)
    }
}

/// A single decoded message: its logical queue offset and its raw body as a
/// zero-copy slice of the fetched commit-log buffer.
#[derive(Debug, Clone)]
pub struct Message {
    pub queue_offset: i64,
    pub body: Bytes,
}

/// Response of the streaming read path, `FetchCoordinator::get_message_async`.
#[derive(Debug, Clone)]
pub struct GetMessageResult {
    pub status: GetMessageStatus,
    pub min_offset: i64,
    pub max_offset: i64,
    pub next_begin_offset: i64,
    pub message_list: Vec<Message>,
}

impl GetMessageResult {
    pub fn empty(status: GetMessageStatus, min_offset: i64, max_offset: i64, next_begin_offset: i64) -> Self {
        Self {
            status,
            min_offset,
            max_offset,
            next_begin_offset,
            message_list: Vec::new(),
        }
    }
}

/// Response of the by-key read path, `IndexQuery::query_message_async`.
#[derive(Debug, Clone, Default)]
pub struct QueryMessageResult {
    /// Timestamp (millis) at which the index covering this query was last
    /// updated; `0` if unknown.
    pub index_last_update_timestamp: i64,
    pub message_list: Vec<Message>,
}

/// Metadata for a topic, resolved from the external metadata store (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMetadata {
    pub topic_id: i32,
}

/// Opaque consumer-supplied filter. The core never evaluates tag/SQL
/// filters itself (filter evaluation is an explicit non-goal, §1); this type
/// only exists so `get_message_async`'s signature matches the external
/// contract — callers that need filtering apply it to `message_list`
/// themselves.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub tag_hash: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_queue_display_matches_parts() {
        let mq = MessageQueue::new("orders", "broker-a", 3);
        assert_eq!(mq.to_string(), "orders:broker-a:3");
    }

    #[test]
    fn get_message_status_is_found_only_for_found() {
        assert!(GetMessageStatus::Found.is_found());
        assert!(!GetMessageStatus::OffsetTooSmall.is_found());
    }
}
