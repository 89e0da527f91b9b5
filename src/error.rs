//! Error types for the tiered-store fetcher
//!
//! Two error surfaces exist on purpose. `FetcherError` is for conditions that
//! are genuine Rust errors (bad config, a malformed on-disk layout) and never
//! crosses the public read-path boundary. Backend and domain failures instead
//! collapse into [`crate::model::GetMessageStatus`] — see the policy notes on
//! `FetchCoordinator` for why.

use thiserror::Error;

/// Errors raised while configuring or wiring the engine, or while decoding a
/// fixed-width on-disk layout. Never returned from `get_message_async` or
/// `query_message_async` — those surface a status/empty-result instead.
#[derive(Error, Debug)]
pub enum FetcherError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("duration parse error: {0}")]
    DurationParse(String),

    #[error("malformed consume-queue buffer: {0}")]
    MalformedConsumeQueue(String),

    #[error("malformed index entry buffer: {0}")]
    MalformedIndexEntry(String),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config deserialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, FetcherError>;

/// Domain errors surfaced by the backend collaborator (§6). These are caught
/// at the `BackendReader` boundary and mapped to a `GetMessageStatus`; they
/// never propagate further than that.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("no new data at the requested offset")]
    NoNewData,

    #[error("illegal parameter: {0}")]
    IllegalParam(String),

    #[error("illegal offset: {0}")]
    IllegalOffset(String),

    #[error("backend io failure: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_display_is_stable() {
        assert_eq!(
            BackendError::NoNewData.to_string(),
            "no new data at the requested offset"
        );
        assert_eq!(
            BackendError::IllegalOffset("last < first".into()).to_string(),
            "illegal offset: last < first"
        );
    }

    #[test]
    fn fetcher_error_wraps_backend_error() {
        let err: FetcherError = BackendError::NoNewData.into();
        assert!(matches!(err, FetcherError::Backend(BackendError::NoNewData)));
    }
}
