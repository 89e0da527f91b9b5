//! Tiered message-store read-path fetcher.
//!
//! Hides the latency of a remote, tiered backing store from consumer pull
//! requests by combining three mechanisms into one engine: a weight-bounded
//! read-ahead cache, a per-queue adaptive prefetcher, and an in-flight
//! request registry that coalesces overlapping pulls across consumer
//! groups. The write path, compaction, replication, and filter evaluation
//! are out of scope — this crate only ever reads.
//!
//! # Modules
//!
//! - [`model`]: queue identity, status taxonomy, request/response types.
//! - [`codec`]: fixed-width consume-queue and index-entry decoding.
//! - [`external`]: the ports the core depends on (`FlatFile`, `IndexFile`,
//!   `MetadataStore`, `FlatFileManager`).
//! - [`flatfile`]: per-flat-file core state layered on top of an external
//!   handle (read-ahead policy, in-flight registry, group bookkeeping).
//! - [`readahead`]: the adaptive prefetch-factor control loop.
//! - [`inflight`]: singleflight-style fetch coalescing.
//! - [`cache`]: the weight/TTL bounded wrapper store.
//! - [`backend`]: pulls and splits consume-queue/commit-log bytes into
//!   messages.
//! - [`prefetch`]: schedules read-ahead fetches and feeds the cache.
//! - [`coordinator`]: the top-level streaming read-path entry point.
//! - [`index_query`]: the by-key read path.
//! - [`metrics`]: cache-line aligned counters and Prometheus exposition.
//! - [`config`]: layered configuration (defaults, YAML, CLI/env).
//! - [`demo`]: an in-memory backend used for smoke testing.

pub mod backend;
pub mod cache;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod demo;
pub mod error;
pub mod external;
pub mod flatfile;
pub mod index_query;
pub mod inflight;
pub mod metrics;
pub mod model;
pub mod prefetch;
pub mod readahead;
#[cfg(test)]
mod testutil;

pub use cache::{CacheKey, CacheStore, MessageWrapper};
pub use coordinator::{FetchCoordinator, FetchCoordinatorConfig};
pub use error::{BackendError, FetcherError, Result};
pub use external::{FlatFile, FlatFileHandle, FlatFileManager, IndexFile, MetadataStore};
pub use index_query::IndexQuery;
pub use model::{GetMessageResult, GetMessageStatus, Message, MessageFilter, MessageQueue, QueryMessageResult, TopicMetadata};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
