//! Cache-line aligned counters plus an optional Prometheus exposition
//! endpoint. One hot struct per flat-file concern, padded to 64 bytes to
//! avoid false sharing between counters bumped from different worker
//! threads.

use prometheus::{IntCounter, Registry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::{error, info};

const CACHE_LINE_SIZE: usize = 64;

/// Process-wide counters for the read path, aligned to a cache line.
#[repr(C, align(64))]
pub struct FetcherMetrics {
    pub cache_access: AtomicU64,
    pub cache_hit: AtomicU64,
    pub cache_eviction: AtomicU64,
    pub backend_fetch: AtomicU64,
    pub backend_fetch_error: AtomicU64,
    pub prefetch_issued: AtomicU64,
    pub inflight_coalesced: AtomicU64,
    _padding: [u8; 8],
}

const _: () = assert!(std::mem::size_of::<FetcherMetrics>() <= CACHE_LINE_SIZE);

impl Default for FetcherMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl FetcherMetrics {
    pub fn new() -> Self {
        Self {
            cache_access: AtomicU64::new(0),
            cache_hit: AtomicU64::new(0),
            cache_eviction: AtomicU64::new(0),
            backend_fetch: AtomicU64::new(0),
            backend_fetch_error: AtomicU64::new(0),
            prefetch_issued: AtomicU64::new(0),
            inflight_coalesced: AtomicU64::new(0),
            _padding: [0; 8],
        }
    }

    pub fn record_cache_probe(&self, accessed: u64, hit: u64) {
        self.cache_access.fetch_add(accessed, Ordering::Relaxed);
        self.cache_hit.fetch_add(hit, Ordering::Relaxed);
    }

    pub fn record_backend_fetch(&self, ok: bool) {
        self.backend_fetch.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.backend_fetch_error.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_prefetch_issued(&self) {
        self.prefetch_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inflight_coalesced(&self) {
        self.inflight_coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FetcherMetricsSnapshot {
        FetcherMetricsSnapshot {
            cache_access: self.cache_access.load(Ordering::Relaxed),
            cache_hit: self.cache_hit.load(Ordering::Relaxed),
            cache_eviction: self.cache_eviction.load(Ordering::Relaxed),
            backend_fetch: self.backend_fetch.load(Ordering::Relaxed),
            backend_fetch_error: self.backend_fetch_error.load(Ordering::Relaxed),
            prefetch_issued: self.prefetch_issued.load(Ordering::Relaxed),
            inflight_coalesced: self.inflight_coalesced.load(Ordering::Relaxed),
            taken_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FetcherMetricsSnapshot {
    pub cache_access: u64,
    pub cache_hit: u64,
    pub cache_eviction: u64,
    pub backend_fetch: u64,
    pub backend_fetch_error: u64,
    pub prefetch_issued: u64,
    pub inflight_coalesced: u64,
    /// Wall-clock time this snapshot was taken, for staleness checks by
    /// whatever periodically polls it.
    pub taken_at_ms: i64,
}

impl FetcherMetricsSnapshot {
    pub fn hit_ratio(&self) -> f64 {
        if self.cache_access == 0 {
            0.0
        } else {
            self.cache_hit as f64 / self.cache_access as f64
        }
    }
}

/// Bridges [`FetcherMetrics`] counters into a Prometheus [`Registry`] so
/// `/metrics` reflects live atomic values rather than a point-in-time copy.
pub struct PrometheusBridge {
    registry: Registry,
    cache_access: IntCounter,
    cache_hit: IntCounter,
    backend_fetch: IntCounter,
    backend_fetch_error: IntCounter,
}

impl PrometheusBridge {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let cache_access = IntCounter::new("fetcher_cache_access_total", "cache lookups attempted")?;
        let cache_hit = IntCounter::new("fetcher_cache_hit_total", "cache lookups satisfied")?;
        let backend_fetch = IntCounter::new("fetcher_backend_fetch_total", "backend fetches issued")?;
        let backend_fetch_error = IntCounter::new("fetcher_backend_fetch_error_total", "backend fetches that failed")?;
        registry.register(Box::new(cache_access.clone()))?;
        registry.register(Box::new(cache_hit.clone()))?;
        registry.register(Box::new(backend_fetch.clone()))?;
        registry.register(Box::new(backend_fetch_error.clone()))?;
        Ok(Self {
            registry,
            cache_access,
            cache_hit,
            backend_fetch,
            backend_fetch_error,
        })
    }

    /// Pull the latest snapshot into the Prometheus counters. Counters are
    /// monotonic on both sides, so this resyncs by adding the delta.
    pub fn sync(&self, snapshot: FetcherMetricsSnapshot) {
        let delta_access = snapshot.cache_access.saturating_sub(self.cache_access.get());
        let delta_hit = snapshot.cache_hit.saturating_sub(self.cache_hit.get());
        let delta_fetch = snapshot.backend_fetch.saturating_sub(self.backend_fetch.get());
        let delta_err = snapshot.backend_fetch_error.saturating_sub(self.backend_fetch_error.get());
        self.cache_access.inc_by(delta_access);
        self.cache_hit.inc_by(delta_hit);
        self.backend_fetch.inc_by(delta_fetch);
        self.backend_fetch_error.inc_by(delta_err);
    }

    fn encode(&self) -> Vec<u8> {
        use prometheus::{Encoder, TextEncoder};
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        let _ = encoder.encode(&self.registry.gather(), &mut buffer);
        buffer
    }
}

/// Serve a minimal `GET /metrics` text endpoint at `addr`. No routing, no
/// keep-alive — every connection gets one response and is closed, which is
/// all a scrape needs.
pub async fn serve_metrics(addr: &str, bridge: Arc<PrometheusBridge>, metrics: Arc<FetcherMetrics>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr, "metrics endpoint listening");
    loop {
        let (mut stream, _) = listener.accept().await?;
        let bridge = bridge.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            bridge.sync(metrics.snapshot());
            let body = bridge.encode();
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            if let Err(e) = stream.write_all(header.as_bytes()).await {
                error!(error = %e, "failed writing metrics response header");
                return;
            }
            let _ = stream.write_all(&body).await;
        });
    }
}
