//! `fetcher-cli`: a thin demo driver.
//!
//! Boots an in-memory demo backend, wires it to a [`FetchCoordinator`], fires
//! a handful of requests against it, and prints the resulting statuses. This
//! exists because no network RPC facade is specified upstream (§9) — the
//! crate is library-first and this binary is a smoke-testing/benchmarking
//! convenience, not a production server entry point.

use clap::Parser;
use std::sync::Arc;
use tiered_fetch::config::{CliArgs, FetcherConfig, LogFormat};
use tiered_fetch::demo::DemoFlatFileManager;
use tiered_fetch::metrics::{serve_metrics, FetcherMetrics, PrometheusBridge};
use tiered_fetch::{FetchCoordinator, FetchCoordinatorConfig, MessageFilter, MessageQueue};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> tiered_fetch::Result<()> {
    let cli = CliArgs::parse();
    let config = FetcherConfig::load(cli.config_file.as_deref().map(std::path::Path::new), &cli)?;
    init_logging(&config);

    info!(version = tiered_fetch::VERSION, "starting tiered-fetch demo driver");

    let metrics = Arc::new(FetcherMetrics::new());

    if let Some(addr) = config.metrics_addr.clone() {
        let bridge = Arc::new(PrometheusBridge::new().expect("prometheus registry construction"));
        let metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_metrics(&addr, bridge, metrics).await {
                error!(error = %e, "metrics endpoint stopped");
            }
        });
    }

    let queue = MessageQueue::new("demo-topic", "demo-broker", 0);
    let manager = Arc::new(DemoFlatFileManager::new().with_queue(queue.clone(), 1000, 64));
    let cache = tiered_fetch::CacheStore::new(config.cache_max_weight_bytes(), config.read_ahead_cache_expire_duration);
    let coordinator = FetchCoordinator::new(
        manager,
        cache,
        FetchCoordinatorConfig {
            min_factor: config.read_ahead_min_factor,
            read_ahead_message_size_threshold: config.read_ahead_message_size_threshold,
            read_ahead_message_count_threshold: config.read_ahead_message_count_threshold,
            batch_size_factor_threshold: config.read_ahead_batch_size_factor_threshold,
        },
    )
    .with_metrics(metrics.clone());

    let mut offset = 0i64;
    for round in 0..5 {
        let result = coordinator
            .get_message_async("demo-group", "demo-topic", 0, offset, 10, &MessageFilter::default())
            .await;
        info!(
            round,
            status = ?result.status,
            returned = result.message_list.len(),
            next_begin_offset = result.next_begin_offset,
            "fetched batch"
        );
        offset = result.next_begin_offset;
    }

    let stats = coordinator.cache_stats();
    info!(hits = stats.hits, misses = stats.misses, evictions = stats.evictions, "final cache stats");

    let snapshot = metrics.snapshot();
    info!(
        cache_access = snapshot.cache_access,
        cache_hit = snapshot.cache_hit,
        hit_ratio = snapshot.hit_ratio(),
        backend_fetch = snapshot.backend_fetch,
        prefetch_issued = snapshot.prefetch_issued,
        "final fetcher metrics"
    );

    Ok(())
}

fn init_logging(config: &FetcherConfig) {
    let level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if config.log_format == LogFormat::Json {
        tracing_subscriber::registry().with(filter).with(fmt::layer().json()).init();
    } else {
        tracing_subscriber::registry().with(filter).with(fmt::layer().with_target(true)).init();
    }
}
