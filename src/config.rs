//! Layered configuration: built-in defaults, an optional YAML file, then
//! CLI/env overrides via an `Args` + `#[arg(env = ...)]` struct.

use crate::error::{FetcherError, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Resolved runtime configuration for the fetcher core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub read_ahead_cache_size_threshold_rate: f64,
    #[serde(with = "humantime_duration")]
    pub read_ahead_cache_expire_duration: Duration,
    pub read_ahead_message_count_threshold: u32,
    pub read_ahead_message_size_threshold: u64,
    pub read_ahead_batch_size_factor_threshold: u32,
    pub read_ahead_min_factor: u32,
    pub process_memory_budget_bytes: u64,
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_addr: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Plain,
    Json,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            read_ahead_cache_size_threshold_rate: 0.25,
            read_ahead_cache_expire_duration: Duration::from_secs(60),
            read_ahead_message_count_threshold: 1000,
            read_ahead_message_size_threshold: 4 * 1024 * 1024,
            read_ahead_batch_size_factor_threshold: 4,
            read_ahead_min_factor: 1,
            process_memory_budget_bytes: 512 * 1024 * 1024,
            log_level: "info".to_string(),
            log_format: LogFormat::Plain,
            metrics_addr: None,
        }
    }
}

impl FetcherConfig {
    /// Resolve the absolute cache weight ceiling from the configured rate
    /// and the process memory budget.
    pub fn cache_max_weight_bytes(&self) -> u64 {
        ((self.process_memory_budget_bytes as f64) * self.read_ahead_cache_size_threshold_rate) as u64
    }

    /// Load defaults, overlay an optional YAML file, then overlay CLI/env
    /// args parsed via [`CliArgs`].
    pub fn load(yaml_path: Option<&Path>, cli: &CliArgs) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = yaml_path {
            let raw = std::fs::read_to_string(path)?;
            config = serde_yaml::from_str(&raw)?;
        }
        cli.apply(&mut config)?;
        Ok(config)
    }
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&format!("{}s", d.as_secs()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Parse durations like `"60s"`, `"500ms"`, `"2m"` — the subset the config
/// keys actually need, without pulling in a dedicated duration-parsing crate.
pub fn parse_duration(raw: &str) -> std::result::Result<Duration, String> {
    let raw = raw.trim();
    let split_at = raw.find(|c: char| !c.is_ascii_digit()).ok_or_else(|| format!("no unit suffix in '{raw}'"))?;
    let (digits, unit) = raw.split_at(split_at);
    let value: u64 = digits.parse().map_err(|_| format!("not a number: '{digits}'"))?;
    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        other => Err(format!("unrecognized duration unit '{other}'")),
    }
}

/// CLI/env overrides, using `#[arg(long, env = "...")]` fields so every
/// knob can be set from a flag or an environment variable.
#[derive(Parser, Debug)]
#[command(author, version, about = "Tiered message-store read-path fetcher", long_about = None)]
pub struct CliArgs {
    #[arg(long, env = "READ_AHEAD_CACHE_SIZE_RATE")]
    pub cache_size_rate: Option<f64>,

    #[arg(long, env = "READ_AHEAD_CACHE_EXPIRE")]
    pub cache_expire: Option<String>,

    #[arg(long, env = "READ_AHEAD_MESSAGE_COUNT_THRESHOLD")]
    pub message_count_threshold: Option<u32>,

    #[arg(long, env = "READ_AHEAD_MESSAGE_SIZE_THRESHOLD")]
    pub message_size_threshold: Option<u64>,

    #[arg(long, env = "READ_AHEAD_BATCH_SIZE_FACTOR_THRESHOLD")]
    pub batch_size_factor_threshold: Option<u32>,

    #[arg(long, env = "READ_AHEAD_MIN_FACTOR")]
    pub min_factor: Option<u32>,

    #[arg(long, env = "PROCESS_MEMORY_BUDGET_BYTES")]
    pub memory_budget_bytes: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,

    /// Optional Prometheus metrics bind address (e.g. 0.0.0.0:9100)
    #[arg(long, env = "METRICS_ADDR")]
    pub metrics_addr: Option<String>,

    /// Optional YAML config file to layer over the built-in defaults
    #[arg(long, env = "CONFIG_FILE")]
    pub config_file: Option<String>,
}

impl CliArgs {
    fn apply(&self, config: &mut FetcherConfig) -> Result<()> {
        if let Some(v) = self.cache_size_rate {
            config.read_ahead_cache_size_threshold_rate = v;
        }
        if let Some(raw) = &self.cache_expire {
            config.read_ahead_cache_expire_duration = parse_duration(raw).map_err(FetcherError::DurationParse)?;
        }
        if let Some(v) = self.message_count_threshold {
            config.read_ahead_message_count_threshold = v;
        }
        if let Some(v) = self.message_size_threshold {
            config.read_ahead_message_size_threshold = v;
        }
        if let Some(v) = self.batch_size_factor_threshold {
            config.read_ahead_batch_size_factor_threshold = v;
        }
        if let Some(v) = self.min_factor {
            config.read_ahead_min_factor = v;
        }
        if let Some(v) = self.memory_budget_bytes {
            config.process_memory_budget_bytes = v;
        }
        config.log_level = self.log_level.clone();
        config.log_format = if self.log_json { LogFormat::Json } else { LogFormat::Plain };
        if self.metrics_addr.is_some() {
            config.metrics_addr = self.metrics_addr.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_ceiling() {
        let config = FetcherConfig::default();
        assert!(config.cache_max_weight_bytes() > 0);
    }

    #[test]
    fn parses_common_duration_suffixes() {
        assert_eq!(parse_duration("60s").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn rejects_unknown_duration_unit() {
        assert!(parse_duration("5x").is_err());
    }

    #[test]
    fn cli_overrides_apply_over_defaults() {
        let cli = CliArgs {
            cache_size_rate: Some(0.5),
            cache_expire: Some("30s".to_string()),
            message_count_threshold: None,
            message_size_threshold: None,
            batch_size_factor_threshold: None,
            min_factor: Some(2),
            memory_budget_bytes: None,
            log_level: "debug".to_string(),
            log_json: true,
            metrics_addr: None,
            config_file: None,
        };
        let config = FetcherConfig::load(None, &cli).unwrap();
        assert_eq!(config.read_ahead_cache_size_threshold_rate, 0.5);
        assert_eq!(config.read_ahead_cache_expire_duration, Duration::from_secs(30));
        assert_eq!(config.read_ahead_min_factor, 2);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
    }
}
