//! Configuration management
//!
//! This module provides configuration file support with TOML format,
//! environment variable overrides, and sensible defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::horizon::{YearMonth, DEFAULT_INCEPTION_MONTH};
use crate::scan::ScanFailurePolicy;
use crate::store::{RedisConfig, RetryPolicy};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Redis connection settings
    #[serde(default)]
    pub redis: RedisSection,

    /// Query engine tuning
    #[serde(default)]
    pub query: QuerySection,

    /// Monitoring and observability
    #[serde(default)]
    pub monitoring: MonitoringSection,
}

/// Redis connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisSection {
    /// Redis server URL
    #[serde(default = "default_url")]
    pub url: String,

    /// Maximum concurrent commands through the pool
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Timeout for establishing connections, in milliseconds
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Timeout for individual commands, in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Command retry attempts. 0 by default: transient failures are
    /// surfaced to the caller, retry is an external-layer concern.
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for RedisSection {
    fn default() -> Self {
        Self {
            url: default_url(),
            pool_size: default_pool_size(),
            connection_timeout_ms: default_connection_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            max_retries: 0,
        }
    }
}

impl RedisSection {
    /// Build the pool configuration from this section
    pub fn to_pool_config(&self) -> RedisConfig {
        RedisConfig {
            url: self.url.clone(),
            pool_size: self.pool_size,
            connection_timeout: Duration::from_millis(self.connection_timeout_ms),
            command_timeout: Duration::from_millis(self.command_timeout_ms),
            retry_policy: RetryPolicy {
                max_retries: self.max_retries,
                ..RetryPolicy::default()
            },
            ..RedisConfig::default()
        }
    }
}

/// Query engine tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuerySection {
    /// Key namespace records are stored under
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// COUNT hint for each scan page
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: u64,

    /// Most recent entries fetched per stream value
    #[serde(default = "default_stream_entry_limit")]
    pub stream_entry_limit: usize,

    /// Inception month (`YYYYMM`) bounding the `All` horizon
    #[serde(default = "default_inception_month")]
    pub inception_month: String,

    /// What to do when one pattern's scan fails
    #[serde(default)]
    pub scan_failure_policy: ScanFailurePolicy,

    /// Optional query deadline in milliseconds, checked between scan pages
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl Default for QuerySection {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            scan_page_size: default_scan_page_size(),
            stream_entry_limit: default_stream_entry_limit(),
            inception_month: default_inception_month(),
            scan_failure_policy: ScanFailurePolicy::default(),
            deadline_ms: None,
        }
    }
}

impl QuerySection {
    /// Parsed inception month, falling back to the built-in default
    pub fn inception(&self) -> YearMonth {
        YearMonth::parse(&self.inception_month).unwrap_or(DEFAULT_INCEPTION_MONTH)
    }

    /// The configured deadline as a duration
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

/// Monitoring and observability
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringSection {
    /// Log level used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for MonitoringSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_pool_size() -> u32 {
    16
}

fn default_connection_timeout_ms() -> u64 {
    5_000
}

fn default_command_timeout_ms() -> u64 {
    1_000
}

fn default_namespace() -> String {
    "review".to_string()
}

fn default_scan_page_size() -> u64 {
    1_000
}

fn default_stream_entry_limit() -> usize {
    200
}

fn default_inception_month() -> String {
    DEFAULT_INCEPTION_MONTH.token()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path, e))?;

        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file {}: {}", path, e))
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> Result<Self, String> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("REVIEWSCOPE_REDIS_URL") {
            self.redis.url = url;
        }
        if let Ok(size) = std::env::var("REVIEWSCOPE_POOL_SIZE") {
            if let Ok(n) = size.parse() {
                self.redis.pool_size = n;
            }
        }
        if let Ok(namespace) = std::env::var("REVIEWSCOPE_NAMESPACE") {
            self.query.namespace = namespace;
        }
        if let Ok(page) = std::env::var("REVIEWSCOPE_SCAN_PAGE_SIZE") {
            if let Ok(n) = page.parse() {
                self.query.scan_page_size = n;
            }
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.monitoring.log_level = level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.redis.url.is_empty() {
            return Err("Redis URL cannot be empty".to_string());
        }
        if self.redis.pool_size == 0 {
            return Err("Pool size must be > 0".to_string());
        }
        if self.query.namespace.is_empty() {
            return Err("Namespace cannot be empty".to_string());
        }
        if self.query.scan_page_size == 0 {
            return Err("Scan page size must be > 0".to_string());
        }
        if self.query.stream_entry_limit == 0 {
            return Err("Stream entry limit must be > 0".to_string());
        }
        if YearMonth::parse(&self.query.inception_month).is_none() {
            return Err(format!(
                "Inception month must be YYYYMM, got {:?}",
                self.query.inception_month
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.query.namespace, "review");
        assert_eq!(config.query.scan_page_size, 1_000);
        assert_eq!(config.query.stream_entry_limit, 200);
        assert_eq!(config.query.inception_month, "202210");
        assert_eq!(config.redis.max_retries, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str(
            r#"
            [redis]
            url = "redis://cache.internal:6380"

            [query]
            scan_page_size = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.redis.url, "redis://cache.internal:6380");
        assert_eq!(config.redis.pool_size, 16);
        assert_eq!(config.query.scan_page_size, 500);
        assert_eq!(config.query.namespace, "review");
    }

    #[test]
    fn test_validation_rejects_bad_inception_month() {
        let mut config = Config::default();
        config.query.inception_month = "2022-10".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_page_size() {
        let mut config = Config::default();
        config.query.scan_page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deadline_conversion() {
        let mut config = Config::default();
        assert!(config.query.deadline().is_none());
        config.query.deadline_ms = Some(1_500);
        assert_eq!(config.query.deadline(), Some(Duration::from_millis(1_500)));
    }
}
