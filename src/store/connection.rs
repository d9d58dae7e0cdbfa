//! Redis connection pool
//!
//! Provides the shared connection layer for store operations:
//! - Configurable concurrency bound and timeouts
//! - Automatic reconnection on dropped connections
//! - Optional retry with exponential backoff (off by default: the engine
//!   surfaces transient failures instead of hiding them)
//! - Command metrics and health checking
//!
//! # Example
//!
//! ```rust,no_run
//! use reviewscope::store::{RedisConfig, RedisPool};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = RedisPool::new(RedisConfig::default()).await?;
//! let status = pool.health_check().await;
//! # Ok(())
//! # }
//! ```

use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, warn};

use super::util::safe_redis_error;
use crate::error::StoreError;

/// Configuration for the Redis connection pool
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// Redis server URL (e.g., "redis://localhost:6379")
    pub url: String,

    /// Maximum number of concurrent commands
    /// Default: 16
    pub pool_size: u32,

    /// Timeout for establishing new connections
    /// Default: 5 seconds
    pub connection_timeout: Duration,

    /// Timeout for individual commands
    /// Default: 1 second
    pub command_timeout: Duration,

    /// Retry policy for failed commands
    pub retry_policy: RetryPolicy,

    /// Health check interval
    /// Default: 30 seconds
    pub health_check_interval: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 16,
            connection_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(1),
            retry_policy: RetryPolicy::default(),
            health_check_interval: Duration::from_secs(30),
        }
    }
}

impl RedisConfig {
    /// Create a new config with the specified URL
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the concurrency bound
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the command timeout
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the retry policy
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Redis URL cannot be empty".to_string());
        }
        if self.pool_size == 0 {
            return Err("Pool size must be greater than 0".to_string());
        }
        if self.pool_size > 1000 {
            return Err("Pool size cannot exceed 1000".to_string());
        }
        Ok(())
    }
}

/// Retry policy with exponential backoff
///
/// `max_retries` defaults to 0: a failed command surfaces immediately so
/// callers decide whether the operation is safe to repeat.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,

    /// Initial delay between retries
    /// Default: 100ms
    pub initial_delay: Duration,

    /// Maximum delay between retries
    /// Default: 5 seconds
    pub max_delay: Duration,

    /// Multiplier for exponential backoff
    /// Default: 2.0
    pub multiplier: f64,

    /// Add random jitter to delays
    /// Default: true
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Calculate delay for a given attempt number (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let delay_ms = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            // up to 25% jitter
            let jitter = rand::random::<f64>() * 0.25;
            delay_ms * (1.0 + jitter)
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay as u64)
    }

    /// Check if we should retry after the given attempt
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Connection pool metrics
#[derive(Debug, Default)]
pub struct PoolMetrics {
    /// Total number of successful connections
    pub connections_created: AtomicU64,

    /// Total number of connection failures
    pub connection_failures: AtomicU64,

    /// Total number of commands executed
    pub commands_executed: AtomicU64,

    /// Total number of command failures
    pub command_failures: AtomicU64,

    /// Total number of retries
    pub retries: AtomicU64,
}

impl PoolMetrics {
    /// Get a snapshot of the metrics
    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connection_failures: self.connection_failures.load(Ordering::Relaxed),
            commands_executed: self.commands_executed.load(Ordering::Relaxed),
            command_failures: self.command_failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of pool metrics at a point in time
#[derive(Debug, Clone)]
pub struct PoolMetricsSnapshot {
    /// Connections created during pool lifetime
    pub connections_created: u64,
    /// Connection failures during pool lifetime
    pub connection_failures: u64,
    /// Commands executed through the pool
    pub commands_executed: u64,
    /// Command failures encountered
    pub command_failures: u64,
    /// Retry attempts made
    pub retries: u64,
}

/// Health status of the Redis connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Connection is healthy
    Healthy,
    /// Connection is slow but working
    Degraded,
    /// Connection is unhealthy
    Unhealthy,
    /// Not yet checked
    Unknown,
}

/// Redis connection pool
///
/// Wraps a multiplexed connection with a semaphore-bounded concurrency
/// limit, reconnection, and per-command timeouts. Constructed once per
/// process and injected into the engine; [`RedisPool::close`] releases the
/// connection on shutdown.
pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    config: RedisConfig,
    metrics: Arc<PoolMetrics>,
    semaphore: Arc<Semaphore>,
    health_status: RwLock<HealthStatus>,
}

impl RedisPool {
    /// Create a new pool and establish the initial connection
    pub async fn new(config: RedisConfig) -> Result<Self, StoreError> {
        config.validate().map_err(StoreError::Connection)?;

        let client = Client::open(config.url.as_str())
            .map_err(|e| StoreError::Connection(safe_redis_error(&config.url, &e)))?;

        let pool = Self {
            client,
            connection: RwLock::new(None),
            semaphore: Arc::new(Semaphore::new(config.pool_size as usize)),
            metrics: Arc::new(PoolMetrics::default()),
            health_status: RwLock::new(HealthStatus::Unknown),
            config,
        };

        pool.connect().await?;

        debug!("Redis connection pool initialized");
        Ok(pool)
    }

    /// Establish or re-establish the connection
    async fn connect(&self) -> Result<(), StoreError> {
        let start = Instant::now();

        let conn_future = self.client.get_multiplexed_async_connection();
        let conn = tokio::time::timeout(self.config.connection_timeout, conn_future)
            .await
            .map_err(|_| {
                self.metrics
                    .connection_failures
                    .fetch_add(1, Ordering::Relaxed);
                StoreError::Connection("Connection timeout".to_string())
            })?
            .map_err(|e| {
                self.metrics
                    .connection_failures
                    .fetch_add(1, Ordering::Relaxed);
                StoreError::Connection(safe_redis_error(&self.config.url, &e))
            })?;

        {
            let mut guard = self.connection.write().await;
            *guard = Some(conn);
        }

        self.metrics
            .connections_created
            .fetch_add(1, Ordering::Relaxed);
        *self.health_status.write().await = HealthStatus::Healthy;

        debug!("Redis connection established in {:?}", start.elapsed());
        Ok(())
    }

    async fn current_connection(&self) -> Result<MultiplexedConnection, StoreError> {
        let conn = {
            let guard = self.connection.read().await;
            guard.clone()
        };
        match conn {
            Some(c) => Ok(c),
            None => {
                self.connect().await?;
                let guard = self.connection.read().await;
                guard
                    .clone()
                    .ok_or_else(|| StoreError::Connection("No connection available".to_string()))
            }
        }
    }

    /// Execute a command with the pool's timeout and retry policy
    pub async fn execute<F, Fut, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: Fn(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = Result<T, RedisError>>,
    {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StoreError::Connection("Pool closed".to_string()))?;

        let mut attempt = 0;
        loop {
            let conn = self.current_connection().await?;

            let result = tokio::time::timeout(self.config.command_timeout, f(conn)).await;

            match result {
                Ok(Ok(value)) => {
                    self.metrics
                        .commands_executed
                        .fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                Ok(Err(e)) => {
                    self.metrics
                        .command_failures
                        .fetch_add(1, Ordering::Relaxed);

                    if self.config.retry_policy.should_retry(attempt) && is_retriable_error(&e) {
                        self.metrics.retries.fetch_add(1, Ordering::Relaxed);
                        let delay = self.config.retry_policy.delay_for_attempt(attempt);
                        warn!(
                            "Redis command failed (attempt {}), retrying in {:?}: {}",
                            attempt + 1,
                            delay,
                            e
                        );
                        tokio::time::sleep(delay).await;

                        if is_connection_error(&e) {
                            let _ = self.connect().await;
                        }

                        attempt += 1;
                        continue;
                    }

                    return Err(classify_redis_error(&self.config.url, &e));
                }
                Err(_) => {
                    self.metrics
                        .command_failures
                        .fetch_add(1, Ordering::Relaxed);

                    if self.config.retry_policy.should_retry(attempt) {
                        self.metrics.retries.fetch_add(1, Ordering::Relaxed);
                        let delay = self.config.retry_policy.delay_for_attempt(attempt);
                        warn!(
                            "Redis command timeout (attempt {}), retrying in {:?}",
                            attempt + 1,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    return Err(StoreError::Timeout(format!(
                        "Command exceeded {:?}",
                        self.config.command_timeout
                    )));
                }
            }
        }
    }

    /// Perform a health check by pinging the server
    pub async fn health_check(&self) -> HealthStatus {
        let start = Instant::now();

        let result = self
            .execute(
                |mut conn| async move { redis::cmd("PING").query_async::<String>(&mut conn).await },
            )
            .await;

        let status = match result {
            Ok(_) => {
                if start.elapsed() > Duration::from_millis(100) {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                }
            }
            Err(_) => HealthStatus::Unhealthy,
        };

        *self.health_status.write().await = status.clone();
        status
    }

    /// Get the last observed health status without probing the server
    pub fn health_status(&self) -> HealthStatus {
        self.health_status
            .try_read()
            .map(|guard| guard.clone())
            .unwrap_or(HealthStatus::Unknown)
    }

    /// Get pool metrics
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Get the pool configuration
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Release the connection. Subsequent commands reconnect lazily; call
    /// this on shutdown to drop the transport deterministically.
    pub async fn close(&self) {
        let mut guard = self.connection.write().await;
        *guard = None;
        *self.health_status.write().await = HealthStatus::Unknown;
        debug!("Redis connection pool closed");
    }
}

/// Classify a Redis error into the store taxonomy
fn classify_redis_error(url: &str, e: &RedisError) -> StoreError {
    if is_connection_error(e) {
        StoreError::Connection(safe_redis_error(url, e))
    } else if e.is_timeout() {
        StoreError::Timeout(safe_redis_error(url, e))
    } else {
        StoreError::Command(safe_redis_error(url, e))
    }
}

/// Check if an error is retriable
fn is_retriable_error(e: &RedisError) -> bool {
    e.is_connection_dropped()
        || e.is_timeout()
        || e.is_io_error()
        || matches!(e.kind(), redis::ErrorKind::BusyLoadingError)
}

/// Check if an error requires reconnection
fn is_connection_error(e: &RedisError) -> bool {
    e.is_connection_dropped() || e.is_io_error()
}
