//! The query engine
//!
//! Ties the pipeline together: resolve the horizon, derive glob patterns,
//! scan, decode, aggregate, and normalize in one sequential pass per query.
//! The store is a shared remote resource with no ordering guarantees
//! against concurrent ingestion, so stages run strictly in order and the
//! engine holds no cross-call state.
//!
//! The engine is read-only with respect to the record namespace. The
//! store client is injected at construction and owned by the caller;
//! create it once per process and close it on shutdown.
//!
//! # Example
//!
//! ```rust,no_run
//! use reviewscope::config::Config;
//! use reviewscope::engine::QueryEngine;
//! use reviewscope::horizon::Horizon;
//! use reviewscope::store::{RedisPool, RedisStore};
//! use reviewscope::types::QueryRequest;
//! use std::sync::Arc;
//!
//! # async fn example() -> reviewscope::Result<()> {
//! let config = Config::from_env();
//! let pool = RedisPool::new(config.redis.to_pool_config()).await?;
//! let store = Arc::new(RedisStore::new(pool));
//! let engine = QueryEngine::new(store, &config.query);
//!
//! let request = QueryRequest::new(["google_play"], Horizon::SixMonths);
//! let outcome = engine.run_now(&request).await?;
//! println!("{} keys matched", outcome.matched_key_count);
//! # Ok(())
//! # }
//! ```

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::aggregate::build_series;
use crate::config::QuerySection;
use crate::decode::ValueDecoder;
use crate::error::Result;
use crate::horizon::HorizonResolver;
use crate::keys::KeySpace;
use crate::scan::{scan_patterns, ScanFailurePolicy};
use crate::store::Store;
use crate::table::normalize;
use crate::types::{QueryOutcome, QueryRequest};

/// Tunables the engine needs per query
#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// COUNT hint for each scan page
    pub scan_page_size: u64,
    /// Most recent entries fetched per stream value
    pub stream_entry_limit: usize,
    /// What to do when one pattern's scan fails
    pub scan_failure_policy: ScanFailurePolicy,
    /// Optional deadline checked between scan pages
    pub deadline: Option<Duration>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            scan_page_size: 1_000,
            stream_entry_limit: 200,
            scan_failure_policy: ScanFailurePolicy::default(),
            deadline: None,
        }
    }
}

/// The query-and-aggregation engine
pub struct QueryEngine<S: Store> {
    store: Arc<S>,
    space: KeySpace,
    resolver: HorizonResolver,
    options: EngineOptions,
}

impl<S: Store> QueryEngine<S> {
    /// Build an engine from a store client and the query config section
    pub fn new(store: Arc<S>, query: &QuerySection) -> Self {
        Self {
            store,
            space: KeySpace::new(query.namespace.clone()),
            resolver: HorizonResolver::new(query.inception()),
            options: EngineOptions {
                scan_page_size: query.scan_page_size,
                stream_entry_limit: query.stream_entry_limit,
                scan_failure_policy: query.scan_failure_policy,
                deadline: query.deadline(),
            },
        }
    }

    /// Run a query with "today" taken from the wall clock
    pub async fn run_now(&self, request: &QueryRequest) -> Result<QueryOutcome> {
        self.run(request, Utc::now().date_naive()).await
    }

    /// Run a query relative to an explicit "today".
    ///
    /// Sequential pipeline: resolve → patterns → scan → decode →
    /// aggregate → normalize. An empty namespace produces a well-formed
    /// empty outcome; per-key decode failures produce partial data plus a
    /// non-zero error count.
    pub async fn run(&self, request: &QueryRequest, today: NaiveDate) -> Result<QueryOutcome> {
        let buckets = self.resolver.resolve(request.horizon, today);
        let patterns = self
            .space
            .glob_patterns(&request.channels, Some(&buckets.tokens));
        debug!(
            horizon = %request.horizon,
            channels = request.channels.len(),
            patterns = patterns.len(),
            granularity = ?buckets.granularity,
            "query start"
        );

        let scan = scan_patterns(
            self.store.as_ref(),
            &patterns,
            self.options.scan_page_size,
            self.options.scan_failure_policy,
            self.options.deadline,
        )
        .await?;

        let decoder = ValueDecoder::new(self.store.as_ref(), self.options.stream_entry_limit);
        let batch = decoder.decode_batch(&scan.keys).await?;

        let series = build_series(&batch.rows, &self.space, &buckets, &request.channels);
        let table = normalize(&batch.rows, None);

        info!(
            matched = scan.keys.len(),
            errors = batch.errors.len(),
            skipped = series.skipped_keys,
            "query complete"
        );

        Ok(QueryOutcome {
            series: series.points,
            table,
            matched_key_count: scan.keys.len(),
            error_count: batch.errors.len(),
            skipped_key_count: series.skipped_keys,
            skipped_patterns: scan.skipped_patterns,
            type_counts: batch.type_counts,
        })
    }
}

/// File name for an exported query result, e.g.
/// `redis_google_play_6mo_values.json`.
pub fn export_file_name(request: &QueryRequest) -> String {
    let channels: Vec<&str> = request.channels.iter().map(String::as_str).collect();
    format!(
        "redis_{}_{}_values.json",
        channels.join("-"),
        request.horizon.tag()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::horizon::Horizon;

    #[test]
    fn test_export_file_name() {
        let request = QueryRequest::new(["google_play", "app_store"], Horizon::SixMonths);
        assert_eq!(
            export_file_name(&request),
            "redis_app_store-google_play_6mo_values.json"
        );
    }

    #[test]
    fn test_export_file_name_all_horizon() {
        let request = QueryRequest::new(["mnetplus"], Horizon::All);
        assert_eq!(export_file_name(&request), "redis_mnetplus_all_values.json");
    }
}
