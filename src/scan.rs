//! Exhaustive key enumeration over cursor-paginated scans
//!
//! The store only offers prefix/glob scanning with cursor-based
//! pagination: each call returns a page of keys plus the next cursor, and
//! the iteration is complete when the cursor comes back as 0. This module
//! wraps that loop into a complete, deduplicated key set and isolates the
//! failure handling for it.
//!
//! A single page failure aborts that pattern's scan; accepting a partial
//! page silently would corrupt aggregate counts downstream. Whether a
//! failed pattern aborts the whole query or is skipped (and reported) is
//! an explicit, configurable policy, not an accident of control flow.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::Store;

/// What to do when one pattern's scan fails.
///
/// Connectivity loss is always fatal to the whole query regardless of
/// policy; this only governs non-connectivity scan failures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanFailurePolicy {
    /// Abort the whole query (default)
    #[default]
    Abort,
    /// Drop the failed pattern, record it, and continue with the rest
    SkipPattern,
}

/// The outcome of scanning a pattern set
#[derive(Clone, Debug, Default)]
pub struct ScanOutcome {
    /// Distinct matched keys, sorted ascending for deterministic replay
    pub keys: Vec<String>,
    /// Patterns dropped under [`ScanFailurePolicy::SkipPattern`]
    pub skipped_patterns: Vec<String>,
}

/// Scan one pattern to completion.
///
/// Issues cursor-based scans starting at 0 and accumulates keys until the
/// store reports cursor 0 again. The number of pages is unbounded. When a
/// `deadline` is given it is checked between pages; expiry aborts with
/// [`StoreError::DeadlineExceeded`] instead of hanging indefinitely.
pub async fn scan_all<S: Store + ?Sized>(
    store: &S,
    pattern: &str,
    page_size: u64,
    deadline: Option<Instant>,
) -> Result<HashSet<String>, StoreError> {
    let mut keys = HashSet::new();
    let mut cursor = 0;
    let mut pages = 0usize;

    loop {
        if pages > 0 {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(StoreError::DeadlineExceeded {
                        pattern: pattern.to_string(),
                        keys_seen: keys.len(),
                    });
                }
            }
        }

        let (next_cursor, page) = store.scan(cursor, pattern, page_size).await.map_err(|e| {
            match e {
                // connectivity loss is its own failure class, not a scan abort
                StoreError::Connection(_) => e,
                other => StoreError::ScanFailed {
                    pattern: pattern.to_string(),
                    reason: other.to_string(),
                },
            }
        })?;

        keys.extend(page);
        pages += 1;

        if next_cursor == 0 {
            break;
        }
        cursor = next_cursor;
    }

    debug!(pattern, pages, matched = keys.len(), "scan complete");
    Ok(keys)
}

/// Scan a set of patterns and merge the results.
///
/// Keys matching more than one pattern (overlapping month boundaries, for
/// example) are counted once. The merged set is returned sorted so the
/// decode stage processes keys in a stable order.
pub async fn scan_patterns<S: Store + ?Sized>(
    store: &S,
    patterns: &[String],
    page_size: u64,
    policy: ScanFailurePolicy,
    deadline: Option<Duration>,
) -> Result<ScanOutcome, StoreError> {
    let deadline = deadline.map(|d| Instant::now() + d);
    let mut merged: HashSet<String> = HashSet::new();
    let mut skipped_patterns = Vec::new();

    for pattern in patterns {
        match scan_all(store, pattern, page_size, deadline).await {
            Ok(keys) => {
                merged.extend(keys);
            }
            Err(e @ StoreError::Connection(_)) => return Err(e),
            Err(e @ StoreError::DeadlineExceeded { .. }) => return Err(e),
            Err(e) => match policy {
                ScanFailurePolicy::Abort => return Err(e),
                ScanFailurePolicy::SkipPattern => {
                    warn!(pattern = %pattern, error = %e, "skipping failed pattern");
                    skipped_patterns.push(pattern.clone());
                }
            },
        }
    }

    let mut keys: Vec<String> = merged.into_iter().collect();
    keys.sort();

    Ok(ScanOutcome {
        keys,
        skipped_patterns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoredValue};

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        for day in 1..=9 {
            store.put(
                format!("review:google_play:2025100{day}120000"),
                StoredValue::Text("{}".to_string()),
            );
        }
        store
    }

    #[tokio::test]
    async fn test_scan_all_walks_every_page() {
        let store = seeded_store();
        let keys = scan_all(&store, "review:google_play:202510*", 2, None)
            .await
            .unwrap();
        assert_eq!(keys.len(), 9);
    }

    #[tokio::test]
    async fn test_scan_all_dedups_redelivered_keys() {
        let store = seeded_store();
        store.redeliver_first_key(true);
        let keys = scan_all(&store, "review:google_play:202510*", 3, None)
            .await
            .unwrap();
        assert_eq!(keys.len(), 9);
    }

    #[tokio::test]
    async fn test_overlapping_patterns_count_once() {
        let store = seeded_store();
        let patterns = vec![
            "review:google_play:202510*".to_string(),
            "review:google_play:2025100*".to_string(),
        ];
        let outcome = scan_patterns(&store, &patterns, 100, ScanFailurePolicy::Abort, None)
            .await
            .unwrap();
        assert_eq!(outcome.keys.len(), 9);
        let mut sorted = outcome.keys.clone();
        sorted.sort();
        assert_eq!(outcome.keys, sorted);
    }

    #[tokio::test]
    async fn test_page_failure_aborts_pattern() {
        let store = seeded_store();
        store.fail_scans_matching(Some("202510"));
        let err = scan_all(&store, "review:google_play:202510*", 100, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ScanFailed { .. }));
    }

    #[tokio::test]
    async fn test_abort_policy_fails_query() {
        let store = seeded_store();
        store.fail_scans_matching(Some("202510"));
        let patterns = vec![
            "review:google_play:202509*".to_string(),
            "review:google_play:202510*".to_string(),
        ];
        let result = scan_patterns(&store, &patterns, 100, ScanFailurePolicy::Abort, None).await;
        assert!(matches!(result, Err(StoreError::ScanFailed { .. })));
    }

    #[tokio::test]
    async fn test_skip_policy_records_pattern_and_continues() {
        let store = seeded_store();
        store.fail_scans_matching(Some("202509"));
        let patterns = vec![
            "review:google_play:202509*".to_string(),
            "review:google_play:202510*".to_string(),
        ];
        let outcome = scan_patterns(&store, &patterns, 100, ScanFailurePolicy::SkipPattern, None)
            .await
            .unwrap();
        assert_eq!(outcome.keys.len(), 9);
        assert_eq!(
            outcome.skipped_patterns,
            vec!["review:google_play:202509*".to_string()]
        );
    }

    #[tokio::test]
    async fn test_connection_loss_is_fatal_even_when_skipping() {
        let store = seeded_store();
        store.set_offline(true);
        let patterns = vec!["review:google_play:202510*".to_string()];
        let result =
            scan_patterns(&store, &patterns, 100, ScanFailurePolicy::SkipPattern, None).await;
        assert!(matches!(result, Err(StoreError::Connection(_))));
    }

    #[tokio::test]
    async fn test_expired_deadline_aborts_between_pages() {
        let store = seeded_store();
        // page size 1 forces multiple pages; an already-expired deadline
        // must abort after the first page, not hang through the rest
        let err = scan_all(
            &store,
            "review:google_play:202510*",
            1,
            Some(Instant::now() - Duration::from_millis(1)),
        )
        .await
        .unwrap_err();
        match err {
            StoreError::DeadlineExceeded { keys_seen, .. } => assert!(keys_seen <= 2),
            other => panic!("expected DeadlineExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_namespace_yields_empty_set() {
        let store = MemoryStore::new();
        let keys = scan_all(&store, "review:google_play:*", 100, None)
            .await
            .unwrap();
        assert!(keys.is_empty());
    }
}
