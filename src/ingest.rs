//! Ingestion writer
//!
//! The scrapers feeding the namespace are external collaborators; this
//! module is the write boundary they share. One record becomes one hash
//! value under `review:<channel>:<review_created_at>`. A new record means
//! a new timestamp and therefore a new key, so keys are never overwritten
//! under normal operation.
//!
//! Content fields are truncated to [`CONTENT_CHAR_CAP`] characters before
//! writing. Administrative flushes live here too: the engine itself stays
//! read-only.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::keys::KeySpace;
use crate::scan::scan_all;
use crate::store::Store;

/// Character cap applied to content fields before writing
pub const CONTENT_CHAR_CAP: usize = 1_000;

/// One feedback record as the scrapers deliver it
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReviewRecord {
    /// Ingestion channel, e.g. `google_play`
    pub channel_name: String,
    /// Identifier on the origin platform, when known
    pub original_id: String,
    /// Origin-side creation time, when known
    pub original_created_at: String,
    /// Origin-side content, e.g. the app version reviewed
    pub original_content: String,
    /// Platform review identifier
    pub review_id: String,
    /// Display name of the reviewer
    pub reviewer_name: String,
    /// Star rating
    pub rating: i64,
    /// Review text
    pub review_content: String,
    /// View counter as reported by the platform
    pub views: String,
    /// Like/thumbs-up counter as reported by the platform
    pub like: String,
    /// Review creation time, `YYYYMMDDHHMMSS`
    pub review_created_at: String,
    /// Ingestion time, `YYYYMMDDHHMMSS` with microsecond suffix
    pub inserted_at: String,
}

/// Writer over the record namespace
pub struct ReviewWriter<S: Store> {
    store: Arc<S>,
    space: KeySpace,
    scan_page_size: u64,
}

impl<S: Store> ReviewWriter<S> {
    /// Create a writer for the given key space
    pub fn new(store: Arc<S>, space: KeySpace) -> Self {
        Self {
            store,
            space,
            scan_page_size: 1_000,
        }
    }

    /// Insert one record, returning the key it was written under
    pub async fn insert(&self, record: &ReviewRecord) -> Result<String> {
        let key = self
            .space
            .encode(&record.channel_name, &record.review_created_at);
        let fields = record_fields(record);
        self.store.hash_set(&key, &fields).await?;
        debug!(key = %key, "record inserted");
        Ok(key)
    }

    /// Delete every key of one channel, returning how many were removed.
    /// Uses the unbounded per-channel pattern, so the whole channel
    /// namespace is walked regardless of horizon.
    pub async fn purge_channel(&self, channel: &str) -> Result<u64> {
        let channels = std::iter::once(channel.to_string()).collect();
        let patterns = self.space.glob_patterns(&channels, None);
        let mut removed = 0;
        for pattern in &patterns {
            let keys: Vec<String> = scan_all(self.store.as_ref(), pattern, self.scan_page_size, None)
                .await?
                .into_iter()
                .collect();
            removed += self.store.delete(&keys).await?;
        }
        info!(channel, removed, "channel purged");
        Ok(removed)
    }

    /// Drop the whole database
    pub async fn flush_db(&self) -> Result<()> {
        self.store.flush_db().await?;
        info!("database flushed");
        Ok(())
    }
}

/// The field mapping written for a record, content fields capped
fn record_fields(record: &ReviewRecord) -> Vec<(String, String)> {
    vec![
        ("channel_name".to_string(), record.channel_name.clone()),
        ("original_id".to_string(), record.original_id.clone()),
        (
            "original_created_at".to_string(),
            record.original_created_at.clone(),
        ),
        (
            "original_content".to_string(),
            truncate_chars(&record.original_content, CONTENT_CHAR_CAP),
        ),
        ("review_id".to_string(), record.review_id.clone()),
        ("reviewer_name".to_string(), record.reviewer_name.clone()),
        ("rating".to_string(), record.rating.to_string()),
        (
            "review_content".to_string(),
            truncate_chars(&record.review_content, CONTENT_CHAR_CAP),
        ),
        ("views".to_string(), record.views.clone()),
        ("like".to_string(), record.like.clone()),
        (
            "review_created_at".to_string(),
            record.review_created_at.clone(),
        ),
        ("inserted_at".to_string(), record.inserted_at.clone()),
    ]
}

/// Truncate to a character cap, never splitting a code point
fn truncate_chars(text: &str, cap: usize) -> String {
    text.chars().take(cap).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn record() -> ReviewRecord {
        ReviewRecord {
            channel_name: "google_play".to_string(),
            review_id: "785f0b33-a54c-4501-8691-a1f8fe8ecae6".to_string(),
            reviewer_name: "도경".to_string(),
            rating: 1,
            review_content: "광고가 더 많습니다".to_string(),
            review_created_at: "20251020214855".to_string(),
            inserted_at: "20251020214900123456".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long: String = "별".repeat(1_500);
        let capped = truncate_chars(&long, CONTENT_CHAR_CAP);
        assert_eq!(capped.chars().count(), 1_000);
    }

    #[test]
    fn test_short_content_unchanged() {
        assert_eq!(truncate_chars("fine", CONTENT_CHAR_CAP), "fine");
    }

    #[tokio::test]
    async fn test_insert_writes_expected_key_and_fields() {
        let store = Arc::new(MemoryStore::new());
        let writer = ReviewWriter::new(store.clone(), KeySpace::default());

        let key = writer.insert(&record()).await.unwrap();
        assert_eq!(key, "review:google_play:20251020214855");

        let fields = store.hash_get_all(&key).await.unwrap();
        assert_eq!(fields.get("rating").map(String::as_str), Some("1"));
        assert_eq!(
            fields.get("channel_name").map(String::as_str),
            Some("google_play")
        );
        assert_eq!(fields.len(), 12);
    }

    #[tokio::test]
    async fn test_insert_caps_content_fields() {
        let store = Arc::new(MemoryStore::new());
        let writer = ReviewWriter::new(store.clone(), KeySpace::default());

        let mut long_record = record();
        long_record.review_content = "a".repeat(5_000);
        let key = writer.insert(&long_record).await.unwrap();

        let fields = store.hash_get_all(&key).await.unwrap();
        assert_eq!(fields["review_content"].len(), 1_000);
    }

    #[tokio::test]
    async fn test_purge_channel_removes_only_that_channel() {
        let store = Arc::new(MemoryStore::new());
        let writer = ReviewWriter::new(store.clone(), KeySpace::default());

        let mut other = record();
        other.channel_name = "app_store".to_string();
        writer.insert(&record()).await.unwrap();
        writer.insert(&other).await.unwrap();

        let removed = writer.purge_channel("google_play").await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_flush_db_empties_store() {
        let store = Arc::new(MemoryStore::new());
        let writer = ReviewWriter::new(store.clone(), KeySpace::default());
        writer.insert(&record()).await.unwrap();
        writer.flush_db().await.unwrap();
        assert!(store.is_empty());
    }
}
