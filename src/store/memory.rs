//! In-memory store stub
//!
//! A lightweight alternative to Redis for unit and integration testing.
//! Stores everything in memory with no persistence, emulates cursor-based
//! scan pagination over a sorted key snapshot, and supports failure
//! injection so scan-abort and decode-error paths can be exercised
//! deterministically.
//!
//! Not suitable for production use: all data is lost on drop, and the scan
//! cursor is a plain offset rather than a reverse-binary iterator.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use super::client::Store;
use crate::error::StoreError;
use crate::types::{StreamEntry, ValueKind};

/// A stored value, one variant per store-side type
#[derive(Clone, Debug)]
pub enum StoredValue {
    /// Plain string
    Text(String),
    /// Field-value mapping
    Hash(BTreeMap<String, String>),
    /// Ordered list
    List(Vec<String>),
    /// Unordered set
    Set(BTreeSet<String>),
    /// Sorted set, kept ascending by score
    SortedSet(Vec<(String, f64)>),
    /// Append-only stream, oldest first
    Stream(Vec<StreamEntry>),
    /// Reports the given kind but fails every read. Used to exercise
    /// per-key decode failure handling.
    Poison(ValueKind, String),
}

impl StoredValue {
    fn kind(&self) -> ValueKind {
        match self {
            StoredValue::Text(_) => ValueKind::String,
            StoredValue::Hash(_) => ValueKind::Hash,
            StoredValue::List(_) => ValueKind::List,
            StoredValue::Set(_) => ValueKind::Set,
            StoredValue::SortedSet(_) => ValueKind::ZSet,
            StoredValue::Stream(_) => ValueKind::Stream,
            StoredValue::Poison(kind, _) => *kind,
        }
    }
}

/// In-memory [`Store`] implementation
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, StoredValue>>,
    scan_fail_substring: RwLock<Option<String>>,
    redeliver_first_key: AtomicBool,
    offline: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value under a key
    pub fn put(&self, key: impl Into<String>, value: StoredValue) {
        self.data.write().insert(key.into(), value);
    }

    /// Insert a hash value from field pairs
    pub fn put_hash<'a, I>(&self, key: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let map = fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.put(key, StoredValue::Hash(map));
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Make scans of patterns containing `substring` fail with a command
    /// error; `None` clears the injection.
    pub fn fail_scans_matching(&self, substring: Option<&str>) {
        *self.scan_fail_substring.write() = substring.map(str::to_string);
    }

    /// Re-deliver the first matched key on the final page of every scan,
    /// emulating the duplicate delivery a live store is allowed to do.
    pub fn redeliver_first_key(&self, enabled: bool) {
        self.redeliver_first_key.store(enabled, Ordering::Relaxed);
    }

    /// Simulate lost connectivity: every operation fails
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::Relaxed) {
            Err(StoreError::Connection("store offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn read_value(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
        self.check_online()?;
        match self.data.read().get(key) {
            Some(StoredValue::Poison(_, reason)) => Err(StoreError::Command(reason.clone())),
            other => Ok(other.cloned()),
        }
    }
}

/// Match `text` against a glob `pattern` supporting `*` and `?`.
///
/// The patterns the engine generates only use a trailing `*`, but the
/// matcher handles the wildcard anywhere so hand-written test patterns
/// behave like they would against a live store.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    // iterative backtracking matcher
    let (mut p, mut t) = (0, 0);
    let (mut star, mut mark) = (None, 0);
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            mark = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            mark += 1;
            t = mark;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

#[async_trait]
impl Store for MemoryStore {
    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        page_size: u64,
    ) -> Result<(u64, Vec<String>), StoreError> {
        self.check_online()?;

        if let Some(substring) = self.scan_fail_substring.read().as_deref() {
            if pattern.contains(substring) {
                return Err(StoreError::Command("injected scan failure".to_string()));
            }
        }

        let keys: Vec<String> = self.data.read().keys().cloned().collect();
        // the keyspace may have shrunk since the cursor was handed out
        let start = (cursor as usize).min(keys.len());
        let end = (start + page_size.max(1) as usize).min(keys.len());
        let mut page: Vec<String> = keys[start..end]
            .iter()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();

        let next_cursor = if end >= keys.len() { 0 } else { end as u64 };

        if next_cursor == 0 && self.redeliver_first_key.load(Ordering::Relaxed) {
            if let Some(first) = keys.iter().find(|key| glob_match(pattern, key)) {
                page.push(first.clone());
            }
        }

        Ok((next_cursor, page))
    }

    async fn type_of(&self, key: &str) -> Result<ValueKind, StoreError> {
        self.check_online()?;
        Ok(self
            .data
            .read()
            .get(key)
            .map(StoredValue::kind)
            .unwrap_or(ValueKind::Unsupported))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.read_value(key)? {
            Some(StoredValue::Text(s)) => Ok(Some(s)),
            _ => Ok(None),
        }
    }

    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError> {
        match self.read_value(key)? {
            Some(StoredValue::Hash(map)) => Ok(map),
            _ => Ok(BTreeMap::new()),
        }
    }

    async fn list_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        let items = match self.read_value(key)? {
            Some(StoredValue::List(items)) => items,
            _ => return Ok(Vec::new()),
        };
        Ok(slice_range(&items, start, stop))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match self.read_value(key)? {
            Some(StoredValue::Set(members)) => Ok(members.into_iter().collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn sorted_set_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        let mut pairs = match self.read_value(key)? {
            Some(StoredValue::SortedSet(pairs)) => pairs,
            _ => return Ok(Vec::new()),
        };
        pairs.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(slice_range(&pairs, start, stop))
    }

    async fn stream_reverse_range(
        &self,
        key: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, StoreError> {
        let entries = match self.read_value(key)? {
            Some(StoredValue::Stream(entries)) => entries,
            _ => return Ok(Vec::new()),
        };
        Ok(entries.into_iter().rev().take(count).collect())
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError> {
        self.check_online()?;
        let mut data = self.data.write();
        let entry = data
            .entry(key.to_string())
            .or_insert_with(|| StoredValue::Hash(BTreeMap::new()));
        if let StoredValue::Hash(map) = entry {
            for (field, value) in fields {
                map.insert(field.clone(), value.clone());
            }
            Ok(())
        } else {
            Err(StoreError::Command(
                "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
            ))
        }
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.check_online()?;
        let mut data = self.data.write();
        let mut removed = 0;
        for key in keys {
            if data.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn flush_db(&self) -> Result<(), StoreError> {
        self.check_online()?;
        self.data.write().clear();
        Ok(())
    }
}

/// Inclusive range slicing with Redis semantics (negative indexes count
/// from the end, out-of-range clamps).
fn slice_range<T: Clone>(items: &[T], start: isize, stop: isize) -> Vec<T> {
    let len = items.len() as isize;
    if len == 0 {
        return Vec::new();
    }
    let normalize = |index: isize| -> isize {
        if index < 0 {
            index + len
        } else {
            index
        }
    };
    let start = normalize(start).max(0);
    let stop = normalize(stop).min(len - 1);
    if start > stop {
        return Vec::new();
    }
    items[start as usize..=stop as usize].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("review:google_play:202510*", "review:google_play:20251020214855"));
        assert!(glob_match("review:google_play:*", "review:google_play:x"));
        assert!(!glob_match("review:google_play:202510*", "review:app_store:20251020"));
        assert!(glob_match("review:?:1*", "review:a:123"));
        assert!(glob_match("*", "anything"));
        assert!(!glob_match("review:*", "session:1"));
    }

    #[test]
    fn test_slice_range_redis_semantics() {
        let items = vec![1, 2, 3, 4, 5];
        assert_eq!(slice_range(&items, 0, -1), vec![1, 2, 3, 4, 5]);
        assert_eq!(slice_range(&items, 1, 2), vec![2, 3]);
        assert_eq!(slice_range(&items, -2, -1), vec![4, 5]);
        assert_eq!(slice_range(&items, 3, 99), vec![4, 5]);
        assert!(slice_range(&items, 4, 1).is_empty());
    }

    #[tokio::test]
    async fn test_scan_pages_cover_all_keys() {
        let store = MemoryStore::new();
        for i in 0..25 {
            store.put(
                format!("review:google_play:202510{:02}000000", i + 1),
                StoredValue::Text("x".to_string()),
            );
        }

        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let (next, page) = store.scan(cursor, "review:google_play:*", 10).await.unwrap();
            seen.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen.len(), 25);
    }

    #[tokio::test]
    async fn test_offline_store_fails_everything() {
        let store = MemoryStore::new();
        store.put("review:a:1", StoredValue::Text("x".to_string()));
        store.set_offline(true);
        assert!(matches!(
            store.scan(0, "*", 10).await,
            Err(StoreError::Connection(_))
        ));
        assert!(matches!(
            store.type_of("review:a:1").await,
            Err(StoreError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_poison_value_reports_kind_but_fails_reads() {
        let store = MemoryStore::new();
        store.put(
            "review:a:1",
            StoredValue::Poison(ValueKind::Hash, "boom".to_string()),
        );
        assert_eq!(store.type_of("review:a:1").await.unwrap(), ValueKind::Hash);
        assert!(matches!(
            store.hash_get_all("review:a:1").await,
            Err(StoreError::Command(_))
        ));
    }
}
