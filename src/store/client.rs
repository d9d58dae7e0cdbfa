//! The store boundary
//!
//! [`Store`] is the seam between the engine and the key-value service: a
//! cursor-paginated glob scan plus one read primitive per value shape, and
//! the few write primitives the ingestion side needs. The engine is
//! read-only with respect to the record namespace; writes exist for the
//! ingestion collaborator and administrative flushes.
//!
//! [`RedisStore`] is the production implementation over a [`RedisPool`].
//! Tests use the in-memory implementation in [`crate::store::memory`].

use async_trait::async_trait;
use redis::{from_redis_value, Value};
use std::collections::BTreeMap;

use super::connection::RedisPool;
use crate::error::StoreError;
use crate::types::{StreamEntry, ValueKind};

/// Primitive operations the store must provide.
///
/// Every operation may fail with a transient connectivity error
/// ([`StoreError::Connection`]), which is surfaced rather than retried
/// here; retry policy is an external-layer concern.
#[async_trait]
pub trait Store: Send + Sync {
    /// One page of a cursor-based scan. Starts at cursor 0; the scan is
    /// complete when the returned cursor is 0 again.
    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        page_size: u64,
    ) -> Result<(u64, Vec<String>), StoreError>;

    /// The store-reported type tag of a key. Missing keys report
    /// [`ValueKind::Unsupported`].
    async fn type_of(&self, key: &str) -> Result<ValueKind, StoreError>;

    /// Raw string value, `None` when the key is gone
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// All fields of a hash value; empty when the key is gone
    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError>;

    /// List elements in `[start, stop]` (inclusive, negative from the end)
    async fn list_range(&self, key: &str, start: isize, stop: isize)
        -> Result<Vec<String>, StoreError>;

    /// Members of a set value, order unspecified
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// `(member, score)` pairs of a sorted set, ascending by score
    async fn sorted_set_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, StoreError>;

    /// The most recent `count` stream entries, newest first
    async fn stream_reverse_range(
        &self,
        key: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, StoreError>;

    /// Write a field mapping under a key (ingestion side)
    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Drop the whole database (administrative flush)
    async fn flush_db(&self) -> Result<(), StoreError>;
}

/// Production [`Store`] over a Redis connection pool
pub struct RedisStore {
    pool: RedisPool,
}

impl RedisStore {
    /// Wrap a connected pool
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool (health checks, metrics, shutdown)
    pub fn pool(&self) -> &RedisPool {
        &self.pool
    }

    /// Release the underlying connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        page_size: u64,
    ) -> Result<(u64, Vec<String>), StoreError> {
        self.pool
            .execute(|mut conn| {
                let pattern = pattern.to_string();
                async move {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(page_size)
                        .query_async::<(u64, Vec<String>)>(&mut conn)
                        .await
                }
            })
            .await
    }

    async fn type_of(&self, key: &str) -> Result<ValueKind, StoreError> {
        let tag = self
            .pool
            .execute(|mut conn| {
                let key = key.to_string();
                async move {
                    redis::cmd("TYPE")
                        .arg(key)
                        .query_async::<String>(&mut conn)
                        .await
                }
            })
            .await?;
        Ok(ValueKind::from_tag(&tag))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.pool
            .execute(|mut conn| {
                let key = key.to_string();
                async move {
                    redis::cmd("GET")
                        .arg(key)
                        .query_async::<Option<String>>(&mut conn)
                        .await
                }
            })
            .await
    }

    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError> {
        self.pool
            .execute(|mut conn| {
                let key = key.to_string();
                async move {
                    redis::cmd("HGETALL")
                        .arg(key)
                        .query_async::<BTreeMap<String, String>>(&mut conn)
                        .await
                }
            })
            .await
    }

    async fn list_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        self.pool
            .execute(|mut conn| {
                let key = key.to_string();
                async move {
                    redis::cmd("LRANGE")
                        .arg(key)
                        .arg(start)
                        .arg(stop)
                        .query_async::<Vec<String>>(&mut conn)
                        .await
                }
            })
            .await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.pool
            .execute(|mut conn| {
                let key = key.to_string();
                async move {
                    redis::cmd("SMEMBERS")
                        .arg(key)
                        .query_async::<Vec<String>>(&mut conn)
                        .await
                }
            })
            .await
    }

    async fn sorted_set_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        self.pool
            .execute(|mut conn| {
                let key = key.to_string();
                async move {
                    redis::cmd("ZRANGE")
                        .arg(key)
                        .arg(start)
                        .arg(stop)
                        .arg("WITHSCORES")
                        .query_async::<Vec<(String, f64)>>(&mut conn)
                        .await
                }
            })
            .await
    }

    async fn stream_reverse_range(
        &self,
        key: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, StoreError> {
        let raw = self
            .pool
            .execute(|mut conn| {
                let key = key.to_string();
                async move {
                    redis::cmd("XREVRANGE")
                        .arg(key)
                        .arg("+")
                        .arg("-")
                        .arg("COUNT")
                        .arg(count)
                        .query_async::<Value>(&mut conn)
                        .await
                }
            })
            .await?;
        parse_stream_reply(raw)
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError> {
        self.pool
            .execute(|mut conn| {
                let key = key.to_string();
                let fields = fields.to_vec();
                async move {
                    let mut cmd = redis::cmd("HSET");
                    cmd.arg(key);
                    for (field, value) in &fields {
                        cmd.arg(field).arg(value);
                    }
                    cmd.query_async::<()>(&mut conn).await
                }
            })
            .await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.pool
            .execute(|mut conn| {
                let keys = keys.to_vec();
                async move {
                    let mut cmd = redis::cmd("DEL");
                    for key in &keys {
                        cmd.arg(key);
                    }
                    cmd.query_async::<u64>(&mut conn).await
                }
            })
            .await
    }

    async fn flush_db(&self) -> Result<(), StoreError> {
        self.pool
            .execute(|mut conn| async move {
                redis::cmd("FLUSHDB").query_async::<()>(&mut conn).await
            })
            .await
    }
}

/// Parse an XREVRANGE reply into stream entries.
///
/// The reply is an array of `[id, [field, value, ...]]` pairs. Entries that
/// do not fit that shape are dropped rather than failing the key; a reply
/// that is not an array at all (other than nil) is a command error.
fn parse_stream_reply(value: Value) -> Result<Vec<StreamEntry>, StoreError> {
    let items = match value {
        Value::Nil => return Ok(Vec::new()),
        Value::Array(items) => items,
        other => {
            return Err(StoreError::Command(format!(
                "Unexpected stream reply shape: {:?}",
                other
            )))
        }
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let Value::Array(pair) = item else { continue };
        let mut pair = pair.into_iter();
        let (Some(raw_id), Some(raw_fields)) = (pair.next(), pair.next()) else {
            continue;
        };
        let Ok(id) = from_redis_value::<String>(&raw_id) else {
            continue;
        };
        entries.push(StreamEntry {
            id,
            fields: parse_field_pairs(raw_fields),
        });
    }
    Ok(entries)
}

/// Parse a flat `[field, value, ...]` array (or RESP3 map) into a mapping,
/// ignoring anything that does not decode as text.
fn parse_field_pairs(value: Value) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    match value {
        Value::Array(flat) => {
            let mut iter = flat.into_iter();
            while let (Some(field), Some(val)) = (iter.next(), iter.next()) {
                if let (Ok(field), Ok(val)) = (
                    from_redis_value::<String>(&field),
                    from_redis_value::<String>(&val),
                ) {
                    fields.insert(field, val);
                }
            }
        }
        Value::Map(pairs) => {
            for (field, val) in pairs {
                if let (Ok(field), Ok(val)) = (
                    from_redis_value::<String>(&field),
                    from_redis_value::<String>(&val),
                ) {
                    fields.insert(field, val);
                }
            }
        }
        _ => {}
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn test_parse_stream_reply_flat_fields() {
        let reply = Value::Array(vec![
            Value::Array(vec![
                bulk("1700000001000-0"),
                Value::Array(vec![bulk("channel_name"), bulk("google_play")]),
            ]),
            Value::Array(vec![
                bulk("1700000000000-0"),
                Value::Array(vec![bulk("rating"), bulk("4")]),
            ]),
        ]);
        let entries = parse_stream_reply(reply).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "1700000001000-0");
        assert_eq!(
            entries[0].fields.get("channel_name").map(String::as_str),
            Some("google_play")
        );
    }

    #[test]
    fn test_parse_stream_reply_nil() {
        assert!(parse_stream_reply(Value::Nil).unwrap().is_empty());
    }

    #[test]
    fn test_parse_stream_reply_skips_malformed_entries() {
        let reply = Value::Array(vec![
            Value::Int(42),
            Value::Array(vec![bulk("1-0"), Value::Array(vec![bulk("a"), bulk("b")])]),
        ]);
        let entries = parse_stream_reply(reply).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_parse_stream_reply_rejects_non_array() {
        assert!(parse_stream_reply(Value::Int(1)).is_err());
    }
}
