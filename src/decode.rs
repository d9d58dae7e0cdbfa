//! Polymorphic value decoding
//!
//! Writers put whatever they like into the namespace, so a key's value can
//! arrive in any of the store's native shapes. Decoding maps the
//! store-reported type tag to a normalized in-memory value through a
//! closed tagged union, one decode rule per variant:
//!
//! | store type | decoding rule |
//! |---|---|
//! | string | structured parse of the raw text, else opaque scalar |
//! | hash | each field decoded independently |
//! | list | ordered opaque scalars |
//! | set | unordered opaque scalars (sorted here for stable output) |
//! | zset | `(member, score)` ascending by score |
//! | stream | most recent N entries, newest first |
//! | anything else | [`DecodedValue::Unsupported`], never an error |
//!
//! Decoding a single key never aborts the batch: a per-key failure is
//! captured as an error marker and surfaced in an error count.

use serde_json::Value as Json;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{QueryError, StoreError};
use crate::store::Store;
use crate::types::{StreamEntry, ValueKind};

/// A single field's value: structured if the raw text parses as a JSON
/// object or array, otherwise the raw text itself.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// Parsed JSON object or array
    Structured(Json),
    /// Opaque scalar text
    Raw(String),
}

/// Attempt a structured parse of raw text.
///
/// Total: never fails. Only JSON objects and arrays count as structured;
/// text that parses as a bare JSON scalar (`"5"`, `"true"`) stays raw,
/// since digit strings like timestamps must not be reinterpreted as
/// numbers.
pub fn try_parse_structured(text: &str) -> FieldValue {
    match serde_json::from_str::<Json>(text) {
        Ok(value @ (Json::Object(_) | Json::Array(_))) => FieldValue::Structured(value),
        _ => FieldValue::Raw(text.to_string()),
    }
}

/// The normalized in-memory form of a store value
#[derive(Clone, Debug, PartialEq)]
pub enum DecodedValue {
    /// String value, structured-parsed when possible
    Scalar(FieldValue),
    /// Hash value, each field decoded independently
    Mapping(BTreeMap<String, FieldValue>),
    /// List value
    Sequence(Vec<String>),
    /// Set value; members sorted for deterministic output
    SetMembers(Vec<String>),
    /// Sorted-set value, ascending by score
    OrderedSet(Vec<(String, f64)>),
    /// Stream value, newest entries first, bounded
    Log(Vec<StreamEntry>),
    /// Unrecognized store type; treated as "no value" downstream
    Unsupported,
}

/// A key together with its observed type and decoded value
#[derive(Clone, Debug)]
pub struct DecodedKey {
    /// The record key
    pub key: String,
    /// Store-reported type tag at decode time
    pub kind: ValueKind,
    /// The normalized value
    pub value: DecodedValue,
}

/// The result of decoding a batch of keys
#[derive(Debug, Default)]
pub struct DecodedBatch {
    /// Successfully decoded keys, in input order
    pub rows: Vec<DecodedKey>,
    /// Per-key error markers: `(key, reason)`
    pub errors: Vec<(String, String)>,
    /// Successfully decoded keys per type tag
    pub type_counts: BTreeMap<String, usize>,
}

/// Decoder over a store handle
pub struct ValueDecoder<'a, S: Store + ?Sized> {
    store: &'a S,
    stream_entry_limit: usize,
}

impl<'a, S: Store + ?Sized> ValueDecoder<'a, S> {
    /// Create a decoder. `stream_entry_limit` bounds how many entries are
    /// fetched from append-log values.
    pub fn new(store: &'a S, stream_entry_limit: usize) -> Self {
        Self {
            store,
            stream_entry_limit,
        }
    }

    /// Decode one key under its store-reported type.
    ///
    /// Returns the store error unchanged when connectivity is lost (fatal
    /// to the caller); any other failure becomes a [`QueryError::Decode`].
    pub async fn decode_key(&self, key: &str) -> Result<DecodedKey, DecodeAbort> {
        let kind = self.store.type_of(key).await.map_err(fatal_or_marker(key))?;
        let value = match kind {
            ValueKind::String => {
                match self.store.get(key).await.map_err(fatal_or_marker(key))? {
                    Some(text) => DecodedValue::Scalar(try_parse_structured(&text)),
                    // matched by the scan but gone at read time
                    None => {
                        return Err(DecodeAbort::Marker(QueryError::Decode {
                            key: key.to_string(),
                            reason: "value missing at read time".to_string(),
                        }))
                    }
                }
            }
            ValueKind::Hash => {
                let raw = self
                    .store
                    .hash_get_all(key)
                    .await
                    .map_err(fatal_or_marker(key))?;
                // field-by-field: a partially populated value decodes as far
                // as it goes instead of failing the key
                let fields = raw
                    .into_iter()
                    .map(|(field, text)| (field, try_parse_structured(&text)))
                    .collect();
                DecodedValue::Mapping(fields)
            }
            ValueKind::List => DecodedValue::Sequence(
                self.store
                    .list_range(key, 0, -1)
                    .await
                    .map_err(fatal_or_marker(key))?,
            ),
            ValueKind::Set => {
                let mut members = self
                    .store
                    .set_members(key)
                    .await
                    .map_err(fatal_or_marker(key))?;
                members.sort();
                DecodedValue::SetMembers(members)
            }
            ValueKind::ZSet => DecodedValue::OrderedSet(
                self.store
                    .sorted_set_range(key, 0, -1)
                    .await
                    .map_err(fatal_or_marker(key))?,
            ),
            ValueKind::Stream => DecodedValue::Log(
                self.store
                    .stream_reverse_range(key, self.stream_entry_limit)
                    .await
                    .map_err(fatal_or_marker(key))?,
            ),
            ValueKind::Unsupported => DecodedValue::Unsupported,
        };

        Ok(DecodedKey {
            key: key.to_string(),
            kind,
            value,
        })
    }

    /// Decode a batch of keys.
    ///
    /// Per-key failures never abort the batch; only connectivity loss
    /// does.
    pub async fn decode_batch(&self, keys: &[String]) -> Result<DecodedBatch, StoreError> {
        let mut batch = DecodedBatch::default();
        for key in keys {
            match self.decode_key(key).await {
                Ok(row) => {
                    *batch
                        .type_counts
                        .entry(row.kind.as_str().to_string())
                        .or_insert(0) += 1;
                    batch.rows.push(row);
                }
                Err(DecodeAbort::Fatal(e)) => return Err(e),
                Err(DecodeAbort::Marker(e)) => {
                    debug!(key = %key, error = %e, "decode failed");
                    batch.errors.push((key.clone(), e.to_string()));
                }
            }
        }
        Ok(batch)
    }
}

/// Why a single-key decode stopped: a marker stays within the batch, a
/// fatal error aborts it.
#[derive(Debug)]
pub enum DecodeAbort {
    /// Connectivity lost; the whole query must fail
    Fatal(StoreError),
    /// This key failed; record and continue
    Marker(QueryError),
}

fn fatal_or_marker(key: &str) -> impl FnOnce(StoreError) -> DecodeAbort + '_ {
    move |e| match e {
        StoreError::Connection(_) => DecodeAbort::Fatal(e),
        other => DecodeAbort::Marker(QueryError::Decode {
            key: key.to_string(),
            reason: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoredValue};
    use std::collections::BTreeSet;

    #[test]
    fn test_structured_parse_objects_and_arrays() {
        assert!(matches!(
            try_parse_structured(r#"{"rating": 5}"#),
            FieldValue::Structured(Json::Object(_))
        ));
        assert!(matches!(
            try_parse_structured("[1, 2, 3]"),
            FieldValue::Structured(Json::Array(_))
        ));
    }

    #[test]
    fn test_scalar_text_stays_raw() {
        // bare JSON scalars are not "structured": a digit-string timestamp
        // must survive as text
        assert_eq!(
            try_parse_structured("20251020214855"),
            FieldValue::Raw("20251020214855".to_string())
        );
        assert_eq!(
            try_parse_structured("true"),
            FieldValue::Raw("true".to_string())
        );
        assert_eq!(
            try_parse_structured("not json at all"),
            FieldValue::Raw("not json at all".to_string())
        );
    }

    #[tokio::test]
    async fn test_hash_preserves_non_json_fields() {
        let store = MemoryStore::new();
        store.put_hash(
            "review:google_play:20251020214855",
            [
                ("review_content", "좋아요! five stars"),
                ("extras", r#"{"device": "pixel"}"#),
                ("rating", "5"),
            ],
        );

        let decoder = ValueDecoder::new(&store, 200);
        let row = decoder
            .decode_key("review:google_play:20251020214855")
            .await
            .unwrap();

        let DecodedValue::Mapping(fields) = row.value else {
            panic!("expected mapping");
        };
        assert_eq!(
            fields.get("review_content"),
            Some(&FieldValue::Raw("좋아요! five stars".to_string()))
        );
        assert!(matches!(
            fields.get("extras"),
            Some(FieldValue::Structured(_))
        ));
        assert_eq!(
            fields.get("rating"),
            Some(&FieldValue::Raw("5".to_string()))
        );
    }

    #[tokio::test]
    async fn test_each_store_type_decodes() {
        let store = MemoryStore::new();
        store.put("review:c:1", StoredValue::Text(r#"{"a": 1}"#.to_string()));
        store.put(
            "review:c:2",
            StoredValue::List(vec!["x".to_string(), "y".to_string()]),
        );
        store.put(
            "review:c:3",
            StoredValue::Set(BTreeSet::from(["m".to_string(), "n".to_string()])),
        );
        store.put(
            "review:c:4",
            StoredValue::SortedSet(vec![("low".to_string(), 1.0), ("high".to_string(), 2.0)]),
        );
        store.put(
            "review:c:5",
            StoredValue::Stream(vec![
                StreamEntry {
                    id: "1-0".to_string(),
                    fields: BTreeMap::new(),
                },
                StreamEntry {
                    id: "2-0".to_string(),
                    fields: BTreeMap::new(),
                },
            ]),
        );

        let decoder = ValueDecoder::new(&store, 200);

        let scalar = decoder.decode_key("review:c:1").await.unwrap();
        assert!(matches!(
            scalar.value,
            DecodedValue::Scalar(FieldValue::Structured(_))
        ));

        let list = decoder.decode_key("review:c:2").await.unwrap();
        assert_eq!(
            list.value,
            DecodedValue::Sequence(vec!["x".to_string(), "y".to_string()])
        );

        let set = decoder.decode_key("review:c:3").await.unwrap();
        assert_eq!(
            set.value,
            DecodedValue::SetMembers(vec!["m".to_string(), "n".to_string()])
        );

        let zset = decoder.decode_key("review:c:4").await.unwrap();
        let DecodedValue::OrderedSet(pairs) = zset.value else {
            panic!("expected ordered set");
        };
        assert_eq!(pairs[0].0, "low");
        assert_eq!(pairs[1].0, "high");

        let stream = decoder.decode_key("review:c:5").await.unwrap();
        let DecodedValue::Log(entries) = stream.value else {
            panic!("expected log");
        };
        // newest first
        assert_eq!(entries[0].id, "2-0");
    }

    #[tokio::test]
    async fn test_unknown_type_is_unsupported_not_error() {
        let store = MemoryStore::new();
        let decoder = ValueDecoder::new(&store, 200);
        // key absent entirely: TYPE reports none
        let row = decoder.decode_key("review:c:missing").await.unwrap();
        assert_eq!(row.value, DecodedValue::Unsupported);
        assert_eq!(row.kind, ValueKind::Unsupported);
    }

    #[tokio::test]
    async fn test_batch_captures_errors_without_aborting() {
        let store = MemoryStore::new();
        store.put_hash("review:c:1", [("rating", "5")]);
        store.put(
            "review:c:2",
            StoredValue::Poison(ValueKind::Hash, "read failed".to_string()),
        );
        store.put_hash("review:c:3", [("rating", "1")]);

        let decoder = ValueDecoder::new(&store, 200);
        let keys: Vec<String> = ["review:c:1", "review:c:2", "review:c:3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let batch = decoder.decode_batch(&keys).await.unwrap();

        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].0, "review:c:2");
        assert_eq!(batch.type_counts.get("hash"), Some(&2));
    }

    #[tokio::test]
    async fn test_batch_aborts_on_connection_loss() {
        let store = MemoryStore::new();
        store.put_hash("review:c:1", [("rating", "5")]);
        store.set_offline(true);

        let decoder = ValueDecoder::new(&store, 200);
        let result = decoder.decode_batch(&["review:c:1".to_string()]).await;
        assert!(matches!(result, Err(StoreError::Connection(_))));
    }

    #[tokio::test]
    async fn test_stream_limit_applies() {
        let store = MemoryStore::new();
        let entries = (0..10)
            .map(|i| StreamEntry {
                id: format!("{i}-0"),
                fields: BTreeMap::new(),
            })
            .collect();
        store.put("review:c:s", StoredValue::Stream(entries));

        let decoder = ValueDecoder::new(&store, 3);
        let row = decoder.decode_key("review:c:s").await.unwrap();
        let DecodedValue::Log(entries) = row.value else {
            panic!("expected log");
        };
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].id, "9-0");
    }
}
