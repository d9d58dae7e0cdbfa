//! Tabular normalization for export
//!
//! Flattens a batch of heterogeneous decoded values into one table. When
//! every value is record-shaped (a field mapping, or a log whose entries
//! are field mappings), each mapping becomes a row and nested structures
//! flatten into dotted-path columns. Otherwise the batch falls back to a
//! single `value` column holding a string-safe rendering of each value.
//!
//! The table serializes to a JSON document: an array of row objects in
//! the resolved column order, UTF-8 with non-ASCII preserved.

use serde::Serialize;
use serde_json::{Map, Value as Json};

use crate::decode::{DecodedKey, DecodedValue, FieldValue};
use crate::error::Error;

/// Fallback column name for non-record batches
pub const VALUE_COLUMN: &str = "value";

/// Preferred column ordering: identity first, then content, timestamps,
/// and metrics. Present columns keep this order; the rest follow
/// alphabetically.
pub const PREFERRED_COLUMNS: [&str; 12] = [
    "channel_name",
    "original_id",
    "original_content",
    "original_created_at",
    "review_created_at",
    "reviewer_name",
    "review_content",
    "rating",
    "like",
    "views",
    "review_id",
    "inserted_at",
];

/// A normalized table: resolved column order plus one JSON object per row
#[derive(Clone, Debug, Default, Serialize)]
pub struct Table {
    /// Columns in their resolved order
    pub columns: Vec<String>,
    /// Rows keyed by column; absent fields are null
    pub rows: Vec<Map<String, Json>>,
}

impl Table {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Serialize to a pretty-printed JSON array of row objects, columns in
    /// resolved order, non-ASCII preserved.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(&self.rows).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Flatten a batch of decoded values into a table.
///
/// `explicit_order`, when given, is used verbatim as the leading column
/// order; columns it does not mention are appended in discovery order
/// rather than dropped. Without it, the preferred ordering applies first
/// and remaining columns sort alphabetically.
pub fn normalize(rows: &[DecodedKey], explicit_order: Option<&[String]>) -> Table {
    let records = collect_records(rows);

    match records {
        Some(records) => record_table(records, explicit_order),
        None => fallback_table(rows),
    }
}

/// Record rows when every value in the batch is record-shaped
fn collect_records(rows: &[DecodedKey]) -> Option<Vec<Map<String, Json>>> {
    let mut records = Vec::new();
    for row in rows {
        match &row.value {
            DecodedValue::Mapping(fields) => {
                let mut record = Map::new();
                for (field, value) in fields {
                    flatten_field(field, value, &mut record);
                }
                records.push(record);
            }
            DecodedValue::Log(entries) => {
                // each log entry is a record of its own
                for entry in entries {
                    let mut record = Map::new();
                    record.insert("id".to_string(), Json::String(entry.id.clone()));
                    for (field, value) in &entry.fields {
                        flatten_json(field, &text_to_json(value), &mut record);
                    }
                    records.push(record);
                }
            }
            _ => return None,
        }
    }
    Some(records)
}

fn record_table(records: Vec<Map<String, Json>>, explicit_order: Option<&[String]>) -> Table {
    // discovery order: first appearance across rows
    let mut discovered: Vec<String> = Vec::new();
    for record in &records {
        for column in record.keys() {
            if !discovered.contains(column) {
                discovered.push(column.clone());
            }
        }
    }

    let columns = match explicit_order {
        Some(order) => {
            let mut columns: Vec<String> = order
                .iter()
                .filter(|c| discovered.contains(c))
                .cloned()
                .collect();
            for column in &discovered {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
            columns
        }
        None => {
            let mut columns: Vec<String> = PREFERRED_COLUMNS
                .iter()
                .filter(|c| discovered.iter().any(|d| d == *c))
                .map(|c| c.to_string())
                .collect();
            let mut remaining: Vec<String> = discovered
                .iter()
                .filter(|d| !columns.contains(d))
                .cloned()
                .collect();
            remaining.sort();
            columns.extend(remaining);
            columns
        }
    };

    let rows = records
        .into_iter()
        .map(|mut record| {
            let mut row = Map::new();
            for column in &columns {
                let value = record.remove(column).unwrap_or(Json::Null);
                row.insert(column.clone(), value);
            }
            row
        })
        .collect();

    Table { columns, rows }
}

/// Single-column table of string-safe renderings
fn fallback_table(rows: &[DecodedKey]) -> Table {
    let table_rows = rows
        .iter()
        .map(|row| {
            let mut record = Map::new();
            record.insert(VALUE_COLUMN.to_string(), stringify(&row.value));
            record
        })
        .collect();
    Table {
        columns: vec![VALUE_COLUMN.to_string()],
        rows: table_rows,
    }
}

/// Flatten one decoded field into dotted-path columns
fn flatten_field(field: &str, value: &FieldValue, out: &mut Map<String, Json>) {
    match value {
        FieldValue::Raw(text) => {
            out.insert(field.to_string(), text_to_json(text));
        }
        FieldValue::Structured(json) => flatten_json(field, json, out),
    }
}

/// Flatten nested JSON objects into dotted paths; arrays and scalars stay
/// whole at their path.
fn flatten_json(path: &str, value: &Json, out: &mut Map<String, Json>) {
    match value {
        Json::Object(fields) => {
            for (key, nested) in fields {
                flatten_json(&format!("{path}.{key}"), nested, out);
            }
        }
        other => {
            out.insert(path.to_string(), coerce_big_int(other.clone()));
        }
    }
}

/// Raw field text becomes a JSON string, never reinterpreted
fn text_to_json(text: &str) -> Json {
    Json::String(text.to_string())
}

/// Numbers outside the signed 64-bit range become strings so export never
/// loses precision.
fn coerce_big_int(value: Json) -> Json {
    if let Json::Number(n) = &value {
        if n.as_i64().is_none() && n.as_f64().is_none() {
            // unrepresentable without loss (e.g. u64 above i64::MAX with
            // arbitrary precision disabled elsewhere)
            return Json::String(n.to_string());
        }
        if let Some(u) = n.as_u64() {
            if u > i64::MAX as u64 {
                return Json::String(n.to_string());
            }
        }
    }
    value
}

/// String-safe single-column rendering of a decoded value
fn stringify(value: &DecodedValue) -> Json {
    match value {
        DecodedValue::Scalar(FieldValue::Raw(text)) => Json::String(text.clone()),
        DecodedValue::Scalar(FieldValue::Structured(json)) => canonical_text(json),
        DecodedValue::Mapping(fields) => {
            let mut record = Map::new();
            for (field, value) in fields {
                flatten_field(field, value, &mut record);
            }
            canonical_text(&Json::Object(record))
        }
        DecodedValue::Sequence(items) | DecodedValue::SetMembers(items) => {
            let array: Vec<Json> = items.iter().map(|s| Json::String(s.clone())).collect();
            canonical_text(&Json::Array(array))
        }
        DecodedValue::OrderedSet(pairs) => {
            let array: Vec<Json> = pairs
                .iter()
                .map(|(member, score)| {
                    let mut pair = Map::new();
                    pair.insert("member".to_string(), Json::String(member.clone()));
                    pair.insert(
                        "score".to_string(),
                        serde_json::Number::from_f64(*score)
                            .map(Json::Number)
                            .unwrap_or(Json::Null),
                    );
                    Json::Object(pair)
                })
                .collect();
            canonical_text(&Json::Array(array))
        }
        DecodedValue::Log(entries) => {
            serde_json::to_value(entries).map(|v| canonical_text(&v)).unwrap_or(Json::Null)
        }
        DecodedValue::Unsupported => Json::Null,
    }
}

/// Canonical textual serialization of a structured value
fn canonical_text(value: &Json) -> Json {
    match serde_json::to_string(value) {
        Ok(text) => Json::String(text),
        Err(_) => Json::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueKind;
    use std::collections::BTreeMap;

    fn decoded(key: &str, value: DecodedValue) -> DecodedKey {
        DecodedKey {
            key: key.to_string(),
            kind: ValueKind::Hash,
            value,
        }
    }

    fn review_mapping(fields: &[(&str, &str)]) -> DecodedValue {
        DecodedValue::Mapping(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), FieldValue::Raw(v.to_string())))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    #[test]
    fn test_preferred_columns_lead_then_alphabetical() {
        let rows = vec![decoded(
            "review:google_play:1",
            review_mapping(&[
                ("zeta", "1"),
                ("rating", "5"),
                ("channel_name", "google_play"),
                ("alpha", "2"),
            ]),
        )];
        let table = normalize(&rows, None);
        assert_eq!(table.columns, vec!["channel_name", "rating", "alpha", "zeta"]);
    }

    #[test]
    fn test_explicit_order_used_verbatim_nothing_dropped() {
        let rows = vec![decoded(
            "review:google_play:1",
            review_mapping(&[("a", "1"), ("b", "2"), ("c", "3")]),
        )];
        let order = vec!["c".to_string(), "a".to_string()];
        let table = normalize(&rows, Some(&order));
        assert_eq!(table.columns, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_nested_structures_flatten_with_dotted_paths() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "meta".to_string(),
            FieldValue::Structured(serde_json::json!({"device": {"os": "android"}, "lang": "ko"})),
        );
        fields.insert("rating".to_string(), FieldValue::Raw("5".to_string()));
        let rows = vec![decoded("review:google_play:1", DecodedValue::Mapping(fields))];

        let table = normalize(&rows, None);
        assert!(table.columns.contains(&"meta.device.os".to_string()));
        assert!(table.columns.contains(&"meta.lang".to_string()));
        assert_eq!(
            table.rows[0].get("meta.device.os"),
            Some(&Json::String("android".to_string()))
        );
    }

    #[test]
    fn test_missing_fields_are_null() {
        let rows = vec![
            decoded("review:a:1", review_mapping(&[("rating", "5")])),
            decoded("review:a:2", review_mapping(&[("views", "10")])),
        ];
        let table = normalize(&rows, None);
        assert_eq!(table.rows[0].get("views"), Some(&Json::Null));
        assert_eq!(table.rows[1].get("rating"), Some(&Json::Null));
    }

    #[test]
    fn test_mixed_batch_falls_back_to_single_column() {
        let rows = vec![
            decoded("review:a:1", review_mapping(&[("rating", "5")])),
            decoded(
                "review:a:2",
                DecodedValue::Scalar(FieldValue::Raw("plain".to_string())),
            ),
        ];
        let table = normalize(&rows, None);
        assert_eq!(table.columns, vec![VALUE_COLUMN.to_string()]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(
            table.rows[1].get(VALUE_COLUMN),
            Some(&Json::String("plain".to_string()))
        );
    }

    #[test]
    fn test_log_entries_expand_to_rows() {
        use crate::types::StreamEntry;
        let entries = vec![
            StreamEntry {
                id: "2-0".to_string(),
                fields: BTreeMap::from([("rating".to_string(), "4".to_string())]),
            },
            StreamEntry {
                id: "1-0".to_string(),
                fields: BTreeMap::from([("rating".to_string(), "5".to_string())]),
            },
        ];
        let rows = vec![decoded("review:a:s", DecodedValue::Log(entries))];
        let table = normalize(&rows, None);
        assert_eq!(table.rows.len(), 2);
        assert!(table.columns.contains(&"id".to_string()));
        assert!(table.columns.contains(&"rating".to_string()));
    }

    #[test]
    fn test_big_integer_coerced_to_string() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "huge".to_string(),
            FieldValue::Structured(serde_json::json!({"id": u64::MAX})),
        );
        let rows = vec![decoded("review:a:1", DecodedValue::Mapping(fields))];
        let table = normalize(&rows, None);
        assert_eq!(
            table.rows[0].get("huge.id"),
            Some(&Json::String(u64::MAX.to_string()))
        );
    }

    #[test]
    fn test_in_range_integer_stays_numeric() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "n".to_string(),
            FieldValue::Structured(serde_json::json!({"id": 42})),
        );
        let rows = vec![decoded("review:a:1", DecodedValue::Mapping(fields))];
        let table = normalize(&rows, None);
        assert_eq!(table.rows[0].get("n.id"), Some(&serde_json::json!(42)));
    }

    #[test]
    fn test_json_export_preserves_non_ascii() {
        let rows = vec![decoded(
            "review:google_play:1",
            review_mapping(&[("review_content", "별로예요")]),
        )];
        let table = normalize(&rows, None);
        let json = table.to_json().unwrap();
        assert!(json.contains("별로예요"));
        assert!(!json.contains("\\u"));
    }

    #[test]
    fn test_empty_batch_is_well_formed() {
        let table = normalize(&[], None);
        assert!(table.is_empty());
        assert_eq!(table.to_json().unwrap(), "[]");
    }

    #[test]
    fn test_row_objects_follow_column_order() {
        let rows = vec![decoded(
            "review:a:1",
            review_mapping(&[("b", "2"), ("a", "1")]),
        )];
        let table = normalize(&rows, None);
        let keys: Vec<&String> = table.rows[0].keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
