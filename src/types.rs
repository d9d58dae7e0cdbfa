//! Core data types used throughout the engine
//!
//! This module defines the fundamental data structures shared across the
//! pipeline:
//!
//! # Key Types
//!
//! - **`Granularity`**: time-bucket width (daily vs monthly)
//! - **`ValueKind`**: the store-reported type tag of a key
//! - **`StreamEntry`**: one append-log entry (id + field mapping)
//! - **`SeriesPoint`**: one `(bucket, channel) → count` row of a series
//! - **`QueryRequest`** / **`QueryOutcome`**: the engine's request/response
//!
//! # Example
//!
//! ```rust
//! use reviewscope::types::{Granularity, SeriesPoint, ValueKind};
//!
//! assert_eq!(Granularity::Monthly.digits(), 6);
//! assert_eq!(ValueKind::from_tag("zset"), ValueKind::ZSet);
//!
//! let point = SeriesPoint::new("202510", "google_play", 3);
//! assert_eq!(point.count, 3);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::horizon::Horizon;
use crate::table::Table;

/// Time-bucket width for aggregation
///
/// Buckets are fixed-width digit strings: 6 digits (`YYYYMM`) for monthly,
/// 8 digits (`YYYYMMDD`) for daily.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// `YYYYMMDD` buckets
    Daily,
    /// `YYYYMM` buckets
    Monthly,
}

impl Granularity {
    /// Number of leading digits identifying a bucket at this granularity
    pub fn digits(&self) -> usize {
        match self {
            Granularity::Daily => 8,
            Granularity::Monthly => 6,
        }
    }

    /// chrono format string producing a bucket token at this granularity
    pub fn format_str(&self) -> &'static str {
        match self {
            Granularity::Daily => "%Y%m%d",
            Granularity::Monthly => "%Y%m",
        }
    }
}

/// The store-reported type of a key's value
///
/// Parsed from the store's TYPE reply. Unrecognized tags map to
/// `Unsupported` rather than failing, so a foreign key in the namespace
/// degrades to "no value" instead of an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValueKind {
    /// Plain string value
    String,
    /// Field-value mapping
    Hash,
    /// Ordered list
    List,
    /// Unordered set
    Set,
    /// Sorted set with scores
    ZSet,
    /// Append-only stream
    Stream,
    /// Anything else, including missing keys (TYPE reports "none")
    Unsupported,
}

impl ValueKind {
    /// Parse a TYPE reply tag
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "string" => ValueKind::String,
            "hash" => ValueKind::Hash,
            "list" => ValueKind::List,
            "set" => ValueKind::Set,
            "zset" => ValueKind::ZSet,
            "stream" => ValueKind::Stream,
            _ => ValueKind::Unsupported,
        }
    }

    /// Canonical tag, used for per-type counters
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Hash => "hash",
            ValueKind::List => "list",
            ValueKind::Set => "set",
            ValueKind::ZSet => "zset",
            ValueKind::Stream => "stream",
            ValueKind::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of an append-only stream value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamEntry {
    /// Store-assigned entry id
    pub id: String,
    /// Field mapping carried by the entry
    pub fields: BTreeMap<String, String>,
}

/// One `(bucket, channel) → count` row of an aggregated series
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Bucket token (`YYYYMM` or `YYYYMMDD`)
    pub bucket: String,
    /// Channel the records were ingested under
    pub channel: String,
    /// Number of records in this bucket; zero-filled rows carry 0
    pub count: u64,
}

impl SeriesPoint {
    /// Create a series point
    pub fn new(bucket: impl Into<String>, channel: impl Into<String>, count: u64) -> Self {
        Self {
            bucket: bucket.into(),
            channel: channel.into(),
            count,
        }
    }
}

/// A query over the record namespace
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Channels to include. A set: duplicates are meaningless and order
    /// never affects results.
    pub channels: BTreeSet<String>,
    /// Named time range, resolved relative to "today"
    pub horizon: Horizon,
}

impl QueryRequest {
    /// Build a request from anything iterable over channel names
    pub fn new<I, S>(channels: I, horizon: Horizon) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channels: channels.into_iter().map(Into::into).collect(),
            horizon,
        }
    }
}

/// Everything a query produces
///
/// An empty namespace yields a well-formed empty outcome, not an error.
/// Per-key decode failures surface as `error_count` alongside partial data.
#[derive(Clone, Debug, Serialize)]
pub struct QueryOutcome {
    /// Zero-filled, deterministically ordered series
    pub series: Vec<SeriesPoint>,
    /// Normalized tabular view of the decoded values
    pub table: Table,
    /// Number of distinct keys matched by the scan
    pub matched_key_count: usize,
    /// Number of keys whose value failed to decode
    pub error_count: usize,
    /// Number of keys skipped because they do not fit the namespace grammar
    /// or carry no derivable bucket. Distinct from `error_count`.
    pub skipped_key_count: usize,
    /// Patterns dropped under the skip-pattern scan policy
    pub skipped_patterns: Vec<String>,
    /// Matched keys per store type tag
    pub type_counts: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granularity_digits() {
        assert_eq!(Granularity::Daily.digits(), 8);
        assert_eq!(Granularity::Monthly.digits(), 6);
    }

    #[test]
    fn test_value_kind_round_trip() {
        for tag in ["string", "hash", "list", "set", "zset", "stream"] {
            assert_eq!(ValueKind::from_tag(tag).as_str(), tag);
        }
    }

    #[test]
    fn test_value_kind_unrecognized() {
        assert_eq!(ValueKind::from_tag("none"), ValueKind::Unsupported);
        assert_eq!(ValueKind::from_tag("ReJSON-RL"), ValueKind::Unsupported);
        assert_eq!(ValueKind::from_tag(""), ValueKind::Unsupported);
    }

    #[test]
    fn test_request_dedups_channels() {
        let request = QueryRequest::new(["a", "b", "a"], Horizon::OneWeek);
        assert_eq!(request.channels.len(), 2);
    }
}
