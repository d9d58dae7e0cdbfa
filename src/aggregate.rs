//! Bucketed series aggregation
//!
//! Counts records into (bucket, channel) cells and zero-fills the
//! requested cartesian product, so a bucket with no records renders as an
//! explicit zero instead of a gap that could mean "not queried".
//!
//! A record's bucket comes from the key itself when possible (the third
//! key segment starts with the timestamp digits, so no value fetch is
//! needed) and otherwise from the `review_created_at` field of the
//! decoded value. The field is tolerant of both epoch-numeric encodings
//! (seconds vs milliseconds, disambiguated by magnitude at 10^12) and
//! fixed-width digit strings.

use chrono::DateTime;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::decode::{DecodedKey, DecodedValue, FieldValue};
use crate::horizon::HorizonBuckets;
use crate::keys::KeySpace;
use crate::types::{Granularity, SeriesPoint};

/// Field holding the record's origin timestamp, used when the key itself
/// carries no bucket digits.
pub const TIMESTAMP_FIELD: &str = "review_created_at";

/// Epoch values at or above this are milliseconds, below are seconds
const EPOCH_MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// The aggregated series plus bookkeeping
#[derive(Clone, Debug, Default)]
pub struct SeriesOutcome {
    /// One row per requested (bucket, channel) pair, zero-filled, sorted
    /// by bucket then channel
    pub points: Vec<SeriesPoint>,
    /// Keys that fit no bucket: malformed, foreign channel, or no
    /// derivable timestamp
    pub skipped_keys: usize,
}

/// Build the zero-filled series for a batch of decoded keys.
///
/// Every (bucket, channel) pair in `buckets.tokens × channels` produces a
/// row even at count 0. Rows outside the requested token set are dropped:
/// scanning already bounded the keys, but the value-field path can produce
/// out-of-range buckets, so the filter stays.
pub fn build_series(
    rows: &[DecodedKey],
    space: &KeySpace,
    buckets: &HorizonBuckets,
    channels: &BTreeSet<String>,
) -> SeriesOutcome {
    let mut counts: BTreeMap<(String, String), u64> = BTreeMap::new();
    let mut skipped = 0usize;

    for row in rows {
        let Ok(parts) = space.split(&row.key) else {
            skipped += 1;
            continue;
        };
        if !channels.contains(parts.channel) {
            skipped += 1;
            continue;
        }

        let bucket = bucket_from_digits(parts.remainder, buckets.granularity)
            .or_else(|| bucket_from_value(&row.value, buckets.granularity));
        let Some(bucket) = bucket else {
            skipped += 1;
            continue;
        };

        *counts
            .entry((bucket, parts.channel.to_string()))
            .or_insert(0) += 1;
    }

    if skipped > 0 {
        debug!(skipped, "keys without a derivable bucket");
    }

    let mut points = Vec::with_capacity(buckets.tokens.len() * channels.len());
    for token in &buckets.tokens {
        for channel in channels {
            let count = counts
                .get(&(token.clone(), channel.clone()))
                .copied()
                .unwrap_or(0);
            points.push(SeriesPoint::new(token.clone(), channel.clone(), count));
        }
    }

    SeriesOutcome {
        points,
        skipped_keys: skipped,
    }
}

/// Bucket from the leading digits of a key remainder.
///
/// Requires at least `granularity.digits()` leading ASCII digits; anything
/// shorter or non-numeric yields nothing.
pub fn bucket_from_digits(remainder: &str, granularity: Granularity) -> Option<String> {
    let width = granularity.digits();
    let prefix = remainder.get(..width)?;
    if prefix.bytes().all(|b| b.is_ascii_digit()) {
        Some(prefix.to_string())
    } else {
        None
    }
}

/// Bucket from the timestamp field of a decoded value
pub fn bucket_from_value(value: &DecodedValue, granularity: Granularity) -> Option<String> {
    let DecodedValue::Mapping(fields) = value else {
        return None;
    };
    match fields.get(TIMESTAMP_FIELD)? {
        FieldValue::Raw(text) => bucket_from_timestamp_text(text, granularity),
        FieldValue::Structured(json) => {
            let n = json.as_i64().or_else(|| json.as_f64().map(|f| f as i64))?;
            bucket_from_epoch(n, granularity)
        }
    }
}

/// Bucket from timestamp text.
///
/// Bare 10- or 13-digit strings are epoch seconds/milliseconds; everything
/// else is reduced to its digits and the leading 6 or 8 taken as the
/// bucket, which covers both `YYYYMMDDHHMMSS[ffffff]` and separator forms
/// like `2025-10-20T21:48:55`.
fn bucket_from_timestamp_text(text: &str, granularity: Granularity) -> Option<String> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == text.len() && matches!(digits.len(), 10 | 13) {
        if let Some(bucket) = digits
            .parse::<i64>()
            .ok()
            .and_then(|n| bucket_from_epoch(n, granularity))
        {
            return Some(bucket);
        }
    }
    if digits.len() >= 8 {
        return Some(digits[..granularity.digits()].to_string());
    }
    None
}

/// Bucket from an epoch value, seconds or milliseconds by magnitude
fn bucket_from_epoch(n: i64, granularity: Granularity) -> Option<String> {
    let seconds = if n.abs() >= EPOCH_MILLIS_THRESHOLD {
        n / 1_000
    } else {
        n
    };
    DateTime::from_timestamp(seconds, 0).map(|ts| ts.format(granularity.format_str()).to_string())
}
