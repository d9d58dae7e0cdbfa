//! Key namespace codec
//!
//! Record keys live under a structured namespace:
//!
//! ```text
//! review:<channel>:<timestamp>
//! ```
//!
//! where `<timestamp>` is a fixed-width digit string
//! (`YYYYMMDDHHMMSS`, optionally with a microsecond suffix). The first two
//! delimiter-separated segments are always the namespace and the channel;
//! the remainder, read as a digit prefix, yields the record's natural time
//! bucket without fetching the value.
//!
//! This module derives the glob patterns that bound a scan and splits
//! matched keys back into their parts.

use std::collections::BTreeSet;

use crate::error::QueryError;

/// Default key namespace
pub const DEFAULT_NAMESPACE: &str = "review";

/// Default segment delimiter
pub const DEFAULT_DELIMITER: char = ':';

/// The structured key namespace
#[derive(Clone, Debug)]
pub struct KeySpace {
    namespace: String,
    delimiter: char,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            delimiter: DEFAULT_DELIMITER,
        }
    }
}

/// The decoded parts of a record key
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyParts<'a> {
    /// Channel segment
    pub channel: &'a str,
    /// Everything after the channel segment, delimiter excluded
    pub remainder: &'a str,
}

impl KeySpace {
    /// Create a key space with a custom namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            delimiter: DEFAULT_DELIMITER,
        }
    }

    /// The namespace segment
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Encode a record key from its channel and timestamp token
    pub fn encode(&self, channel: &str, stamp: &str) -> String {
        format!(
            "{ns}{d}{channel}{d}{stamp}",
            ns = self.namespace,
            d = self.delimiter
        )
    }

    /// Derive the scan-glob patterns bounding a set of channels and bucket
    /// tokens.
    ///
    /// With `tokens = None` the horizon is unbounded and one pattern per
    /// channel covers the channel's whole namespace. Otherwise one pattern
    /// per (channel, token) pair is emitted, anchored to
    /// `namespace:channel:token` and trailing-wildcarded.
    ///
    /// Emission is channel-major, token-minor, but callers must not rely on
    /// the order: matched keys are deduplicated after scanning.
    pub fn glob_patterns(
        &self,
        channels: &BTreeSet<String>,
        tokens: Option<&[String]>,
    ) -> Vec<String> {
        let mut patterns = Vec::new();
        match tokens {
            None => {
                for channel in channels {
                    patterns.push(format!("{}*", self.encode(channel, "")));
                }
            }
            Some(tokens) => {
                for channel in channels {
                    for token in tokens {
                        patterns.push(format!("{}*", self.encode(channel, token)));
                    }
                }
            }
        }
        patterns
    }

    /// Split a key into its parts.
    ///
    /// Fails with [`QueryError::MalformedKey`] when the key has fewer than
    /// three delimiter-separated segments or sits outside the namespace.
    /// Downstream consumers treat malformed keys as skip-and-count, never
    /// as fatal.
    pub fn split<'a>(&self, key: &'a str) -> Result<KeyParts<'a>, QueryError> {
        let mut segments = key.splitn(3, self.delimiter);
        let namespace = segments.next();
        let channel = segments.next();
        let remainder = segments.next();
        match (namespace, channel, remainder) {
            (Some(ns), Some(channel), Some(remainder)) if ns == self.namespace => {
                Ok(KeyParts { channel, remainder })
            }
            _ => Err(QueryError::MalformedKey(key.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_encode() {
        let space = KeySpace::default();
        assert_eq!(
            space.encode("google_play", "20251020214855"),
            "review:google_play:20251020214855"
        );
    }

    #[test]
    fn test_bounded_patterns_cover_cartesian_product() {
        let space = KeySpace::default();
        let tokens = vec!["202509".to_string(), "202510".to_string()];
        let patterns = space.glob_patterns(&channels(&["app_store", "google_play"]), Some(&tokens));
        assert_eq!(patterns.len(), 4);
        assert!(patterns.contains(&"review:app_store:202509*".to_string()));
        assert!(patterns.contains(&"review:app_store:202510*".to_string()));
        assert!(patterns.contains(&"review:google_play:202509*".to_string()));
        assert!(patterns.contains(&"review:google_play:202510*".to_string()));
    }

    #[test]
    fn test_unbounded_patterns_one_per_channel() {
        let space = KeySpace::default();
        let patterns = space.glob_patterns(&channels(&["google_play"]), None);
        assert_eq!(patterns, vec!["review:google_play:*".to_string()]);
    }

    #[test]
    fn test_split_valid_key() {
        let space = KeySpace::default();
        let parts = space.split("review:google_play:20251020214855").unwrap();
        assert_eq!(parts.channel, "google_play");
        assert_eq!(parts.remainder, "20251020214855");
    }

    #[test]
    fn test_split_keeps_extra_delimiters_in_remainder() {
        let space = KeySpace::default();
        let parts = space.split("review:google_play:2025:extra").unwrap();
        assert_eq!(parts.remainder, "2025:extra");
    }

    #[test]
    fn test_split_rejects_short_keys() {
        let space = KeySpace::default();
        assert!(space.split("review").is_err());
        assert!(space.split("review:google_play").is_err());
        assert!(space.split("").is_err());
    }

    #[test]
    fn test_split_rejects_foreign_namespace() {
        let space = KeySpace::default();
        assert!(space.split("session:google_play:202510").is_err());
    }
}
