//! Error types for the engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Query error
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Store errors
///
/// Covers the transport boundary to Redis. `Connection` is fatal to the
/// whole query; the other variants abort at most one pattern or one key.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connectivity to the store was lost or never established.
    /// Fatal to the whole query, surfaced to the caller, not retried here.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A single command timed out
    #[error("Command timeout: {0}")]
    Timeout(String),

    /// A command failed for a non-connectivity reason
    #[error("Command error: {0}")]
    Command(String),

    /// A page fetch failed mid-scan. Silent partial scans would corrupt
    /// aggregate counts, so the whole pattern is aborted.
    #[error("Scan failed for pattern {pattern}: {reason}")]
    ScanFailed {
        /// The glob pattern whose scan was aborted
        pattern: String,
        /// Underlying failure description
        reason: String,
    },

    /// The caller-supplied deadline expired between scan pages
    #[error("Deadline exceeded while scanning {pattern} ({keys_seen} keys seen)")]
    DeadlineExceeded {
        /// The glob pattern being scanned when the deadline hit
        pattern: String,
        /// How many keys had been accumulated before aborting
        keys_seen: usize,
    },
}

/// Query errors
#[derive(Error, Debug)]
pub enum QueryError {
    /// The requested horizon name is not one of the known horizons.
    /// Kept distinct from "valid horizon with no applicable buckets".
    #[error("Unknown horizon: {0:?}")]
    UnknownHorizon(String),

    /// A key does not fit the namespace grammar. Skip-and-count, never fatal.
    #[error("Malformed key: {0:?}")]
    MalformedKey(String),

    /// A value could not be decoded under its declared store type.
    /// Recorded per key, never aborts the batch.
    #[error("Decode failed for key {key:?}: {reason}")]
    Decode {
        /// The key whose value failed to decode
        key: String,
        /// Underlying failure description
        reason: String,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
