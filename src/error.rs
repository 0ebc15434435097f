//! Error types, one per seam: store, cache, configuration and query.

use crate::model::SeriesKey;
use thiserror::Error;

/// Failures reported by a `TimeSeriesStore`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No backing data exists for this (index, source, scenario, model).
    /// Aggregation treats this as "zero observations".
    #[error("No series stored for {0}")]
    SeriesNotFound(SeriesKey),

    /// The store was reachable but the query failed.
    #[error("Store query failed: {0}")]
    Query(String),

    /// A store lock was poisoned by a panicking thread.
    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<postgres::Error> for StoreError {
    fn from(e: postgres::Error) -> Self {
        StoreError::Query(e.to_string())
    }
}

/// Failures persisting or loading the result cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Problems with drought.toml.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors surfaced to callers of the query engine.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
