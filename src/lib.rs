/// drought_service: drought event detection and multi-model aggregation.
///
/// # Module structure
///
/// ```text
/// drought_service
/// ├── model       — shared data types (YearMonth, Threshold, SeriesKey, queries, …)
/// ├── error       — StoreError, CacheError, ConfigError, QueryError
/// ├── logging     — tracing subscriber setup and failure classification
/// ├── config      — service configuration loader (drought.toml)
/// ├── domain      — region domain and per-family model rosters
/// ├── db          — PostgreSQL connection and schema validation
/// ├── store
/// │   ├── memory   — in-process series registry
/// │   └── postgres — series catalog + index values in the `drought` schema
/// ├── analysis
/// │   ├── threshold      — drought month selection
/// │   ├── drought_events — run-length event detection
/// │   └── decades        — per-decade breakdowns
/// ├── cache       — canonical keys and the persisted summary cache
/// ├── aggregate   — query engine and multi-model summaries
/// └── endpoint    — JSON HTTP API
/// ```

pub mod aggregate;
pub mod analysis;
pub mod cache;
pub mod config;
pub mod db;
pub mod domain;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod model;
pub mod store;
