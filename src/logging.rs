/// Structured logging for the drought statistics service
///
/// Wraps `tracing-subscriber` initialization and provides the failure
/// classification used when one model of a multi-model fan-out fails:
/// an absent series is routine (a roster model may not have been run for
/// every scenario) while a failing store query is not.

use std::fmt;
use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt as subscriber_fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::StoreError;
use crate::model::SeriesKey;

static INIT: Once = Once::new();

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line (for the daemon under a supervisor).
    Json,
    /// Human-readable output (for interactive runs).
    #[default]
    Pretty,
}

impl LogFormat {
    /// Reads `DROUGHT_LOG_FORMAT` ("json" or anything else for pretty).
    pub fn from_env() -> Self {
        match std::env::var("DROUGHT_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Initializes the global subscriber. `RUST_LOG` controls levels (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(subscriber_fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(subscriber_fmt::layer().with_target(false))
                    .init();
            }
        }
    });
}

/// Test logging: captured by the test harness, `drought_service=debug`.
pub fn init_test_logging() {
    let _ = subscriber_fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("drought_service=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}

/// Span wrapping one summary computation.
pub fn summary_span(kind: &str, cache_key: &str) -> Span {
    tracing::info_span!("summary", kind = kind, cache_key = cache_key)
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// The series simply does not exist; the model contributes "no data".
    Expected,
    /// The store failed while answering; indicates degradation.
    Unexpected,
    /// Cannot tell.
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

pub fn classify_store_failure(err: &StoreError) -> FailureType {
    match err {
        StoreError::SeriesNotFound(_) => FailureType::Expected,
        StoreError::Query(_) => FailureType::Unexpected,
        StoreError::Poisoned => FailureType::Unknown,
    }
}

/// Logs a per-model failure inside a fan-out at a level matching its class.
pub fn log_model_failure(series: &SeriesKey, region_id: i32, err: &StoreError) {
    let failure_type = classify_store_failure(err);
    match failure_type {
        FailureType::Expected => tracing::debug!(
            series = %series,
            region_id,
            failure = %failure_type,
            "model has no data: {}", err
        ),
        FailureType::Unexpected | FailureType::Unknown => tracing::warn!(
            series = %series,
            region_id,
            failure = %failure_type,
            "model contribution dropped: {}", err
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IndexName, SourceFamily};

    #[test]
    fn test_failure_classification() {
        let key = SeriesKey::new(IndexName::Spi, SourceFamily::Cmip5, "rcp45", "MIROC-MIROC5");
        assert_eq!(classify_store_failure(&StoreError::SeriesNotFound(key)), FailureType::Expected);
        assert_eq!(
            classify_store_failure(&StoreError::Query("timeout".to_string())),
            FailureType::Unexpected
        );
        assert_eq!(classify_store_failure(&StoreError::Poisoned), FailureType::Unknown);
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_test_logging();
        init_test_logging();
    }
}
