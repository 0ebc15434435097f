/// Time-series store seam.
///
/// The engine reads drought index series through `TimeSeriesStore` and never
/// learns how they are kept. Series are addressed by a structured
/// `SeriesKey`; each implementation resolves that key against its own
/// registry instead of building storage names out of query strings.
///
/// Implementations:
/// - `memory`   — in-process registry, used for embedding and in tests
/// - `postgres` — PostgreSQL adapter over the `drought` schema

pub mod memory;
pub mod postgres;

use crate::error::StoreError;
use crate::model::{Observation, RegionInfo, SeriesKey, YearRange};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

pub trait TimeSeriesStore: Send + Sync {
    /// Observations of one region of one series whose year falls in `years`,
    /// ordered by (year, month).
    ///
    /// Returns `StoreError::SeriesNotFound` when no data backs `series`.
    fn fetch(&self, series: &SeriesKey, region_id: i32, years: YearRange) -> Result<Vec<Observation>, StoreError>;

    /// Distinct regions present in any series of `scenario`, ordered by id.
    fn regions(&self, scenario: &str) -> Result<Vec<RegionInfo>, StoreError>;
}
