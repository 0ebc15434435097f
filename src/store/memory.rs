/// In-memory `TimeSeriesStore`.
///
/// Holds every series in a `HashMap` keyed by `SeriesKey`, rows sorted by
/// (year, month). Counts fetches so callers can verify that cached queries
/// never reach the store.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::TimeSeriesStore;
use crate::error::StoreError;
use crate::model::{normalize_scenario, Observation, RegionInfo, SeriesKey, YearRange};

#[derive(Debug, Default)]
pub struct MemoryStore {
    series: RwLock<HashMap<SeriesKey, Vec<Observation>>>,
    fetch_count: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds observations to a series, creating it if needed.
    ///
    /// A later observation for the same (region, year, month) replaces the
    /// earlier one, keeping at most one value per month.
    pub fn insert(&self, series: SeriesKey, observations: Vec<Observation>) -> Result<(), StoreError> {
        let mut map = self.series.write().map_err(|_| StoreError::Poisoned)?;
        let rows = map.entry(series).or_default();

        for obs in observations {
            match rows
                .iter_mut()
                .find(|r| r.region_id == obs.region_id && r.year == obs.year && r.month == obs.month)
            {
                Some(existing) => *existing = obs,
                None => rows.push(obs),
            }
        }
        rows.sort_by_key(|r| (r.region_id, r.year, r.month));
        Ok(())
    }

    /// Registers a series with no rows. Fetches from it succeed with nothing,
    /// unlike fetches from a series that was never registered.
    pub fn insert_empty(&self, series: SeriesKey) -> Result<(), StoreError> {
        let mut map = self.series.write().map_err(|_| StoreError::Poisoned)?;
        map.entry(series).or_default();
        Ok(())
    }

    /// Number of `fetch` calls served so far, including failed ones.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

}

impl TimeSeriesStore for MemoryStore {
    fn fetch(&self, series: &SeriesKey, region_id: i32, years: YearRange) -> Result<Vec<Observation>, StoreError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let map = self.series.read().map_err(|_| StoreError::Poisoned)?;
        let rows = map
            .get(series)
            .ok_or_else(|| StoreError::SeriesNotFound(series.clone()))?;

        Ok(rows
            .iter()
            .filter(|r| r.region_id == region_id && years.contains(r.year))
            .cloned()
            .collect())
    }

    fn regions(&self, scenario: &str) -> Result<Vec<RegionInfo>, StoreError> {
        let scenario = normalize_scenario(scenario);
        let map = self.series.read().map_err(|_| StoreError::Poisoned)?;

        let mut regions: BTreeMap<i32, String> = BTreeMap::new();
        for rows in map.iter().filter(|(k, _)| k.scenario == scenario).map(|(_, rows)| rows) {
            for row in rows {
                regions.entry(row.region_id).or_insert_with(|| row.region_name.clone());
            }
        }

        Ok(regions
            .into_iter()
            .map(|(region_id, region_name)| RegionInfo { region_id, region_name })
            .collect())
    }
}
