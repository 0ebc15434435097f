/// PostgreSQL `TimeSeriesStore`.
///
/// # Schema (sql/001_drought_schema.sql)
///
/// - `drought.series`       — one row per (index, source, scenario, model)
/// - `drought.index_values` — monthly values keyed by (series_id, region_id, year, month)
///
/// The series catalog is read once at construction into a registry mapping
/// `SeriesKey` to `series_id`. Queries then address values by id; a key
/// missing from the registry is reported as `SeriesNotFound` without a
/// round trip.

use postgres::Client;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use super::TimeSeriesStore;
use crate::db;
use crate::error::StoreError;
use crate::model::{normalize_scenario, Observation, RegionInfo, SeriesKey, YearRange};

pub struct PostgresStore {
    client: Mutex<Client>,
    registry: RwLock<HashMap<SeriesKey, i32>>,
}

impl PostgresStore {
    /// Wraps an open connection and loads the series registry.
    pub fn new(mut client: Client) -> Result<Self, StoreError> {
        let registry = load_registry(&mut client)?;
        tracing::info!(series = registry.len(), "series registry loaded");
        Ok(Self {
            client: Mutex::new(client),
            registry: RwLock::new(registry),
        })
    }

    /// Connects via DATABASE_URL, verifies the `drought` schema and loads the registry.
    pub fn connect() -> Result<Self, Box<dyn std::error::Error>> {
        let client = db::connect_and_verify(&[db::DROUGHT_SCHEMA])?;
        Ok(Self::new(client)?)
    }

    /// Re-reads the series catalog, picking up series ingested since startup.
    pub fn refresh_registry(&self) -> Result<usize, StoreError> {
        let fresh = {
            let mut client = self.client.lock().map_err(|_| StoreError::Poisoned)?;
            load_registry(&mut client)?
        };
        let count = fresh.len();
        *self.registry.write().map_err(|_| StoreError::Poisoned)? = fresh;
        Ok(count)
    }

    pub fn series_id(&self, series: &SeriesKey) -> Option<i32> {
        self.registry.read().ok()?.get(series).copied()
    }
}

/// Builds the registry key for a catalog row. Catalog text is folded the
/// same way `SeriesKey::new` folds query parameters.
pub fn catalog_key(index_name: &str, data_source: &str, scenario: &str, model_name: &str) -> SeriesKey {
    SeriesKey {
        index: index_name.trim().to_lowercase(),
        source: data_source.trim().to_lowercase(),
        scenario: normalize_scenario(scenario),
        model: model_name.trim().to_lowercase(),
    }
}

fn load_registry(client: &mut Client) -> Result<HashMap<SeriesKey, i32>, StoreError> {
    let rows = client.query(
        "SELECT series_id, index_name, data_source, scenario, model_name
         FROM drought.series",
        &[],
    )?;

    let mut registry = HashMap::new();
    for row in rows {
        let series_id: i32 = row.get(0);
        let index_name: String = row.get(1);
        let data_source: String = row.get(2);
        let scenario: String = row.get(3);
        let model_name: String = row.get(4);
        registry.insert(catalog_key(&index_name, &data_source, &scenario, &model_name), series_id);
    }

    Ok(registry)
}

impl TimeSeriesStore for PostgresStore {
    fn fetch(&self, series: &SeriesKey, region_id: i32, years: YearRange) -> Result<Vec<Observation>, StoreError> {
        let series_id = self
            .series_id(series)
            .ok_or_else(|| StoreError::SeriesNotFound(series.clone()))?;

        let rows = {
            let mut client = self.client.lock().map_err(|_| StoreError::Poisoned)?;
            client.query(
                "SELECT region_id, region_name, year, month, value
                 FROM drought.index_values
                 WHERE series_id = $1
                   AND region_id = $2
                   AND year BETWEEN $3 AND $4
                   AND value IS NOT NULL
                 ORDER BY year, month",
                &[&series_id, &region_id, &years.start_year, &years.end_year],
            )?
        };

        let mut observations = Vec::with_capacity(rows.len());
        for row in rows {
            let month: i32 = row.get(3);
            let value: Decimal = row.get(4);

            let (Ok(month), Some(value)) = (u32::try_from(month), value.to_f64()) else {
                tracing::warn!(series = %series, region_id, month, "skipping unreadable row");
                continue;
            };
            if !(1..=12).contains(&month) {
                tracing::warn!(series = %series, region_id, month, "skipping row with invalid month");
                continue;
            }

            observations.push(Observation {
                region_id: row.get(0),
                region_name: row.get(1),
                year: row.get(2),
                month,
                value,
            });
        }

        Ok(observations)
    }

    fn regions(&self, scenario: &str) -> Result<Vec<RegionInfo>, StoreError> {
        let scenario = normalize_scenario(scenario);
        let mut client = self.client.lock().map_err(|_| StoreError::Poisoned)?;
        let rows = client.query(
            "SELECT DISTINCT ON (v.region_id) v.region_id, v.region_name
             FROM drought.index_values v
             JOIN drought.series s ON s.series_id = v.series_id
             WHERE replace(replace(lower(btrim(s.scenario)), '.', ''), '-', '') = $1
             ORDER BY v.region_id",
            &[&scenario],
        )?;

        Ok(rows
            .into_iter()
            .map(|row| RegionInfo {
                region_id: row.get(0),
                region_name: row.get(1),
            })
            .collect())
    }
}
