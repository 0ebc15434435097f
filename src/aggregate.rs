/// Query engine: single-model lookups and multi-model summaries.
///
/// Single-region queries go straight to the store and are not cached.
/// Summaries fan out one job per (model, region) pair over a worker pool,
/// fold the contributions per region, and memoize the folded vector through
/// the `ResultCache` under the query's canonical key.
///
/// ## Folding
///
/// - Months: for each region, the mean distinct drought-month count over the
///   models that flagged at least one month there. No contributor means 0.
/// - Events: for each region, the sum of event counts over every roster model
///   divided by the roster size (always 5), rounded to 2 decimal places.
///
/// A change summary is the per-region difference between two cached
/// summaries of the same kind: the query's window minus a baseline window.
///
/// ## Failures
///
/// A model whose series does not exist contributes nothing. Any other store
/// failure, a panicking job, or a fan-out deadline also drops the
/// contribution, and the result is returned but marked partial so it is never
/// cached.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use threadpool::ThreadPool;

use crate::analysis::{decades, drought_events, threshold};
use crate::cache::{CacheKey, CachedValues, Computation, ResultCache};
use crate::config::ServiceConfig;
use crate::domain::{Domain, ROSTER_SIZE};
use crate::error::{QueryError, StoreError};
use crate::logging;
use crate::model::{
    DroughtEvent, RegionInfo, RegionQuery, RegionSummary, SummaryKind, SummaryQuery, YearMonth, YearRange,
};
use crate::store::TimeSeriesStore;

/// Drought statistics for one decade window of a single-region query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DecadeSummary {
    pub decade_start: i32,
    pub drought_months: usize,
    pub drought_events: usize,
}

/// One (model, region) job's answer.
struct Contribution {
    region_index: usize,
    /// Flagged months, or `None` when the model had no data.
    flagged: Option<Vec<YearMonth>>,
    /// The contribution was lost to something other than a missing series.
    failed: bool,
}

/// Everything a fan-out collected before finishing or hitting its deadline.
struct FanOut {
    per_region: Vec<Vec<Vec<YearMonth>>>,
    complete: bool,
}

pub struct DroughtEngine {
    store: Arc<dyn TimeSeriesStore>,
    cache: Arc<dyn ResultCache>,
    domain: Domain,
    pool: Mutex<ThreadPool>,
    fanout_timeout: Option<Duration>,
}

impl DroughtEngine {
    pub fn new(store: Arc<dyn TimeSeriesStore>, cache: Arc<dyn ResultCache>, domain: Domain, workers: usize) -> Self {
        Self {
            store,
            cache,
            domain,
            pool: Mutex::new(ThreadPool::with_name("drought-fanout".to_string(), workers.max(1))),
            fanout_timeout: None,
        }
    }

    pub fn from_config(store: Arc<dyn TimeSeriesStore>, cache: Arc<dyn ResultCache>, config: &ServiceConfig) -> Self {
        Self::new(store, cache, config.domain.clone(), config.worker_threads)
            .with_fanout_timeout(config.fanout_timeout)
    }

    pub fn with_fanout_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fanout_timeout = timeout;
        self
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    // -----------------------------------------------------------------------
    // Single region
    // -----------------------------------------------------------------------

    /// Flagged months of one region of one series. A missing series is empty.
    fn flagged_months(&self, query: &RegionQuery) -> Result<Vec<YearMonth>, QueryError> {
        let series = query.series_key();
        match self.store.fetch(&series, query.region_id, query.years) {
            Ok(observations) => Ok(threshold::select_in_range(&observations, query.threshold, query.years)),
            Err(StoreError::SeriesNotFound(_)) => {
                tracing::debug!(series = %series, region_id = query.region_id, "series not found, reporting no drought");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn drought_month_count(&self, query: &RegionQuery) -> Result<usize, QueryError> {
        let months = self.flagged_months(query)?;
        Ok(drought_events::distinct_month_count(&months, query.years))
    }

    pub fn drought_months_details(&self, query: &RegionQuery) -> Result<Vec<YearMonth>, QueryError> {
        self.flagged_months(query)
    }

    pub fn drought_events(&self, query: &RegionQuery) -> Result<Vec<DroughtEvent>, QueryError> {
        let months = self.flagged_months(query)?;
        Ok(drought_events::detect(&months))
    }

    /// Months and events per ten-year window starting at the query's first year.
    pub fn decade_breakdown(&self, query: &RegionQuery) -> Result<Vec<DecadeSummary>, QueryError> {
        let months = self.flagged_months(query)?;
        let events = drought_events::detect(&months);

        let month_counts = decades::month_count_by_decade(&months, query.years);
        let event_counts = decades::event_frequency_by_decade(&events, query.years);

        Ok(month_counts
            .into_iter()
            .zip(event_counts)
            .map(|((decade_start, drought_months), (_, drought_events))| DecadeSummary {
                decade_start,
                drought_months,
                drought_events,
            })
            .collect())
    }

    pub fn regions(&self, scenario: &str) -> Result<Vec<RegionInfo>, QueryError> {
        if scenario.trim().is_empty() {
            return Err(QueryError::InvalidParameter("scenario must not be empty".to_string()));
        }
        Ok(self.store.regions(scenario)?)
    }

    // -----------------------------------------------------------------------
    // Multi-model summaries
    // -----------------------------------------------------------------------

    /// Mean drought-month count per region over contributing models.
    pub fn total_drought_months(&self, query: &SummaryQuery) -> Result<Vec<RegionSummary>, QueryError> {
        self.summary(SummaryKind::DroughtMonths, query)
    }

    /// Event count per region, summed over models and divided by the roster size.
    pub fn total_drought_events(&self, query: &SummaryQuery) -> Result<Vec<RegionSummary>, QueryError> {
        self.summary(SummaryKind::DroughtEvents, query)
    }

    /// Per-region change of a summary between `baseline` and the query's own
    /// window (query minus baseline). Both sides go through the cache.
    pub fn summary_change(
        &self,
        kind: SummaryKind,
        query: &SummaryQuery,
        baseline: YearRange,
    ) -> Result<Vec<RegionSummary>, QueryError> {
        let baseline_query = SummaryQuery { years: baseline, ..query.clone() };
        let before = self.summary(kind, &baseline_query)?;
        let after = self.summary(kind, query)?;

        Ok(after
            .into_iter()
            .zip(before)
            .map(|(after, before)| RegionSummary {
                region_id: after.region_id,
                metric: after.metric - before.metric,
            })
            .collect())
    }

    fn summary(&self, kind: SummaryKind, query: &SummaryQuery) -> Result<Vec<RegionSummary>, QueryError> {
        let key = CacheKey::new(kind, query, &self.domain.fingerprint(query.source));
        let span = logging::summary_span(kind.as_str(), key.as_str());
        let _enter = span.enter();

        let values = self.cache.get_or_compute(&key, &mut || -> Result<Computation, QueryError> {
            let started = Instant::now();
            let fan_out = self.fan_out(query);
            let values = match kind {
                SummaryKind::DroughtMonths => fold_months(&fan_out, query),
                SummaryKind::DroughtEvents => fold_events(&fan_out),
            };
            tracing::info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                complete = fan_out.complete,
                "summary computed"
            );
            Ok(if fan_out.complete {
                Computation::Complete(values)
            } else {
                Computation::Partial(values)
            })
        })?;

        let regions = self.domain.regions();
        if values.len() != regions.len() {
            tracing::warn!(
                cached = values.len(),
                regions = regions.len(),
                "cached summary does not match the region domain"
            );
        }

        Ok(regions
            .iter()
            .zip(values)
            .map(|(&region_id, metric)| RegionSummary { region_id, metric })
            .collect())
    }

    fn fan_out(&self, query: &SummaryQuery) -> FanOut {
        let regions = self.domain.regions();
        let roster = self.domain.roster_for(query.source);
        let pool = self.pool.lock().unwrap_or_else(|p| p.into_inner()).clone();

        let (tx, rx) = mpsc::channel::<Contribution>();
        let expected = roster.models.len() * regions.len();

        for model in &roster.models {
            for (region_index, &region_id) in regions.iter().enumerate() {
                let tx = tx.clone();
                let store = Arc::clone(&self.store);
                let series = query.series_key(model);
                let years = query.years;
                let limit = query.threshold;

                pool.execute(move || {
                    let contribution = match store.fetch(&series, region_id, years) {
                        Ok(observations) => Contribution {
                            region_index,
                            flagged: Some(threshold::select(&observations, limit)),
                            failed: false,
                        },
                        Err(e) => {
                            logging::log_model_failure(&series, region_id, &e);
                            Contribution {
                                region_index,
                                flagged: None,
                                failed: !matches!(e, StoreError::SeriesNotFound(_)),
                            }
                        }
                    };
                    // Receiver gone means the caller stopped waiting.
                    let _ = tx.send(contribution);
                });
            }
        }
        drop(tx);

        let deadline = self.fanout_timeout.map(|t| Instant::now() + t);
        let mut per_region: Vec<Vec<Vec<YearMonth>>> = vec![Vec::new(); regions.len()];
        let mut received = 0usize;
        let mut failed = 0usize;

        while received < expected {
            let next = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    rx.recv_timeout(remaining)
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match next {
                Ok(contribution) => {
                    received += 1;
                    if contribution.failed {
                        failed += 1;
                    }
                    if let Some(flagged) = contribution.flagged {
                        per_region[contribution.region_index].push(flagged);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(received, expected, "fan-out deadline reached");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // Every sender dropped early: some jobs panicked.
                    tracing::warn!(received, expected, "fan-out jobs lost");
                    break;
                }
            }
        }

        FanOut {
            per_region,
            complete: received == expected && failed == 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Folding
// ---------------------------------------------------------------------------

fn fold_months(fan_out: &FanOut, query: &SummaryQuery) -> CachedValues {
    fan_out
        .per_region
        .iter()
        .map(|models| {
            let counts: Vec<usize> = models
                .iter()
                .map(|flagged| drought_events::distinct_month_count(flagged, query.years))
                .filter(|&count| count > 0)
                .collect();
            if counts.is_empty() {
                0.0
            } else {
                counts.iter().sum::<usize>() as f64 / counts.len() as f64
            }
        })
        .collect()
}

fn fold_events(fan_out: &FanOut) -> CachedValues {
    fan_out
        .per_region
        .iter()
        .map(|models| {
            let total: usize = models.iter().map(|flagged| drought_events::count_events(flagged)).sum();
            round2(total as f64 / ROSTER_SIZE as f64)
        })
        .collect()
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::domain::{ModelRoster, CMIP6_ROSTER};
    use crate::model::{IndexName, Observation, SeriesKey, SourceFamily, Threshold, YearRange};
    use crate::store::MemoryStore;

    const REGIONS: [i32; 3] = [1030, 1040, 1060];

    fn small_domain() -> Domain {
        Domain::new(
            REGIONS.to_vec(),
            vec![ModelRoster {
                family: SourceFamily::Cmip6,
                models: CMIP6_ROSTER.iter().map(|m| m.to_string()).collect(),
            }],
        )
        .unwrap()
    }

    fn key(model: &str) -> SeriesKey {
        SeriesKey::new(IndexName::Spi, SourceFamily::Cmip6, "ssp126", model)
    }

    /// Observations for `region_id` in 2000, one per listed (month, value).
    fn series(region_id: i32, values: &[(u32, f64)]) -> Vec<Observation> {
        values
            .iter()
            .map(|&(month, value)| Observation {
                region_id,
                region_name: format!("Region {}", region_id),
                year: 2000,
                month,
                value,
            })
            .collect()
    }

    fn summary_query() -> SummaryQuery {
        SummaryQuery {
            index: IndexName::Spi,
            source: SourceFamily::Cmip6,
            scenario: "ssp126".to_string(),
            years: YearRange::new(2000, 2000),
            threshold: Threshold::DEFAULT,
        }
    }

    fn region_query(model: &str, region_id: i32) -> RegionQuery {
        RegionQuery {
            index: IndexName::Spi,
            source: SourceFamily::Cmip6,
            scenario: "ssp126".to_string(),
            model: model.to_string(),
            region_id,
            years: YearRange::new(2000, 2000),
            threshold: Threshold::DEFAULT,
        }
    }

    fn engine(store: Arc<MemoryStore>) -> DroughtEngine {
        DroughtEngine::new(store, Arc::new(MemoryCache::new()), small_domain(), 4)
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(0.4), 0.4);
        assert_eq!(round2(1.0 / 3.0), 0.33);
        assert_eq!(round2(2.0 / 3.0), 0.67);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn test_single_region_counts_and_events() {
        logging::init_test_logging();
        let store = Arc::new(MemoryStore::new());
        store
            .insert(key("CESM2"), series(1030, &[(1, -1.5), (2, -1.2), (3, 0.1), (5, -2.0)]))
            .unwrap();
        let engine = engine(store);

        let query = region_query("CESM2", 1030);
        assert_eq!(engine.drought_month_count(&query).unwrap(), 3);
        let months: Vec<String> = engine
            .drought_months_details(&query)
            .unwrap()
            .iter()
            .map(|m| m.to_string())
            .collect();
        assert_eq!(months, vec!["2000-01", "2000-02", "2000-05"]);

        let events = engine.drought_events(&query).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start, YearMonth::new(2000, 1).unwrap());
        assert_eq!(events[0].end, YearMonth::new(2000, 2).unwrap());
    }

    #[test]
    fn test_missing_series_reports_zero() {
        let engine = engine(Arc::new(MemoryStore::new()));
        let query = region_query("CESM2", 1030);
        assert_eq!(engine.drought_month_count(&query).unwrap(), 0);
        assert!(engine.drought_events(&query).unwrap().is_empty());
    }

    #[test]
    fn test_month_summary_averages_contributing_models_only() {
        let store = Arc::new(MemoryStore::new());
        store.insert(key("ACCESS-CM2"), series(1030, &[(1, -1.5), (2, -1.5), (3, -1.5)])).unwrap();
        store.insert(key("CESM2"), series(1030, &[(1, -1.5)])).unwrap();
        // Present but never below threshold: not a contributor.
        store.insert(key("CMCC-ESM2"), series(1030, &[(1, 0.5)])).unwrap();
        let engine = engine(store);

        let summary = engine.total_drought_months(&summary_query()).unwrap();
        let ids: Vec<i32> = summary.iter().map(|s| s.region_id).collect();
        assert_eq!(ids, REGIONS.to_vec());
        assert_eq!(summary[0].metric, 2.0);
        assert_eq!(summary[1].metric, 0.0);
        assert_eq!(summary[2].metric, 0.0);
    }

    #[test]
    fn test_event_summary_divides_by_roster_size() {
        let store = Arc::new(MemoryStore::new());
        // One two-month event from a single model.
        store.insert(key("ACCESS-CM2"), series(1040, &[(3, -1.1), (4, -1.1)])).unwrap();
        let engine = engine(store);

        let summary = engine.total_drought_events(&summary_query()).unwrap();
        assert_eq!(summary[1], RegionSummary { region_id: 1040, metric: 0.2 });
        assert_eq!(summary[0].metric, 0.0);
    }

    #[test]
    fn test_summary_hits_cache_on_repeat() {
        let store = Arc::new(MemoryStore::new());
        store.insert(key("CESM2"), series(1030, &[(1, -1.5), (2, -1.5)])).unwrap();
        let engine = engine(Arc::clone(&store));

        let first = engine.total_drought_events(&summary_query()).unwrap();
        let fetches = store.fetch_count();
        assert_eq!(fetches, CMIP6_ROSTER.len() * REGIONS.len());

        let second = engine.total_drought_events(&summary_query()).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.fetch_count(), fetches);
    }

    #[test]
    fn test_summary_change_subtracts_baseline_per_region() {
        let store = Arc::new(MemoryStore::new());
        let rows = vec![
            Observation { region_id: 1040, region_name: "Region 1040".into(), year: 1990, month: 1, value: -1.5 },
            Observation { region_id: 1040, region_name: "Region 1040".into(), year: 2000, month: 1, value: -1.5 },
            Observation { region_id: 1040, region_name: "Region 1040".into(), year: 2000, month: 2, value: -1.5 },
            Observation { region_id: 1040, region_name: "Region 1040".into(), year: 2000, month: 3, value: -1.5 },
            Observation { region_id: 1060, region_name: "Region 1060".into(), year: 1991, month: 4, value: -1.5 },
        ];
        store.insert(key("CESM2"), rows).unwrap();
        let engine = engine(Arc::clone(&store));

        let change = engine
            .summary_change(SummaryKind::DroughtMonths, &summary_query(), YearRange::new(1990, 1991))
            .unwrap();
        let ids: Vec<i32> = change.iter().map(|s| s.region_id).collect();
        assert_eq!(ids, REGIONS.to_vec());
        assert_eq!(change[0].metric, 0.0);
        assert_eq!(change[1].metric, 2.0);
        assert_eq!(change[2].metric, -1.0);

        // Both windows are now cached.
        let fetches = store.fetch_count();
        engine.total_drought_months(&summary_query()).unwrap();
        assert_eq!(store.fetch_count(), fetches);
    }

    #[test]
    fn test_decade_breakdown() {
        let store = Arc::new(MemoryStore::new());
        store.insert(key("CESM2"), series(1030, &[(1, -1.5), (2, -1.5), (6, -1.5)])).unwrap();
        let engine = engine(store);

        let mut query = region_query("CESM2", 1030);
        query.years = YearRange::new(1995, 2014);
        let breakdown = engine.decade_breakdown(&query).unwrap();
        assert_eq!(
            breakdown,
            vec![
                DecadeSummary { decade_start: 1995, drought_months: 3, drought_events: 1 },
                DecadeSummary { decade_start: 2005, drought_months: 0, drought_events: 0 },
            ]
        );
    }

    /// Store whose fetches either stall or fail, for the degraded paths.
    struct FlakyStore {
        delay: Duration,
        fail: bool,
    }

    impl TimeSeriesStore for FlakyStore {
        fn fetch(&self, series: &SeriesKey, region_id: i32, _years: YearRange) -> Result<Vec<Observation>, StoreError> {
            std::thread::sleep(self.delay);
            if self.fail {
                return Err(StoreError::Query("connection reset".to_string()));
            }
            Ok(vec![Observation {
                region_id,
                region_name: series.model.clone(),
                year: 2000,
                month: 1,
                value: -2.0,
            }])
        }

        fn regions(&self, _scenario: &str) -> Result<Vec<RegionInfo>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_fanout_deadline_returns_partial_result_uncached() {
        let cache = Arc::new(MemoryCache::new());
        let store = FlakyStore { delay: Duration::from_millis(300), fail: false };
        let engine = DroughtEngine::new(Arc::new(store), cache.clone(), small_domain(), 1)
            .with_fanout_timeout(Some(Duration::from_millis(20)));

        let summary = engine.total_drought_months(&summary_query()).unwrap();
        assert_eq!(summary.len(), REGIONS.len());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_store_failures_count_as_no_data_and_skip_cache() {
        let cache = Arc::new(MemoryCache::new());
        let store = FlakyStore { delay: Duration::ZERO, fail: true };
        let engine = DroughtEngine::new(Arc::new(store), cache.clone(), small_domain(), 2);

        let summary = engine.total_drought_events(&summary_query()).unwrap();
        assert!(summary.iter().all(|s| s.metric == 0.0));
        assert!(cache.is_empty());

        let query = region_query("CESM2", 1030);
        assert!(matches!(engine.drought_month_count(&query), Err(QueryError::Store(_))));
    }

    #[test]
    fn test_empty_scenario_is_rejected() {
        let engine = engine(Arc::new(MemoryStore::new()));
        assert!(matches!(engine.regions("  "), Err(QueryError::InvalidParameter(_))));
    }
}
