/// Durable memoization of multi-model summaries.
///
/// ## Keys
///
/// A `CacheKey` is the canonical string form of a full summary signature:
/// summary kind, index, data source, scenario, year window, threshold and
/// the fingerprint of the region domain and roster the values were computed
/// over, in that fixed order and case-folded. Cached vectors are positional,
/// so a reordered or resized domain must never read them back. Every equal
/// signature must produce an equal key.
///
/// ## Lifecycle
///
/// 1. `JsonFileCache::load` reads the persisted map at startup. A missing or
///    unreadable file starts an empty cache.
/// 2. A hit returns the stored values with no staleness check; the backing
///    series are immutable once loaded.
/// 3. A miss computes, stores, and rewrites the whole file before returning.
///    Write failures are logged and the in-memory entry is kept.
///
/// ## Concurrency
///
/// The entry map and the file are guarded by separate mutexes. Concurrent
/// misses on the same key may both compute; the first insert wins and every
/// caller returns that stored value. File rewrites are serialized and go
/// through a temp file + rename so a crash never leaves a truncated cache.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{CacheError, QueryError};
use crate::model::{normalize_scenario, SummaryKind, SummaryQuery};

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// `domain_fingerprint` comes from `Domain::fingerprint` for the query's
    /// source family.
    pub fn new(kind: SummaryKind, query: &SummaryQuery, domain_fingerprint: &str) -> Self {
        // -0.0 and 0.0 compare equal, so they must share a key.
        let threshold = if query.threshold.value() == 0.0 { 0.0 } else { query.threshold.value() };
        CacheKey(format!(
            "{}|{}|{}|{}|{}|{}|{:?}|{}",
            kind.as_str(),
            query.index.as_str(),
            query.source.as_str(),
            normalize_scenario(&query.scenario),
            query.years.start_year,
            query.years.end_year,
            threshold,
            domain_fingerprint,
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cached summary: one value per region, in domain order.
pub type CachedValues = Vec<f64>;

/// Result of a summary computation handed to `get_or_compute`.
#[derive(Debug, Clone, PartialEq)]
pub enum Computation {
    /// Every contribution was accounted for; safe to memoize.
    Complete(CachedValues),
    /// Some contributions timed out or failed unexpectedly. Returned to the
    /// caller but never stored.
    Partial(CachedValues),
}

// ---------------------------------------------------------------------------
// Cache seam
// ---------------------------------------------------------------------------

pub trait ResultCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<CachedValues>;

    /// Stores `values` unless the key is already present, and returns
    /// whichever value ends up stored.
    fn insert(&self, key: &CacheKey, values: CachedValues) -> CachedValues;

    /// Returns the cached value for `key`, or runs `compute`, stores a
    /// complete result and returns it. Errors and partial results are not cached.
    fn get_or_compute(
        &self,
        key: &CacheKey,
        compute: &mut dyn FnMut() -> Result<Computation, QueryError>,
    ) -> Result<CachedValues, QueryError> {
        if let Some(hit) = self.get(key) {
            tracing::debug!(cache_key = %key, "cache hit");
            return Ok(hit);
        }
        tracing::debug!(cache_key = %key, "cache miss");
        match compute()? {
            Computation::Complete(values) => Ok(self.insert(key, values)),
            Computation::Partial(values) => {
                tracing::warn!(cache_key = %key, "partial result, not caching");
                Ok(values)
            }
        }
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// In-memory cache
// ---------------------------------------------------------------------------

/// Non-persistent cache, for tests and one-shot tools.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CachedValues>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<CachedValues> {
        self.entries.lock().ok()?.get(key.as_str()).cloned()
    }

    fn insert(&self, key: &CacheKey, values: CachedValues) -> CachedValues {
        match self.entries.lock() {
            Ok(mut entries) => entries.entry(key.as_str().to_string()).or_insert(values).clone(),
            Err(_) => values,
        }
    }

    fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// JSON file cache
// ---------------------------------------------------------------------------

/// Cache persisted as a single JSON object `{ "<key>": [values...] }`.
#[derive(Debug)]
pub struct JsonFileCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, CachedValues>>,
    persist_lock: Mutex<()>,
}

impl JsonFileCache {
    /// Loads `path` if it exists. Missing or corrupt files yield an empty cache.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match read_entries(&path) {
            Ok(Some(entries)) => {
                tracing::info!(path = %path.display(), entries = entries.len(), "cache loaded");
                entries
            }
            Ok(None) => {
                tracing::info!(path = %path.display(), "no cache file, starting empty");
                HashMap::new()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to load cache, starting empty: {}", e);
                HashMap::new()
            }
        };

        Self {
            path,
            entries: Mutex::new(entries),
            persist_lock: Mutex::new(()),
        }
    }

    /// Writes the full cache to disk.
    pub fn flush(&self) -> Result<(), CacheError> {
        let _guard = self.persist_lock.lock().unwrap_or_else(|p| p.into_inner());
        let snapshot = {
            let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
            serde_json::to_vec(&*entries)?
        };
        write_atomically(&self.path, &snapshot)?;
        Ok(())
    }
}

impl ResultCache for JsonFileCache {
    fn get(&self, key: &CacheKey) -> Option<CachedValues> {
        self.entries.lock().ok()?.get(key.as_str()).cloned()
    }

    fn insert(&self, key: &CacheKey, values: CachedValues) -> CachedValues {
        let (stored, is_new) = {
            let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
            match entries.get(key.as_str()) {
                Some(existing) => (existing.clone(), false),
                None => {
                    entries.insert(key.as_str().to_string(), values.clone());
                    (values, true)
                }
            }
        };
        if !is_new {
            return stored;
        }

        match self.flush() {
            Ok(()) => tracing::debug!(cache_key = %key, path = %self.path.display(), "cache persisted"),
            Err(e) => tracing::warn!(
                cache_key = %key,
                path = %self.path.display(),
                "cache write-through failed, keeping in-memory entry: {}", e
            ),
        }

        stored
    }

    fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

fn read_entries(path: &Path) -> Result<Option<HashMap<String, CachedValues>>, CacheError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read(path)?;
    Ok(Some(serde_json::from_slice(&contents)?))
}

/// Sibling temp file the cache is staged in before the rename.
fn staging_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let tmp = staging_path(path);

    let written = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = written {
        // Nothing to clean up if the create itself failed.
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
