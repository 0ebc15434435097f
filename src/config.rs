/// Service configuration loader - parses drought.toml
///
/// Separates deployment settings (cache location, fan-out sizing, endpoint
/// port) and the static region/roster domain from code, so a roster can be
/// extended or a region list trimmed without recompiling the service.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::{Domain, ModelRoster};
use crate::error::ConfigError;
use crate::model::{SourceFamily, Threshold};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "drought.toml";

// ---------------------------------------------------------------------------
// TOML structures
// ---------------------------------------------------------------------------

/// `[service]` table. Every field is optional.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServiceSection {
    pub cache_file: Option<PathBuf>,
    pub worker_threads: Option<usize>,
    pub fanout_timeout_secs: Option<u64>,
    pub endpoint_port: Option<u16>,
    pub default_threshold: Option<f64>,
}

/// `[domain]` table: overrides the built-in region list.
#[derive(Debug, Clone, Deserialize)]
pub struct DomainSection {
    pub regions: Vec<i32>,
}

/// One `[[roster]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RosterSection {
    pub family: SourceFamily,
    pub models: Vec<String>,
}

/// Root configuration structure for TOML parsing
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    service: ServiceSection,
    domain: Option<DomainSection>,
    #[serde(default)]
    roster: Vec<RosterSection>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub cache_file: PathBuf,
    pub worker_threads: usize,
    /// Upper bound on a multi-model fan-out. `None` waits for every job.
    pub fanout_timeout: Option<Duration>,
    pub endpoint_port: u16,
    pub default_threshold: Threshold,
    pub domain: Domain,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_file: PathBuf::from("cache.json"),
            worker_threads: 8,
            fanout_timeout: None,
            endpoint_port: 9901,
            default_threshold: Threshold::DEFAULT,
            domain: Domain::default(),
        }
    }
}

/// Parses configuration text. Omitted sections fall back to `ServiceConfig::default()`.
pub fn parse_config(contents: &str, origin: &str) -> Result<ServiceConfig, ConfigError> {
    let file: ConfigFile = toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: origin.to_string(),
        source,
    })?;

    let defaults = ServiceConfig::default();
    let service = file.service;

    let worker_threads = service.worker_threads.unwrap_or(defaults.worker_threads);
    if worker_threads == 0 {
        return Err(ConfigError::Invalid("worker_threads must be at least 1".to_string()));
    }

    let regions = file
        .domain
        .map(|d| d.regions)
        .unwrap_or_else(|| defaults.domain.regions().to_vec());
    let rosters = file
        .roster
        .into_iter()
        .map(|r| ModelRoster { family: r.family, models: r.models })
        .collect();
    let domain = Domain::new(regions, rosters)?;

    Ok(ServiceConfig {
        cache_file: service.cache_file.unwrap_or(defaults.cache_file),
        worker_threads,
        fanout_timeout: service.fanout_timeout_secs.map(Duration::from_secs),
        endpoint_port: service.endpoint_port.unwrap_or(defaults.endpoint_port),
        default_threshold: service
            .default_threshold
            .map(Threshold)
            .unwrap_or(defaults.default_threshold),
        domain,
    })
}

/// Loads configuration from a TOML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServiceConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&contents, &path.display().to_string())
}

/// Loads drought.toml from the working directory, or the built-in defaults
/// when the file does not exist. A file that exists but is invalid is an error.
pub fn load_config_default() -> Result<ServiceConfig, ConfigError> {
    if Path::new(DEFAULT_CONFIG_PATH).exists() {
        load_config(DEFAULT_CONFIG_PATH)
    } else {
        Ok(ServiceConfig::default())
    }
}
