//! Drought Query Service - Main Server
//!
//! A server-side process that:
//! 1. Loads the region domain and model rosters from drought.toml
//! 2. Connects to the drought index series in PostgreSQL
//! 3. Restores the summary cache from disk
//! 4. Serves drought month, event and multi-model summary queries over HTTP
//!
//! Index values are loaded into the `drought` schema by a separate ingestion
//! job; this service only reads them.
//!
//! Usage:
//!   cargo run --release                            # Serve on the configured port
//!   cargo run --release -- --endpoint 8080         # Override the port
//!   cargo run --release -- --config other.toml     # Use another configuration file
//!
//! Environment:
//!   DATABASE_URL       - PostgreSQL connection string
//!   RUST_LOG           - log filter (default: info)
//!   DROUGHT_LOG_FORMAT - "json" for one JSON object per line

use drought_service::aggregate::DroughtEngine;
use drought_service::cache::{JsonFileCache, ResultCache};
use drought_service::config;
use drought_service::endpoint::{self, DroughtApi};
use drought_service::logging::{self, LogFormat};
use drought_service::store::{PostgresStore, TimeSeriesStore};
use std::env;
use std::sync::Arc;

fn main() {
    println!("🌵 Drought Query Service");
    println!("========================\n");

    // Parse command-line arguments
    let args: Vec<String> = env::args().collect();
    let mut endpoint_port: Option<u16> = None;
    let mut config_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--endpoint" => {
                match args.get(i + 1).and_then(|p| p.parse().ok()) {
                    Some(port) => endpoint_port = Some(port),
                    None => {
                        eprintln!("Error: --endpoint requires a port number");
                        std::process::exit(1);
                    }
                }
                i += 2;
            }
            "--config" => {
                match args.get(i + 1) {
                    Some(path) => config_path = Some(path.clone()),
                    None => {
                        eprintln!("Error: --config requires a file path");
                        std::process::exit(1);
                    }
                }
                i += 2;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                eprintln!("Usage: {} [--endpoint PORT] [--config PATH]", args[0]);
                std::process::exit(1);
            }
        }
    }

    logging::init_logging(LogFormat::from_env());

    // Load configuration
    println!("⚙️  Loading configuration...");
    let loaded = match &config_path {
        Some(path) => config::load_config(path),
        None => config::load_config_default(),
    };
    let service_config = match loaded {
        Ok(c) => c,
        Err(e) => {
            eprintln!("\n❌ Configuration error: {}\n", e);
            std::process::exit(1);
        }
    };
    println!(
        "✓ {} regions, {} worker threads, threshold {}\n",
        service_config.domain.regions().len(),
        service_config.worker_threads,
        service_config.default_threshold.value()
    );

    // Connect to the series store
    println!("📊 Connecting to database...");
    let store: Arc<dyn TimeSeriesStore> = match PostgresStore::connect() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("\n❌ Database connection failed: {}\n", e);
            std::process::exit(1);
        }
    };
    println!("✓ Connected\n");

    // Restore the summary cache
    println!("💾 Loading summary cache from {}...", service_config.cache_file.display());
    let cache = Arc::new(JsonFileCache::load(&service_config.cache_file));
    println!("✓ {} cached summaries\n", cache.len());

    let engine = DroughtEngine::from_config(store, cache, &service_config);
    let api = DroughtApi::new(Arc::new(engine), service_config.default_threshold);

    let port = endpoint_port.unwrap_or(service_config.endpoint_port);
    println!("🚀 Starting HTTP endpoint server...");
    if let Err(e) = endpoint::start_endpoint_server(port, api) {
        eprintln!("\n❌ Endpoint server error: {}", e);
        std::process::exit(1);
    }
}
