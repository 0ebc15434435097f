#!/usr/bin/env rust
//! Multi-Model Drought Summary
//!
//! Computes one cross-model summary over the configured region domain and
//! prints it as a table. The result is written to the summary cache, so a
//! run before startup warms the service for that query.
//!
//! Usage:
//!   cargo run --bin drought_summary -- --scenario rcp45
//!
//! Options:
//!   --index NAME        spi or spei (default: spi)
//!   --source NAME       cmip5 or cmip6 (default: cmip5)
//!   --scenario NAME     climate scenario, required
//!   --start YEAR        first year, inclusive (default: 1976)
//!   --end YEAR          last year, inclusive (default: 2005)
//!   --threshold VALUE   drought threshold (default: from config)
//!   --events            summarize drought events instead of drought months
//!   --config PATH       configuration file (default: drought.toml)
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string

use chrono::Utc;
use drought_service::aggregate::DroughtEngine;
use drought_service::cache::{JsonFileCache, ResultCache};
use drought_service::config;
use drought_service::logging::{self, LogFormat};
use drought_service::model::{IndexName, SourceFamily, SummaryQuery, Threshold, YearRange};
use drought_service::store::PostgresStore;
use std::env;
use std::sync::Arc;

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_or_exit<T: std::str::FromStr>(value: Option<String>, flag: &str, default: T) -> T {
    match value {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            eprintln!("Error: invalid value '{}' for {}", raw, flag);
            std::process::exit(1);
        }),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🌵 Multi-Model Drought Summary");
    println!("==============================\n");

    logging::init_logging(LogFormat::from_env());

    let args: Vec<String> = env::args().collect();
    let scenario = arg_value(&args, "--scenario").unwrap_or_else(|| {
        eprintln!("Error: --scenario is required");
        std::process::exit(1);
    });
    let events = args.contains(&"--events".to_string());

    let service_config = match arg_value(&args, "--config") {
        Some(path) => config::load_config(path)?,
        None => config::load_config_default()?,
    };

    let index: IndexName = arg_value(&args, "--index").unwrap_or_else(|| "spi".to_string()).parse()?;
    let source: SourceFamily = arg_value(&args, "--source").unwrap_or_else(|| "cmip5".to_string()).parse()?;
    let start_year = parse_or_exit(arg_value(&args, "--start"), "--start", 1976);
    let end_year = parse_or_exit(arg_value(&args, "--end"), "--end", 2005);
    let threshold = parse_or_exit(
        arg_value(&args, "--threshold"),
        "--threshold",
        service_config.default_threshold.value(),
    );

    let query = SummaryQuery {
        index,
        source,
        scenario,
        years: YearRange::new(start_year, end_year),
        threshold: Threshold(threshold),
    };

    println!("📊 Connecting to database...");
    let store = PostgresStore::connect().unwrap_or_else(|e| {
        eprintln!("\n{}\n", e);
        std::process::exit(1);
    });
    println!("✓ Connected\n");

    let cache = Arc::new(JsonFileCache::load(&service_config.cache_file));
    let cached_before = cache.len();
    let engine = DroughtEngine::from_config(Arc::new(store), cache.clone(), &service_config);

    let label = if events { "drought events (per model)" } else { "drought months (model mean)" };
    println!(
        "🔎 {} {} {} {}-{}, threshold {}",
        query.index, query.source, query.scenario, start_year, end_year, threshold
    );

    let started = Utc::now();
    let summary = if events {
        engine.total_drought_events(&query)?
    } else {
        engine.total_drought_months(&query)?
    };
    let elapsed = Utc::now() - started;

    println!("\n  {:>9}  {}", "region_id", label);
    println!("  {:>9}  {}", "---------", "-".repeat(label.len()));
    for row in &summary {
        println!("  {:>9}  {:.2}", row.region_id, row.metric);
    }

    let warmed = if cache.len() > cached_before { "computed and cached" } else { "served from cache" };
    println!(
        "\n✓ {} regions, {} in {} ms",
        summary.len(),
        warmed,
        elapsed.num_milliseconds()
    );

    Ok(())
}
