/// HTTP endpoint for drought queries
///
/// JSON-over-HTTP surface for the query engine, used by the map frontend and
/// by analysis scripts. All query routes take a JSON body and live under
/// `/drought`.
///
/// Endpoints:
/// - POST /drought/drought-month-count     - Drought months for one model and region
/// - POST /drought/drought-months-details  - The drought months themselves ("YYYY-MM")
/// - POST /drought/drought-event-count     - Drought events for one model and region
/// - POST /drought/decade-breakdown        - Months and events per decade window
/// - POST /drought/regions                 - Regions present in a scenario
/// - POST /drought/drought-months-summary  - Cross-model mean drought months per region
/// - POST /drought/drought-event-summary   - Cross-model event frequency per region
/// - POST /drought/drought-summary-change  - Either summary minus its 1976-2005 baseline
/// - GET  /health                          - Service health check

use crate::aggregate::DroughtEngine;
use crate::error::QueryError;
use crate::model::{IndexName, RegionQuery, RegionSummary, SourceFamily, SummaryKind, SummaryQuery, Threshold, YearRange};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Read;
use std::sync::Arc;

const ROUTES: [&str; 9] = [
    "/drought/drought-month-count",
    "/drought/drought-months-details",
    "/drought/drought-event-count",
    "/drought/decade-breakdown",
    "/drought/regions",
    "/drought/drought-months-summary",
    "/drought/drought-event-summary",
    "/drought/drought-summary-change",
    "/health",
];

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

/// Body of the single-model, single-region routes.
#[derive(Debug, Deserialize)]
pub struct RegionRequest {
    pub index: String,
    pub data_source: String,
    pub scenario: String,
    pub model: String,
    pub start_year: i32,
    pub end_year: i32,
    pub region_id: i32,
    pub threshold: Option<f64>,
}

/// Body of the cross-model summary routes.
#[derive(Debug, Deserialize)]
pub struct SummaryRequest {
    pub index: String,
    pub data_source: String,
    pub scenario: String,
    pub start_year: i32,
    pub end_year: i32,
    pub threshold: Option<f64>,
}

/// Body of the change route: a summary request plus which summary to compare
/// and an optional baseline window.
#[derive(Debug, Deserialize)]
pub struct ChangeRequest {
    #[serde(flatten)]
    pub summary: SummaryRequest,
    /// "events" (default) or "months".
    pub definition: Option<String>,
    pub baseline_start_year: Option<i32>,
    pub baseline_end_year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ScenarioRequest {
    pub scenario: String,
}

fn threshold_or(value: Option<f64>, default: Threshold) -> Result<Threshold, QueryError> {
    match value {
        Some(v) if !v.is_finite() => Err(QueryError::InvalidParameter(format!("threshold must be finite, got {}", v))),
        Some(v) => Ok(Threshold(v)),
        None => Ok(default),
    }
}

fn non_empty(field: &str, value: &str) -> Result<(), QueryError> {
    if value.trim().is_empty() {
        return Err(QueryError::InvalidParameter(format!("{} must not be empty", field)));
    }
    Ok(())
}

impl RegionRequest {
    pub fn into_query(self, default_threshold: Threshold) -> Result<RegionQuery, QueryError> {
        non_empty("scenario", &self.scenario)?;
        non_empty("model", &self.model)?;
        Ok(RegionQuery {
            index: self.index.parse::<IndexName>()?,
            source: self.data_source.parse::<SourceFamily>()?,
            scenario: self.scenario,
            model: self.model,
            region_id: self.region_id,
            years: YearRange::new(self.start_year, self.end_year),
            threshold: threshold_or(self.threshold, default_threshold)?,
        })
    }
}

impl SummaryRequest {
    pub fn into_query(self, default_threshold: Threshold) -> Result<SummaryQuery, QueryError> {
        non_empty("scenario", &self.scenario)?;
        Ok(SummaryQuery {
            index: self.index.parse::<IndexName>()?,
            source: self.data_source.parse::<SourceFamily>()?,
            scenario: self.scenario,
            years: YearRange::new(self.start_year, self.end_year),
            threshold: threshold_or(self.threshold, default_threshold)?,
        })
    }
}

impl ChangeRequest {
    pub fn into_parts(self, default_threshold: Threshold) -> Result<(SummaryKind, SummaryQuery, YearRange), QueryError> {
        let kind = match self.definition.as_deref().map(|d| d.trim().to_lowercase()) {
            None => SummaryKind::DroughtEvents,
            Some(d) if d == "events" => SummaryKind::DroughtEvents,
            Some(d) if d == "months" => SummaryKind::DroughtMonths,
            Some(other) => {
                return Err(QueryError::InvalidParameter(format!(
                    "unknown definition '{}', expected events or months",
                    other
                )))
            }
        };
        let baseline = YearRange::new(
            self.baseline_start_year.unwrap_or(YearRange::BASELINE.start_year),
            self.baseline_end_year.unwrap_or(YearRange::BASELINE.end_year),
        );
        Ok((kind, self.summary.into_query(default_threshold)?, baseline))
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Request router. Holds no connection state, so it is testable without a socket.
pub struct DroughtApi {
    engine: Arc<DroughtEngine>,
    default_threshold: Threshold,
    started_at: DateTime<Utc>,
}

impl DroughtApi {
    pub fn new(engine: Arc<DroughtEngine>, default_threshold: Threshold) -> Self {
        Self {
            engine,
            default_threshold,
            started_at: Utc::now(),
        }
    }

    /// Routes one request, returning the status code and JSON body.
    pub fn handle(&self, method: &str, url: &str, body: &str) -> (u16, Value) {
        let path = url.split('?').next().unwrap_or(url);

        match (method, path) {
            ("GET", "/health") => (200, self.health()),
            ("POST", "/drought/drought-month-count") => self.with_region(body, |q| {
                let count = self.engine.drought_month_count(&q)?;
                Ok(json!({ "success": true, "drought_month_count": count }))
            }),
            ("POST", "/drought/drought-months-details") => self.with_region(body, |q| {
                let months: Vec<String> = self
                    .engine
                    .drought_months_details(&q)?
                    .iter()
                    .map(|m| m.to_string())
                    .collect();
                Ok(json!({ "success": true, "drought_months_details": months }))
            }),
            ("POST", "/drought/drought-event-count") => self.with_region(body, |q| {
                let events = self.engine.drought_events(&q)?;
                Ok(json!({ "success": true, "drought_events": events }))
            }),
            ("POST", "/drought/decade-breakdown") => self.with_region(body, |q| {
                let decades = self.engine.decade_breakdown(&q)?;
                Ok(json!({ "success": true, "decades": decades }))
            }),
            ("POST", "/drought/regions") => respond(parse_body::<ScenarioRequest>(body).and_then(|req| {
                let regions = self.engine.regions(&req.scenario)?;
                Ok(json!({ "success": true, "regions": regions }))
            })),
            ("POST", "/drought/drought-months-summary") => self.with_summary(body, |q| {
                self.engine.total_drought_months(&q)
            }),
            ("POST", "/drought/drought-event-summary") => self.with_summary(body, |q| {
                self.engine.total_drought_events(&q)
            }),
            ("POST", "/drought/drought-summary-change") => respond(
                parse_body::<ChangeRequest>(body)
                    .and_then(|req| req.into_parts(self.default_threshold))
                    .and_then(|(kind, q, baseline)| self.engine.summary_change(kind, &q, baseline))
                    .map(summary_body),
            ),
            (_, p) if ROUTES.contains(&p) => (
                405,
                json!({ "success": false, "error": format!("Method {} not allowed on {}", method, p) }),
            ),
            _ => (
                404,
                json!({
                    "success": false,
                    "error": "Not found",
                    "available_endpoints": ROUTES,
                }),
            ),
        }
    }

    fn health(&self) -> Value {
        json!({
            "status": "ok",
            "service": "drought_service",
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": self.started_at.to_rfc3339(),
            "uptime_secs": (Utc::now() - self.started_at).num_seconds(),
            "regions": self.engine.domain().regions().len(),
        })
    }

    fn with_region<F>(&self, body: &str, run: F) -> (u16, Value)
    where
        F: FnOnce(RegionQuery) -> Result<Value, QueryError>,
    {
        respond(
            parse_body::<RegionRequest>(body)
                .and_then(|req| req.into_query(self.default_threshold))
                .and_then(run),
        )
    }

    fn with_summary<F>(&self, body: &str, run: F) -> (u16, Value)
    where
        F: FnOnce(SummaryQuery) -> Result<Vec<RegionSummary>, QueryError>,
    {
        respond(
            parse_body::<SummaryRequest>(body)
                .and_then(|req| req.into_query(self.default_threshold))
                .and_then(run)
                .map(summary_body),
        )
    }
}

fn summary_body(summary: Vec<RegionSummary>) -> Value {
    let region_ids: Vec<i32> = summary.iter().map(|s| s.region_id).collect();
    let values: Vec<f64> = summary.iter().map(|s| s.metric).collect();
    json!({ "success": true, "region_ids": region_ids, "drought_summary": values })
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, QueryError> {
    serde_json::from_str(body).map_err(|e| QueryError::InvalidParameter(format!("invalid request body: {}", e)))
}

fn respond(result: Result<Value, QueryError>) -> (u16, Value) {
    match result {
        Ok(body) => (200, body),
        Err(QueryError::InvalidParameter(msg)) => (400, json!({ "success": false, "error": msg })),
        Err(e) => {
            tracing::error!("query failed: {}", e);
            (500, json!({ "success": false, "error": e.to_string() }))
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

/// Start HTTP endpoint server on the specified port
pub fn start_endpoint_server(port: u16, api: DroughtApi) -> Result<(), String> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))?;

    println!("📡 HTTP endpoint listening on http://0.0.0.0:{}", port);
    for route in ROUTES {
        println!("   {}", route);
    }
    println!();

    for mut request in server.incoming_requests() {
        let method = request.method().as_str().to_string();
        let url = request.url().to_string();

        let mut body = String::new();
        let (status, json) = match request.as_reader().read_to_string(&mut body) {
            Ok(_) => api.handle(&method, &url, &body),
            Err(e) => (400, json!({ "success": false, "error": format!("unreadable body: {}", e) })),
        };
        tracing::info!(method = %method, url = %url, status, "request served");

        if let Err(e) = request.respond(create_response(status, json)) {
            tracing::warn!("Failed to send response: {}", e);
        }
    }

    Ok(())
}

/// Create HTTP response with JSON body
fn create_response(status_code: u16, json: Value) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let body = serde_json::to_string_pretty(&json).unwrap_or_else(|_| "{}".to_string());

    let mut response = tiny_http::Response::from_data(body.into_bytes())
        .with_status_code(tiny_http::StatusCode::from(status_code));
    for (name, value) in [
        (&b"Content-Type"[..], &b"application/json"[..]),
        (&b"Access-Control-Allow-Origin"[..], &b"*"[..]),
    ] {
        if let Ok(header) = tiny_http::Header::from_bytes(name, value) {
            response.add_header(header);
        }
    }
    response
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::domain::Domain;
    use crate::model::{Observation, SeriesKey};
    use crate::store::MemoryStore;

    fn api() -> DroughtApi {
        let store = MemoryStore::new();
        let key = SeriesKey::new(IndexName::Spi, SourceFamily::Cmip5, "rcp45", "CCCma-CanESM2");
        let rows = [(1, -1.2), (2, -1.4), (3, 0.3), (7, -1.1)]
            .iter()
            .map(|&(month, value)| Observation {
                region_id: 1030,
                region_name: "Region 1030".to_string(),
                year: 1980,
                month,
                value,
            })
            .collect();
        store.insert(key, rows).unwrap();

        let engine = DroughtEngine::new(Arc::new(store), Arc::new(MemoryCache::new()), Domain::default(), 2);
        DroughtApi::new(Arc::new(engine), Threshold::DEFAULT)
    }

    const REGION_BODY: &str = r#"{"index":"spi","data_source":"cmip5","scenario":"rcp45",
        "model":"cccma-canesm2","start_year":1976,"end_year":2005,"region_id":1030}"#;

    #[test]
    fn test_month_count_route() {
        let (status, body) = api().handle("POST", "/drought/drought-month-count", REGION_BODY);
        assert_eq!(status, 200);
        assert_eq!(body["drought_month_count"], 3);
    }

    #[test]
    fn test_months_details_are_formatted() {
        let (status, body) = api().handle("POST", "/drought/drought-months-details", REGION_BODY);
        assert_eq!(status, 200);
        assert_eq!(body["drought_months_details"], json!(["1980-01", "1980-02", "1980-07"]));
    }

    #[test]
    fn test_event_route_returns_start_and_end() {
        let (_, body) = api().handle("POST", "/drought/drought-event-count", REGION_BODY);
        assert_eq!(
            body["drought_events"],
            json!([{ "start": { "year": 1980, "month": 1 }, "end": { "year": 1980, "month": 2 } }])
        );
    }

    #[test]
    fn test_summary_route_follows_domain_order() {
        let body = r#"{"index":"spi","data_source":"cmip5","scenario":"rcp45","start_year":1976,"end_year":2005}"#;
        let (status, body) = api().handle("POST", "/drought/drought-event-summary", body);
        assert_eq!(status, 200);
        assert_eq!(body["region_ids"][0], 1030);
        assert_eq!(body["drought_summary"][0], 0.2);
        assert_eq!(body["drought_summary"].as_array().unwrap().len(), Domain::default().regions().len());
    }

    #[test]
    fn test_summary_change_route_defaults_to_events_against_baseline() {
        // Data sits in 1980, inside the default baseline only.
        let body = r#"{"index":"spi","data_source":"cmip5","scenario":"RCP4.5","start_year":2020,"end_year":2059}"#;
        let (status, body) = api().handle("POST", "/drought/drought-summary-change", body);
        assert_eq!(status, 200);
        assert_eq!(body["region_ids"][0], 1030);
        assert_eq!(body["drought_summary"][0], -0.2);
        assert_eq!(body["drought_summary"][1], 0.0);
    }

    #[test]
    fn test_summary_change_route_with_months_and_custom_baseline() {
        let body = r#"{"index":"spi","data_source":"cmip5","scenario":"rcp45","start_year":1976,"end_year":2005,
            "definition":"months","baseline_start_year":1950,"baseline_end_year":1959}"#;
        let (status, body) = api().handle("POST", "/drought/drought-summary-change", body);
        assert_eq!(status, 200);
        assert_eq!(body["drought_summary"][0], 3.0);

        let bad = r#"{"index":"spi","data_source":"cmip5","scenario":"rcp45","start_year":1976,"end_year":2005,
            "definition":"severity"}"#;
        assert_eq!(api().handle("POST", "/drought/drought-summary-change", bad).0, 400);
    }

    #[test]
    fn test_bad_index_is_rejected() {
        let body = REGION_BODY.replace("\"spi\"", "\"pdsi\"");
        let (status, body) = api().handle("POST", "/drought/drought-month-count", &body);
        assert_eq!(status, 400);
        assert_eq!(body["success"], false);
    }

    #[test]
    fn test_malformed_body_is_rejected() {
        let (status, _) = api().handle("POST", "/drought/drought-months-summary", "{not json");
        assert_eq!(status, 400);
    }

    #[test]
    fn test_unknown_route_and_wrong_method() {
        assert_eq!(api().handle("GET", "/site/05568500", "").0, 404);
        assert_eq!(api().handle("GET", "/drought/regions", "").0, 405);
    }

    #[test]
    fn test_health() {
        let (status, body) = api().handle("GET", "/health", "");
        assert_eq!(status, 200);
        assert_eq!(body["service"], "drought_service");
        assert!(body["started_at"].is_string());
    }

    #[test]
    fn test_regions_route() {
        let (status, body) = api().handle("POST", "/drought/regions", r#"{"scenario":"RCP45"}"#);
        assert_eq!(status, 200);
        assert_eq!(body["regions"], json!([{ "region_id": 1030, "region_name": "Region 1030" }]));
    }
}
