/// AirNow current-observations API client
///
/// Fetches the most recent hourly AQI readings near a lat/long point and
/// normalizes them into `Observation` rows for the `observations` table.
///
/// API Documentation: https://docs.airnowapi.org/CurrentObservationsByLatLon/query

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use postgres::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::Config;
use crate::db;
use crate::error::{ForecastError, Result};
use crate::logging::{self, Component};
use crate::model::{Location, Observation, RawPayload};

pub const AIRNOW_BASE_URL: &str = "https://www.airnowapi.org/aq/observation/latLong/current/";

/// Search radius for nearby monitors.
pub const DEFAULT_DISTANCE_MILES: u32 = 25;

const REQUEST_TIMEOUT_SECS: u64 = 20;

// ============================================================================
// AirNow API Response Structures
// ============================================================================

/// One record of the current-observations response (one per pollutant
/// per reporting area). Only the fields the service stores are typed; the
/// full record is kept as the raw payload.
#[derive(Debug, Deserialize)]
pub struct AirNowRecord {
    #[serde(rename = "DateObserved")]
    pub date_observed: Option<String>, // "2025-12-10 " (AirNow pads with a space)
    #[serde(rename = "HourObserved")]
    pub hour_observed: Option<HourObserved>,
    #[serde(rename = "AQI")]
    pub aqi: Option<i32>,
    #[serde(rename = "ParameterName")]
    pub parameter_name: Option<String>,
    #[serde(rename = "Category")]
    pub category: Option<AirNowCategory>,
}

/// `HourObserved` is documented as an integer but arrives as a string from
/// some mirrors.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum HourObserved {
    Number(i64),
    Text(String),
}

impl HourObserved {
    fn as_hour(&self) -> Option<u32> {
        let raw = match self {
            HourObserved::Number(n) => *n,
            HourObserved::Text(s) => s.trim().parse().ok()?,
        };
        u32::try_from(raw).ok()
    }
}

#[derive(Debug, Deserialize)]
pub struct AirNowCategory {
    #[serde(rename = "Number")]
    pub number: Option<i32>,
    #[serde(rename = "Name")]
    pub name: Option<String>,
}

/// A location that produced nothing to insert. Not fatal for the run.
#[derive(Debug, Error)]
pub enum IngestGap {
    #[error("No observations returned for {0}")]
    NoObservations(String),
    #[error("No valid normalized records for {0}")]
    NoValidRecords(String),
}

// ============================================================================
// API Client
// ============================================================================

pub struct AirNowClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl AirNowClient {
    /// Fails with `Configuration` if the API key is missing or a placeholder.
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config.airnow_api_key()?.to_string();
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(AirNowClient {
            http,
            base_url: AIRNOW_BASE_URL.to_string(),
            api_key,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch current observations around a point.
    ///
    /// # Parameters
    /// - `distance_miles`: search radius for nearby monitors
    /// - `pollutants`: if non-empty, keep only these `ParameterName`s
    ///   (case-insensitive, e.g. "PM2.5", "ozone")
    ///
    /// # Returns
    /// Raw JSON records, one per pollutant per reporting area
    pub fn fetch_current_observations(
        &self,
        latitude: f64,
        longitude: f64,
        distance_miles: u32,
        pollutants: &[String],
    ) -> Result<Vec<Value>> {
        let params = [
            ("format", "application/json".to_string()),
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            ("distance", distance_miles.to_string()),
            ("API_KEY", self.api_key.clone()),
        ];

        let response = self
            .http
            .get(&self.base_url)
            .header("Accept", "application/json")
            .query(&params)
            .send()?
            .error_for_status()?;

        let body: Value = response.json()?;
        Ok(filter_pollutants(wrap_records(body), pollutants))
    }
}

// ============================================================================
// Response Processing
// ============================================================================

/// AirNow normally returns an array; a single object is treated as one record.
pub fn wrap_records(body: Value) -> Vec<Value> {
    match body {
        Value::Array(records) => records,
        other => vec![other],
    }
}

pub fn filter_pollutants(records: Vec<Value>, pollutants: &[String]) -> Vec<Value> {
    if pollutants.is_empty() {
        return records;
    }
    let wanted: Vec<String> = pollutants.iter().map(|p| p.to_uppercase()).collect();
    records
        .into_iter()
        .filter(|rec| {
            let name = rec
                .get("ParameterName")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_uppercase();
            wanted.contains(&name)
        })
        .collect()
}

/// Observation hour as a naive timestamp. AirNow reports local time; it is
/// stored as-is in `timestamp_utc`.
pub fn parse_observed_at(date_observed: &str, hour: u32) -> Option<NaiveDateTime> {
    NaiveDate::parse_from_str(date_observed.trim(), "%Y-%m-%d")
        .ok()?
        .and_hms_opt(hour, 0, 0)
}

/// Turn raw API records into observation rows. Records missing a date,
/// hour or pollutant name, or whose values do not parse, are skipped.
pub fn normalize_observations(location_id: i32, records: &[Value]) -> Vec<Observation> {
    records
        .iter()
        .filter_map(|raw| {
            let rec: AirNowRecord = serde_json::from_value(raw.clone()).ok()?;
            let hour = rec.hour_observed.as_ref()?.as_hour()?;
            let timestamp_utc = parse_observed_at(rec.date_observed.as_deref()?, hour)?;
            let pollutant = rec.parameter_name?;

            Some(Observation {
                location_id,
                timestamp_utc,
                aqi: rec.aqi,
                category: rec.category.and_then(|c| c.name),
                pollutant,
                raw_payload: RawPayload::from_json(raw),
            })
        })
        .collect()
}

// ============================================================================
// Ingestion Run
// ============================================================================

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub distance_miles: u32,
    pub pollutants: Vec<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        IngestOptions {
            distance_miles: DEFAULT_DISTANCE_MILES,
            pollutants: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub locations: usize,
    pub successful: usize,
    pub failed: usize,
    pub inserted: u64,
}

fn ingest_location(
    client: &mut Client,
    airnow: &AirNowClient,
    location: &Location,
    options: &IngestOptions,
) -> Result<u64> {
    let raw = airnow.fetch_current_observations(
        location.latitude,
        location.longitude,
        options.distance_miles,
        &options.pollutants,
    )?;
    if raw.is_empty() {
        logging::log_ingest_failure(
            location.id,
            "fetch",
            &IngestGap::NoObservations(location.name.clone()),
        );
        return Ok(0);
    }

    let observations = normalize_observations(location.id, &raw);
    if observations.is_empty() {
        logging::log_ingest_failure(
            location.id,
            "normalize",
            &IngestGap::NoValidRecords(location.name.clone()),
        );
        return Ok(0);
    }

    let inserted = db::insert_observations(client, &observations)?;
    logging::info(
        Component::Ingest,
        Some(location.id),
        &format!(
            "{}: {} record(s) fetched, {} new observation(s) inserted",
            location.name,
            observations.len(),
            inserted
        ),
    );
    Ok(inserted)
}

/// Fetch and store current observations for every seeded location.
///
/// A failing location is logged and skipped. Configuration and database
/// errors abort the run.
pub fn run_ingestion(
    client: &mut Client,
    airnow: &AirNowClient,
    options: &IngestOptions,
) -> Result<IngestReport> {
    let locations = db::load_locations(client)?;
    let mut report = IngestReport {
        locations: locations.len(),
        ..IngestReport::default()
    };

    if locations.is_empty() {
        logging::warn(
            Component::Ingest,
            None,
            "No locations found in the locations table. Run `seed` first.",
        );
        return Ok(report);
    }

    for location in &locations {
        match ingest_location(client, airnow, location, options) {
            Ok(inserted) => {
                report.successful += 1;
                report.inserted += inserted;
            }
            Err(e @ (ForecastError::Configuration(_) | ForecastError::Database(_))) => return Err(e),
            Err(e) => {
                report.failed += 1;
                logging::log_ingest_failure(location.id, "ingest", &e);
            }
        }
    }

    logging::log_ingest_summary(
        report.locations,
        report.successful,
        report.failed,
        report.inserted as usize,
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(parameter: &str, aqi: i64) -> Value {
        json!({
            "DateObserved": "2025-06-01 ",
            "HourObserved": 14,
            "LocalTimeZone": "PST",
            "ReportingArea": "Portland",
            "StateCode": "OR",
            "Latitude": 45.54,
            "Longitude": -122.68,
            "ParameterName": parameter,
            "AQI": aqi,
            "Category": { "Number": 1, "Name": "Good" }
        })
    }

    #[test]
    fn test_normalize_builds_hourly_timestamp() {
        let obs = normalize_observations(3, &[record("PM2.5", 42)]);
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].location_id, 3);
        assert_eq!(
            obs[0].timestamp_utc,
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap().and_hms_opt(14, 0, 0).unwrap()
        );
        assert_eq!(obs[0].aqi, Some(42));
        assert_eq!(obs[0].category.as_deref(), Some("Good"));
        assert_eq!(obs[0].pollutant, "PM2.5");
    }

    #[test]
    fn test_normalize_keeps_the_full_record_as_payload() {
        let raw = record("O3", 30);
        let obs = normalize_observations(1, std::slice::from_ref(&raw));
        let round: Value = serde_json::from_str(obs[0].raw_payload.as_str()).unwrap();
        assert_eq!(round, raw);
    }

    #[test]
    fn test_normalize_accepts_string_hour() {
        let mut raw = record("O3", 30);
        raw["HourObserved"] = json!("7");
        let obs = normalize_observations(1, &[raw]);
        assert_eq!(obs[0].timestamp_utc.format("%H").to_string(), "07");
    }

    #[test]
    fn test_normalize_skips_malformed_records() {
        let mut no_date = record("O3", 30);
        no_date.as_object_mut().unwrap().remove("DateObserved");
        let mut no_hour = record("O3", 30);
        no_hour["HourObserved"] = Value::Null;
        let mut bad_hour = record("O3", 30);
        bad_hour["HourObserved"] = json!(24);
        let mut bad_date = record("O3", 30);
        bad_date["DateObserved"] = json!("06/01/2025");

        let obs = normalize_observations(1, &[no_date, no_hour, bad_hour, bad_date, record("PM10", 5)]);
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].pollutant, "PM10");
    }

    #[test]
    fn test_missing_aqi_and_category_are_kept_as_none() {
        let mut raw = record("O3", 30);
        let map = raw.as_object_mut().unwrap();
        map.remove("AQI");
        map.remove("Category");
        let obs = normalize_observations(1, &[raw]);
        assert_eq!(obs[0].aqi, None);
        assert_eq!(obs[0].category, None);
    }

    #[test]
    fn test_wrap_records_wraps_single_object() {
        assert_eq!(wrap_records(record("O3", 1)).len(), 1);
        assert_eq!(wrap_records(json!([record("O3", 1), record("PM2.5", 2)])).len(), 2);
    }

    #[test]
    fn test_pollutant_filter_is_case_insensitive() {
        let records = vec![record("PM2.5", 1), record("OZONE", 2), record("PM10", 3)];
        let kept = filter_pollutants(records, &["ozone".to_string(), "pm2.5".to_string()]);
        let names: Vec<&str> = kept
            .iter()
            .map(|r| r["ParameterName"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["PM2.5", "OZONE"]);
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        assert_eq!(filter_pollutants(vec![record("O3", 1), record("PM10", 2)], &[]).len(), 2);
    }

    #[test]
    fn test_ingest_gap_messages_classify_as_expected() {
        let msg = IngestGap::NoObservations("Bend, OR".to_string()).to_string();
        assert_eq!(
            logging::classify_ingest_failure(&msg),
            logging::FailureType::Expected
        );
    }

    /// Local stand-in for the AirNow endpoint. Answers `body` when the
    /// request carries `API_KEY=test-key`, 401 otherwise.
    fn mock_airnow(body: Value) -> String {
        use std::collections::HashMap;

        use axum::extract::Query;
        use axum::http::StatusCode;
        use axum::routing::get;
        use axum::{Json, Router};

        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        std_listener.set_nonblocking(true).unwrap();
        let addr = std_listener.local_addr().unwrap();

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
                let app = Router::new().route(
                    "/current/",
                    get(move |Query(params): Query<HashMap<String, String>>| {
                        let body = body.clone();
                        async move {
                            if params.get("API_KEY").map(String::as_str) == Some("test-key")
                                && params.contains_key("latitude")
                                && params.contains_key("distance")
                            {
                                (StatusCode::OK, Json(body))
                            } else {
                                (StatusCode::UNAUTHORIZED, Json(Value::Null))
                            }
                        }
                    }),
                );
                axum::serve(listener, app).await.unwrap();
            });
        });

        format!("http://{}/current/", addr)
    }

    fn mock_client(api_key: &str, base_url: String) -> AirNowClient {
        let config = Config {
            airnow_api_key: Some(api_key.to_string()),
            ..Config::default()
        };
        AirNowClient::new(&config).unwrap().with_base_url(base_url)
    }

    #[test]
    fn test_fetch_filters_records_from_the_endpoint() {
        let url = mock_airnow(json!([record("PM2.5", 42), record("OZONE", 30)]));
        let client = mock_client("test-key", url);

        let raw = client
            .fetch_current_observations(45.5152, -122.6784, DEFAULT_DISTANCE_MILES, &["pm2.5".to_string()])
            .unwrap();

        assert_eq!(raw.len(), 1);
        assert_eq!(normalize_observations(1, &raw)[0].aqi, Some(42));
    }

    #[test]
    fn test_fetch_wraps_a_single_object_response() {
        let url = mock_airnow(record("O3", 12));
        let client = mock_client("test-key", url);

        let raw = client.fetch_current_observations(44.05, -121.31, 10, &[]).unwrap();

        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0]["ParameterName"], "O3");
    }

    #[test]
    fn test_fetch_surfaces_http_status_errors() {
        let url = mock_airnow(json!([]));
        let client = mock_client("wrong-key", url);

        let result = client.fetch_current_observations(44.05, -121.31, 10, &[]);

        assert!(matches!(result, Err(ForecastError::Http(_))));
    }

    #[test]
    #[ignore] // Don't run in CI - needs AIRNOW_API_KEY and network
    fn airnow_api_returns_records_for_portland() {
        let config = Config::from_env().unwrap();
        let client = AirNowClient::new(&config).unwrap();
        let raw = client
            .fetch_current_observations(45.5152, -122.6784, DEFAULT_DISTANCE_MILES, &[])
            .unwrap();
        assert!(!raw.is_empty(), "expected at least one Portland record");
        assert!(!normalize_observations(1, &raw).is_empty());
    }
}
