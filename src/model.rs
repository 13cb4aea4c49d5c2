/// Core data types for the AQI forecasting service.
///
/// This module defines the shared domain model imported by all other modules:
/// locations, raw observations, daily aggregates and forecasts. It contains
/// no I/O. Row types mirror the PostgreSQL tables in `sql/001_schema.sql`.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

/// A monitored location. Seeded once, never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: i32,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

/// Source API record kept verbatim alongside a normalized observation.
///
/// Encoding: the UTF-8 JSON text of the record exactly as the upstream API
/// returned it. Stored in a `JSONB` column and never interpreted by the
/// forecasting code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPayload(String);

impl RawPayload {
    pub fn from_json(value: &serde_json::Value) -> Self {
        RawPayload(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One pollutant reading for one location at one hour.
///
/// Unique on `(location_id, timestamp_utc, pollutant)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub location_id: i32,
    pub timestamp_utc: NaiveDateTime,
    pub aqi: Option<i32>,
    pub category: Option<String>,
    pub pollutant: String,
    pub raw_payload: RawPayload,
}

// ---------------------------------------------------------------------------
// Aggregates and forecasts
// ---------------------------------------------------------------------------

/// Per-location, per-calendar-day AQI summary. Unique on `(location_id, date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub location_id: i32,
    pub date: NaiveDate,
    pub max_aqi: i32,
    pub mean_aqi: f64,
    pub min_aqi: i32,
}

/// A next-day forecast. Unique on `(location_id, target_date, model_name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forecast {
    pub location_id: i32,
    pub target_date: NaiveDate,
    pub forecast_aqi: i32,
    pub model_name: String,
}

/// Read-side projection: the most recent forecast for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestForecast {
    pub location_id: i32,
    pub location_name: String,
    pub target_date: NaiveDate,
    pub forecast_aqi: i32,
    pub model_name: String,
}

/// Body of the health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn ok() -> Self {
        HealthStatus {
            status: "ok".to_string(),
        }
    }
}
