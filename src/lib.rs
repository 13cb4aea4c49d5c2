//! AQI forecasting service.
//!
//! Ingests hourly AirNow observations for a fixed set of locations,
//! aggregates them per day in PostgreSQL, forecasts next-day AQI and
//! raises alerts when a forecast crosses the configured threshold.
//!
//! The forecast run lives in [`pipeline`]; everything it touches in the
//! database goes through the [`store::ForecastStore`] seam. Stored
//! forecasts are read back over HTTP by [`api`].

pub mod alert;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod forecast;
pub mod ingest;
pub mod locations;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod store;
