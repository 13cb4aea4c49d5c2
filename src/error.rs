//! Error taxonomy for the forecasting service.
//!
//! Empty input is deliberately absent: a run with no daily aggregates is a
//! normal outcome (`pipeline::RunOutcome::NoData`), not a failure.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// The unified error type for the `aqi_forecast_service` crate.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Missing or placeholder settings (e.g. an unset AirNow API key).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No model artifact at the configured path.
    #[error("Model file not found at: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    /// `predict` called on a strategy that needs `fit` first.
    #[error("Model not fitted: call fit() before predict()")]
    ModelNotFitted,

    /// The mean strategy was asked about a location it never saw during fit.
    #[error("Location {0} was not present in the training data")]
    UnknownLocation(i32),

    /// The regression strategy received a row without engineered features.
    #[error("No engineered features supplied for location {0}")]
    MissingFeatures(i32),

    #[error(
        "Location {location_id} has {available} daily aggregate(s); the model needs {needed}"
    )]
    InsufficientHistory {
        location_id: i32,
        needed: usize,
        available: usize,
    },

    /// Feature engineering left no complete rows to train on.
    #[error("No feature rows available for training. Collect more data first.")]
    EmptyTrainingSet,

    #[error("Training set has {rows} feature row(s) but {targets} target(s)")]
    TrainingShapeMismatch { rows: usize, targets: usize },

    #[error("Model returned {got} prediction(s) for {expected} input row(s)")]
    PredictionCountMismatch { expected: usize, got: usize },

    /// A forecast batch could not be committed. Not retried.
    #[error("Forecast write failed: {0}")]
    WriteFailed(String),

    #[error("Cannot compute the day after {0}")]
    DateOutOfRange(NaiveDate),

    #[error("Database error: {0}")]
    Database(#[from] postgres::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file parse error: {0}")]
    ConfigFile(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ForecastError>;
