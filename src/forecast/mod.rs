//! Next-day AQI predictors.
//!
//! [`Forecaster`] is a closed set of strategies sharing one capability set:
//! `fit`, `predict`, `save` and `load`. The trained artifact is the
//! forecaster itself serialized as JSON and tagged by `"strategy"`.
//!
//! Submodules:
//! - `naive`: persistence and per-location mean baselines
//! - `forest`: bagged regression trees over lag/rolling features
//! - `train`: training entry points and hold-out evaluation

pub mod forest;
pub mod naive;
pub mod train;

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::features::{self, LagFeatures, LONG_WINDOW};
use crate::model::DailyAggregate;

use forest::{FeatureRow, ForestModel, ForestParams};
use naive::MeanModel;

/// One row to forecast: a location's latest day, plus engineered features
/// when the strategy needs them.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionInput {
    pub location_id: i32,
    pub date: NaiveDate,
    pub max_aqi: i32,
    pub features: Option<LagFeatures>,
}

impl From<&DailyAggregate> for PredictionInput {
    fn from(row: &DailyAggregate) -> Self {
        PredictionInput {
            location_id: row.location_id,
            date: row.date,
            max_aqi: row.max_aqi,
            features: None,
        }
    }
}

/// Rounds a model output to a whole AQI value. Halves round away from zero.
pub fn round_aqi(value: f64) -> i32 {
    value.round() as i32
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Forecaster {
    Persistence,
    Mean(MeanModel),
    RandomForest(ForestModel),
}

impl Forecaster {
    pub fn persistence() -> Self {
        Forecaster::Persistence
    }

    pub fn mean() -> Self {
        Forecaster::Mean(MeanModel::unfitted())
    }

    pub fn random_forest(params: ForestParams) -> Self {
        Forecaster::RandomForest(ForestModel::unfitted(params))
    }

    pub fn strategy_name(&self) -> &'static str {
        match self {
            Forecaster::Persistence => "persistence",
            Forecaster::Mean(_) => "mean",
            Forecaster::RandomForest(_) => "random_forest",
        }
    }

    /// Trailing days per location that inference needs, beyond the latest
    /// aggregate itself.
    pub fn history_window(&self) -> Option<usize> {
        match self {
            Forecaster::Persistence | Forecaster::Mean(_) => None,
            Forecaster::RandomForest(_) => Some(LONG_WINDOW),
        }
    }

    /// Trains on historical daily aggregates. A no-op for persistence.
    pub fn fit(&mut self, history: &[DailyAggregate]) -> Result<()> {
        match self {
            Forecaster::Persistence => Ok(()),
            Forecaster::Mean(model) => {
                model.fit(history);
                Ok(())
            }
            Forecaster::RandomForest(model) => {
                let table = features::build_training_table(history);
                let x: Vec<FeatureRow> = table.iter().map(|r| r.features.to_array()).collect();
                let y: Vec<f64> = table.iter().map(|r| r.target).collect();
                *model = ForestModel::fit(&x, &y, model.params().clone())?;
                Ok(())
            }
        }
    }

    pub fn predict(&self, inputs: &[PredictionInput]) -> Result<Vec<f64>> {
        match self {
            Forecaster::Persistence => Ok(naive::persistence_predict(inputs)),
            Forecaster::Mean(model) => model.predict(inputs),
            Forecaster::RandomForest(model) => {
                if !model.is_fitted() {
                    return Err(ForecastError::ModelNotFitted);
                }
                inputs
                    .iter()
                    .map(|row| {
                        row.features
                            .map(|f| model.predict_one(&f.to_array()))
                            .ok_or(ForecastError::MissingFeatures(row.location_id))
                    })
                    .collect()
            }
        }
    }

    /// `predict`, rounded to whole AQI values.
    pub fn predict_aqi(&self, inputs: &[PredictionInput]) -> Result<Vec<i32>> {
        let raw = self.predict(inputs)?;
        if raw.len() != inputs.len() {
            return Err(ForecastError::PredictionCountMismatch {
                expected: inputs.len(),
                got: raw.len(),
            });
        }
        Ok(raw.into_iter().map(round_aqi).collect())
    }

    /// Writes the artifact, creating parent directories as needed.
    /// Overwrites any previous artifact at `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ForecastError::ArtifactNotFound(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
