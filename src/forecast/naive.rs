//! Zero- and one-parameter baselines.
//!
//! - persistence: tomorrow's max AQI equals today's
//! - mean: tomorrow's max AQI equals the location's historical mean max AQI

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::model::DailyAggregate;

use super::PredictionInput;

pub fn persistence_predict(inputs: &[PredictionInput]) -> Vec<f64> {
    inputs.iter().map(|row| row.max_aqi as f64).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationMean {
    pub location_id: i32,
    pub mean_max_aqi: f64,
}

/// Per-location mean of historical max AQI.
///
/// Stored as a list sorted by location id; `None` until fitted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeanModel {
    location_means: Option<Vec<LocationMean>>,
}

impl MeanModel {
    pub fn unfitted() -> Self {
        MeanModel::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.location_means.is_some()
    }

    pub fn fit(&mut self, history: &[DailyAggregate]) {
        let mut sums: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
        for row in history {
            let entry = sums.entry(row.location_id).or_insert((0.0, 0));
            entry.0 += row.max_aqi as f64;
            entry.1 += 1;
        }

        let means = sums
            .into_iter()
            .map(|(location_id, (sum, count))| LocationMean {
                location_id,
                mean_max_aqi: sum / count as f64,
            })
            .collect();
        self.location_means = Some(means);
    }

    /// `UnknownLocation` for any location absent from the training data.
    pub fn mean_for(&self, location_id: i32) -> Result<f64> {
        let means = self
            .location_means
            .as_ref()
            .ok_or(ForecastError::ModelNotFitted)?;
        means
            .binary_search_by_key(&location_id, |m| m.location_id)
            .map(|idx| means[idx].mean_max_aqi)
            .map_err(|_| ForecastError::UnknownLocation(location_id))
    }

    /// `ModelNotFitted` when unfitted, even for an empty batch.
    pub fn predict(&self, inputs: &[PredictionInput]) -> Result<Vec<f64>> {
        if !self.is_fitted() {
            return Err(ForecastError::ModelNotFitted);
        }
        inputs.iter().map(|row| self.mean_for(row.location_id)).collect()
    }
}
