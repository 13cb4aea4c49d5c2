//! Training entry points.
//!
//! Baselines are fitted on the full daily-aggregate history. The forest is
//! fitted on engineered features and evaluated against the persistence
//! baseline (`target ≈ lag1`) on a held-out split.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::{ForecastError, Result};
use crate::features::{self, TrainingRow};
use crate::logging::{self, Component};
use crate::model::DailyAggregate;

use super::Forecaster;
use super::forest::{FeatureRow, ForestModel, ForestParams};

/// Below this many feature rows there is no separate test set.
pub const MIN_ROWS_FOR_SPLIT: usize = 20;

pub const TEST_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaiveStrategy {
    Persistence,
    Mean,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationSplit {
    Holdout { train_rows: usize, test_rows: usize },
    /// Too few rows to hold any out: trained and scored on the same rows.
    FullSet { rows: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub feature_rows: usize,
    pub split: EvaluationSplit,
    pub baseline_mae: f64,
    pub model_mae: f64,
}

impl TrainingReport {
    /// True when the scores come from the training rows themselves.
    pub fn evaluated_in_sample(&self) -> bool {
        matches!(self.split, EvaluationSplit::FullSet { .. })
    }
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let total: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum();
    total / actual.len() as f64
}

/// Shuffled train/test index split. The test set holds
/// `ceil(n * test_fraction)` rows.
pub fn split_indices(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64) * test_fraction).ceil() as usize;
    let test = indices.split_off(n.saturating_sub(n_test));
    (indices, test)
}

pub fn train_baseline(history: &[DailyAggregate], strategy: NaiveStrategy) -> Result<Forecaster> {
    let mut model = match strategy {
        NaiveStrategy::Persistence => Forecaster::persistence(),
        NaiveStrategy::Mean => Forecaster::mean(),
    };
    model.fit(history)?;
    Ok(model)
}

fn columns(rows: &[&TrainingRow]) -> (Vec<FeatureRow>, Vec<f64>) {
    let x = rows.iter().map(|r| r.features.to_array()).collect();
    let y = rows.iter().map(|r| r.target).collect();
    (x, y)
}

/// Builds features, fits the forest, and scores it against persistence.
pub fn train_forest(
    history: &[DailyAggregate],
    params: ForestParams,
) -> Result<(Forecaster, TrainingReport)> {
    let table = features::build_training_table(history);
    if table.is_empty() {
        return Err(ForecastError::EmptyTrainingSet);
    }
    let n_rows = table.len();
    logging::info(
        Component::Model,
        None,
        &format!("Feature rows available for modeling: {}", n_rows),
    );

    let (train, test, split): (Vec<&TrainingRow>, Vec<&TrainingRow>, EvaluationSplit) =
        if n_rows < MIN_ROWS_FOR_SPLIT {
            logging::warn(
                Component::Model,
                None,
                "Very few rows for training. Training on all data without train/test split.",
            );
            let all: Vec<&TrainingRow> = table.iter().collect();
            (all.clone(), all, EvaluationSplit::FullSet { rows: n_rows })
        } else {
            let (train_idx, test_idx) = split_indices(n_rows, TEST_FRACTION, params.seed);
            let split = EvaluationSplit::Holdout {
                train_rows: train_idx.len(),
                test_rows: test_idx.len(),
            };
            (
                train_idx.iter().map(|&i| &table[i]).collect(),
                test_idx.iter().map(|&i| &table[i]).collect(),
                split,
            )
        };

    let (x_train, y_train) = columns(&train);
    let (x_test, y_test) = columns(&test);

    let baseline: Vec<f64> = test.iter().map(|r| r.features.lag1).collect();
    let baseline_mae = mean_absolute_error(&y_test, &baseline);

    let forest = ForestModel::fit(&x_train, &y_train, params)?;
    let model_mae = mean_absolute_error(&y_test, &forest.predict(&x_test));

    logging::info(
        Component::Model,
        None,
        &format!(
            "Baseline (persistence) MAE: {:.3}, RandomForest MAE: {:.3}",
            baseline_mae, model_mae
        ),
    );

    let report = TrainingReport {
        feature_rows: n_rows,
        split,
        baseline_mae,
        model_mae,
    };
    Ok((Forecaster::RandomForest(forest), report))
}
