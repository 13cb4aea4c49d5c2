//! Bagged ensemble of CART regression trees.
//!
//! Each tree is grown on a bootstrap sample of the training rows, splitting
//! on the feature/threshold pair with the largest reduction in squared
//! error. All features are considered at every split. Predictions are the
//! mean of the per-tree predictions.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::features::FEATURE_COUNT;

pub type FeatureRow = [f64; FEATURE_COUNT];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    /// `None` grows each tree until its leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParams {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, x: &FeatureRow) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tree growing
// ---------------------------------------------------------------------------

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// Sum of squared errors of the two children.
    sse: f64,
}

fn mean(indices: &[usize], y: &[f64]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64
}

fn sum_squared_error(indices: &[usize], y: &[f64]) -> f64 {
    let m = mean(indices, y);
    indices.iter().map(|&i| (y[i] - m).powi(2)).sum()
}

/// Best split over all features, scanning each feature in sorted order with
/// running sums so every threshold is evaluated in O(1).
fn find_best_split(
    x: &[FeatureRow],
    y: &[f64],
    indices: &[usize],
    min_samples_leaf: usize,
) -> Option<SplitCandidate> {
    let n = indices.len();
    let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
    let total_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();
    let mut best: Option<SplitCandidate> = None;

    let mut order = indices.to_vec();
    for feature in 0..FEATURE_COUNT {
        order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for k in 0..n - 1 {
            let yi = y[order[k]];
            left_sum += yi;
            left_sq += yi * yi;

            let here = x[order[k]][feature];
            let next = x[order[k + 1]][feature];
            let n_left = k + 1;
            let n_right = n - n_left;
            if here == next || n_left < min_samples_leaf || n_right < min_samples_leaf {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / n_left as f64)
                + (right_sq - right_sum * right_sum / n_right as f64);

            if best.as_ref().is_none_or(|b| sse < b.sse) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (here + next) / 2.0,
                    sse,
                });
            }
        }
    }

    best
}

fn grow(
    x: &[FeatureRow],
    y: &[f64],
    indices: &[usize],
    depth: usize,
    params: &ForestParams,
) -> TreeNode {
    let leaf = || TreeNode::Leaf {
        value: mean(indices, y),
    };

    let parent_sse = sum_squared_error(indices, y);
    if indices.len() < params.min_samples_split.max(2)
        || params.max_depth.is_some_and(|d| depth >= d)
        || parent_sse < 1e-10
    {
        return leaf();
    }

    let Some(split) = find_best_split(x, y, indices, params.min_samples_leaf.max(1)) else {
        return leaf();
    };
    if split.sse >= parent_sse {
        return leaf();
    }

    let (left, right): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .partition(|&&i| x[i][split.feature] <= split.threshold);

    TreeNode::Split {
        feature: split.feature,
        threshold: split.threshold,
        left: Box::new(grow(x, y, &left, depth + 1, params)),
        right: Box::new(grow(x, y, &right, depth + 1, params)),
    }
}

fn bootstrap_sample(n_samples: usize, rng: &mut StdRng) -> Vec<usize> {
    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
}

// ---------------------------------------------------------------------------
// Forest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestModel {
    params: ForestParams,
    trees: Vec<TreeNode>,
}

impl ForestModel {
    /// An ensemble with no trees yet; `fit` replaces it.
    pub fn unfitted(params: ForestParams) -> Self {
        ForestModel {
            params,
            trees: Vec::new(),
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Fits the ensemble. Deterministic for a given `params.seed`.
    pub fn fit(x: &[FeatureRow], y: &[f64], params: ForestParams) -> Result<Self> {
        if x.is_empty() {
            return Err(ForecastError::EmptyTrainingSet);
        }
        if x.len() != y.len() {
            return Err(ForecastError::TrainingShapeMismatch {
                rows: x.len(),
                targets: y.len(),
            });
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let trees = (0..params.n_trees.max(1))
            .map(|_| {
                let sample = bootstrap_sample(x.len(), &mut rng);
                grow(x, y, &sample, 0, &params)
            })
            .collect();

        Ok(ForestModel { params, trees })
    }

    pub fn predict_one(&self, x: &FeatureRow) -> f64 {
        let total: f64 = self.trees.iter().map(|t| t.predict(x)).sum();
        total / self.trees.len() as f64
    }

    pub fn predict(&self, x: &[FeatureRow]) -> Vec<f64> {
        x.iter().map(|row| self.predict_one(row)).collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(TreeNode::depth).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(v: f64) -> FeatureRow {
        [v, v, v, v, v]
    }

    fn small_params() -> ForestParams {
        ForestParams {
            n_trees: 20,
            ..ForestParams::default()
        }
    }

    #[test]
    fn test_fit_rejects_empty_input() {
        let result = ForestModel::fit(&[], &[], small_params());
        assert!(matches!(result, Err(ForecastError::EmptyTrainingSet)));
    }

    #[test]
    fn test_fit_rejects_mismatched_targets() {
        let x: Vec<FeatureRow> = (0..4).map(|i| row(i as f64)).collect();
        let result = ForestModel::fit(&x, &[1.0, 2.0], small_params());
        assert!(matches!(
            result,
            Err(ForecastError::TrainingShapeMismatch { rows: 4, targets: 2 })
        ));
    }

    #[test]
    fn test_constant_target_predicts_constant() {
        let x: Vec<FeatureRow> = (0..10).map(|i| row(i as f64)).collect();
        let y = vec![55.0; 10];
        let model = ForestModel::fit(&x, &y, small_params()).unwrap();
        assert_eq!(model.predict_one(&row(3.0)), 55.0);
        assert_eq!(model.max_depth(), 0);
    }

    #[test]
    fn test_learns_a_step_function() {
        let x: Vec<FeatureRow> = (0..40).map(|i| row(i as f64)).collect();
        let y: Vec<f64> = (0..40).map(|i| if i < 20 { 30.0 } else { 150.0 }).collect();
        let model = ForestModel::fit(&x, &y, small_params()).unwrap();

        assert!((model.predict_one(&row(2.0)) - 30.0).abs() < 10.0);
        assert!((model.predict_one(&row(37.0)) - 150.0).abs() < 10.0);
    }

    #[test]
    fn test_same_seed_gives_same_model() {
        let x: Vec<FeatureRow> = (0..30).map(|i| row((i * 7 % 13) as f64)).collect();
        let y: Vec<f64> = (0..30).map(|i| (i * 3 % 11) as f64).collect();
        let a = ForestModel::fit(&x, &y, small_params()).unwrap();
        let b = ForestModel::fit(&x, &y, small_params()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_max_depth_is_respected() {
        let x: Vec<FeatureRow> = (0..50).map(|i| row(i as f64)).collect();
        let y: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let params = ForestParams {
            max_depth: Some(2),
            ..small_params()
        };
        let model = ForestModel::fit(&x, &y, params).unwrap();
        assert!(model.max_depth() <= 2);
        assert_eq!(model.n_trees(), 20);
    }

    #[test]
    fn test_model_survives_json_round_trip() {
        let x: Vec<FeatureRow> = (0..12).map(|i| row(i as f64)).collect();
        let y: Vec<f64> = (0..12).map(|i| (i * 2) as f64).collect();
        let model = ForestModel::fit(&x, &y, small_params()).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let restored: ForestModel = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.n_trees(), model.n_trees());
        assert!((restored.predict_one(&row(5.0)) - model.predict_one(&row(5.0))).abs() < 1e-9);
    }
}
