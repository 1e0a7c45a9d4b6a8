//! Gradient-boosted regression trees on SmartCore
//!
//! Least-squares boosting: start from the mean target, then fit each tree to
//! the current residuals and add it scaled by the learning rate. Trees are
//! SmartCore `DecisionTreeRegressor`s.

use rand::{rngs::StdRng, seq::index, SeedableRng};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};
use std::fmt;
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::{ForecastError, Result};

type Tree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Row-major feature rows as a SmartCore matrix
pub fn to_dense_matrix(x: &[Vec<f64>]) -> Result<DenseMatrix<f64>> {
    let n_samples = x.len();
    let n_features = x.first().map_or(0, Vec::len);

    let mut flat = Vec::with_capacity(n_samples * n_features);
    for row in x {
        if row.len() != n_features {
            return Err(ForecastError::FeatureCountMismatch {
                expected: n_features,
                actual: row.len(),
            });
        }
        flat.extend_from_slice(row);
    }
    Ok(DenseMatrix::new(n_samples, n_features, flat, false))
}

pub struct GradientBoostedTrees {
    base_score: f64,
    learning_rate: f64,
    n_features: usize,
    trees: Vec<Tree>,
}

impl fmt::Debug for GradientBoostedTrees {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradientBoostedTrees")
            .field("base_score", &self.base_score)
            .field("learning_rate", &self.learning_rate)
            .field("n_features", &self.n_features)
            .field("n_trees", &self.trees.len())
            .finish()
    }
}

impl GradientBoostedTrees {
    /// Per-tree SmartCore parameters
    pub fn tree_parameters(cfg: &ModelConfig) -> DecisionTreeRegressorParameters {
        DecisionTreeRegressorParameters::default()
            .with_max_depth(cfg.max_depth)
            .with_min_samples_leaf(cfg.min_samples_leaf)
            .with_min_samples_split(cfg.min_samples_split)
    }

    /// Fit `cfg.n_trees` trees to `(x, y)`.
    ///
    /// With `subsample < 1` each tree sees a row sample drawn from an RNG
    /// seeded with `cfg.seed`, so fits are reproducible.
    pub fn fit(x: &[Vec<f64>], y: &[f64], cfg: &ModelConfig) -> Result<Self> {
        if x.is_empty() || y.is_empty() {
            return Err(ForecastError::EmptyTrainingSet);
        }
        if x.len() != y.len() {
            return Err(ForecastError::Model(format!(
                "feature and target count mismatch: {} rows, {} targets",
                x.len(),
                y.len()
            )));
        }

        if let Some(row) = y.iter().position(|t| !t.is_finite()) {
            return Err(ForecastError::Model(format!("non-finite target at row {row}")));
        }

        let n_samples = x.len();
        let n_features = x[0].len();
        let x_full = to_dense_matrix(x)?;
        let params = Self::tree_parameters(cfg);

        let base_score = y.iter().sum::<f64>() / n_samples as f64;
        let mut current = vec![base_score; n_samples];
        let mut trees = Vec::with_capacity(cfg.n_trees);

        let sample_size = ((n_samples as f64 * cfg.subsample).round() as usize).clamp(1, n_samples);
        let mut rng = StdRng::seed_from_u64(cfg.seed);

        for round in 0..cfg.n_trees {
            let residuals: Vec<f64> = y.iter().zip(&current).map(|(t, c)| t - c).collect();

            let tree = if sample_size < n_samples {
                let mut rows = index::sample(&mut rng, n_samples, sample_size).into_vec();
                rows.sort_unstable();
                let x_sample: Vec<Vec<f64>> = rows.iter().map(|&i| x[i].clone()).collect();
                let r_sample: Vec<f64> = rows.iter().map(|&i| residuals[i]).collect();
                Tree::fit(&to_dense_matrix(&x_sample)?, &r_sample, params.clone())
            } else {
                Tree::fit(&x_full, &residuals, params.clone())
            }
            .map_err(|e| ForecastError::Model(format!("tree {round} failed to fit: {e:?}")))?;

            let step = tree
                .predict(&x_full)
                .map_err(|e| ForecastError::Model(format!("tree {round} failed to predict: {e:?}")))?;
            for (c, s) in current.iter_mut().zip(step) {
                *c += cfg.learning_rate * s;
            }
            trees.push(tree);
        }

        debug!(
            trees = trees.len(),
            samples = n_samples,
            features = n_features,
            base_score,
            "fitted gradient-boosted trees"
        );

        Ok(Self {
            base_score,
            learning_rate: cfg.learning_rate,
            n_features,
            trees,
        })
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        if x.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(row) = x.iter().find(|r| r.len() != self.n_features) {
            return Err(ForecastError::FeatureCountMismatch {
                expected: self.n_features,
                actual: row.len(),
            });
        }

        let matrix = to_dense_matrix(x)?;
        let mut out = vec![self.base_score; x.len()];
        for (i, tree) in self.trees.iter().enumerate() {
            let step = tree
                .predict(&matrix)
                .map_err(|e| ForecastError::Model(format!("tree {i} failed to predict: {e:?}")))?;
            for (o, s) in out.iter_mut().zip(step) {
                *o += self.learning_rate * s;
            }
        }
        Ok(out)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ModelConfig {
        ModelConfig {
            n_trees: 60,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            min_samples_split: 2,
            subsample: 1.0,
            seed: 7,
        }
    }

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 4) as f64]).collect();
        let y: Vec<f64> = (0..40).map(|i| if i < 20 { 10.0 } else { 50.0 }).collect();
        (x, y)
    }

    #[test]
    fn test_fit_reduces_error_below_mean_baseline() {
        let (x, y) = step_data();
        let model = GradientBoostedTrees::fit(&x, &y, &small_config()).unwrap();
        let pred = model.predict(&x).unwrap();

        assert_eq!(model.n_trees(), 60);
        assert_eq!(model.n_features(), 2);
        // mean is 30; boosted fit moves each side toward its level
        assert!(pred[0] < 15.0, "left side predicted {}", pred[0]);
        assert!(pred[39] > 45.0, "right side predicted {}", pred[39]);
    }

    #[test]
    fn test_constant_target_predicts_constant() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let y = vec![42.0; 10];
        let model = GradientBoostedTrees::fit(&x, &y, &small_config()).unwrap();
        for p in model.predict(&x).unwrap() {
            assert!((p - 42.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fit_on_empty_is_error() {
        let err = GradientBoostedTrees::fit(&[], &[], &small_config()).unwrap_err();
        assert!(matches!(err, ForecastError::EmptyTrainingSet));
    }

    #[test]
    fn test_fit_rejects_nan_target() {
        let (x, mut y) = step_data();
        y[5] = f64::NAN;
        let err = GradientBoostedTrees::fit(&x, &y, &small_config()).unwrap_err();
        assert!(matches!(err, ForecastError::Model(msg) if msg.contains("row 5")));
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let (x, y) = step_data();
        let model = GradientBoostedTrees::fit(&x, &y, &small_config()).unwrap();
        let err = model.predict(&[vec![1.0, 2.0, 3.0]]).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::FeatureCountMismatch { expected: 2, actual: 3 }
        ));
        assert!(model.predict(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_subsampled_fit_is_reproducible() {
        let (x, y) = step_data();
        let cfg = ModelConfig {
            subsample: 0.5,
            ..small_config()
        };
        let a = GradientBoostedTrees::fit(&x, &y, &cfg).unwrap().predict(&x).unwrap();
        let b = GradientBoostedTrees::fit(&x, &y, &cfg).unwrap().predict(&x).unwrap();
        assert_eq!(a, b);
    }
}
