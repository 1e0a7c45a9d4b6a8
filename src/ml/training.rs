//! Predictor fitting and scoring
//!
//! The predictor learns the clipped settlement price from `MODEL_FEATURES`
//! and is then scored on every row of a forecast horizon.

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use super::smartcore::GradientBoostedTrees;
use super::{ModelMetadata, ModelType};
use crate::config::ModelConfig;
use crate::domain::PredictionRow;
use crate::error::{ForecastError, Result};
use crate::forecast::features::{FeatureRow, MODEL_FEATURES};
use crate::forecast::horizon::ForecastHorizon;
use crate::forecast::metrics::ForecastMetrics;

pub struct Predictor {
    config: ModelConfig,
    model: Option<GradientBoostedTrees>,
    metadata: Option<ModelMetadata>,
}

impl Predictor {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            model: None,
            metadata: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    pub fn metadata(&self) -> Option<&ModelMetadata> {
        self.metadata.as_ref()
    }

    /// Fit on the given feature rows, replacing any previous fit.
    pub fn fit<'a>(&mut self, rows: impl IntoIterator<Item = &'a FeatureRow>) -> Result<&ModelMetadata> {
        let rows: Vec<&FeatureRow> = rows.into_iter().collect();
        if rows.is_empty() {
            return Err(ForecastError::EmptyTrainingSet);
        }

        let x: Vec<Vec<f64>> = rows.iter().map(|r| r.inputs.to_vec()).collect();
        let y: Vec<f64> = rows.iter().map(|r| r.settlement_point_price).collect();

        let model = GradientBoostedTrees::fit(&x, &y, &self.config)?;
        if model.n_features() != MODEL_FEATURES.len() {
            return Err(ForecastError::FeatureCountMismatch {
                expected: MODEL_FEATURES.len(),
                actual: model.n_features(),
            });
        }

        let fitted = model.predict(&x)?;
        let fit_metrics = ForecastMetrics::calculate(&y, &fitted)
            .map_err(|e| ForecastError::Model(e.to_string()))?;

        let mut training_nodes: Vec<String> = rows.iter().map(|r| r.node.clone()).collect();
        training_nodes.sort();
        training_nodes.dedup();

        info!(
            samples = rows.len(),
            nodes = training_nodes.len(),
            trees = model.n_trees(),
            mae = fit_metrics.mae,
            r2 = fit_metrics.r2,
            "predictor fitted"
        );

        let metadata = ModelMetadata {
            model_id: Uuid::new_v4().to_string(),
            model_type: ModelType::GradientBoosting,
            version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: Utc::now(),
            training_samples: rows.len(),
            training_nodes,
            fit_metrics,
            feature_names: MODEL_FEATURES.iter().map(|f| f.to_string()).collect(),
            params: self.config.clone(),
        };

        self.model = Some(model);
        let metadata: &ModelMetadata = self.metadata.insert(metadata);
        Ok(metadata)
    }

    /// Predict raw feature vectors in `MODEL_FEATURES` order
    pub fn predict_raw(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        let model = self.model.as_ref().ok_or(ForecastError::ModelNotFitted)?;
        model.predict(x)
    }

    /// Score every horizon row for `node`
    pub fn predict(&self, horizon: &ForecastHorizon, node: &str) -> Result<Vec<PredictionRow>> {
        let x: Vec<Vec<f64>> = horizon.rows.iter().map(|r| r.inputs.to_vec()).collect();
        let prices = self.predict_raw(&x)?;

        debug!(node, rows = prices.len(), "scored forecast horizon");

        Ok(horizon
            .rows
            .iter()
            .zip(prices)
            .map(|(row, price)| PredictionRow {
                node: node.to_string(),
                key: row.key,
                settlement_point_price: price,
            })
            .collect())
    }
}
