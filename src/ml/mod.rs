//! Machine learning for settlement price prediction
//!
//! - `smartcore`: gradient-boosted regression trees on SmartCore decision trees
//! - `training`: the predictor fitted on the feature table and scored on the
//!   forecast horizon

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::forecast::metrics::ForecastMetrics;

pub mod smartcore;
pub mod training;

pub use training::Predictor;

/// ML Model Type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ModelType {
    GradientBoosting,
}

/// Description of a fitted predictor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub model_type: ModelType,
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub training_samples: usize,
    /// Nodes whose rows were in the training set
    pub training_nodes: Vec<String>,
    /// In-sample fit on the clipped target
    pub fit_metrics: ForecastMetrics,
    pub feature_names: Vec<String>,
    pub params: ModelConfig,
}
