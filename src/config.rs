use anyhow::{ensure, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::SettlementPoint;

/// Application configuration: the pipeline settings plus the batch-run surface
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub run: RunConfig,
}

/// Everything the analytic core needs; passed explicitly into each run
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PipelineConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub horizon: HorizonConfig,
}

/// Gradient-boosted tree hyper-parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub n_trees: usize,
    pub learning_rate: f64,
    pub max_depth: u16,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
    /// Fraction of rows sampled for each tree (1.0 = no subsampling)
    pub subsample: f64,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_trees: 300,
            learning_rate: 0.01,
            max_depth: 10,
            min_samples_leaf: 20,
            min_samples_split: 2,
            subsample: 1.0,
            seed: 42,
        }
    }
}

/// Which history the predictor is fitted on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrainingScope {
    /// Every node in the feature table
    #[default]
    AllNodes,
    /// Only the node being forecast
    QueriedNode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureConfig {
    pub clip_lower_quantile: f64,
    pub clip_upper_quantile: f64,
    /// Lag offsets in intervals
    pub lags: Vec<usize>,
    pub rolling_window: usize,
    pub training_scope: TrainingScope,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            clip_lower_quantile: 0.01,
            clip_upper_quantile: 0.99,
            lags: vec![1, 96, 288],
            rolling_window: 3,
            training_scope: TrainingScope::AllNodes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HorizonConfig {
    pub days: u32,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self { days: 7 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub data_dir: PathBuf,
    pub settlement_hubs: String,
    pub settlement_load_zones: String,
    pub wind: String,
    pub solar: String,
    pub load: String,
    pub load_forecast: String,
    pub wind_forecast: String,
    pub solar_forecast: String,
    /// Keep only this many days of history (None keeps everything)
    pub retention_days: Option<u32>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            settlement_hubs: "spp_data_HU.csv".into(),
            settlement_load_zones: "spp_data_LZ.csv".into(),
            wind: "wind_data.csv".into(),
            solar: "solar_data.csv".into(),
            load: "load_data.csv".into(),
            load_forecast: "load_forecast.csv".into(),
            wind_forecast: "wind_forecast.csv".into(),
            solar_forecast: "solar_forecast.csv".into(),
            retention_days: Some(90),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub predictions_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            predictions_path: PathBuf::from("predictions.csv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Nodes to forecast; empty means every known settlement point
    pub nodes: Vec<String>,
    pub max_concurrent_nodes: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            max_concurrent_nodes: 1,
        }
    }
}

impl RunConfig {
    pub fn resolved_nodes(&self) -> Vec<String> {
        if self.nodes.is_empty() {
            SettlementPoint::all_names()
        } else {
            self.nodes.clone()
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config/default.toml")
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("SPP__").split("__"));
        let cfg: Config = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        ensure!(
            self.run.max_concurrent_nodes >= 1,
            "run.max_concurrent_nodes must be at least 1"
        );
        Ok(())
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        let m = &self.model;
        ensure!(m.n_trees >= 1, "model.n_trees must be at least 1");
        ensure!(
            m.learning_rate > 0.0 && m.learning_rate <= 1.0,
            "model.learning_rate must be in (0, 1], got {}",
            m.learning_rate
        );
        ensure!(m.max_depth >= 1, "model.max_depth must be at least 1");
        ensure!(
            m.subsample > 0.0 && m.subsample <= 1.0,
            "model.subsample must be in (0, 1], got {}",
            m.subsample
        );

        let f = &self.features;
        ensure!(
            (0.0..=1.0).contains(&f.clip_lower_quantile)
                && (0.0..=1.0).contains(&f.clip_upper_quantile)
                && f.clip_lower_quantile <= f.clip_upper_quantile,
            "clip quantiles must satisfy 0 <= lower <= upper <= 1"
        );
        ensure!(
            !f.lags.is_empty() && f.lags.iter().all(|&l| l >= 1),
            "features.lags must be non-empty positive offsets"
        );
        ensure!(f.rolling_window >= 2, "features.rolling_window must be at least 2");

        ensure!(self.horizon.days >= 1, "horizon.days must be at least 1");
        Ok(())
    }
}
