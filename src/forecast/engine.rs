//! Per-node forecast runs
//!
//! `run_node` is the whole pipeline for one node: normalize, align, build
//! features, fit, build the horizon and score it. It holds no state between
//! calls. `run_all` loads the tables once and runs many nodes against shared
//! read-only snapshots, recording each node's outcome separately.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::align::align_series;
use super::features::{build_features, FeatureRow};
use super::horizon::{build_horizon, latest_settlement_key};
use super::normalize::{
    normalize_forecast, normalize_generation, normalize_load, normalize_settlement, Granularity,
};
use crate::config::{PipelineConfig, TrainingScope};
use crate::domain::{ForecastProduct, ForecastTables, HistoricalTables, PredictionRow, SettlementPoint};
use crate::error::{ForecastError, Result};
use crate::ml::Predictor;
use crate::provider::MarketDataProvider;

/// Result of one node's run
#[derive(Debug)]
pub struct NodeOutcome {
    pub node: String,
    pub result: Result<Vec<PredictionRow>>,
}

/// Outcomes of a batch run, in the order the nodes were requested
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<NodeOutcome>,
}

impl RunReport {
    /// Predictions of every successful node
    pub fn predictions(&self) -> Vec<PredictionRow> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .flatten()
            .cloned()
            .collect()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ForecastError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.node.as_str(), e)))
    }

    /// True when at least one node ran and none succeeded
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.succeeded() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct ForecastEngine {
    config: PipelineConfig,
    retention_days: Option<u32>,
}

impl ForecastEngine {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            retention_days: None,
        }
    }

    /// Trim loaded history to the most recent `days` before running
    pub fn with_retention_days(mut self, days: Option<u32>) -> Self {
        self.retention_days = days;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Forecast one node over the configured horizon.
    ///
    /// Empty history yields no predictions and the predictor is never fitted.
    pub fn run_node(
        &self,
        historical: &HistoricalTables,
        forecasts: &ForecastTables,
        node: &str,
    ) -> Result<Vec<PredictionRow>> {
        let settlement = normalize_settlement(historical.settlement())?;
        let wind = normalize_generation("wind", &historical.wind, Granularity::FiveMinute)?;
        let solar = normalize_generation("solar", &historical.solar, Granularity::FiveMinute)?;
        let load = normalize_load(&historical.load)?;

        let joined = align_series(&settlement, &wind, &solar, &load);
        let table = build_features(&joined, &self.config.features);
        if table.is_empty() {
            info!(node, "no complete feature rows; skipping fit");
            return Ok(Vec::new());
        }
        if !table.nodes().contains(&node) {
            match node.parse::<SettlementPoint>() {
                Ok(point) => warn!(node, table = %point.point_type(), "node has no history of its own"),
                Err(_) => warn!(node, "node is not a known settlement point and has no history"),
            }
        }

        let training: Vec<&FeatureRow> = match self.config.features.training_scope {
            TrainingScope::AllNodes => table.rows.iter().collect(),
            TrainingScope::QueriedNode => table.for_node(node).collect(),
        };
        if training.is_empty() {
            info!(node, "no training rows for node; skipping fit");
            return Ok(Vec::new());
        }

        let mut predictor = Predictor::new(self.config.model.clone());
        predictor.fit(training)?;

        let Some(latest) = latest_settlement_key(&settlement) else {
            return Ok(Vec::new());
        };
        let load_fc = normalize_forecast(ForecastProduct::Load, &forecasts.load)?;
        let wind_fc = normalize_forecast(ForecastProduct::Wind, &forecasts.wind)?;
        let solar_fc = normalize_forecast(ForecastProduct::Solar, &forecasts.solar)?;
        let horizon = build_horizon(latest, &load_fc, &wind_fc, &solar_fc, &self.config.horizon);

        let predictions = predictor.predict(&horizon, node)?;
        info!(
            node,
            predictions = predictions.len(),
            horizon_start = %horizon.start,
            horizon_end = %horizon.end(),
            "node forecast complete"
        );
        Ok(predictions)
    }

    /// Run every node against one snapshot of the tables.
    ///
    /// Up to `max_concurrent` nodes run at once on blocking worker threads. A
    /// failing node is recorded in the report and does not stop the others.
    pub async fn run_tables(
        &self,
        historical: Arc<HistoricalTables>,
        forecasts: Arc<ForecastTables>,
        nodes: &[String],
        max_concurrent: usize,
    ) -> RunReport {
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let mut tasks = JoinSet::new();

        for (idx, node) in nodes.iter().enumerate() {
            let engine = self.clone();
            let historical = Arc::clone(&historical);
            let forecasts = Arc::clone(&forecasts);
            let semaphore = Arc::clone(&semaphore);
            let node = node.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                debug!(node = %node, "starting node run");
                let task_node = node.clone();
                let result = tokio::task::spawn_blocking(move || {
                    engine.run_node(&historical, &forecasts, &task_node)
                })
                .await
                .unwrap_or_else(|e| Err(ForecastError::Model(format!("node task failed: {e}"))));
                (idx, NodeOutcome { node, result })
            });
        }

        let mut outcomes: Vec<(usize, NodeOutcome)> = Vec::with_capacity(nodes.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(error = %e, "node task aborted"),
            }
        }
        outcomes.sort_by_key(|(idx, _)| *idx);

        let report = RunReport {
            outcomes: outcomes.into_iter().map(|(_, o)| o).collect(),
        };
        for (node, err) in report.failures() {
            error!(node, error = %err, structural = err.is_structural(), "node forecast failed");
        }
        info!(
            nodes = nodes.len(),
            succeeded = report.succeeded(),
            "forecast run finished"
        );
        report
    }

    /// Load the tables from `provider` and run every node.
    ///
    /// Provider failures abort the run; node failures are reported.
    pub async fn run_all(
        &self,
        provider: &dyn MarketDataProvider,
        nodes: &[String],
        max_concurrent: usize,
    ) -> Result<RunReport> {
        let mut historical = provider.historical().await?;
        let forecasts = provider.forecasts().await?;

        if let Some(days) = self.retention_days {
            historical.retain_recent_days(days);
        }

        Ok(self
            .run_tables(Arc::new(historical), Arc::new(forecasts), nodes, max_concurrent)
            .await)
    }
}
