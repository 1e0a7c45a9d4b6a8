use anyhow::{bail, Context, Result};
use spp_forecaster::{config, forecast, provider, telemetry};
use config::Config;
use forecast::ForecastEngine;
use provider::{write_predictions, CsvDirectoryProvider};
use telemetry::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load().context("loading configuration")?;
    let nodes = cfg.run.resolved_nodes();

    info!(
        data_dir = %cfg.input.data_dir.display(),
        nodes = nodes.len(),
        horizon_days = cfg.pipeline.horizon.days,
        "starting settlement price forecast"
    );

    let provider = CsvDirectoryProvider::new(cfg.input.clone());
    let engine = ForecastEngine::new(cfg.pipeline.clone())
        .with_retention_days(cfg.input.retention_days);

    let report = engine
        .run_all(&provider, &nodes, cfg.run.max_concurrent_nodes)
        .await
        .context("loading market data")?;

    let predictions = report.predictions();
    write_predictions(&cfg.output.predictions_path, &predictions)
        .await
        .with_context(|| format!("writing {}", cfg.output.predictions_path.display()))?;

    if report.all_failed() {
        bail!("forecast failed for every node ({})", nodes.len());
    }

    info!(
        succeeded = report.succeeded(),
        rows = predictions.len(),
        "forecast complete"
    );
    Ok(())
}
