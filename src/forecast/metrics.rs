//! Fit metrics
//!
//! In-sample error summary recorded when the predictor is fitted. No
//! validation split is taken, so these describe fit, not forecast accuracy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error summary of predictions against observed prices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Square Error
    pub rmse: f64,
    /// R² (coefficient of determination)
    pub r2: f64,
    /// Largest absolute error
    pub max_error: f64,
    pub sample_count: usize,
}

impl ForecastMetrics {
    pub fn calculate(actual: &[f64], predicted: &[f64]) -> Result<Self, ForecastMetricsError> {
        if actual.len() != predicted.len() {
            return Err(ForecastMetricsError::DimensionMismatch {
                actual: actual.len(),
                predicted: predicted.len(),
            });
        }
        if actual.is_empty() {
            return Err(ForecastMetricsError::EmptyData);
        }

        let n = actual.len() as f64;
        let errors: Vec<f64> = actual.iter().zip(predicted).map(|(a, p)| a - p).collect();

        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
        let sse: f64 = errors.iter().map(|e| e * e).sum();
        let rmse = (sse / n).sqrt();

        let mean_actual = actual.iter().sum::<f64>() / n;
        let total_variance: f64 = actual.iter().map(|a| (a - mean_actual).powi(2)).sum();
        // constant target: R² is undefined, report 0
        let r2 = if total_variance > 1e-10 {
            1.0 - sse / total_variance
        } else {
            0.0
        };

        let max_error = errors.iter().map(|e| e.abs()).fold(0.0f64, f64::max);

        Ok(Self {
            mae,
            rmse,
            r2,
            max_error,
            sample_count: actual.len(),
        })
    }
}

impl fmt::Display for ForecastMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MAE={:.3}, RMSE={:.3}, R²={:.3}, max={:.3}, n={}",
            self.mae, self.rmse, self.r2, self.max_error, self.sample_count
        )
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ForecastMetricsError {
    #[error("Dimension mismatch: actual={actual}, predicted={predicted}")]
    DimensionMismatch { actual: usize, predicted: usize },

    #[error("Empty data provided")]
    EmptyData,
}
