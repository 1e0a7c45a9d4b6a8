//! Error types for the settlement price forecasting pipeline

use thiserror::Error;

use crate::domain::ForecastProduct;

/// Pipeline errors.
///
/// Transformation stages return these without catching; only the engine's
/// node loop decides whether a failure skips a node or aborts the run.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// An input table could not be found
    #[error("Missing input table: {0}")]
    MissingTable(String),

    /// An expected column is absent from an input table
    #[error("Missing column '{column}' in table '{table}'")]
    MissingColumn { table: String, column: String },

    /// A forecast product lacks its expected value column
    #[error("Schema mismatch in {product} forecast: expected one of [{expected}]")]
    SchemaMismatch {
        product: ForecastProduct,
        expected: String,
    },

    /// A row could not be mapped onto the interval calendar
    #[error("Invalid record {row} in table '{table}': {reason}")]
    InvalidRecord {
        table: String,
        row: usize,
        reason: String,
    },

    #[error("Invalid interval key: {0}")]
    InvalidKey(String),

    /// Fitting was attempted on an empty feature table
    #[error("Cannot fit model on an empty feature table")]
    EmptyTrainingSet,

    #[error("Feature count mismatch: expected {expected}, got {actual}")]
    FeatureCountMismatch { expected: usize, actual: usize },

    #[error("Model has not been fitted")]
    ModelNotFitted,

    /// Failure reported by the underlying learner
    #[error("Model error: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type with the pipeline error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl ForecastError {
    pub(crate) fn invalid_record(table: &str, row: usize, reason: impl Into<String>) -> Self {
        ForecastError::InvalidRecord {
            table: table.to_string(),
            row,
            reason: reason.into(),
        }
    }

    /// Whether the error stems from the shape of the inputs rather than their values
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ForecastError::MissingTable(_)
                | ForecastError::MissingColumn { .. }
                | ForecastError::SchemaMismatch { .. }
        )
    }
}
