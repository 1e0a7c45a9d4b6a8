pub mod align;
pub mod engine;
pub mod features;
pub mod horizon;
pub mod metrics;
pub mod normalize;

pub use align::{align_series, JoinedRow};
pub use engine::*;
pub use features::{build_features, FeatureRow, FeatureTable, ModelInputs, MODEL_FEATURES};
pub use horizon::{build_horizon, ForecastHorizon, HorizonRow};
pub use metrics::ForecastMetrics;
