//! Alerting: threshold evaluation and the append-only alert log.
//!
//! Submodules:
//! - `thresholds`: partitions forecasts by the alert threshold
//! - `notifier`: writes timestamped lines to the alert log

pub mod notifier;
pub mod thresholds;

pub use notifier::AlertNotifier;
pub use thresholds::{AlertEvaluation, ForecastAlert, evaluate_forecasts};
