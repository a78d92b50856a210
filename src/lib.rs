// Library crate - series alignment, percentile signal and strategy evaluation

pub mod series;
pub mod signal;
pub mod strategy;
pub mod data;
pub mod report;

// Re-export commonly used types
pub use series::{align, AlignedRecord, Series, TimePoint};
pub use signal::{generate_signals, predict_from_change, ChangeModel, ChangePrediction, RiskState, SignalRecord};
pub use strategy::{ReturnMode, StrategyConfig, StrategyOutcome, StrategyReturn, SweepGrid};
