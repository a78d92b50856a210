//! Strategy - volatility-gated long strategy on the underlying
//!
//! - Strategy parameters and sweep grid
//! - Evaluation of one parameter set (returns, outlier filter, compounding)
//! - Parallel parameter sweep

pub mod config;
pub mod evaluator;
pub mod sweep;

pub use config::{ReturnMode, StrategyConfig, SweepGrid};
pub use evaluator::{
    evaluate, run, CurvePoint, ReturnRecord, StateRecord, StrategyOutcome, StrategyReturn,
};
pub use sweep::{run_sweep, SweepReport, SweepResult};
