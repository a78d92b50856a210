//! Strategy evaluator
//!
//! Turns the per-date percentile signal into risk-on/risk-off states, takes
//! daily returns of the underlying on risk-on dates, drops outlier returns
//! and compounds what is left. Buy-and-hold over the full aligned range is
//! computed alongside as the baseline.

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use super::config::{ReturnMode, StrategyConfig};
use crate::series::{align, AlignedRecord, Series};
use crate::signal::{generate_signals, RiskState, SignalRecord};

/// Relative tolerance under which a return set is treated as constant
const ZERO_VARIANCE_TOLERANCE: f64 = 1e-12;

/// One aligned date with its signal and state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub date: NaiveDate,
    pub underlying_value: f64,
    pub indicator_value: f64,
    pub percentile: f64,
    pub state: RiskState,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnRecord {
    pub date: NaiveDate,
    pub daily_return: f64,
}

/// Running compounded strategy return after each kept daily return
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub date: NaiveDate,
    pub cumulative_pct: f64,
}

/// Compounded strategy return, or the absence of one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StrategyReturn {
    /// No risk-on returns to compound
    NoSignal,
    /// Cumulative return in percent
    Return(f64),
}

impl StrategyReturn {
    pub fn pct(&self) -> Option<f64> {
        match self {
            Self::NoSignal => None,
            Self::Return(pct) => Some(*pct),
        }
    }
}

impl fmt::Display for StrategyReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSignal => write!(f, "no signal"),
            Self::Return(pct) => write!(f, "{:.2}%", pct),
        }
    }
}

/// Everything one evaluation produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyOutcome {
    pub config: StrategyConfig,
    pub strategy_return: StrategyReturn,
    /// `None` when there are no aligned records or the first value is 0
    pub buy_and_hold_pct: Option<f64>,
    pub last_date: Option<NaiveDate>,
    pub last_percentile: Option<f64>,
    pub last_state: Option<RiskState>,
    pub aligned_days: usize,
    pub risk_on_days: usize,
    /// Returns kept after the outlier filter
    pub return_days: usize,
    pub outliers_dropped: usize,
    pub equity_curve: Vec<CurvePoint>,
    pub states: Vec<StateRecord>,
}

/// Attach each aligned date's signal and classify it.
///
/// Aligned dates without a signal are dropped.
pub fn classify(
    aligned: &[AlignedRecord],
    signals: &[SignalRecord],
    threshold: f64,
) -> Vec<StateRecord> {
    let by_date: HashMap<NaiveDate, f64> =
        signals.iter().map(|s| (s.date, s.percentile)).collect();

    aligned
        .iter()
        .filter_map(|rec| {
            let percentile = *by_date.get(&rec.date)?;
            Some(StateRecord {
                date: rec.date,
                underlying_value: rec.underlying_value,
                indicator_value: rec.indicator_value,
                percentile,
                state: RiskState::classify(percentile, threshold),
            })
        })
        .collect()
}

fn pct_change(prev: f64, cur: f64) -> f64 {
    (cur - prev) / prev
}

/// Daily returns of the underlying on risk-on dates
pub fn daily_returns(states: &[StateRecord], mode: ReturnMode) -> Vec<ReturnRecord> {
    let returns: Vec<ReturnRecord> = match mode {
        ReturnMode::FilteredSubset => {
            let risk_on: Vec<&StateRecord> =
                states.iter().filter(|s| s.state.is_risk_on()).collect();
            risk_on
                .windows(2)
                .map(|w| ReturnRecord {
                    date: w[1].date,
                    daily_return: pct_change(w[0].underlying_value, w[1].underlying_value),
                })
                .collect()
        }
        ReturnMode::Contiguous => states
            .windows(2)
            .filter(|w| w[1].state.is_risk_on())
            .map(|w| ReturnRecord {
                date: w[1].date,
                daily_return: pct_change(w[0].underlying_value, w[1].underlying_value),
            })
            .collect(),
    };

    returns
        .into_iter()
        .filter(|r| r.daily_return.is_finite())
        .collect()
}

/// Sample standard deviation (n - 1). `None` for fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / (n as f64 - 1.0);
    Some(var.sqrt())
}

/// Drop returns whose magnitude is at least `sigma_mult` standard deviations.
///
/// A constant (zero-variance) or too-short return set is left untouched.
/// Returns the kept returns and how many were dropped.
pub fn filter_outliers(returns: &[ReturnRecord], sigma_mult: f64) -> (Vec<ReturnRecord>, usize) {
    let values: Vec<f64> = returns.iter().map(|r| r.daily_return).collect();
    let scale = values.iter().fold(0.0f64, |acc, r| acc.max(r.abs()));

    let sigma = match sample_std_dev(&values) {
        Some(sigma) if sigma.is_finite() && sigma > ZERO_VARIANCE_TOLERANCE * scale => sigma,
        _ => {
            debug!("Outlier filter disabled ({} returns, zero variance or too few)", values.len());
            return (returns.to_vec(), 0);
        }
    };

    let limit = sigma_mult * sigma;
    let kept: Vec<ReturnRecord> = returns
        .iter()
        .copied()
        .filter(|r| r.daily_return.abs() < limit)
        .collect();
    let dropped = returns.len() - kept.len();

    (kept, dropped)
}

/// `prod(1 + r) - 1` as a percentage
pub fn compound(returns: &[ReturnRecord]) -> f64 {
    (returns.iter().fold(1.0, |acc, r| acc * (1.0 + r.daily_return)) - 1.0) * 100.0
}

/// Running compounded return after each daily return
pub fn equity_curve(returns: &[ReturnRecord]) -> Vec<CurvePoint> {
    let mut growth = 1.0;
    returns
        .iter()
        .map(|r| {
            growth *= 1.0 + r.daily_return;
            CurvePoint {
                date: r.date,
                cumulative_pct: (growth - 1.0) * 100.0,
            }
        })
        .collect()
}

/// Return from holding the underlying over the whole aligned range, in percent
pub fn buy_and_hold(aligned: &[AlignedRecord]) -> Option<f64> {
    let first = aligned.first()?.underlying_value;
    let last = aligned.last()?.underlying_value;
    if first == 0.0 {
        return None;
    }
    Some((last - first) / first * 100.0)
}

/// Evaluate the strategy on already aligned records and signals.
///
/// Fails on a config that cannot classify dates (NaN threshold, window < 2).
pub fn evaluate(
    aligned: &[AlignedRecord],
    signals: &[SignalRecord],
    config: &StrategyConfig,
) -> Result<StrategyOutcome> {
    config.validate()?;

    let states = classify(aligned, signals, config.threshold);
    let risk_on_days = states.iter().filter(|s| s.state.is_risk_on()).count();

    let returns = daily_returns(&states, config.return_mode);
    let (kept, outliers_dropped) = filter_outliers(&returns, config.outlier_sigma);

    let strategy_return = if risk_on_days == 0 || kept.is_empty() {
        StrategyReturn::NoSignal
    } else {
        StrategyReturn::Return(compound(&kept))
    };

    let last = signals.last();

    debug!(
        "threshold={} window={}: {} aligned, {} risk-on, {} returns ({} outliers) -> {}",
        config.threshold,
        config.window,
        aligned.len(),
        risk_on_days,
        kept.len(),
        outliers_dropped,
        strategy_return
    );

    Ok(StrategyOutcome {
        config: *config,
        strategy_return,
        buy_and_hold_pct: buy_and_hold(aligned),
        last_date: last.map(|s| s.date),
        last_percentile: last.map(|s| s.percentile),
        last_state: last.map(|s| RiskState::classify(s.percentile, config.threshold)),
        aligned_days: aligned.len(),
        risk_on_days,
        return_days: kept.len(),
        outliers_dropped,
        equity_curve: equity_curve(&kept),
        states,
    })
}

/// Full pipeline: align, generate the signal over the indicator's own
/// history, evaluate.
pub fn run(underlying: &Series, indicator: &Series, config: &StrategyConfig) -> Result<StrategyOutcome> {
    config.validate()?;
    let aligned = align(underlying, indicator);
    let signals = generate_signals(indicator, config.window);
    evaluate(&aligned, &signals, config)
}
