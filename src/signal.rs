//! Rolling percentile signal on the volatility indicator

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::series::Series;

/// Percentile rank of the indicator on one date
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub date: NaiveDate,
    pub percentile: f64,
}

/// Risk-on holds the underlying, risk-off stands aside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskState {
    RiskOn,
    RiskOff,
}

impl RiskState {
    /// Classify a percentile against the threshold (risk-on iff below it)
    pub fn classify(percentile: f64, threshold: f64) -> Self {
        if percentile < threshold {
            Self::RiskOn
        } else {
            Self::RiskOff
        }
    }

    pub fn is_risk_on(&self) -> bool {
        matches!(self, Self::RiskOn)
    }
}

impl fmt::Display for RiskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RiskOn => write!(f, "Risk On"),
            Self::RiskOff => write!(f, "Risk Off"),
        }
    }
}

/// Inclusive percentile rank: `100 * count(m <= x) / |M|`.
///
/// Ties are not split. Returns `None` for an empty set.
pub fn percentile_rank(x: f64, set: &[f64]) -> Option<f64> {
    if set.is_empty() {
        return None;
    }
    let at_or_below = set.iter().filter(|&&m| m <= x).count();
    Some(100.0 * at_or_below as f64 / set.len() as f64)
}

/// Rolling percentile of every value against its trailing `window`.
///
/// Until the window fills (`i < window - 1`) the rank is taken against the
/// whole history seen so far. Fewer than 2 values yields an empty vector.
pub fn rolling_percentiles(values: &[f64], window: usize) -> Vec<f64> {
    if values.len() < 2 || window == 0 {
        return Vec::new();
    }

    values
        .iter()
        .enumerate()
        .filter_map(|(i, &x)| {
            let start = (i + 1).saturating_sub(window);
            percentile_rank(x, &values[start..=i])
        })
        .collect()
}

/// One [`SignalRecord`] per observation of the indicator
pub fn generate_signals(indicator: &Series, window: usize) -> Vec<SignalRecord> {
    let values = indicator.values();
    let percentiles = rolling_percentiles(&values, window);

    indicator
        .points
        .iter()
        .zip(percentiles)
        .map(|(point, percentile)| SignalRecord {
            date: point.date,
            percentile,
        })
        .collect()
}

/// Linear model of the next underlying return on the last indicator change:
/// `predicted = intercept + slope * change`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChangeModel {
    pub intercept: f64,
    pub slope: f64,
}

impl Default for ChangeModel {
    /// Coefficients fitted on daily S&P 500 returns against VIX changes
    fn default() -> Self {
        Self {
            intercept: -0.0003,
            slope: -0.0021,
        }
    }
}

impl ChangeModel {
    pub fn predicted_return(&self, change: f64) -> f64 {
        self.intercept + self.slope * change
    }
}

/// Next-day call from the last indicator change
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChangePrediction {
    pub date: NaiveDate,
    pub indicator_change: f64,
    /// Fractional return, not percent
    pub predicted_return: f64,
    /// Risk-off iff the predicted return is negative
    pub state: RiskState,
}

/// Predict the next underlying return from the change between the last two
/// indicator observations. `None` for fewer than 2 observations.
pub fn predict_from_change(indicator: &Series, model: &ChangeModel) -> Option<ChangePrediction> {
    let [.., prev, last] = indicator.points.as_slice() else {
        return None;
    };

    let indicator_change = last.value - prev.value;
    let predicted_return = model.predicted_return(indicator_change);
    let state = if predicted_return < 0.0 {
        RiskState::RiskOff
    } else {
        RiskState::RiskOn
    };

    Some(ChangePrediction {
        date: last.date,
        indicator_change,
        predicted_return,
        state,
    })
}
