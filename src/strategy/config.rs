//! Strategy parameters

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// How daily returns are taken for the risk-on subset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ReturnMode {
    /// Percent change between consecutive risk-on records; a return can span
    /// risk-off days in between
    #[default]
    FilteredSubset,
    /// Percent change against the immediately preceding aligned record, kept
    /// only when the return's own date is risk-on
    Contiguous,
}

impl std::fmt::Display for ReturnMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FilteredSubset => write!(f, "filtered-subset"),
            Self::Contiguous => write!(f, "contiguous"),
        }
    }
}

/// Parameters for one strategy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Lookback window for the rolling percentile (observations)
    pub window: usize,

    /// Risk-on when the indicator percentile is strictly below this
    pub threshold: f64,

    /// Returns with |r| >= outlier_sigma * stddev are discarded
    pub outlier_sigma: f64,

    pub return_mode: ReturnMode,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            window: 11,
            threshold: 44.0,
            outlier_sigma: 3.0,
            return_mode: ReturnMode::FilteredSubset,
        }
    }
}

impl StrategyConfig {
    pub fn with_params(threshold: f64, window: usize) -> Self {
        Self {
            threshold,
            window,
            ..Default::default()
        }
    }

    /// Reject parameters the evaluator cannot give a meaning to
    pub fn validate(&self) -> Result<()> {
        if self.window < 2 {
            bail!("window must be at least 2, got {}", self.window);
        }
        if !(self.threshold > 0.0 && self.threshold < 100.0) {
            bail!("threshold must be in (0, 100), got {}", self.threshold);
        }
        if !(self.outlier_sigma.is_finite() && self.outlier_sigma > 0.0) {
            bail!("outlier sigma must be positive, got {}", self.outlier_sigma);
        }
        Ok(())
    }
}

/// Grid of thresholds and windows for a parameter sweep
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepGrid {
    pub threshold_min: f64,
    pub threshold_max: f64,
    pub threshold_step: f64,
    pub window_min: usize,
    pub window_max: usize,
}

impl Default for SweepGrid {
    fn default() -> Self {
        Self {
            threshold_min: 30.0,
            threshold_max: 50.0,
            threshold_step: 1.0,
            window_min: 5,
            window_max: 19,
        }
    }
}

impl SweepGrid {
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold_step.is_finite() && self.threshold_step > 0.0) {
            bail!("threshold step must be positive, got {}", self.threshold_step);
        }
        if self.threshold_min > self.threshold_max {
            bail!(
                "threshold range is empty: {} > {}",
                self.threshold_min,
                self.threshold_max
            );
        }
        if self.window_min > self.window_max {
            bail!("window range is empty: {} > {}", self.window_min, self.window_max);
        }
        StrategyConfig::with_params(self.threshold_min, self.window_min).validate()?;
        StrategyConfig::with_params(self.threshold_max, self.window_max).validate()?;
        Ok(())
    }

    /// Thresholds from min to max inclusive.
    ///
    /// Computed as `min + k * step` so steps like 0.1 don't accumulate drift.
    pub fn thresholds(&self) -> Vec<f64> {
        let steps = ((self.threshold_max - self.threshold_min) / self.threshold_step + 1e-9).floor();
        (0..=steps as usize)
            .map(|k| self.threshold_min + k as f64 * self.threshold_step)
            .collect()
    }

    pub fn windows(&self) -> Vec<usize> {
        (self.window_min..=self.window_max).collect()
    }

    pub fn len(&self) -> usize {
        self.thresholds().len() * self.windows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StrategyConfig::default();
        assert_eq!(config.window, 11);
        assert_eq!(config.threshold, 44.0);
        assert!(config.validate().is_ok());
        assert!(SweepGrid::default().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_params() {
        assert!(StrategyConfig::with_params(44.0, 1).validate().is_err());
        assert!(StrategyConfig::with_params(0.0, 11).validate().is_err());
        assert!(StrategyConfig::with_params(100.0, 11).validate().is_err());
        assert!(StrategyConfig::with_params(f64::NAN, 11).validate().is_err());

        let config = StrategyConfig {
            outlier_sigma: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_grid_points() {
        let grid = SweepGrid::default();
        let thresholds = grid.thresholds();
        assert_eq!(thresholds.len(), 21);
        assert_eq!(thresholds[0], 30.0);
        assert_eq!(thresholds[20], 50.0);
        assert_eq!(grid.windows().len(), 15);
        assert_eq!(grid.len(), 315);

        let fine = SweepGrid {
            threshold_min: 40.0,
            threshold_max: 41.0,
            threshold_step: 0.1,
            ..Default::default()
        };
        assert_eq!(fine.thresholds().len(), 11);
    }

    #[test]
    fn test_grid_validation() {
        let inverted = SweepGrid {
            window_min: 10,
            window_max: 5,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());

        let tiny_window = SweepGrid {
            window_min: 1,
            ..Default::default()
        };
        assert!(tiny_window.validate().is_err());
    }
}
