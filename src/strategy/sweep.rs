//! Parameter Sweep Module
//!
//! Brute-force search over (threshold, window) pairs using Rayon. The
//! rolling signal depends only on the window, so it is computed once per
//! window and shared by every threshold.

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

use super::config::{StrategyConfig, SweepGrid};
use super::evaluator::{evaluate, StrategyReturn};
use crate::series::{align, Series};
use crate::signal::{generate_signals, SignalRecord};

/// Result of one grid cell
#[derive(Debug, Clone, PartialEq)]
pub struct SweepResult {
    pub threshold: f64,
    pub window: usize,
    pub strategy_return: StrategyReturn,
    pub risk_on_days: usize,
    pub return_days: usize,
    pub outliers_dropped: usize,
}

/// Flat CSV row for one grid cell; an empty return column means no signal
#[derive(Debug, Serialize)]
struct SweepRow {
    threshold: f64,
    window: usize,
    cumulative_return_pct: Option<f64>,
    risk_on_days: usize,
    return_days: usize,
    outliers_dropped: usize,
}

impl From<&SweepResult> for SweepRow {
    fn from(r: &SweepResult) -> Self {
        Self {
            threshold: r.threshold,
            window: r.window,
            cumulative_return_pct: r.strategy_return.pct(),
            risk_on_days: r.risk_on_days,
            return_days: r.return_days,
            outliers_dropped: r.outliers_dropped,
        }
    }
}

/// All cells in iteration order plus the index of the best one
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub results: Vec<SweepResult>,
    pub best: Option<usize>,
    pub buy_and_hold_pct: Option<f64>,
}

impl SweepReport {
    pub fn best(&self) -> Option<&SweepResult> {
        self.best.map(|i| &self.results[i])
    }
}

/// All (threshold, window) pairs, threshold-major
pub fn generate_combinations(grid: &SweepGrid) -> Vec<(f64, usize)> {
    let windows = grid.windows();
    let mut combinations = Vec::with_capacity(grid.len());

    for threshold in grid.thresholds() {
        for &window in &windows {
            combinations.push((threshold, window));
        }
    }

    combinations
}

/// Index of the highest strategy return; earlier cells win ties.
///
/// Cells without a signal never win.
pub fn select_best(results: &[SweepResult]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;

    for (i, result) in results.iter().enumerate() {
        if let Some(pct) = result.strategy_return.pct() {
            match best {
                Some((_, best_pct)) if pct <= best_pct => {}
                _ => best = Some((i, pct)),
            }
        }
    }

    best.map(|(i, _)| i)
}

/// Run the sweep in parallel
pub fn run_sweep(
    underlying: &Series,
    indicator: &Series,
    grid: &SweepGrid,
    base: &StrategyConfig,
) -> Result<SweepReport> {
    grid.validate()?;
    base.validate()?;

    let aligned = align(underlying, indicator);
    info!(
        "Sweeping {} combinations over {} aligned days",
        grid.len(),
        aligned.len()
    );

    let signals: HashMap<usize, Vec<SignalRecord>> = grid
        .windows()
        .into_par_iter()
        .map(|window| (window, generate_signals(indicator, window)))
        .collect();

    let combinations = generate_combinations(grid);
    let total = combinations.len();
    let completed = AtomicUsize::new(0);
    let start = std::time::Instant::now();

    // par_iter().collect() keeps the input order, so tie-breaks stay stable
    let results: Vec<SweepResult> = combinations
        .par_iter()
        .map(|&(threshold, window)| -> Result<SweepResult> {
            let config = StrategyConfig {
                threshold,
                window,
                ..*base
            };
            let window_signals = signals.get(&window).map(Vec::as_slice).unwrap_or(&[]);
            let outcome = evaluate(&aligned, window_signals, &config)?;

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if done % 50 == 0 || done == total {
                let elapsed = start.elapsed().as_secs_f64();
                let rate = done as f64 / elapsed.max(f64::EPSILON);
                eprint!("\r[{}/{}] {:.1}/s       ", done, total, rate);
            }

            Ok(SweepResult {
                threshold,
                window,
                strategy_return: outcome.strategy_return,
                risk_on_days: outcome.risk_on_days,
                return_days: outcome.return_days,
                outliers_dropped: outcome.outliers_dropped,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    eprintln!();
    info!(
        "Sweep finished in {:.2}s",
        start.elapsed().as_secs_f64()
    );

    let best = select_best(&results);
    let buy_and_hold_pct = super::evaluator::buy_and_hold(&aligned);

    Ok(SweepReport {
        results,
        best,
        buy_and_hold_pct,
    })
}

/// Write one CSV row per grid cell
pub fn write_results_csv(results: &[SweepResult], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create sweep output: {:?}", path))?;

    for r in results {
        writer.serialize(SweepRow::from(r))?;
    }
    writer.flush()?;

    Ok(())
}

pub fn print_summary(report: &SweepReport) {
    let with_signal = report
        .results
        .iter()
        .filter(|r| r.strategy_return.pct().is_some())
        .count();

    println!("\n=== SWEEP SUMMARY ===");
    println!("Total combinations: {}", report.results.len());
    println!("With signal:        {}", with_signal);
    if let Some(bh) = report.buy_and_hold_pct {
        println!("Buy and Hold P/L:   {:.2}%", bh);
    }

    let mut ranked: Vec<&SweepResult> = report
        .results
        .iter()
        .filter(|r| r.strategy_return.pct().is_some())
        .collect();
    ranked.sort_by(|a, b| {
        let a = a.strategy_return.pct().unwrap_or(f64::NEG_INFINITY);
        let b = b.strategy_return.pct().unwrap_or(f64::NEG_INFINITY);
        b.total_cmp(&a)
    });

    if !ranked.is_empty() {
        println!("\nTop 10 by cumulative return:");
        for (i, r) in ranked.iter().take(10).enumerate() {
            println!(
                "  {}. threshold={} window={} return={} risk-on days={}",
                i + 1,
                r.threshold,
                r.window,
                r.strategy_return,
                r.risk_on_days
            );
        }
    }

    match report.best() {
        Some(best) => {
            println!("\nBest threshold: {}", best.threshold);
            println!("Best window:    {}", best.window);
            println!("Highest cumulative return: {}", best.strategy_return);
        }
        None => println!("\nNo combination produced a risk-on signal"),
    }
}
