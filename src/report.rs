//! Reporting: console summary and files for charting

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::signal::{ChangeModel, ChangePrediction, RiskState};
use crate::strategy::{StateRecord, StrategyConfig, StrategyOutcome, StrategyReturn};

/// Days covered by the "recent" segment view
pub const RECENT_DAYS: i64 = 365;

/// A maximal run of consecutive risk-on dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskSegment {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: usize,
}

/// Consecutive risk-on runs in the state sequence
pub fn risk_on_segments(states: &[StateRecord]) -> Vec<RiskSegment> {
    let mut segments = Vec::new();
    let mut current: Option<RiskSegment> = None;

    for s in states {
        if !s.state.is_risk_on() {
            if let Some(seg) = current.take() {
                segments.push(seg);
            }
            continue;
        }

        match current.as_mut() {
            Some(seg) => {
                seg.end = s.date;
                seg.days += 1;
            }
            None => {
                current = Some(RiskSegment {
                    start: s.date,
                    end: s.date,
                    days: 1,
                });
            }
        }
    }

    if let Some(seg) = current {
        segments.push(seg);
    }

    segments
}

/// States within `days` calendar days of the last state
pub fn trailing_states(states: &[StateRecord], days: i64) -> &[StateRecord] {
    let Some(last) = states.last() else {
        return states;
    };
    let cutoff = last.date - Duration::days(days);
    let start = states.partition_point(|s| s.date < cutoff);
    &states[start..]
}

/// Summary written to JSON
#[derive(Debug, Serialize)]
pub struct ReportSummary<'a> {
    pub config: &'a StrategyConfig,
    pub strategy_return: StrategyReturn,
    pub buy_and_hold_pct: Option<f64>,
    pub last_date: Option<NaiveDate>,
    pub last_percentile: Option<f64>,
    pub last_state: Option<RiskState>,
    pub aligned_days: usize,
    pub risk_on_days: usize,
    pub return_days: usize,
    pub outliers_dropped: usize,
    pub segments: Vec<RiskSegment>,
    pub recent_segments: Vec<RiskSegment>,
}

impl<'a> ReportSummary<'a> {
    pub fn new(outcome: &'a StrategyOutcome) -> Self {
        Self {
            config: &outcome.config,
            strategy_return: outcome.strategy_return,
            buy_and_hold_pct: outcome.buy_and_hold_pct,
            last_date: outcome.last_date,
            last_percentile: outcome.last_percentile,
            last_state: outcome.last_state,
            aligned_days: outcome.aligned_days,
            risk_on_days: outcome.risk_on_days,
            return_days: outcome.return_days,
            outliers_dropped: outcome.outliers_dropped,
            segments: risk_on_segments(&outcome.states),
            recent_segments: risk_on_segments(trailing_states(&outcome.states, RECENT_DAYS)),
        }
    }
}

pub fn print_results(outcome: &StrategyOutcome) {
    println!("\n{}", "=".repeat(60));
    println!(
        "VIX PERCENTILE LONG STRATEGY (threshold {}, window {}, {} returns)",
        outcome.config.threshold, outcome.config.window, outcome.config.return_mode
    );
    println!("{}", "=".repeat(60));

    match (outcome.last_date, outcome.last_percentile, outcome.last_state) {
        (Some(date), Some(percentile), Some(state)) => {
            println!("Prediction Date: {}", date.format("%Y-%m-%d"));
            println!("The last percentile is: {:.2}", percentile);
            println!("The last position is: {}", state);
        }
        _ => println!("No signal: indicator history too short"),
    }

    println!("{}", "-".repeat(40));
    match outcome.buy_and_hold_pct {
        Some(bh) => println!("  Buy and Hold P/L:   {:.2}%", bh),
        None => println!("  Buy and Hold P/L:   N/A"),
    }
    println!("  Long Position P/L:  {}", outcome.strategy_return);
    println!("  Aligned days:       {}", outcome.aligned_days);
    println!("  Risk-on days:       {}", outcome.risk_on_days);
    println!("  Returns compounded: {}", outcome.return_days);
    println!("  Outliers dropped:   {}", outcome.outliers_dropped);

    let recent = risk_on_segments(trailing_states(&outcome.states, RECENT_DAYS));
    if !recent.is_empty() {
        println!("\n  Risk-on spans, last {} days:", RECENT_DAYS);
        for seg in &recent {
            println!("    {} .. {} ({} days)", seg.start, seg.end, seg.days);
        }
    }
}

pub fn print_prediction(prediction: &ChangePrediction, model: &ChangeModel) {
    println!("\n{}", "=".repeat(60));
    println!(
        "VIX CHANGE MODEL (intercept {}, slope {})",
        model.intercept, model.slope
    );
    println!("{}", "=".repeat(60));
    println!("Prediction Date: {}", prediction.date.format("%Y-%m-%d"));
    println!("VIX Change: {:.2}", prediction.indicator_change);
    println!("Predicted SP500 Return: {:.4}%", prediction.predicted_return * 100.0);
    println!("Decision: {}", prediction.state);
}

/// Write the summary, per-date states and equity curve to `output_dir`
pub fn write_outputs(outcome: &StrategyOutcome, output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;

    let summary_path = output_dir.join("summary.json");
    let json = serde_json::to_string_pretty(&ReportSummary::new(outcome))?;
    std::fs::write(&summary_path, json)?;
    info!("Wrote summary to {:?}", summary_path);

    let states_path = output_dir.join("states.csv");
    write_csv(&outcome.states, &states_path)?;
    info!("Wrote {} states to {:?}", outcome.states.len(), states_path);

    let curve_path = output_dir.join("equity_curve.csv");
    write_csv(&outcome.equity_curve, &curve_path)?;
    info!("Wrote {} curve points to {:?}", outcome.equity_curve.len(), curve_path);

    Ok(())
}

fn write_csv<T: Serialize>(rows: &[T], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {:?}", path))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
