use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use vix_regime::data::{self, fred, FredClient, Source, SP500_SERIES, VIX_SERIES};
use vix_regime::report;
use vix_regime::series::Series;
use vix_regime::signal::{self, ChangeModel};
use vix_regime::strategy::{self, sweep, ReturnMode, StrategyConfig, SweepGrid};

#[derive(Parser, Debug)]
#[command(name = "vix-regime")]
#[command(about = "VIX percentile risk-on/risk-off signal and S&P 500 long strategy backtest")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON config file holding `fred_api_key`
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,

    /// Directory for cached series
    #[arg(long, global = true, default_value = "cache")]
    cache_dir: PathBuf,

    /// FRED API key (overrides the config file)
    #[arg(long, global = true, env = "FRED_API_KEY", hide_env_values = true)]
    fred_api_key: Option<String>,
}

/// Where to read the two input series from
#[derive(ClapArgs, Debug)]
struct InputArgs {
    /// Underlying series file (.csv, .json or .json.zst) instead of FRED
    #[arg(long)]
    underlying_file: Option<PathBuf>,

    /// Indicator series file (.csv, .json or .json.zst) instead of FRED
    #[arg(long)]
    indicator_file: Option<PathBuf>,

    /// Use cached series only, never hit the API
    #[arg(long)]
    offline: bool,

    /// FRED id of the underlying
    #[arg(long, default_value = SP500_SERIES)]
    underlying_id: String,

    /// FRED id of the volatility indicator
    #[arg(long, default_value = VIX_SERIES)]
    indicator_id: String,

    /// First observation date requested from FRED (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download both series from FRED into the cache
    Fetch {
        /// FRED id of the underlying
        #[arg(long, default_value = SP500_SERIES)]
        underlying_id: String,

        /// FRED id of the volatility indicator
        #[arg(long, default_value = VIX_SERIES)]
        indicator_id: String,

        /// First observation date to download (YYYY-MM-DD), full history if omitted
        #[arg(long)]
        start: Option<NaiveDate>,
    },

    /// Next-day call from the last change of the cached indicator
    Predict {
        /// Indicator series file (.csv, .json or .json.zst) instead of the cache
        #[arg(long)]
        indicator_file: Option<PathBuf>,

        /// FRED id of the volatility indicator
        #[arg(long, default_value = VIX_SERIES)]
        indicator_id: String,

        /// Model intercept
        #[arg(long, default_value = "-0.0003", allow_negative_numbers = true)]
        intercept: f64,

        /// Model slope on the indicator change
        #[arg(long, default_value = "-0.0021", allow_negative_numbers = true)]
        slope: f64,
    },

    /// Evaluate one threshold/window pair and report the current position
    Evaluate {
        #[command(flatten)]
        input: InputArgs,

        /// Indicator percentile below which the strategy is risk-on
        #[arg(long, default_value = "44.0")]
        threshold: f64,

        /// Lookback window for the rolling percentile (observations)
        #[arg(long, default_value = "11")]
        window: usize,

        /// Returns beyond this many standard deviations are dropped
        #[arg(long, default_value = "3.0")]
        outlier_sigma: f64,

        /// How daily returns are taken on risk-on dates
        #[arg(long, value_enum, default_value_t = ReturnMode::FilteredSubset)]
        return_mode: ReturnMode,

        /// Output directory for summary, states and equity curve
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
    },

    /// Grid search over thresholds and windows
    Sweep {
        #[command(flatten)]
        input: InputArgs,

        #[arg(long, default_value = "30")]
        threshold_min: f64,

        #[arg(long, default_value = "50")]
        threshold_max: f64,

        #[arg(long, default_value = "1")]
        threshold_step: f64,

        #[arg(long, default_value = "5")]
        window_min: usize,

        #[arg(long, default_value = "19")]
        window_max: usize,

        /// Returns beyond this many standard deviations are dropped
        #[arg(long, default_value = "3.0")]
        outlier_sigma: f64,

        /// How daily returns are taken on risk-on dates
        #[arg(long, value_enum, default_value_t = ReturnMode::FilteredSubset)]
        return_mode: ReturnMode,

        /// CSV file for per-combination results
        #[arg(short, long, default_value = "output/sweep_results.csv")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Commands::Fetch {
            ref underlying_id,
            ref indicator_id,
            start,
        } => {
            run_fetch(&args, underlying_id, indicator_id, start).await?;
        }
        Commands::Predict {
            ref indicator_file,
            ref indicator_id,
            intercept,
            slope,
        } => {
            let model = ChangeModel { intercept, slope };
            run_predict(&args, indicator_file.as_deref(), indicator_id, model).await?;
        }
        Commands::Evaluate {
            ref input,
            threshold,
            window,
            outlier_sigma,
            return_mode,
            ref output_dir,
        } => {
            let config = StrategyConfig {
                window,
                threshold,
                outlier_sigma,
                return_mode,
            };
            run_evaluate(&args, input, config, output_dir).await?;
        }
        Commands::Sweep {
            ref input,
            threshold_min,
            threshold_max,
            threshold_step,
            window_min,
            window_max,
            outlier_sigma,
            return_mode,
            ref output,
        } => {
            let grid = SweepGrid {
                threshold_min,
                threshold_max,
                threshold_step,
                window_min,
                window_max,
            };
            let base = StrategyConfig {
                outlier_sigma,
                return_mode,
                ..Default::default()
            };
            run_sweep(&args, input, grid, base, output).await?;
        }
    }

    Ok(())
}

fn fred_client(args: &Args) -> Result<FredClient> {
    let api_key = fred::resolve_api_key(args.fred_api_key.clone(), &args.config)?;
    FredClient::new(api_key)
}

async fn run_fetch(
    args: &Args,
    underlying_id: &str,
    indicator_id: &str,
    start: Option<NaiveDate>,
) -> Result<()> {
    info!("=== FETCH ===");
    let client = fred_client(args)?;

    for id in [indicator_id, underlying_id] {
        let series = data::obtain_series(id, Source::Fred(&client, start), &args.cache_dir).await?;
        if let Some((first, last)) = series.date_range() {
            info!("{}: {} observations from {} to {}", id, series.len(), first, last);
        }
    }

    info!("Fetch complete!");
    Ok(())
}

fn pick_source<'a>(
    file: Option<&'a Path>,
    client: Option<&'a FredClient>,
    start: Option<NaiveDate>,
) -> Source<'a> {
    match (file, client) {
        (Some(path), _) => Source::File(path),
        (None, Some(client)) => Source::Fred(client, start),
        (None, None) => Source::Cache,
    }
}

/// Load both series, each from its file, the cache or FRED
async fn load_inputs(args: &Args, input: &InputArgs) -> Result<(Series, Series)> {
    let needs_api = !input.offline
        && (input.underlying_file.is_none() || input.indicator_file.is_none());
    let client = if needs_api { Some(fred_client(args)?) } else { None };

    let underlying = data::obtain_series(
        &input.underlying_id,
        pick_source(input.underlying_file.as_deref(), client.as_ref(), input.start),
        &args.cache_dir,
    )
    .await?;
    let indicator = data::obtain_series(
        &input.indicator_id,
        pick_source(input.indicator_file.as_deref(), client.as_ref(), input.start),
        &args.cache_dir,
    )
    .await?;

    info!(
        "Loaded {} {} and {} {} observations",
        underlying.len(),
        underlying.id,
        indicator.len(),
        indicator.id
    );

    Ok((underlying, indicator))
}

async fn run_predict(
    args: &Args,
    indicator_file: Option<&Path>,
    indicator_id: &str,
    model: ChangeModel,
) -> Result<()> {
    info!("=== PREDICT ===");

    let source = indicator_file.map_or(Source::Cache, Source::File);
    let indicator = data::obtain_series(indicator_id, source, &args.cache_dir).await?;

    let Some(prediction) = signal::predict_from_change(&indicator, &model) else {
        bail!(
            "{} has {} observations, at least 2 are needed for a prediction",
            indicator_id,
            indicator.len()
        );
    };

    report::print_prediction(&prediction, &model);
    Ok(())
}

async fn run_evaluate(
    args: &Args,
    input: &InputArgs,
    config: StrategyConfig,
    output_dir: &Path,
) -> Result<()> {
    info!("=== EVALUATE ===");
    config.validate()?;

    let (underlying, indicator) = load_inputs(args, input).await?;

    info!("Config:");
    info!("  Threshold: {} percentile", config.threshold);
    info!("  Window: {} observations", config.window);
    info!("  Outlier filter: {} sigma", config.outlier_sigma);
    info!("  Return mode: {}", config.return_mode);

    let outcome = strategy::run(&underlying, &indicator, &config)?;

    report::print_results(&outcome);
    report::write_outputs(&outcome, output_dir)?;

    info!("Evaluation complete!");
    Ok(())
}

async fn run_sweep(
    args: &Args,
    input: &InputArgs,
    grid: SweepGrid,
    base: StrategyConfig,
    output: &Path,
) -> Result<()> {
    info!("=== PARAMETER SWEEP ===");
    grid.validate()?;
    base.validate()?;

    let (underlying, indicator) = load_inputs(args, input).await?;

    let report = sweep::run_sweep(&underlying, &indicator, &grid, &base)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    sweep::write_results_csv(&report.results, output)?;
    info!("Results written to {:?}", output);

    sweep::print_summary(&report);

    Ok(())
}
