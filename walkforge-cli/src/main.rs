//! WalkForge CLI — walk-forward runs, window previews and one-off backtests.
//!
//! Commands:
//! - `run` — execute a walk-forward from a TOML config over a candle CSV
//! - `windows` — print the train/test schedule a config would produce
//! - `backtest` — simulate one parameter set over a candle CSV

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use walkforge_core::{simulate, ParamValue, ParameterSet, SimulationSettings, StrategyParams};
use walkforge_runner::export::{generate_report, save_artifacts};
use walkforge_runner::{
    load_candles_csv, load_candles_in_range, schedule_windows, spawn_walk_forward, Metrics,
    ProgressEvent, WalkForwardConfig, WalkForwardResult,
};

#[derive(Parser)]
#[command(
    name = "walkforge",
    about = "WalkForge CLI — walk-forward optimization for MA crossover strategies"
)]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a walk-forward optimization.
    Run {
        /// Path to a TOML run config.
        #[arg(long)]
        config: PathBuf,

        /// Candle CSV (open_time,open,high,low,close[,volume]).
        #[arg(long)]
        data: PathBuf,

        /// Override the config's search thread count.
        #[arg(long)]
        threads: Option<usize>,

        /// Output directory for result artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Skip writing artifacts.
        #[arg(long, default_value_t = false)]
        no_save: bool,

        /// Print the full Markdown report instead of the short summary.
        #[arg(long, default_value_t = false)]
        report: bool,
    },
    /// Preview the window schedule for a config.
    Windows {
        /// Path to a TOML run config.
        #[arg(long)]
        config: PathBuf,
    },
    /// Simulate a single parameter set.
    Backtest {
        /// Candle CSV.
        #[arg(long)]
        data: PathBuf,

        /// Parameter overrides, e.g. `--param fast_period=5 --param ma_type=sma`.
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// Only candles at or after this RFC 3339 time.
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// Only candles before this RFC 3339 time.
        #[arg(long)]
        end: Option<DateTime<Utc>>,

        #[arg(long, default_value_t = 10_000.0)]
        initial_balance: f64,

        #[arg(long, default_value_t = 1.0)]
        leverage: f64,

        #[arg(long, default_value_t = 0.0004)]
        fee_rate: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            data,
            threads,
            output_dir,
            no_save,
            report,
        } => run_walk_forward_cmd(config, data, threads, output_dir, no_save, report),
        Commands::Windows { config } => run_windows_cmd(config),
        Commands::Backtest {
            data,
            params,
            start,
            end,
            initial_balance,
            leverage,
            fee_rate,
        } => {
            let settings = SimulationSettings {
                initial_balance,
                leverage,
                fee_rate,
                ..SimulationSettings::default()
            };
            run_backtest_cmd(data, &params, start, end, settings)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ─── run ─────────────────────────────────────────────────────────────

fn run_walk_forward_cmd(
    config_path: PathBuf,
    data: PathBuf,
    threads: Option<usize>,
    output_dir: PathBuf,
    no_save: bool,
    report: bool,
) -> Result<()> {
    let mut config = WalkForwardConfig::from_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(threads) = threads {
        config.threads = threads;
    }
    config.validate()?;

    let series = load_candles_csv(&data)?;
    info!(
        candles = series.len(),
        first = %series.first_time(),
        last = %series.last_time(),
        "candles loaded"
    );

    let handle = spawn_walk_forward(config, series).context("failed to start worker thread")?;
    info!(task_id = handle.task_id(), "task started");
    for event in handle.events() {
        if let ProgressEvent::WindowCompleted {
            index,
            completed,
            total,
            disqualified,
        } = event
        {
            let pct = handle.snapshot().progress_fraction * 100.0;
            info!(window = index, completed, total, disqualified, "progress {pct:.0}%");
        }
    }
    let result = handle.join()?;

    if report {
        println!("{}", generate_report(&result));
    } else {
        print_summary(&result);
    }

    if !no_save {
        let run_dir = save_artifacts(&result, &output_dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn print_summary(result: &WalkForwardResult) {
    let s = &result.summary;
    let m = &s.overall_metrics;
    println!();
    println!("=== Walk-Forward Result ===");
    println!("Symbol:         {}", result.symbol);
    println!("Strategy:       {}", result.strategy);
    println!("Metric:         {}", result.metric);
    println!("Status:         {}", result.status);
    println!(
        "Windows:        {}/{} ({} disqualified)",
        result.windows.len(),
        result.total_windows,
        s.disqualified_windows
    );
    println!();
    println!("--- Out-of-sample ---");
    println!("Total Return:   {:.2}%", m.total_return_pct);
    println!("Trades:         {}", m.total_trades);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    match m.profit_factor {
        Some(pf) => println!("Profit Factor:  {pf:.2}"),
        None => println!("Profit Factor:  n/a"),
    }
    println!("Max Drawdown:   {:.2}%", m.max_drawdown_pct);
    println!("Sharpe-like:    {:.3}", m.sharpe_like_ratio);
    println!();
    println!("--- Overfitting ---");
    println!("Sign flips:     {}/{}", s.overfit_windows, s.qualifying_windows);
    match s.degradation_ratio {
        Some(r) => println!("Degradation:    {r:.3} ({:?})", s.degradation_flag),
        None => println!("Degradation:    n/a ({:?})", s.degradation_flag),
    }
    if let Some(risk) = s.overfitting_risk {
        println!("Risk:           {risk:?}");
    }
}

// ─── windows ─────────────────────────────────────────────────────────

fn run_windows_cmd(config_path: PathBuf) -> Result<()> {
    let config = WalkForwardConfig::from_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let windows = schedule_windows(&config.schedule_spec())?;
    if windows.is_empty() {
        println!("No windows: range is shorter than one training plus one test period.");
        return Ok(());
    }
    println!("{:>4}  {:<20} {:<20} {:<20} {:<20}", "#", "train_start", "train_end", "test_start", "test_end");
    for w in &windows {
        println!(
            "{:>4}  {:<20} {:<20} {:<20} {:<20}",
            w.index,
            w.train_start.format("%Y-%m-%d %H:%M"),
            w.train_end.format("%Y-%m-%d %H:%M"),
            w.test_start.format("%Y-%m-%d %H:%M"),
            w.test_end.format("%Y-%m-%d %H:%M"),
        );
    }
    println!("{} windows ({})", windows.len(), config.window_type);
    Ok(())
}

// ─── backtest ────────────────────────────────────────────────────────

/// `name=value`; ints, floats and bools are recognised, anything else is a
/// categorical string.
fn parse_param(raw: &str) -> Result<(String, ParamValue)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("expected NAME=VALUE, got `{raw}`");
    };
    let value = value.trim();
    let parsed = if let Ok(i) = value.parse::<i64>() {
        ParamValue::Int(i)
    } else if let Ok(f) = value.parse::<f64>() {
        ParamValue::Float(f)
    } else if let Ok(b) = value.parse::<bool>() {
        ParamValue::Bool(b)
    } else {
        ParamValue::from(value)
    };
    Ok((name.trim().to_string(), parsed))
}

fn run_backtest_cmd(
    data: PathBuf,
    raw_params: &[String],
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    settings: SimulationSettings,
) -> Result<()> {
    let params: ParameterSet = raw_params
        .iter()
        .map(|raw| parse_param(raw))
        .collect::<Result<_>>()?;
    let typed = StrategyParams::from_parameter_set(&params)?;

    let series = match (start, end) {
        (None, None) => load_candles_csv(&data)?,
        (start, end) => load_candles_in_range(
            &data,
            start.unwrap_or(DateTime::<Utc>::MIN_UTC),
            end.unwrap_or(DateTime::<Utc>::MAX_UTC),
        )?,
    };

    let result = simulate(series.candles(), &typed, &settings)?;
    let m = Metrics::compute(&result.trades, &result.equity, settings.initial_balance);

    println!();
    println!("=== Backtest Result ===");
    println!("Params:         {}", typed.to_parameter_set());
    println!(
        "Period:         {} to {} ({} candles)",
        series.first_time(),
        series.last_time(),
        series.len()
    );
    println!("Trades:         {}", m.total_trades);
    println!("Final Balance:  {:.2}", m.final_balance);
    println!("Total Return:   {:.2}%", m.total_return_pct);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    match m.profit_factor {
        Some(pf) => println!("Profit Factor:  {pf:.2}"),
        None => println!("Profit Factor:  n/a"),
    }
    println!("Max Drawdown:   {:.2}%", m.max_drawdown_pct);
    println!("Sharpe-like:    {:.3}", m.sharpe_like_ratio);
    println!("Robust Score:   {:.3}", m.robust_score);
    if let Some(open) = &result.open_trade {
        println!(
            "Open {} from {:.4} (unrealized {:.2})",
            open.side, open.entry_price, open.unrealized_pnl_usd
        );
    }
    Ok(())
}
