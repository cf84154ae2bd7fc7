//! Reporting and export — JSON, CSV, and Markdown artifacts for a
//! walk-forward run.
//!
//! - **JSON**: the full `WalkForwardResult`, schema-versioned
//! - **CSV**: one flat row per window, the stitched test trade tape, and the
//!   stitched equity curve
//! - **Markdown**: a human-readable summary
//!
//! Unknown schema versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use walkforge_core::{EquityPoint, ParameterSet};

use crate::walk_forward::{WalkForwardResult, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(result: &WalkForwardResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize WalkForwardResult to JSON")
}

/// Deserialize a `WalkForwardResult`, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<WalkForwardResult> {
    let result: WalkForwardResult =
        serde_json::from_str(json).context("failed to deserialize WalkForwardResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

fn opt(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{v:.precision$}"))
        .unwrap_or_default()
}

fn params_cell(params: Option<&ParameterSet>) -> String {
    params.map(ToString::to_string).unwrap_or_default()
}

/// One row per window, with the test-slice metrics flattened into columns.
pub fn export_windows_csv(result: &WalkForwardResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "window",
        "train_start",
        "train_end",
        "test_start",
        "test_end",
        "disqualified",
        "disqualify_reason",
        "best_params",
        "train_objective",
        "test_objective",
        "train_trades",
        "test_trades",
        "test_return_pct",
        "test_win_rate",
        "test_profit_factor",
        "test_max_drawdown_pct",
        "test_sharpe_like_ratio",
        "test_robust_score",
        "candidates_evaluated",
        "candidates_disqualified",
        "candidates_skipped",
    ])?;

    for w in &result.windows {
        let m = &w.test_metrics;
        wtr.write_record([
            &w.window.index.to_string(),
            &w.window.train_start.to_rfc3339(),
            &w.window.train_end.to_rfc3339(),
            &w.window.test_start.to_rfc3339(),
            &w.window.test_end.to_rfc3339(),
            &w.disqualified.to_string(),
            w.disqualify_reason.as_deref().unwrap_or(""),
            &params_cell(w.best_params.as_ref()),
            &opt(w.train_objective, 6),
            &opt(w.test_objective, 6),
            &w.train_metrics
                .as_ref()
                .map(|t| t.total_trades.to_string())
                .unwrap_or_default(),
            &w.test_trade_count.to_string(),
            &format!("{:.4}", m.total_return_pct),
            &format!("{:.4}", m.win_rate),
            &opt(m.profit_factor, 4),
            &format!("{:.4}", m.max_drawdown_pct),
            &format!("{:.6}", m.sharpe_like_ratio),
            &format!("{:.4}", m.robust_score),
            &w.candidates_evaluated.to_string(),
            &w.candidates_disqualified.to_string(),
            &w.candidates_skipped.to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Every test-slice trade, tagged with its window index.
pub fn export_trades_csv(result: &WalkForwardResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "window",
        "side",
        "entry_time",
        "entry_price",
        "exit_time",
        "exit_price",
        "quantity",
        "exit_reason",
        "fee",
        "pnl_usd",
        "pnl_pct",
        "candles_held",
    ])?;

    for w in &result.windows {
        for t in &w.test_trades {
            wtr.write_record([
                &w.window.index.to_string(),
                &t.side.to_string(),
                &t.entry_time.to_rfc3339(),
                &format!("{:.6}", t.entry_price),
                &t.exit_time.to_rfc3339(),
                &format!("{:.6}", t.exit_price),
                &format!("{:.8}", t.quantity),
                &t.exit_reason.to_string(),
                &format!("{:.4}", t.fee),
                &format!("{:.4}", t.pnl_usd),
                &format!("{:.4}", t.pnl_pct),
                &t.candles_held.to_string(),
            ])?;
        }
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_equity_csv(equity: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["time", "balance"])?;
    for point in equity {
        wtr.write_record([
            &point.time.to_rfc3339(),
            &format!("{:.2}", point.cumulative_balance),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a run.
///
/// Creates `{symbol}_{fingerprint prefix}/` under `output_dir` containing
/// `result.json`, `windows.csv`, `trades.csv` and `equity.csv`. Returns the
/// created directory.
pub fn save_artifacts(result: &WalkForwardResult, output_dir: &Path) -> Result<PathBuf> {
    let prefix: String = result.config_fingerprint.chars().take(12).collect();
    let run_dir = output_dir.join(format!("{}_{prefix}", dir_component(&result.symbol)));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let files = [
        ("result.json", export_json(result)?),
        ("windows.csv", export_windows_csv(result)?),
        ("trades.csv", export_trades_csv(result)?),
        ("equity.csv", export_equity_csv(&result.summary.equity)?),
    ];
    for (name, content) in files {
        let path = run_dir.join(name);
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(run_dir)
}

/// A symbol reduced to one safe path component: anything but ASCII
/// alphanumerics, `-` and `_` becomes `_`.
fn dir_component(symbol: &str) -> String {
    symbol
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Load a result back from an artifact directory.
pub fn load_artifacts(dir: &Path) -> Result<WalkForwardResult> {
    let path = dir.join("result.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

// ─── Markdown report ────────────────────────────────────────────────

pub fn generate_report(result: &WalkForwardResult) -> String {
    let mut md = String::with_capacity(2048);
    let s = &result.summary;

    md.push_str("# Walk-Forward Report\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Symbol | {} |\n", result.symbol));
    md.push_str(&format!("| Strategy | {} |\n", result.strategy));
    md.push_str(&format!("| Metric | {} |\n", result.metric));
    md.push_str(&format!("| Status | {} |\n", result.status));
    md.push_str(&format!(
        "| Windows | {} of {} ({} disqualified) |\n",
        result.windows.len(),
        result.total_windows,
        s.disqualified_windows
    ));
    md.push('\n');

    let m = &s.overall_metrics;
    md.push_str("## Out-of-Sample Performance\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Total Return | {:.2}% |\n", m.total_return_pct));
    md.push_str(&format!("| Trades | {} |\n", m.total_trades));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", m.win_rate * 100.0));
    md.push_str(&format!(
        "| Profit Factor | {} |\n",
        m.profit_factor.map(|p| format!("{p:.2}")).unwrap_or_else(|| "n/a".into())
    ));
    md.push_str(&format!("| Max Drawdown | {:.2}% |\n", m.max_drawdown_pct));
    md.push_str(&format!("| Sharpe-like | {:.3} |\n", m.sharpe_like_ratio));
    md.push_str(&format!(
        "| Median Window Return | {:.2}% |\n",
        s.test_stats.total_return_pct.median
    ));
    md.push('\n');

    md.push_str("## Overfitting\n\n");
    md.push_str(&format!(
        "- Sign flips (train vs test): {} of {} windows\n",
        s.overfit_windows, s.qualifying_windows
    ));
    md.push_str(&format!(
        "- Mean objective: train {:.3}, test {:.3}\n",
        s.mean_train_objective, s.mean_test_objective
    ));
    match s.degradation_ratio {
        Some(ratio) => md.push_str(&format!(
            "- Degradation: {ratio:.3} ({:?})\n",
            s.degradation_flag
        )),
        None => md.push_str(&format!("- Degradation: n/a ({:?})\n", s.degradation_flag)),
    }
    if let Some(risk) = s.overfitting_risk {
        md.push_str(&format!("- Risk: **{risk:?}**\n"));
    }
    md.push('\n');

    md.push_str("## Windows\n\n");
    md.push_str("| # | Test Start | Params | Train | Test | Trades |\n");
    md.push_str("| --- | --- | --- | --- | --- | --- |\n");
    for w in &result.windows {
        let params = if w.disqualified {
            "*disqualified*".to_string()
        } else {
            params_cell(w.best_params.as_ref())
        };
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            w.window.index,
            w.window.test_start.format("%Y-%m-%d"),
            params,
            opt(w.train_objective, 3),
            opt(w.test_objective, 3),
            w.test_trade_count,
        ));
    }

    md
}
