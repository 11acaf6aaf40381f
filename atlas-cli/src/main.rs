//! ATLAS CLI — pull terminal history for ticker universes into xlsx workbooks.
//!
//! One workbook per universe: a `parameters` sheet, one sheet per configured
//! field, plus `benchmark` and `failures` sheets when relevant.

use anyhow::{Context, Result};
use atlas_core::config::{TEST_MODE_BATCH_SIZE, TEST_MODE_TICKERS};
use atlas_core::{
    load_config, load_universe, AtlasConfig, DataTerminal, HttpTerminal, LogProgress,
    PlanOverrides, FAILED_TICKERS_LOGGED,
};
use atlas_runner::{run_universe, FieldSummary, RunMode, RunOutcome, RunSummary};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "atlas",
    version,
    about = "ATLAS — extract terminal time series for ticker universes into xlsx"
)]
struct Cli {
    /// Path to the YAML config file.
    #[arg(long, default_value = "config/atlas_config.yaml")]
    config: PathBuf,

    /// Universe to extract (repeatable). Defaults to the config's default universe.
    #[arg(long = "universe", value_name = "NAME")]
    universes: Vec<String>,

    /// Override the start date (YYYY-MM-DD).
    #[arg(long, value_name = "YYYY-MM-DD")]
    start_date: Option<NaiveDate>,

    /// Override the end date (YYYY-MM-DD).
    #[arg(long, value_name = "YYYY-MM-DD")]
    end_date: Option<NaiveDate>,

    /// Use today as the end date.
    #[arg(long, default_value_t = false, conflicts_with = "end_date")]
    today: bool,

    /// Show the run plan without contacting the terminal.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Test mode: first 5 tickers, batch size 2, `_test` output file.
    #[arg(long, default_value_t = false)]
    test: bool,

    /// Log verbosity.
    #[arg(long, value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warning => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

impl Cli {
    fn overrides(&self) -> PlanOverrides {
        PlanOverrides {
            start_date: self.start_date,
            end_date: self.end_date,
            today: self.today,
            test_mode: self.test,
        }
    }

    fn mode(&self) -> RunMode {
        if self.dry_run {
            RunMode::DryRun
        } else {
            RunMode::Live
        }
    }
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.into())
        .format_timestamp_secs()
        .init();

    match run(&cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            log::error!("{e:#}");
            std::process::exit(1);
        }
    }
}

/// Run every requested universe. `Ok(false)` when at least one of them failed.
fn run(cli: &Cli) -> Result<bool> {
    let config = load_config(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;

    let universes = if cli.universes.is_empty() {
        vec![config.default_universe.clone()]
    } else {
        cli.universes.clone()
    };

    let terminal = HttpTerminal::new(
        &config.terminal.endpoint,
        Duration::from_secs(config.terminal.timeout_secs),
    )
    .context("creating terminal client")?;

    if cli.test {
        log::info!(
            "Test mode: first {TEST_MODE_TICKERS} tickers, batch size {TEST_MODE_BATCH_SIZE}"
        );
    }

    let today = chrono::Local::now().date_naive();
    let mut completed = Vec::new();
    let mut failed = Vec::new();

    for name in &universes {
        match run_one(&config, name, cli, &terminal, today) {
            Ok(RunOutcome::DryRun(plan)) => {
                println!("[dry-run] {name}");
                println!("{plan}");
                println!();
            }
            Ok(RunOutcome::Completed(summary)) => completed.push(summary),
            Err(e) => {
                log::error!("Universe {name} failed: {e:#}");
                failed.push(name.clone());
            }
        }
    }

    for summary in &completed {
        print_summary(summary);
    }
    if !failed.is_empty() {
        println!("Failed universes: {}", failed.join(", "));
    }

    Ok(failed.is_empty())
}

fn run_one(
    config: &AtlasConfig,
    name: &str,
    cli: &Cli,
    terminal: &dyn DataTerminal,
    today: NaiveDate,
) -> Result<RunOutcome> {
    let name = config.resolve_universe(Some(name))?;
    let universe = load_universe(&config.tickers_dir, &name)
        .with_context(|| format!("loading universe {name}"))?;
    log::info!("Loaded {} tickers for {name}", universe.len());

    let plan = config.plan(universe, cli.overrides(), today)?;
    let outcome = run_universe(&plan, terminal, &LogProgress, cli.mode())
        .with_context(|| format!("running universe {name}"))?;
    Ok(outcome)
}

fn print_summary(summary: &RunSummary) {
    println!("=== {} ===", summary.universe);
    for field in &summary.fields {
        println!(
            "  {:<20} {:<24} {:>5} resolved  {:>5} failed",
            field.sheet, field.code, field.resolved, field.failed
        );
        if let Some(line) = skipped_line(field) {
            println!("    skipped: {line}");
        }
    }
    if summary.benchmark_written {
        println!("  benchmark sheet written");
    }
    println!("  fingerprint: {}", summary.fingerprint);
    println!("  output: {}", summary.output_path.display());
}

/// Failed tickers of one field, truncated after `FAILED_TICKERS_LOGGED` names.
fn skipped_line(field: &FieldSummary) -> Option<String> {
    if field.failed_tickers.is_empty() {
        return None;
    }
    let shown: Vec<&str> = field
        .failed_tickers
        .iter()
        .take(FAILED_TICKERS_LOGGED)
        .map(String::as_str)
        .collect();
    let more = if field.failed_tickers.len() > FAILED_TICKERS_LOGGED {
        "..."
    } else {
        ""
    };
    Some(format!("{}{more}", shown.join(", ")))
}
