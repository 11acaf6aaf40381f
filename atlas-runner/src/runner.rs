//! Universe runner: plan → terminal check → extraction per field → benchmark
//! → alignment → workbook.

use std::path::PathBuf;

use thiserror::Error;

use atlas_core::{
    extract, DataTerminal, ExtractionContext, ExtractionProgress, FieldSpec, RequestError,
    RunPlan, TerminalError, TimeSeries,
};

use crate::report::{benchmark_sheet, FieldExtraction, Report, SeriesSheet};
use crate::xlsx::{write_report, ReportError};

/// Errors that stop a universe run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("terminal '{0}' is not reachable")]
    TerminalUnavailable(String),
    #[error("invalid extraction request: {0}")]
    Request(#[from] RequestError),
    #[error("no data extracted for universe '{0}'")]
    NoData(String),
    #[error("report error: {0}")]
    Report(#[from] ReportError),
}

/// Whether a run talks to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Render the plan only, no terminal calls.
    DryRun,
    Live,
}

/// Counts for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSummary {
    pub sheet: String,
    pub code: String,
    pub resolved: usize,
    pub failed: usize,
    /// Skipped tickers, in universe order.
    pub failed_tickers: Vec<String>,
}

/// What a live run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub universe: String,
    pub output_path: PathBuf,
    pub fields: Vec<FieldSummary>,
    /// Field sheets actually written (empty ones are skipped).
    pub sheets_written: usize,
    pub benchmark_written: bool,
    pub fingerprint: String,
}

impl RunSummary {
    pub fn total_failed(&self) -> usize {
        self.fields.iter().map(|f| f.failed).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The rendered plan.
    DryRun(String),
    Completed(RunSummary),
}

/// Run one universe end to end.
pub fn run_universe(
    plan: &RunPlan,
    terminal: &dyn DataTerminal,
    progress: &dyn ExtractionProgress,
    mode: RunMode,
) -> Result<RunOutcome, RunError> {
    if mode == RunMode::DryRun {
        return Ok(RunOutcome::DryRun(plan.to_string()));
    }

    if !terminal.is_available() {
        return Err(RunError::TerminalUnavailable(terminal.name().to_string()));
    }

    let fingerprint = plan.fingerprint();
    log::info!(
        "Universe {}: {} tickers, {} fields, {} to {} (plan {})",
        plan.universe,
        plan.tickers.len(),
        plan.fields.len(),
        plan.start,
        plan.end,
        fingerprint.short()
    );

    let ctx = plan.extraction_context(progress);
    let mut extractions = Vec::with_capacity(plan.fields.len());
    for field in &plan.fields {
        log::info!("Extracting field: {} -> sheet '{}'", field.code, field.sheet);
        let request = plan.request(field)?;
        let result = extract(terminal, &request, &ctx);
        extractions.push(FieldExtraction {
            field: field.clone(),
            result,
        });
    }

    let benchmark = plan
        .benchmark
        .as_deref()
        .map(|symbol| fetch_benchmark(terminal, plan, symbol, &ctx));

    let report = Report::build(plan, &extractions, benchmark);
    if !report.has_data() {
        return Err(RunError::NoData(plan.universe.clone()));
    }

    log::info!("Writing {}", plan.output_path.display());
    write_report(&report, &plan.output_path)?;

    Ok(RunOutcome::Completed(RunSummary {
        universe: plan.universe.clone(),
        output_path: plan.output_path.clone(),
        fields: extractions
            .iter()
            .map(|e| FieldSummary {
                sheet: e.field.sheet.clone(),
                code: e.field.code.clone(),
                resolved: e.result.resolved_count(),
                failed: e.result.failed_count(),
                failed_tickers: plan
                    .tickers
                    .iter()
                    .filter(|t| e.result.failure(t).is_some())
                    .cloned()
                    .collect(),
            })
            .collect(),
        sheets_written: report.sheets.len(),
        benchmark_written: report.benchmark.is_some(),
        fingerprint: fingerprint.to_string(),
    }))
}

/// Every field for the benchmark symbol, one request each. Failures are logged, never fatal.
fn fetch_benchmark(
    terminal: &dyn DataTerminal,
    plan: &RunPlan,
    symbol: &str,
    ctx: &ExtractionContext<'_>,
) -> SeriesSheet {
    log::info!("Extracting benchmark {symbol}");
    let symbols = [symbol.to_string()];

    let series: Vec<(FieldSpec, Option<TimeSeries>)> = plan
        .fields
        .iter()
        .map(|field| {
            let found = match terminal.fetch_series(
                &symbols,
                &field.code,
                plan.start,
                plan.end,
                ctx.options,
            ) {
                Ok(mut batch) => batch.remove(symbol).filter(|s| !s.is_empty()),
                Err(e) => {
                    log_benchmark_failure(symbol, field, &e);
                    return (field.clone(), None);
                }
            };
            if found.is_none() {
                log::warn!("  benchmark {symbol}: no data for {}", field.code);
            }
            (field.clone(), found)
        })
        .collect();

    benchmark_sheet(&series)
}

fn log_benchmark_failure(symbol: &str, field: &FieldSpec, error: &TerminalError) {
    log::warn!("  benchmark {symbol}: {} failed: {error}", field.code);
}
