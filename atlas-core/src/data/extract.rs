//! Tiered extraction: batch request, per-ticker fallback, then skip.
//!
//! For one field the engine walks the universe in fixed-size batches:
//! 1. One bulk request per batch.
//! 2. If the bulk request fails, every ticker in that batch is requested alone.
//! 3. If the single request fails too, the ticker is recorded as failed.
//!
//! No ticker is attempted a third time and no failure aborts the field.
//! Every requested ticker ends up either resolved or failed, never both.

use super::terminal::{DataTerminal, TerminalError, TerminalOptions};
use crate::domain::TimeSeries;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Largest number of tickers sent in one bulk request.
pub const MAX_BATCH_SIZE: usize = 250;

/// How many failed tickers the field summary names before truncating.
pub const FAILED_TICKERS_LOGGED: usize = 20;

static NO_OPTIONS: TerminalOptions = TerminalOptions::new();

/// Errors from building an extraction request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("extraction request for '{field}' has no tickers")]
    NoTickers { field: String },

    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error("ticker '{ticker}' appears more than once")]
    DuplicateTicker { ticker: String },
}

/// One field over one universe and date range. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    universe: String,
    field: String,
    tickers: Vec<String>,
    start: NaiveDate,
    end: NaiveDate,
}

impl ExtractionRequest {
    pub fn new(
        universe: impl Into<String>,
        field: impl Into<String>,
        tickers: Vec<String>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, RequestError> {
        let field = field.into();
        if tickers.is_empty() {
            return Err(RequestError::NoTickers { field });
        }
        if start > end {
            return Err(RequestError::InvertedRange { start, end });
        }
        let mut seen = HashSet::with_capacity(tickers.len());
        if let Some(dup) = tickers.iter().find(|t| !seen.insert(t.as_str())) {
            return Err(RequestError::DuplicateTicker {
                ticker: dup.clone(),
            });
        }

        Ok(Self {
            universe: universe.into(),
            field,
            tickers,
            start,
            end,
        })
    }

    pub fn universe(&self) -> &str {
        &self.universe
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }
}

/// Why a ticker could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The terminal request for this ticker errored.
    Rejected(String),
    /// The terminal answered but had no observations for this ticker.
    NoData,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Rejected(msg) => write!(f, "request failed: {msg}"),
            FailureReason::NoData => write!(f, "no data"),
        }
    }
}

/// Resolved series plus the tickers that could not be resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult {
    series: HashMap<String, TimeSeries>,
    failed: BTreeMap<String, FailureReason>,
}

impl ExtractionResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resolved ticker, clearing any earlier failure for it.
    pub fn insert_series(&mut self, ticker: impl Into<String>, series: TimeSeries) {
        let ticker = ticker.into();
        self.failed.remove(&ticker);
        self.series.insert(ticker, series);
    }

    /// Record a failed ticker, clearing any earlier series for it.
    pub fn insert_failure(&mut self, ticker: impl Into<String>, reason: FailureReason) {
        let ticker = ticker.into();
        self.series.remove(&ticker);
        self.failed.insert(ticker, reason);
    }

    pub fn series(&self) -> &HashMap<String, TimeSeries> {
        &self.series
    }

    pub fn get(&self, ticker: &str) -> Option<&TimeSeries> {
        self.series.get(ticker)
    }

    pub fn failed(&self) -> &BTreeMap<String, FailureReason> {
        &self.failed
    }

    pub fn failure(&self, ticker: &str) -> Option<&FailureReason> {
        self.failed.get(ticker)
    }

    pub fn resolved_count(&self) -> usize {
        self.series.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// True when no ticker failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn has_data(&self) -> bool {
        !self.series.is_empty()
    }
}

/// Observer for extraction events.
///
/// Passed explicitly through `ExtractionContext` so the engine never reaches
/// for global state and tests can capture exactly what was reported.
pub trait ExtractionProgress {
    /// Called before the bulk request for a batch (1-based `batch`).
    fn on_batch_start(&self, field: &str, batch: usize, total: usize, size: usize);

    /// Called when a bulk request fails, before the per-ticker fallback.
    fn on_batch_failed(&self, field: &str, batch: usize, error: &TerminalError);

    /// Called once for every ticker recorded as failed.
    fn on_ticker_failed(&self, field: &str, ticker: &str, reason: &FailureReason);

    /// Called when the whole field is done.
    fn on_field_complete(&self, field: &str, result: &ExtractionResult);
}

/// Progress reporter that writes through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ExtractionProgress for LogProgress {
    fn on_batch_start(&self, field: &str, batch: usize, total: usize, size: usize) {
        log::info!("  {field}: batch {batch}/{total} ({size} tickers)");
    }

    fn on_batch_failed(&self, field: &str, batch: usize, error: &TerminalError) {
        log::error!("  {field}: batch {batch} failed: {error}");
        log::info!("  {field}: falling back to per-ticker extraction for batch {batch}");
    }

    fn on_ticker_failed(&self, field: &str, ticker: &str, reason: &FailureReason) {
        log::warn!("    {field}: {ticker} failed ({reason})");
    }

    fn on_field_complete(&self, field: &str, result: &ExtractionResult) {
        log::info!(
            "  {field}: {} tickers resolved, {} failed",
            result.resolved_count(),
            result.failed_count()
        );
        if !result.is_complete() {
            let names: Vec<&str> = result
                .failed()
                .keys()
                .take(FAILED_TICKERS_LOGGED)
                .map(String::as_str)
                .collect();
            let more = if result.failed_count() > FAILED_TICKERS_LOGGED {
                "..."
            } else {
                ""
            };
            log::warn!(
                "  {} tickers failed for {field}: {}{more}",
                result.failed_count(),
                names.join(", ")
            );
        }
    }
}

/// Settings and observer shared by every request of an extraction.
#[derive(Clone, Copy)]
pub struct ExtractionContext<'a> {
    /// Tickers per bulk request; clamped to `1..=MAX_BATCH_SIZE`.
    pub batch_size: usize,
    /// Appended to each ticker to form the terminal symbol.
    pub ticker_suffix: &'a str,
    /// Forwarded with every request.
    pub options: &'a TerminalOptions,
    pub progress: &'a dyn ExtractionProgress,
}

impl<'a> ExtractionContext<'a> {
    pub fn new(progress: &'a dyn ExtractionProgress) -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            ticker_suffix: "",
            options: &NO_OPTIONS,
            progress,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_ticker_suffix(mut self, suffix: &'a str) -> Self {
        self.ticker_suffix = suffix;
        self
    }

    pub fn with_options(mut self, options: &'a TerminalOptions) -> Self {
        self.options = options;
        self
    }

    /// Batch size actually used by the engine.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }
}

impl fmt::Debug for ExtractionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionContext")
            .field("batch_size", &self.batch_size)
            .field("ticker_suffix", &self.ticker_suffix)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Number of bulk requests needed for `tickers` tickers.
pub fn batch_count(tickers: usize, batch_size: usize) -> usize {
    tickers.div_ceil(batch_size.clamp(1, MAX_BATCH_SIZE))
}

/// Extract one field for every ticker in `request`.
pub fn extract(
    terminal: &dyn DataTerminal,
    request: &ExtractionRequest,
    ctx: &ExtractionContext<'_>,
) -> ExtractionResult {
    let field = request.field();
    let batch_size = ctx.effective_batch_size();
    let total = batch_count(request.tickers().len(), batch_size);
    let mut result = ExtractionResult::new();

    for (i, batch) in request.tickers().chunks(batch_size).enumerate() {
        let batch_num = i + 1;
        ctx.progress.on_batch_start(field, batch_num, total, batch.len());

        let symbols: Vec<String> = batch
            .iter()
            .map(|t| terminal_symbol(t, ctx.ticker_suffix))
            .collect();

        let bulk = terminal.fetch_series(
            &symbols,
            field,
            request.start(),
            request.end(),
            ctx.options,
        );

        match bulk {
            Ok(mut returned) => {
                for (ticker, symbol) in batch.iter().zip(&symbols) {
                    match returned.remove(symbol) {
                        Some(series) if !series.is_empty() => {
                            result.insert_series(ticker.clone(), series)
                        }
                        _ => fail(&mut result, ctx, field, ticker, FailureReason::NoData),
                    }
                }
                if !returned.is_empty() {
                    let mut extra: Vec<&String> = returned.keys().collect();
                    extra.sort();
                    log::debug!("  {field}: ignoring unrequested symbols {extra:?}");
                }
            }
            Err(err) => {
                ctx.progress.on_batch_failed(field, batch_num, &err);
                for (ticker, symbol) in batch.iter().zip(&symbols) {
                    match fetch_single(terminal, symbol, request, ctx) {
                        Ok(series) => result.insert_series(ticker.clone(), series),
                        Err(reason) => fail(&mut result, ctx, field, ticker, reason),
                    }
                }
            }
        }
    }

    ctx.progress.on_field_complete(field, &result);
    result
}

/// Request a single symbol; an empty answer counts as `NoData`.
fn fetch_single(
    terminal: &dyn DataTerminal,
    symbol: &str,
    request: &ExtractionRequest,
    ctx: &ExtractionContext<'_>,
) -> Result<TimeSeries, FailureReason> {
    let symbols = [symbol.to_string()];
    let mut returned = terminal
        .fetch_series(
            &symbols,
            request.field(),
            request.start(),
            request.end(),
            ctx.options,
        )
        .map_err(|e| FailureReason::Rejected(e.to_string()))?;

    match returned.remove(symbol) {
        Some(series) if !series.is_empty() => Ok(series),
        _ => Err(FailureReason::NoData),
    }
}

fn fail(
    result: &mut ExtractionResult,
    ctx: &ExtractionContext<'_>,
    field: &str,
    ticker: &str,
    reason: FailureReason,
) {
    ctx.progress.on_ticker_failed(field, ticker, &reason);
    result.insert_failure(ticker, reason);
}

fn terminal_symbol(ticker: &str, suffix: &str) -> String {
    format!("{ticker}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::terminal::SeriesBatch;
    use crate::domain::Observation;
    use std::cell::RefCell;
    use std::sync::Mutex;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn series(value: f64) -> TimeSeries {
        TimeSeries::new(vec![
            Observation::new(d("2024-01-02"), value),
            Observation::new(d("2024-01-03"), value + 1.0),
        ])
    }

    /// Terminal that fails bulk requests above one symbol and any symbol in `bad`.
    struct FlakyTerminal {
        bad: Vec<&'static str>,
        empty: Vec<&'static str>,
        fail_bulk: bool,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl FlakyTerminal {
        fn new(fail_bulk: bool, bad: Vec<&'static str>) -> Self {
            Self {
                bad,
                empty: Vec::new(),
                fail_bulk,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl DataTerminal for FlakyTerminal {
        fn name(&self) -> &str {
            "flaky"
        }

        fn fetch_series(
            &self,
            symbols: &[String],
            _field: &str,
            _start: NaiveDate,
            _end: NaiveDate,
            _options: &TerminalOptions,
        ) -> Result<SeriesBatch, TerminalError> {
            self.calls.lock().unwrap().push(symbols.to_vec());
            if self.fail_bulk && symbols.len() > 1 {
                return Err(TerminalError::RateLimited {
                    retry_after_secs: 60,
                });
            }
            if symbols.iter().any(|s| self.bad.contains(&s.as_str())) {
                return Err(TerminalError::Rejected("unknown security".into()));
            }
            Ok(symbols
                .iter()
                .filter(|s| !self.empty.contains(&s.as_str()))
                .enumerate()
                .map(|(i, s)| (s.clone(), series(i as f64)))
                .collect())
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<String>>,
    }

    impl ExtractionProgress for Recorder {
        fn on_batch_start(&self, _field: &str, batch: usize, total: usize, size: usize) {
            self.events
                .borrow_mut()
                .push(format!("start {batch}/{total} ({size})"));
        }

        fn on_batch_failed(&self, _field: &str, batch: usize, _error: &TerminalError) {
            self.events.borrow_mut().push(format!("batch-failed {batch}"));
        }

        fn on_ticker_failed(&self, _field: &str, ticker: &str, _reason: &FailureReason) {
            self.events.borrow_mut().push(format!("ticker-failed {ticker}"));
        }

        fn on_field_complete(&self, _field: &str, result: &ExtractionResult) {
            self.events
                .borrow_mut()
                .push(format!("complete {}", result.failed_count()));
        }
    }

    fn tickers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn request(names: &[&str]) -> ExtractionRequest {
        ExtractionRequest::new(
            "test",
            "PX_LAST",
            tickers(names),
            d("2024-01-01"),
            d("2024-01-31"),
        )
        .unwrap()
    }

    #[test]
    fn request_rejects_empty_inverted_and_duplicate() {
        let start = d("2024-01-01");
        let end = d("2024-01-31");
        assert!(matches!(
            ExtractionRequest::new("u", "PX_LAST", vec![], start, end),
            Err(RequestError::NoTickers { .. })
        ));
        assert!(matches!(
            ExtractionRequest::new("u", "PX_LAST", tickers(&["A"]), end, start),
            Err(RequestError::InvertedRange { .. })
        ));
        assert_eq!(
            ExtractionRequest::new("u", "PX_LAST", tickers(&["A", "B", "A"]), start, end),
            Err(RequestError::DuplicateTicker {
                ticker: "A".into()
            })
        );
    }

    #[test]
    fn single_day_range_is_valid() {
        let day = d("2024-01-02");
        assert!(ExtractionRequest::new("u", "PX_LAST", tickers(&["A"]), day, day).is_ok());
    }

    #[test]
    fn healthy_batch_resolves_every_ticker_in_one_call() {
        let terminal = FlakyTerminal::new(false, vec![]);
        let progress = Recorder::default();
        let ctx = ExtractionContext::new(&progress);

        let result = extract(&terminal, &request(&["A", "B", "C"]), &ctx);

        assert_eq!(terminal.calls().len(), 1);
        assert_eq!(result.resolved_count(), 3);
        assert!(result.is_complete());
        assert_eq!(
            *progress.events.borrow(),
            vec!["start 1/1 (3)".to_string(), "complete 0".to_string()]
        );
    }

    #[test]
    fn failed_batch_falls_back_to_each_ticker() {
        let terminal = FlakyTerminal::new(true, vec!["B"]);
        let progress = Recorder::default();
        let ctx = ExtractionContext::new(&progress);

        let result = extract(&terminal, &request(&["A", "B", "C"]), &ctx);

        let calls = terminal.calls();
        assert_eq!(calls.len(), 4, "one bulk call plus three single calls");
        assert_eq!(calls[1], tickers(&["A"]));
        assert_eq!(calls[2], tickers(&["B"]));
        assert_eq!(calls[3], tickers(&["C"]));

        assert!(result.get("A").is_some());
        assert!(result.get("C").is_some());
        assert!(result.get("B").is_none());
        assert!(matches!(result.failure("B"), Some(FailureReason::Rejected(_))));
        assert_eq!(
            *progress.events.borrow(),
            vec![
                "start 1/1 (3)".to_string(),
                "batch-failed 1".to_string(),
                "ticker-failed B".to_string(),
                "complete 1".to_string(),
            ]
        );
    }

    #[test]
    fn suffix_is_sent_to_terminal_and_stripped_from_results() {
        let terminal = FlakyTerminal::new(false, vec![]);
        let progress = Recorder::default();
        let ctx = ExtractionContext::new(&progress).with_ticker_suffix(" Equity");

        let result = extract(&terminal, &request(&["SAP GY", "ASML NA"]), &ctx);

        assert_eq!(terminal.calls()[0], tickers(&["SAP GY Equity", "ASML NA Equity"]));
        assert!(result.get("SAP GY").is_some());
        assert!(result.get("ASML NA").is_some());
    }

    #[test]
    fn missing_from_successful_batch_is_no_data_without_retry() {
        let mut terminal = FlakyTerminal::new(false, vec![]);
        terminal.empty = vec!["B"];
        let progress = Recorder::default();
        let ctx = ExtractionContext::new(&progress);

        let result = extract(&terminal, &request(&["A", "B"]), &ctx);

        assert_eq!(terminal.calls().len(), 1);
        assert_eq!(result.failure("B"), Some(&FailureReason::NoData));
        assert!(!result.is_complete());
    }

    #[test]
    fn empty_single_answer_is_no_data() {
        let mut terminal = FlakyTerminal::new(true, vec![]);
        terminal.empty = vec!["B"];
        let progress = Recorder::default();
        let ctx = ExtractionContext::new(&progress);

        let result = extract(&terminal, &request(&["A", "B"]), &ctx);

        assert_eq!(terminal.calls().len(), 3);
        assert_eq!(result.failure("B"), Some(&FailureReason::NoData));
        assert!(result.get("A").is_some());
    }

    #[test]
    fn batches_respect_configured_size() {
        let terminal = FlakyTerminal::new(false, vec![]);
        let progress = Recorder::default();
        let ctx = ExtractionContext::new(&progress).with_batch_size(2);

        let result = extract(&terminal, &request(&["A", "B", "C", "D", "E"]), &ctx);

        let sizes: Vec<usize> = terminal.calls().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(result.resolved_count(), 5);
    }

    #[test]
    fn batch_size_is_clamped() {
        let progress = Recorder::default();
        let ctx = ExtractionContext::new(&progress).with_batch_size(10_000);
        assert_eq!(ctx.effective_batch_size(), MAX_BATCH_SIZE);
        let ctx = ctx.with_batch_size(0);
        assert_eq!(ctx.effective_batch_size(), 1);
        assert_eq!(batch_count(501, 250), 3);
        assert_eq!(batch_count(500, 250), 2);
    }

    #[test]
    fn insert_keeps_series_and_failures_disjoint() {
        let mut result = ExtractionResult::new();
        result.insert_failure("A", FailureReason::NoData);
        result.insert_series("A", series(1.0));
        assert!(result.failure("A").is_none());
        assert!(result.get("A").is_some());

        result.insert_failure("A", FailureReason::Rejected("boom".into()));
        assert!(result.get("A").is_none());
        assert_eq!(result.failed_count(), 1);
    }

    #[test]
    fn failure_reason_display() {
        assert_eq!(FailureReason::NoData.to_string(), "no data");
        assert_eq!(
            FailureReason::Rejected("terminal unreachable: x".into()).to_string(),
            "request failed: terminal unreachable: x"
        );
    }
}
