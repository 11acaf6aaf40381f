//! Data terminal trait and the normalized error it reports.
//!
//! The `DataTerminal` trait abstracts over the market-data terminal so the
//! extraction engine can run against the HTTP gateway in production and a
//! scripted terminal in tests. Every client failure is mapped onto
//! `TerminalError` here, at the boundary.

use crate::domain::TimeSeries;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Series returned by one terminal request, keyed by terminal symbol.
pub type SeriesBatch = HashMap<String, TimeSeries>;

/// Extra request options forwarded verbatim to the terminal (e.g. `Per: D`).
pub type TerminalOptions = BTreeMap<String, serde_json::Value>;

/// Structured failure of a terminal request.
///
/// The extraction engine treats every variant alike; the distinction only
/// matters for the messages that end up in logs and the failures sheet.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TerminalError {
    #[error("terminal unreachable: {0}")]
    Unreachable(String),

    #[error("rate limited by terminal (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("terminal error: {0}")]
    Other(String),
}

/// Trait for market-data terminals.
///
/// Implementations issue one historical-data request per call and do not
/// retry; resilience belongs to the extraction engine.
pub trait DataTerminal: Send + Sync {
    /// Human-readable name of this terminal.
    fn name(&self) -> &str;

    /// Fetch one field for a group of terminal symbols over an inclusive date range.
    ///
    /// Symbols without data may be absent from the returned batch.
    fn fetch_series(
        &self,
        symbols: &[String],
        field: &str,
        start: NaiveDate,
        end: NaiveDate,
        options: &TerminalOptions,
    ) -> Result<SeriesBatch, TerminalError>;

    /// Connectivity probe, checked once before a live run starts.
    fn is_available(&self) -> bool;
}
