//! Run plan resolution: config + universe + CLI overrides → everything a run needs.

use super::{AtlasConfig, ConfigError};
use crate::data::extract::{
    batch_count, ExtractionContext, ExtractionProgress, ExtractionRequest, RequestError,
};
use crate::data::terminal::TerminalOptions;
use crate::data::universe::Universe;
use crate::domain::{FieldSpec, PlanFingerprint};
use chrono::NaiveDate;
use std::fmt;
use std::path::{Path, PathBuf};

/// Tickers kept in test mode.
pub const TEST_MODE_TICKERS: usize = 5;

/// Batch size forced in test mode.
pub const TEST_MODE_BATCH_SIZE: usize = 2;

/// Tickers shown in the dry-run preview.
const PREVIEW_TICKERS: usize = 10;

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanOverrides {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Force the end date to today, ignoring both config and `end_date`.
    pub today: bool,
    pub test_mode: bool,
}

/// Fully resolved inputs of one universe run. Built before any network call.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub universe: String,
    pub tickers: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub fields: Vec<FieldSpec>,
    pub output_path: PathBuf,
    pub batch_size: usize,
    pub ticker_suffix: String,
    pub options: TerminalOptions,
    pub parameters: Vec<(String, String)>,
    pub benchmark: Option<String>,
    pub align_to: Option<String>,
    pub test_mode: bool,
}

impl AtlasConfig {
    /// Resolve a run plan for an already loaded universe.
    ///
    /// End date precedence: `--today`, then `--end-date`, then the config, then `today`.
    pub fn plan(
        &self,
        universe: Universe,
        overrides: PlanOverrides,
        today: NaiveDate,
    ) -> Result<RunPlan, ConfigError> {
        let name = self.resolve_universe(Some(universe.name()))?;

        let start = overrides.start_date.unwrap_or(self.start_date);
        let end = if overrides.today {
            today
        } else {
            overrides.end_date.or(self.end_date).unwrap_or(today)
        };
        if start > end {
            return Err(ConfigError::InvertedRange { start, end });
        }

        let mut universe = universe;
        let mut output_path = self.output_path(&name);
        let mut batch_size = self.terminal.batch_size;
        if overrides.test_mode {
            universe.truncate(TEST_MODE_TICKERS);
            batch_size = TEST_MODE_BATCH_SIZE;
            output_path = test_output_path(&output_path);
        }

        Ok(RunPlan {
            benchmark: self.benchmarks.get(&name).cloned(),
            universe: name,
            tickers: universe.into_tickers(),
            start,
            end,
            fields: self.fields.clone(),
            output_path,
            batch_size,
            ticker_suffix: self.terminal.ticker_suffix.clone(),
            options: self.terminal.options.clone(),
            parameters: self.parameters.clone(),
            align_to: self.align_to.clone(),
            test_mode: overrides.test_mode,
        })
    }
}

/// `out/ATLAS_sxxr.xlsx` → `out/ATLAS_sxxr_test.xlsx`.
fn test_output_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_test.{}", ext.to_string_lossy()),
        None => format!("{stem}_test"),
    };
    path.with_file_name(name)
}

impl RunPlan {
    /// Number of bulk requests per field.
    pub fn batch_count(&self) -> usize {
        batch_count(self.tickers.len(), self.batch_size)
    }

    /// Extraction request for one field over this plan's tickers and dates.
    pub fn request(&self, field: &FieldSpec) -> Result<ExtractionRequest, RequestError> {
        ExtractionRequest::new(
            self.universe.clone(),
            field.code.clone(),
            self.tickers.clone(),
            self.start,
            self.end,
        )
    }

    /// Engine context carrying this plan's batch size, suffix and options.
    pub fn extraction_context<'a>(
        &'a self,
        progress: &'a dyn ExtractionProgress,
    ) -> ExtractionContext<'a> {
        ExtractionContext::new(progress)
            .with_batch_size(self.batch_size)
            .with_ticker_suffix(&self.ticker_suffix)
            .with_options(&self.options)
    }

    /// Deterministic hash of everything that decides what a run fetches and writes.
    pub fn fingerprint(&self) -> PlanFingerprint {
        let mut hasher = blake3::Hasher::new();
        let mut put = |label: &str, value: &str| {
            hasher.update(label.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        };

        put("universe", &self.universe);
        for ticker in &self.tickers {
            put("ticker", ticker);
        }
        put("start", &self.start.to_string());
        put("end", &self.end.to_string());
        for field in &self.fields {
            put(&format!("field:{}", field.sheet), &field.code);
        }
        put("output", &self.output_path.to_string_lossy());
        put("batch_size", &self.batch_size.to_string());
        put("ticker_suffix", &self.ticker_suffix);
        for (key, value) in &self.options {
            put(&format!("option:{key}"), &value.to_string());
        }
        for (key, value) in &self.parameters {
            put(&format!("param:{key}"), value);
        }
        put("benchmark", self.benchmark.as_deref().unwrap_or(""));
        put("align_to", self.align_to.as_deref().unwrap_or(""));
        put("test_mode", if self.test_mode { "true" } else { "false" });

        PlanFingerprint::from_hash(hasher.finalize())
    }

    /// Key/value rows for the `parameters` sheet, in display order.
    pub fn parameter_rows(&self) -> Vec<(String, String)> {
        let mut rows = vec![
            ("universe".to_string(), self.universe.clone()),
            ("start_date".to_string(), self.start.to_string()),
            ("end_date".to_string(), self.end.to_string()),
        ];
        rows.extend(self.parameters.iter().cloned());
        rows.push(("tickers".to_string(), self.tickers.len().to_string()));
        rows.push(("batch_size".to_string(), self.batch_size.to_string()));
        rows.push(("ticker_suffix".to_string(), self.ticker_suffix.clone()));
        for field in &self.fields {
            rows.push((format!("field:{}", field.sheet), field.code.clone()));
        }
        rows.push((
            "benchmark".to_string(),
            self.benchmark.clone().unwrap_or_default(),
        ));
        rows.push(("test_mode".to_string(), self.test_mode.to_string()));
        rows.push(("fingerprint".to_string(), self.fingerprint().to_string()));
        rows
    }
}

impl fmt::Display for RunPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Universe:    {}", self.universe)?;
        writeln!(f, "Date range:  {} to {}", self.start, self.end)?;
        writeln!(f, "Fields:")?;
        for field in &self.fields {
            writeln!(f, "  {:<20} {}", field.sheet, field.code)?;
        }
        writeln!(f, "Output:      {}", self.output_path.display())?;
        writeln!(
            f,
            "Batches:     {} x {} tickers per field ({} tickers, {} fields)",
            self.batch_count(),
            self.batch_size,
            self.tickers.len(),
            self.fields.len()
        )?;
        if let Some(benchmark) = &self.benchmark {
            writeln!(f, "Benchmark:   {benchmark}")?;
        }
        if self.test_mode {
            writeln!(f, "Test mode:   on")?;
        }
        let preview: Vec<&str> = self
            .tickers
            .iter()
            .take(PREVIEW_TICKERS)
            .map(String::as_str)
            .collect();
        write!(f, "Tickers:     {}", preview.join(", "))?;
        if self.tickers.len() > PREVIEW_TICKERS {
            write!(f, " ... (+{} more)", self.tickers.len() - PREVIEW_TICKERS)?;
        }
        Ok(())
    }
}
