//! Shared fixtures for runner integration tests.

#![allow(dead_code)]

use atlas_core::{
    AtlasConfig, DataTerminal, Observation, PlanOverrides, RunPlan, SeriesBatch, TerminalError,
    TerminalOptions, TimeSeries, Universe,
};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn series(points: &[(&str, f64)]) -> TimeSeries {
    points
        .iter()
        .map(|(date, v)| Observation::new(d(date), *v))
        .collect()
}

/// One recorded terminal request.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub symbols: Vec<String>,
    pub field: String,
}

/// In-memory terminal keyed by (symbol, field).
///
/// Bulk requests fail when `bulk_down` is set or when any symbol in them is
/// `rejected`; single requests fail only for `rejected` symbols.
#[derive(Default)]
pub struct MockTerminal {
    pub data: HashMap<(String, String), TimeSeries>,
    pub rejected: HashSet<String>,
    pub bulk_down: bool,
    pub unavailable: bool,
    pub calls: Mutex<Vec<Call>>,
}

impl MockTerminal {
    pub fn with(mut self, symbol: &str, field: &str, ts: TimeSeries) -> Self {
        self.data.insert((symbol.to_string(), field.to_string()), ts);
        self
    }

    pub fn rejecting(mut self, symbol: &str) -> Self {
        self.rejected.insert(symbol.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl DataTerminal for MockTerminal {
    fn name(&self) -> &str {
        "mock"
    }

    fn fetch_series(
        &self,
        symbols: &[String],
        field: &str,
        _start: NaiveDate,
        _end: NaiveDate,
        _options: &TerminalOptions,
    ) -> Result<SeriesBatch, TerminalError> {
        self.calls.lock().unwrap().push(Call {
            symbols: symbols.to_vec(),
            field: field.to_string(),
        });
        if self.bulk_down && symbols.len() > 1 {
            return Err(TerminalError::Unreachable("timed out".into()));
        }
        if let Some(bad) = symbols.iter().find(|s| self.rejected.contains(*s)) {
            return Err(TerminalError::Rejected(format!("Unknown/Invalid security {bad}")));
        }
        Ok(symbols
            .iter()
            .filter_map(|s| {
                self.data
                    .get(&(s.clone(), field.to_string()))
                    .map(|ts| (s.clone(), ts.clone()))
            })
            .collect())
    }

    fn is_available(&self) -> bool {
        !self.unavailable
    }
}

/// Config YAML with two fields, price aligned, a benchmark for `u`.
pub fn config_yaml(output_dir: &Path) -> String {
    format!(
        r#"
parameters:
  start_date: 2024-01-01
  end_date: 2024-01-31
  period: D
paths:
  output_xlsx: '{}/ATLAS_{{universe}}.xlsx'
terminal:
  batch_size: 250
fields:
  price: PX_LAST
  EPS: IS_EPS
universes:
  default: u
  available: [u, v]
benchmarks:
  u: BENCH Index
report:
  align_to: price
"#,
        output_dir.display()
    )
}

pub fn plan(output_dir: &Path, tickers: &[&str], overrides: PlanOverrides) -> RunPlan {
    let config = AtlasConfig::from_yaml(&config_yaml(output_dir), None).unwrap();
    let universe = Universe::new("u", tickers.iter().map(|s| s.to_string()).collect()).unwrap();
    config.plan(universe, overrides, d("2024-06-01")).unwrap()
}
