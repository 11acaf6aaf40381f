//! Universe ticker lists.
//!
//! Each universe lives in its own CSV file, `<tickers_dir>/<name>.csv`, with a
//! `Ticker` header column. Row order is the canonical output order.

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

const TICKER_COLUMN: &str = "Ticker";

/// Errors from loading a universe ticker file.
#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("ticker file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("read ticker file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse ticker file {source_name}: {source}")]
    Csv {
        source_name: String,
        #[source]
        source: csv::Error,
    },

    #[error("ticker file missing 'Ticker' column: {source_name}")]
    MissingTickerColumn { source_name: String },

    #[error("ticker file is empty: {source_name}")]
    Empty { source_name: String },
}

/// Load the universe `name` from `<dir>/<name>.csv`.
pub fn load_universe(dir: &Path, name: &str) -> Result<Universe, UniverseError> {
    Universe::load(dir, name)
}

/// A named, ordered list of unique ticker symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Universe {
    name: String,
    tickers: Vec<String>,
}

impl Universe {
    /// Build a universe from a ticker list.
    ///
    /// Blank entries are skipped and duplicates dropped (first occurrence wins).
    pub fn new(name: impl Into<String>, tickers: Vec<String>) -> Result<Self, UniverseError> {
        let name = name.into();
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            let ticker = ticker.trim().to_string();
            if ticker.is_empty() {
                continue;
            }
            if seen.insert(ticker.clone()) {
                unique.push(ticker);
            } else {
                log::warn!("universe {name}: dropping duplicate ticker {ticker}");
            }
        }

        if unique.is_empty() {
            return Err(UniverseError::Empty { source_name: name });
        }

        Ok(Self {
            name,
            tickers: unique,
        })
    }

    /// Path of the ticker file for `name` under `dir`.
    pub fn path_for(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.csv"))
    }

    /// Load `<dir>/<name>.csv`.
    pub fn load(dir: &Path, name: &str) -> Result<Self, UniverseError> {
        let path = Self::path_for(dir, name);
        if !path.is_file() {
            return Err(UniverseError::NotFound { path });
        }
        let file = std::fs::File::open(&path).map_err(|source| UniverseError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_reader(name, file, &path.display().to_string())
    }

    /// Parse a universe from CSV content. `source_name` only feeds error messages.
    pub fn from_reader<R: Read>(
        name: &str,
        reader: R,
        source_name: &str,
    ) -> Result<Self, UniverseError> {
        let csv_err = |source| UniverseError::Csv {
            source_name: source_name.to_string(),
            source,
        };

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let column = rdr
            .headers()
            .map_err(csv_err)?
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').trim() == TICKER_COLUMN)
            .ok_or_else(|| UniverseError::MissingTickerColumn {
                source_name: source_name.to_string(),
            })?;

        let mut tickers = Vec::new();
        for record in rdr.records() {
            let record = record.map_err(csv_err)?;
            if let Some(ticker) = record.get(column) {
                tickers.push(ticker.to_string());
            }
        }

        Self::new(name, tickers).map_err(|e| match e {
            UniverseError::Empty { .. } => UniverseError::Empty {
                source_name: source_name.to_string(),
            },
            other => other,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    /// Keep only the first `n` tickers.
    pub fn truncate(&mut self, n: usize) {
        self.tickers.truncate(n.max(1));
    }

    pub fn into_tickers(self) -> Vec<String> {
        self.tickers
    }
}
