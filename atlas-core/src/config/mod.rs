//! YAML run configuration.
//!
//! The config file is parsed into loosely-typed raw structs first, then
//! validated into `AtlasConfig`. Field order in the `fields` mapping is kept
//! because it decides sheet order in the workbook.

mod plan;

pub use plan::{PlanOverrides, RunPlan, TEST_MODE_BATCH_SIZE, TEST_MODE_TICKERS};

use crate::data::extract::MAX_BATCH_SIZE;
use crate::data::terminal::TerminalOptions;
use crate::domain::{validate_sheet_name, FieldSpec};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Placeholder substituted with the universe name in the output path template.
pub const UNIVERSE_PLACEHOLDER: &str = "{universe}";

const DEFAULT_ENDPOINT: &str = "http://localhost:8194";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_TICKERS_DIR: &str = "tickers";

/// Errors from loading or resolving the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("missing required config key: {0}")]
    MissingKey(String),

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("unknown universe '{name}'. Available: {}", available.join(", "))]
    UnknownUniverse { name: String, available: Vec<String> },

    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
}

impl ConfigError {
    fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Load and validate the config file at `path`.
pub fn load_config(path: &Path) -> Result<AtlasConfig, ConfigError> {
    AtlasConfig::from_file(path)
}

// ── Raw (as-written) config ──

#[derive(Debug, Deserialize)]
struct RawConfig {
    parameters: Option<Mapping>,
    paths: Option<RawPaths>,
    #[serde(default, alias = "bloomberg")]
    terminal: RawTerminal,
    fields: Option<Mapping>,
    universes: Option<RawUniverses>,
    #[serde(default)]
    benchmarks: BTreeMap<String, String>,
    #[serde(default)]
    report: RawReport,
}

#[derive(Debug, Deserialize)]
struct RawPaths {
    output_xlsx: Option<String>,
    tickers_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTerminal {
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
    batch_size: Option<usize>,
    ticker_suffix: Option<String>,
    #[serde(default, alias = "bdh_options")]
    options: TerminalOptions,
}

#[derive(Debug, Deserialize)]
struct RawUniverses {
    default: Option<String>,
    #[serde(default)]
    available: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawReport {
    align_to: Option<String>,
}

// ── Validated config ──

/// Connection and request settings for the terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalSettings {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub batch_size: usize,
    pub ticker_suffix: String,
    pub options: TerminalOptions,
}

/// Validated configuration, ready to resolve into run plans.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasConfig {
    pub start_date: NaiveDate,
    /// `None` means "today" at plan time.
    pub end_date: Option<NaiveDate>,
    /// Every other key under `parameters`, in file order, rendered as text.
    pub parameters: Vec<(String, String)>,
    pub output_template: String,
    pub tickers_dir: PathBuf,
    pub terminal: TerminalSettings,
    pub fields: Vec<FieldSpec>,
    pub default_universe: String,
    pub available_universes: Vec<String>,
    pub benchmarks: BTreeMap<String, String>,
    pub align_to: Option<String>,
}

impl AtlasConfig {
    /// Load and validate a YAML config file.
    ///
    /// A relative `tickers_dir` is resolved against the config file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content, path.parent())
    }

    /// Parse and validate YAML content.
    pub fn from_yaml(content: &str, base_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(content)?;
        Self::validate(raw, base_dir)
    }

    fn validate(raw: RawConfig, base_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let parameters = raw
            .parameters
            .ok_or_else(|| ConfigError::MissingKey("parameters".into()))?;
        let paths = raw
            .paths
            .ok_or_else(|| ConfigError::MissingKey("paths".into()))?;
        let fields = raw
            .fields
            .ok_or_else(|| ConfigError::MissingKey("fields".into()))?;
        let universes = raw
            .universes
            .ok_or_else(|| ConfigError::MissingKey("universes".into()))?;

        let (start_date, end_date, parameters) = parse_parameters(parameters)?;
        let fields = parse_fields(fields)?;

        let output_template = paths
            .output_xlsx
            .ok_or_else(|| ConfigError::MissingKey("paths.output_xlsx".into()))?;
        if !output_template.contains(UNIVERSE_PLACEHOLDER) {
            return Err(ConfigError::invalid(
                "paths.output_xlsx",
                format!("template must contain {UNIVERSE_PLACEHOLDER}"),
            ));
        }

        let tickers_dir = paths
            .tickers_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TICKERS_DIR));
        let tickers_dir = match base_dir {
            Some(base) if tickers_dir.is_relative() => base.join(tickers_dir),
            _ => tickers_dir,
        };

        let batch_size = raw.terminal.batch_size.unwrap_or(MAX_BATCH_SIZE);
        if !(1..=MAX_BATCH_SIZE).contains(&batch_size) {
            return Err(ConfigError::invalid(
                "terminal.batch_size",
                format!("{batch_size} is outside 1..={MAX_BATCH_SIZE}"),
            ));
        }
        let timeout_secs = raw.terminal.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "terminal.timeout_secs",
                "must be at least 1 second",
            ));
        }
        let terminal = TerminalSettings {
            endpoint: raw
                .terminal
                .endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            timeout_secs,
            batch_size,
            ticker_suffix: raw.terminal.ticker_suffix.unwrap_or_default(),
            options: raw.terminal.options,
        };

        if universes.available.is_empty() {
            return Err(ConfigError::invalid(
                "universes.available",
                "at least one universe is required",
            ));
        }
        let default_universe = match universes.default {
            Some(name) if universes.available.contains(&name) => name,
            Some(name) => {
                return Err(ConfigError::UnknownUniverse {
                    name,
                    available: universes.available,
                })
            }
            None => universes.available[0].clone(),
        };

        let align_to = raw.report.align_to;
        if let Some(sheet) = &align_to {
            if !fields.iter().any(|f| &f.sheet == sheet) {
                return Err(ConfigError::invalid(
                    "report.align_to",
                    format!("'{sheet}' is not one of the configured field sheets"),
                ));
            }
        }

        Ok(Self {
            start_date,
            end_date,
            parameters,
            output_template,
            tickers_dir,
            terminal,
            fields,
            default_universe,
            available_universes: universes.available,
            benchmarks: raw.benchmarks,
            align_to,
        })
    }

    /// Pick the universe to run: the requested one if given, else the default.
    pub fn resolve_universe(&self, requested: Option<&str>) -> Result<String, ConfigError> {
        let name = requested.unwrap_or(&self.default_universe);
        if self.available_universes.iter().any(|u| u == name) {
            Ok(name.to_string())
        } else {
            Err(ConfigError::UnknownUniverse {
                name: name.to_string(),
                available: self.available_universes.clone(),
            })
        }
    }

    /// Output path for `universe` before any test-mode suffix.
    pub fn output_path(&self, universe: &str) -> PathBuf {
        PathBuf::from(self.output_template.replace(UNIVERSE_PLACEHOLDER, universe))
    }
}

/// Split `parameters` into the date range and the remaining echo-only entries.
fn parse_parameters(
    parameters: Mapping,
) -> Result<(NaiveDate, Option<NaiveDate>, Vec<(String, String)>), ConfigError> {
    let mut start_date = None;
    let mut end_date = None;
    let mut rest = Vec::new();

    for (key, value) in parameters {
        let key = scalar_text(&key)
            .ok_or_else(|| ConfigError::invalid("parameters", "keys must be scalars"))?;
        match key.as_str() {
            "start_date" => {
                start_date = Some(parse_date_value("parameters.start_date", &value)?);
            }
            "end_date" => {
                end_date = match value {
                    Value::Null => None,
                    other => Some(parse_date_value("parameters.end_date", &other)?),
                };
            }
            _ => rest.push((key, display_value(&value))),
        }
    }

    let start_date =
        start_date.ok_or_else(|| ConfigError::MissingKey("parameters.start_date".into()))?;
    Ok((start_date, end_date, rest))
}

fn parse_fields(fields: Mapping) -> Result<Vec<FieldSpec>, ConfigError> {
    let mut seen = HashSet::new();
    let mut specs = Vec::with_capacity(fields.len());

    for (sheet, code) in fields {
        let (Value::String(sheet), Value::String(code)) = (sheet, code) else {
            return Err(ConfigError::invalid(
                "fields",
                "entries must map a sheet name to a field code string",
            ));
        };
        validate_sheet_name(&sheet).map_err(|reason| ConfigError::invalid("fields", reason))?;
        if code.trim().is_empty() {
            return Err(ConfigError::invalid(
                "fields",
                format!("sheet '{sheet}' has an empty field code"),
            ));
        }
        if !seen.insert(sheet.to_lowercase()) {
            return Err(ConfigError::invalid(
                "fields",
                format!("sheet '{sheet}' is listed twice"),
            ));
        }
        specs.push(FieldSpec::new(sheet, code.trim()));
    }

    if specs.is_empty() {
        return Err(ConfigError::invalid("fields", "at least one field is required"));
    }
    Ok(specs)
}

fn parse_date_value(key: &str, value: &Value) -> Result<NaiveDate, ConfigError> {
    let text = scalar_text(value)
        .ok_or_else(|| ConfigError::invalid(key, "expected a YYYY-MM-DD date"))?;
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|e| ConfigError::invalid(key, format!("'{text}': {e}")))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => scalar_text(other).unwrap_or_else(|| {
            serde_yaml::to_string(other)
                .map(|s| s.trim_end().to_string())
                .unwrap_or_default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
parameters:
  start_date: 2013-01-01
  end_date: null
  period: D
  currency: EUR
paths:
  output_xlsx: output/ATLAS_{universe}.xlsx
bloomberg:
  batch_size: 250
  ticker_suffix: " Equity"
  bdh_options:
    Per: D
fields:
  price: PX_LAST
  Pxtobook: PX_TO_BOOK_RATIO
  EPS: IS_EPS
universes:
  default: sxxr
  available: [sxxr, nky, spx]
benchmarks:
  sxxr: SXXR Index
report:
  align_to: price
"#;

    fn sample() -> AtlasConfig {
        AtlasConfig::from_yaml(SAMPLE, Some(Path::new("/etc/atlas"))).unwrap()
    }

    #[test]
    fn parses_sample_config() {
        let cfg = sample();
        assert_eq!(cfg.start_date, NaiveDate::from_ymd_opt(2013, 1, 1).unwrap());
        assert_eq!(cfg.end_date, None);
        assert_eq!(
            cfg.parameters,
            vec![
                ("period".to_string(), "D".to_string()),
                ("currency".to_string(), "EUR".to_string()),
            ]
        );
        assert_eq!(cfg.terminal.ticker_suffix, " Equity");
        assert_eq!(cfg.terminal.batch_size, 250);
        assert_eq!(cfg.terminal.options["Per"], serde_json::json!("D"));
        assert_eq!(cfg.terminal.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(cfg.tickers_dir, PathBuf::from("/etc/atlas/tickers"));
        assert_eq!(cfg.benchmarks["sxxr"], "SXXR Index");
        assert_eq!(cfg.align_to.as_deref(), Some("price"));
    }

    #[test]
    fn field_order_follows_file() {
        let sheets: Vec<String> = sample().fields.into_iter().map(|f| f.sheet).collect();
        assert_eq!(sheets, vec!["price", "Pxtobook", "EPS"]);
    }

    #[test]
    fn missing_section_is_reported() {
        let yaml = SAMPLE.replace("fields:\n  price: PX_LAST\n  Pxtobook: PX_TO_BOOK_RATIO\n  EPS: IS_EPS\n", "");
        let err = AtlasConfig::from_yaml(&yaml, None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref k) if k == "fields"));
    }

    #[test]
    fn batch_size_above_limit_is_rejected() {
        let yaml = SAMPLE.replace("batch_size: 250", "batch_size: 500");
        let err = AtlasConfig::from_yaml(&yaml, None).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let yaml = SAMPLE.replace("batch_size: 250", "batch_size: 250\n  timeout_secs: 0");
        let err = AtlasConfig::from_yaml(&yaml, None).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "terminal.timeout_secs")
        );
    }

    #[test]
    fn sheet_name_quoted_with_apostrophe_is_rejected() {
        let yaml = SAMPLE.replace("  EPS: IS_EPS", "  \"EPS'\": IS_EPS");
        let err = AtlasConfig::from_yaml(&yaml, None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "fields"));
        assert!(err.to_string().contains("apostrophe"));
    }

    #[test]
    fn template_without_placeholder_is_rejected() {
        let yaml = SAMPLE.replace("ATLAS_{universe}.xlsx", "ATLAS.xlsx");
        assert!(AtlasConfig::from_yaml(&yaml, None).is_err());
    }

    #[test]
    fn unknown_default_universe_is_rejected() {
        let yaml = SAMPLE.replace("default: sxxr", "default: ftse");
        let err = AtlasConfig::from_yaml(&yaml, None).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownUniverse { .. }));
    }

    #[test]
    fn reserved_sheet_name_is_rejected() {
        let yaml = SAMPLE.replace("EPS: IS_EPS", "parameters: IS_EPS");
        assert!(AtlasConfig::from_yaml(&yaml, None).is_err());
    }

    #[test]
    fn align_to_must_name_a_field() {
        let yaml = SAMPLE.replace("align_to: price", "align_to: volume");
        assert!(AtlasConfig::from_yaml(&yaml, None).is_err());
    }

    #[test]
    fn bad_start_date_is_rejected() {
        let yaml = SAMPLE.replace("start_date: 2013-01-01", "start_date: 01/01/2013");
        let err = AtlasConfig::from_yaml(&yaml, None).unwrap_err();
        assert!(err.to_string().contains("parameters.start_date"));
    }

    #[test]
    fn resolve_universe_uses_default_and_validates() {
        let cfg = sample();
        assert_eq!(cfg.resolve_universe(None).unwrap(), "sxxr");
        assert_eq!(cfg.resolve_universe(Some("nky")).unwrap(), "nky");
        let err = cfg.resolve_universe(Some("ftse")).unwrap_err();
        assert!(err.to_string().contains("sxxr, nky, spx"));
    }

    #[test]
    fn output_path_substitutes_universe() {
        assert_eq!(
            sample().output_path("nky"),
            PathBuf::from("output/ATLAS_nky.xlsx")
        );
    }

    #[test]
    fn missing_default_falls_back_to_first_available() {
        let yaml = SAMPLE.replace("  default: sxxr\n", "");
        let cfg = AtlasConfig::from_yaml(&yaml, None).unwrap();
        assert_eq!(cfg.default_universe, "sxxr");
    }
}
