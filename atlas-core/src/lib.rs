//! ATLAS Core — configuration, ticker universes, the terminal boundary and the
//! tiered extraction engine.
//!
//! This crate contains everything needed to turn a YAML config and a universe
//! name into per-ticker time series:
//! - Domain types (observations, time series, field specs, plan fingerprints)
//! - YAML configuration and run plan resolution
//! - Universe ticker lists loaded from CSV
//! - The `DataTerminal` trait and a blocking HTTP gateway client
//! - Batch → per-ticker → skip extraction with explicit failure accounting

pub mod config;
pub mod data;
pub mod domain;

pub use config::{
    load_config, AtlasConfig, ConfigError, PlanOverrides, RunPlan, TerminalSettings,
};
pub use data::extract::{
    extract, ExtractionContext, ExtractionProgress, ExtractionRequest, ExtractionResult,
    FailureReason, LogProgress, RequestError, FAILED_TICKERS_LOGGED, MAX_BATCH_SIZE,
};
pub use data::http::HttpTerminal;
pub use data::terminal::{DataTerminal, SeriesBatch, TerminalError, TerminalOptions};
pub use data::universe::{load_universe, Universe, UniverseError};
pub use domain::{FieldSpec, Observation, PlanFingerprint, TimeSeries};
