//! Terminal access, universes and extraction

pub mod extract;
pub mod http;
pub mod terminal;
pub mod universe;

pub use extract::{extract, ExtractionContext, ExtractionProgress, ExtractionResult, LogProgress};
pub use http::HttpTerminal;
pub use terminal::{DataTerminal, SeriesBatch, TerminalError, TerminalOptions};
pub use universe::{Universe, UniverseError};
