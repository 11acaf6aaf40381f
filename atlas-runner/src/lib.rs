//! ATLAS Runner — per-universe run driver and workbook output.
//!
//! This crate builds on `atlas-core` to provide:
//! - The run driver (dry-run, terminal check, extraction per field, benchmark)
//! - Report assembly: field sheets in universe order, failures, parameters
//! - As-of date alignment of sparse sheets onto a reference sheet
//! - xlsx serialization

pub mod align;
pub mod report;
pub mod runner;
pub mod xlsx;

pub use align::align_sheets;
pub use report::{FailureRow, FieldExtraction, Report, SeriesSheet, SheetRow};
pub use runner::{run_universe, FieldSummary, RunError, RunMode, RunOutcome, RunSummary};
pub use xlsx::{write_report, ReportError};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn report_is_send_sync() {
        assert_send::<Report>();
        assert_sync::<Report>();
    }

    #[test]
    fn run_summary_is_send_sync() {
        assert_send::<RunSummary>();
        assert_sync::<RunSummary>();
    }
}
