//! Domain types for ATLAS

pub mod field;
pub mod ids;
pub mod series;

pub use field::{validate_sheet_name, FieldSpec, RESERVED_SHEETS};
pub use ids::PlanFingerprint;
pub use series::{Observation, TimeSeries};
