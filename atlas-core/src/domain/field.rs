//! Field specifications: output sheet name paired with a terminal field code.

use serde::{Deserialize, Serialize};

/// Sheet names the report writer uses for its own sheets.
pub const RESERVED_SHEETS: [&str; 3] = ["parameters", "benchmark", "failures"];

/// Longest sheet name a workbook accepts.
const MAX_SHEET_NAME_LEN: usize = 31;

const FORBIDDEN_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

/// A named metric (e.g. `price`) mapped to the terminal's field code (e.g. `PX_LAST`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Output sheet label.
    pub sheet: String,
    /// Field code understood by the terminal.
    pub code: String,
}

impl FieldSpec {
    pub fn new(sheet: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
            code: code.into(),
        }
    }
}

/// Check that `name` can be used as a data sheet name.
pub fn validate_sheet_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("sheet name is empty".into());
    }
    if name.chars().count() > MAX_SHEET_NAME_LEN {
        return Err(format!(
            "sheet name '{name}' is longer than {MAX_SHEET_NAME_LEN} characters"
        ));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_SHEET_CHARS.contains(c)) {
        return Err(format!("sheet name '{name}' contains forbidden character '{c}'"));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(format!(
            "sheet name '{name}' cannot start or end with an apostrophe"
        ));
    }
    if RESERVED_SHEETS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
    {
        return Err(format!("sheet name '{name}' is reserved"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        assert!(validate_sheet_name("price").is_ok());
        assert!(validate_sheet_name("Pxtobook").is_ok());
        assert!(validate_sheet_name("EPS").is_ok());
    }

    #[test]
    fn rejects_reserved_names_case_insensitively() {
        assert!(validate_sheet_name("parameters").is_err());
        assert!(validate_sheet_name("Benchmark").is_err());
    }

    #[test]
    fn rejects_forbidden_characters_and_long_names() {
        assert!(validate_sheet_name("px/book").is_err());
        assert!(validate_sheet_name(&"x".repeat(32)).is_err());
        assert!(validate_sheet_name("  ").is_err());
    }

    #[test]
    fn rejects_leading_or_trailing_apostrophe() {
        assert!(validate_sheet_name("'price").is_err());
        assert!(validate_sheet_name("price'").is_err());
        assert!(validate_sheet_name("analyst's eps").is_ok());
    }
}
