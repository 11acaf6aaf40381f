//! Date alignment across field sheets.
//!
//! Fundamentals (EPS, book ratios) arrive on far fewer dates than prices. Any
//! sheet with fewer dates than the reference sheet is re-indexed onto the
//! reference dates, each cell taking the latest observation on or before that
//! date (as-of forward fill). Cells before a row's first observation stay empty.

use chrono::NaiveDate;

use crate::report::{SeriesSheet, SheetRow};

/// Align every other non-empty sheet with fewer dates onto the `target` sheet's dates.
///
/// Returns how many sheets were re-indexed. A missing or empty target leaves
/// everything untouched.
pub fn align_sheets(sheets: &mut [SeriesSheet], target: &str) -> usize {
    let Some(master) = sheets
        .iter()
        .find(|s| s.name == target && s.has_data())
        .map(|s| s.dates.clone())
    else {
        log::warn!("  Alignment target '{target}' has no data, sheets left unaligned");
        return 0;
    };

    let mut aligned = 0;
    for sheet in sheets.iter_mut() {
        if sheet.name == target || !sheet.has_data() || sheet.dates.len() >= master.len() {
            continue;
        }
        log::info!(
            "  Reindexing '{}' from {} to {} dates (forward-fill)",
            sheet.name,
            sheet.dates.len(),
            master.len()
        );
        *sheet = reindex(sheet, &master);
        aligned += 1;
    }
    aligned
}

/// Re-index `sheet` onto `dates` with an as-of forward fill.
pub fn reindex(sheet: &SeriesSheet, dates: &[NaiveDate]) -> SeriesSheet {
    let rows = sheet
        .rows
        .iter()
        .map(|row| SheetRow {
            label: row.label.clone(),
            values: as_of(&sheet.dates, &row.values, dates),
            failure: row.failure.clone(),
        })
        .collect();

    SeriesSheet {
        name: sheet.name.clone(),
        label_header: sheet.label_header.clone(),
        dates: dates.to_vec(),
        rows,
    }
}

/// Both date slices must be sorted ascending.
fn as_of(src_dates: &[NaiveDate], src_values: &[Option<f64>], targets: &[NaiveDate]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(targets.len());
    let mut next = 0;
    let mut last = None;

    for target in targets {
        while next < src_dates.len() && src_dates[next] <= *target {
            if let Some(v) = src_values[next] {
                last = Some(v);
            }
            next += 1;
        }
        out.push(last);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn sheet(name: &str, dates: &[&str], rows: &[(&str, Vec<Option<f64>>)]) -> SeriesSheet {
        SeriesSheet {
            name: name.into(),
            label_header: "Ticker".into(),
            dates: dates.iter().map(|s| d(s)).collect(),
            rows: rows
                .iter()
                .map(|(label, values)| SheetRow {
                    label: label.to_string(),
                    values: values.clone(),
                    failure: None,
                })
                .collect(),
        }
    }

    #[test]
    fn forward_fills_sparse_sheet_onto_master_dates() {
        let mut sheets = vec![
            sheet(
                "price",
                &["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04"],
                &[("A", vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)])],
            ),
            sheet(
                "EPS",
                &["2024-01-02", "2024-01-04"],
                &[("A", vec![Some(10.0), Some(11.0)])],
            ),
        ];

        assert_eq!(align_sheets(&mut sheets, "price"), 1);

        let eps = &sheets[1];
        assert_eq!(eps.dates.len(), 4);
        assert_eq!(eps.rows[0].values, vec![None, Some(10.0), Some(10.0), Some(11.0)]);
    }

    #[test]
    fn gaps_inside_a_row_carry_last_value() {
        let src = [d("2024-01-01"), d("2024-01-02"), d("2024-01-03")];
        let targets = [d("2024-01-01"), d("2024-01-02"), d("2024-01-03"), d("2024-01-05")];
        let out = as_of(&src, &[Some(5.0), None, Some(7.0)], &targets);
        assert_eq!(out, vec![Some(5.0), Some(5.0), Some(7.0), Some(7.0)]);
    }

    #[test]
    fn denser_or_equal_sheets_are_left_alone() {
        let mut sheets = vec![
            sheet("price", &["2024-01-02"], &[("A", vec![Some(1.0)])]),
            sheet(
                "volume",
                &["2024-01-01", "2024-01-02"],
                &[("A", vec![Some(5.0), Some(6.0)])],
            ),
        ];
        assert_eq!(align_sheets(&mut sheets, "price"), 0);
        assert_eq!(sheets[1].dates.len(), 2);
    }

    #[test]
    fn missing_target_is_a_noop() {
        let mut sheets = vec![sheet("EPS", &["2024-01-02"], &[("A", vec![Some(1.0)])])];
        assert_eq!(align_sheets(&mut sheets, "price"), 0);
        assert_eq!(sheets[0].dates.len(), 1);
    }
}
