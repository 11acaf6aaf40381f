//! Report model: what goes into the workbook, independent of the file format.
//!
//! Field sheets keep the universe's ticker order as rows and the sorted union
//! of observed dates as columns. Failed tickers keep an empty row so every
//! field sheet lines up row for row.

use atlas_core::{ExtractionResult, FailureReason, FieldSpec, RunPlan, TimeSeries};
use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::align::align_sheets;

/// One labelled row of a series sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub label: String,
    /// One cell per sheet date; `None` is an empty cell.
    pub values: Vec<Option<f64>>,
    /// Set when the row is empty because extraction failed.
    pub failure: Option<FailureReason>,
}

impl SheetRow {
    pub fn has_data(&self) -> bool {
        self.values.iter().any(Option::is_some)
    }
}

/// A date-indexed grid: rows are labels (tickers or fields), columns are dates.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSheet {
    pub name: String,
    /// Header of the label column.
    pub label_header: String,
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<SheetRow>,
}

impl SeriesSheet {
    /// Lay out `rows` (label, series, failure) on the union of their dates.
    pub fn from_series<'a, I>(name: &str, label_header: &str, rows: I) -> Self
    where
        I: IntoIterator<Item = (String, Option<&'a TimeSeries>, Option<FailureReason>)>,
    {
        let rows: Vec<_> = rows.into_iter().collect();

        let dates: Vec<NaiveDate> = rows
            .iter()
            .filter_map(|(_, series, _)| *series)
            .flat_map(TimeSeries::dates)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let rows = rows
            .into_iter()
            .map(|(label, series, failure)| SheetRow {
                values: match series {
                    Some(s) => dates.iter().map(|d| s.value_on(*d)).collect(),
                    None => vec![None; dates.len()],
                },
                label,
                failure,
            })
            .collect();

        Self {
            name: name.to_string(),
            label_header: label_header.to_string(),
            dates,
            rows,
        }
    }

    /// Field sheet: one row per ticker, in universe order.
    pub fn for_field(field: &FieldSpec, tickers: &[String], result: &ExtractionResult) -> Self {
        Self::from_series(
            &field.sheet,
            "Ticker",
            tickers
                .iter()
                .map(|t| (t.clone(), result.get(t), result.failure(t).cloned())),
        )
    }

    pub fn has_data(&self) -> bool {
        self.rows.iter().any(SheetRow::has_data)
    }

    /// Cell lookup by row label and date.
    pub fn value(&self, label: &str, date: NaiveDate) -> Option<f64> {
        let col = self.dates.binary_search(&date).ok()?;
        self.rows
            .iter()
            .find(|r| r.label == label)
            .and_then(|r| r.values[col])
    }

    pub fn row(&self, label: &str) -> Option<&SheetRow> {
        self.rows.iter().find(|r| r.label == label)
    }
}

/// One entry of the `failures` sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRow {
    pub field: String,
    pub ticker: String,
    pub reason: String,
}

/// Everything the workbook contains, in sheet order.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub parameters: Vec<(String, String)>,
    pub sheets: Vec<SeriesSheet>,
    pub benchmark: Option<SeriesSheet>,
    pub failures: Vec<FailureRow>,
}

/// Extraction output for one field, in config order.
#[derive(Debug, Clone)]
pub struct FieldExtraction {
    pub field: FieldSpec,
    pub result: ExtractionResult,
}

impl Report {
    /// Assemble the report from per-field results.
    ///
    /// Field sheets without any data are dropped with a warning. When the plan
    /// names an `align_to` sheet, the other sheets are aligned onto its dates.
    pub fn build(
        plan: &RunPlan,
        extractions: &[FieldExtraction],
        benchmark: Option<SeriesSheet>,
    ) -> Self {
        let mut sheets = Vec::with_capacity(extractions.len());
        let mut failures = Vec::new();

        for ext in extractions {
            for ticker in &plan.tickers {
                if let Some(reason) = ext.result.failure(ticker) {
                    failures.push(FailureRow {
                        field: ext.field.sheet.clone(),
                        ticker: ticker.clone(),
                        reason: reason.to_string(),
                    });
                }
            }

            let sheet = SeriesSheet::for_field(&ext.field, &plan.tickers, &ext.result);
            if sheet.has_data() {
                sheets.push(sheet);
            } else {
                log::warn!("  Skipping empty sheet: {}", ext.field.sheet);
            }
        }

        if let Some(target) = &plan.align_to {
            align_sheets(&mut sheets, target);
        }

        let benchmark = benchmark.filter(SeriesSheet::has_data);

        Self {
            parameters: plan.parameter_rows(),
            sheets,
            benchmark,
            failures,
        }
    }

    pub fn has_data(&self) -> bool {
        !self.sheets.is_empty()
    }

    pub fn sheet(&self, name: &str) -> Option<&SeriesSheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

/// Benchmark sheet: one row per field for the universe's benchmark symbol.
pub fn benchmark_sheet(series: &[(FieldSpec, Option<TimeSeries>)]) -> SeriesSheet {
    SeriesSheet::from_series(
        "benchmark",
        "Field",
        series
            .iter()
            .map(|(field, s)| (field.sheet.clone(), s.as_ref(), None)),
    )
}
