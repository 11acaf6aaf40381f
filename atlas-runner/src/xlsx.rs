//! Workbook serialization with `rust_xlsxwriter`.
//!
//! Sheet order: `parameters`, one sheet per field (config order), `benchmark`
//! when present, `failures` when anything failed.

use std::path::{Path, PathBuf};

use chrono::Datelike;
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook, Worksheet, XlsxError};
use thiserror::Error;

use crate::report::{FailureRow, Report, SeriesSheet};

/// Most columns a worksheet can hold.
pub const MAX_COLUMNS: usize = 16_384;

/// Most rows a worksheet can hold.
pub const MAX_ROWS: usize = 1_048_576;

const DATE_FORMAT: &str = "yyyy-mm-dd";

/// Errors from writing the workbook.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("create output directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sheet '{sheet}' needs {needed} {what}, the workbook limit is {limit}")]
    TooLarge {
        sheet: String,
        what: &'static str,
        needed: usize,
        limit: usize,
    },

    #[error("date {0} cannot be written as a workbook date")]
    Date(chrono::NaiveDate),

    #[error("xlsx error: {0}")]
    Xlsx(#[from] XlsxError),
}

struct Formats {
    header: Format,
    date: Format,
}

/// Write `report` to `path`, creating the parent directory if needed.
pub fn write_report(report: &Report, path: &Path) -> Result<(), ReportError> {
    for sheet in report.sheets.iter().chain(&report.benchmark) {
        check_limits(sheet)?;
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ReportError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let formats = Formats {
        header: Format::new().set_bold(),
        date: Format::new().set_bold().set_num_format(DATE_FORMAT),
    };

    let mut workbook = Workbook::new();

    write_pairs(
        workbook.add_worksheet(),
        "parameters",
        ("Parameter", "Value"),
        &report.parameters,
        &formats,
    )?;

    for sheet in &report.sheets {
        write_series(workbook.add_worksheet(), sheet, &formats)?;
        log::info!(
            "  Sheet '{}': {} rows x {} cols",
            sheet.name,
            sheet.rows.len(),
            sheet.dates.len()
        );
    }

    if let Some(benchmark) = &report.benchmark {
        write_series(workbook.add_worksheet(), benchmark, &formats)?;
        log::info!("  Sheet 'benchmark': {} rows", benchmark.rows.len());
    }

    if !report.failures.is_empty() {
        write_failures(workbook.add_worksheet(), &report.failures, &formats)?;
        log::info!("  Sheet 'failures': {} rows", report.failures.len());
    }

    workbook.save(path)?;
    Ok(())
}

fn check_limits(sheet: &SeriesSheet) -> Result<(), ReportError> {
    let columns = sheet.dates.len() + 1;
    if columns > MAX_COLUMNS {
        return Err(ReportError::TooLarge {
            sheet: sheet.name.clone(),
            what: "columns",
            needed: columns,
            limit: MAX_COLUMNS,
        });
    }
    let rows = sheet.rows.len() + 1;
    if rows > MAX_ROWS {
        return Err(ReportError::TooLarge {
            sheet: sheet.name.clone(),
            what: "rows",
            needed: rows,
            limit: MAX_ROWS,
        });
    }
    Ok(())
}

fn write_series(ws: &mut Worksheet, sheet: &SeriesSheet, formats: &Formats) -> Result<(), ReportError> {
    ws.set_name(&sheet.name)?;
    ws.write_string_with_format(0, 0, &sheet.label_header, &formats.header)?;
    ws.set_column_width(0, 18)?;

    for (i, date) in sheet.dates.iter().enumerate() {
        let col = column(i + 1);
        let cell = ExcelDateTime::from_ymd(
            u16::try_from(date.year()).map_err(|_| ReportError::Date(*date))?,
            date.month() as u8,
            date.day() as u8,
        )
        .map_err(|_| ReportError::Date(*date))?;
        ws.write_datetime_with_format(0, col, &cell, &formats.date)?;
        ws.set_column_width(col, 11)?;
    }

    for (r, row) in sheet.rows.iter().enumerate() {
        let xl_row = (r + 1) as u32;
        ws.write_string(xl_row, 0, &row.label)?;
        for (c, value) in row.values.iter().enumerate() {
            if let Some(v) = value {
                ws.write_number(xl_row, column(c + 1), *v)?;
            }
        }
    }

    ws.set_freeze_panes(1, 1)?;
    Ok(())
}

fn write_pairs(
    ws: &mut Worksheet,
    name: &str,
    headers: (&str, &str),
    pairs: &[(String, String)],
    formats: &Formats,
) -> Result<(), ReportError> {
    ws.set_name(name)?;
    ws.write_string_with_format(0, 0, headers.0, &formats.header)?;
    ws.write_string_with_format(0, 1, headers.1, &formats.header)?;
    ws.set_column_width(0, 24)?;
    ws.set_column_width(1, 40)?;

    for (i, (key, value)) in pairs.iter().enumerate() {
        let row = (i + 1) as u32;
        ws.write_string(row, 0, key)?;
        ws.write_string(row, 1, value)?;
    }
    Ok(())
}

fn write_failures(
    ws: &mut Worksheet,
    failures: &[FailureRow],
    formats: &Formats,
) -> Result<(), ReportError> {
    ws.set_name("failures")?;
    for (col, header) in ["Field", "Ticker", "Reason"].iter().enumerate() {
        ws.write_string_with_format(0, col as u16, *header, &formats.header)?;
    }
    ws.set_column_width(2, 60)?;

    for (i, failure) in failures.iter().enumerate() {
        let row = (i + 1) as u32;
        ws.write_string(row, 0, &failure.field)?;
        ws.write_string(row, 1, &failure.ticker)?;
        ws.write_string(row, 2, &failure.reason)?;
    }
    Ok(())
}

/// Column index; callers stay below `MAX_COLUMNS` via `check_limits`.
fn column(i: usize) -> u16 {
    i as u16
}
