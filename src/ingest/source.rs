//! Tabular source readers (CSV and spreadsheets) producing validated records.
use std::io::Read;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta};
use tracing::info;

use super::{IngestError, REQUIRED_COLUMNS};

/// One source row after schema validation and date parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Sort key; only the calendar date is exposed downstream.
    pub date: NaiveDateTime,
    pub title: String,
    pub description: String,
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%B %d %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Parse the date spellings commonly found in exported news datasets.
///
/// Zoned timestamps keep their local wall-clock date.
pub fn parse_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
    {
        return date.and_hms_opt(0, 0, 0);
    }

    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
    {
        return Some(dt);
    }

    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .map(|dt| dt.naive_local())
        .ok()
}

/// Read records from `path`, picking the reader from the file extension.
pub fn read_records(path: &Path) -> Result<Vec<Record>, IngestError> {
    if !path.exists() {
        return Err(IngestError::SourceNotFound(path.to_path_buf()));
    }

    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let records = match ext.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_spreadsheet(path)?,
        _ => read_csv(std::fs::File::open(path).map_err(|e| IngestError::Source(e.to_string()))?)?,
    };

    info!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Read CSV data with a header row.
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<Record>, IngestError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let columns = required_columns(&headers)?;

    let mut records = Vec::new();
    for (i, row) in rdr.records().enumerate() {
        let row = row?;
        let cell = |idx: usize| row.get(idx).unwrap_or_default();
        records.push(to_record(i + 1, columns, cell)?);
    }
    Ok(records)
}

/// Read the first worksheet of an Excel/ODS workbook.
fn read_spreadsheet(path: &Path) -> Result<Vec<Record>, IngestError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| IngestError::Source(format!("{} has no worksheets", path.display())))??;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|r| r.iter().map(cell_to_string).collect())
        .unwrap_or_default();
    let columns = required_columns(&headers)?;

    let mut records = Vec::new();
    for (i, row) in rows.enumerate() {
        let values: Vec<String> = row.iter().map(cell_to_string).collect();
        let cell = |idx: usize| values.get(idx).map(String::as_str).unwrap_or_default();
        records.push(to_record(i + 1, columns, cell)?);
    }
    Ok(records)
}

/// Positions of `Date`, `Title`, `Description` in the header row.
fn required_columns(headers: &[String]) -> Result<[usize; 3], IngestError> {
    let mut columns = [0usize; 3];
    for (slot, name) in columns.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| IngestError::MissingColumn(name.to_string()))?;
    }
    Ok(columns)
}

fn to_record<'a>(
    row: usize,
    [date_col, title_col, desc_col]: [usize; 3],
    cell: impl Fn(usize) -> &'a str,
) -> Result<Record, IngestError> {
    let raw_date = cell(date_col);
    let date = parse_date(raw_date).ok_or_else(|| IngestError::InvalidDate {
        row,
        value: raw_date.to_string(),
    })?;

    Ok(Record {
        date,
        title: cell(title_col).to_string(),
        description: cell(desc_col).to_string(),
    })
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64())
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        other => other.to_string(),
    }
}

/// Excel serial dates count days from 1899-12-30 (1900 date system).
fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(TimeDelta::try_milliseconds(millis)?)
}
