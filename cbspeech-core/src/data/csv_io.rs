//! CSV reading and writing for dated tables.
//!
//! Floats are written with Rust's shortest round-trip `Display` form, which is
//! locale independent; reading a written table back yields identical values.
//! Missing values are empty cells.

use super::provider::DataError;
use crate::domain::{month_start, Column, TimeSeriesTable};
use crate::schema::{find_column, parse_date, MACRO_DATE_COLUMNS};
use chrono::NaiveDate;
use std::io::{Read, Write};
use std::path::Path;

/// Format a float for CSV output. NaN and infinities become an empty cell.
pub fn format_float(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}

/// Parse a numeric cell; empty, `.`, `NA` and `NaN` mean missing.
pub fn parse_float(cell: &str) -> Result<f64, String> {
    let cell = cell.trim();
    match cell {
        "" | "." | "NA" | "N/A" | "NaN" | "nan" | "null" => Ok(f64::NAN),
        _ => cell
            .parse::<f64>()
            .map_err(|_| format!("invalid number '{cell}'")),
    }
}

/// Write a table as `date,<col>,<col>,...`.
pub fn write_table_csv<W: Write>(table: &TimeSeriesTable, writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec!["date".to_string()];
    header.extend(table.column_names().iter().map(|s| s.to_string()));
    wtr.write_record(&header)?;
    for (i, date) in table.dates().iter().enumerate() {
        let mut record = Vec::with_capacity(table.width() + 1);
        record.push(date.to_string());
        record.extend(table.columns().iter().map(|c| format_float(c.values[i])));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read a table written by [`write_table_csv`] or any CSV whose first column
/// holds dates. Dates are kept as written (not snapped).
pub fn read_table_csv<R: Read>(reader: R, origin: &Path) -> Result<TimeSeriesTable, DataError> {
    read_dated_csv(reader, origin, false)
}

/// Read a local macro CSV: a date column named one of `date`, `Date`,
/// `datetime`, `Datetime`, `index` plus one numeric column per series. Dates
/// are snapped to month starts and rows sorted.
pub fn read_macro_csv(path: &Path) -> Result<TimeSeriesTable, DataError> {
    let file = std::fs::File::open(path).map_err(|e| DataError::io(path, e))?;
    read_dated_csv(file, path, true)
}

fn read_dated_csv<R: Read>(
    reader: R,
    origin: &Path,
    snap_to_month: bool,
) -> Result<TimeSeriesTable, DataError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(false).from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|e| DataError::record(origin, 1, e.to_string()))?
        .clone();

    let date_idx = if snap_to_month {
        find_column(headers.iter(), MACRO_DATE_COLUMNS).ok_or_else(|| DataError::MissingColumn {
            path: origin.to_path_buf(),
            column: "date".into(),
        })?
    } else {
        0
    };
    let value_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != date_idx)
        .map(|(i, h)| (i, h.trim().to_string()))
        .collect();

    let mut rows: Vec<(NaiveDate, Vec<f64>)> = Vec::new();
    for (n, result) in rdr.records().enumerate() {
        // Header is line 1.
        let row = n + 2;
        let record = result.map_err(|e| DataError::record(origin, row, e.to_string()))?;
        let raw_date = record.get(date_idx).unwrap_or("");
        let mut date = parse_date(raw_date)
            .ok_or_else(|| DataError::record(origin, row, format!("unparseable date '{raw_date}'")))?;
        if snap_to_month {
            date = month_start(date);
        }
        let values = value_cols
            .iter()
            .map(|(i, name)| {
                parse_float(record.get(*i).unwrap_or(""))
                    .map_err(|m| DataError::record(origin, row, format!("column '{name}': {m}")))
            })
            .collect::<Result<Vec<f64>, DataError>>()?;
        rows.push((date, values));
    }

    if snap_to_month {
        rows.sort_by_key(|(d, _)| *d);
    }
    let dates: Vec<NaiveDate> = rows.iter().map(|(d, _)| *d).collect();
    let columns = value_cols
        .iter()
        .enumerate()
        .map(|(k, (_, name))| Column::new(name.clone(), rows.iter().map(|(_, v)| v[k]).collect()))
        .collect();
    Ok(TimeSeriesTable::new(dates, columns)?)
}
