//! Speech dataset loading (CSV, JSON, Parquet).
//!
//! Each row carries a date, a polarity label and a source identifier. Rows
//! that cannot be parsed abort the load with the row number; nothing is
//! dropped silently. The optional source filter is applied after parsing.

use super::provider::DataError;
use crate::domain::{Polarity, SentimentRecord};
use crate::schema::{find_column, parse_date, SPEECH_SCHEMA, SPEECH_SOURCE_COLUMNS};
use polars::prelude::{DataType, ParquetReader, SerReader};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Load speeches from `path`, choosing the format by extension.
pub fn load_speeches(
    path: &Path,
    source_filter: Option<&str>,
) -> Result<Vec<SentimentRecord>, DataError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let records = match ext.as_deref() {
        Some("csv") => read_speeches_csv(path)?,
        Some("json") => read_speeches_json(path)?,
        Some("parquet") => read_speeches_parquet(path)?,
        _ => {
            return Err(DataError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };
    let total = records.len();
    let records = filter_source(records, source_filter);
    info!(
        path = %path.display(),
        total,
        kept = records.len(),
        "loaded speeches"
    );
    Ok(records)
}

/// Keep records whose source matches `filter` (case-insensitive).
pub fn filter_source(records: Vec<SentimentRecord>, filter: Option<&str>) -> Vec<SentimentRecord> {
    match filter {
        None => records,
        Some(f) => records
            .into_iter()
            .filter(|r| r.source.eq_ignore_ascii_case(f.trim()))
            .collect(),
    }
}

fn parse_record(
    path: &Path,
    row: usize,
    date: &str,
    sentiment: &str,
    source: &str,
) -> Result<SentimentRecord, DataError> {
    let date = parse_date(date)
        .ok_or_else(|| DataError::record(path, row, format!("unparseable date '{date}'")))?;
    let polarity: Polarity = sentiment
        .parse()
        .map_err(|m: String| DataError::record(path, row, m))?;
    Ok(SentimentRecord::new(date, polarity, source.trim()))
}

fn missing(path: &Path, column: &str) -> DataError {
    DataError::MissingColumn {
        path: path.to_path_buf(),
        column: column.to_string(),
    }
}

fn read_speeches_csv(path: &Path) -> Result<Vec<SentimentRecord>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::io(path, e))?;
    let mut rdr = csv::Reader::from_reader(file);
    let headers = rdr
        .headers()
        .map_err(|e| DataError::record(path, 1, e.to_string()))?
        .clone();

    let mut idx = Vec::with_capacity(SPEECH_SCHEMA.len());
    for field in SPEECH_SCHEMA {
        idx.push(find_column(headers.iter(), &[field.name]).ok_or_else(|| missing(path, field.name))?);
    }
    let source_idx = find_column(headers.iter(), SPEECH_SOURCE_COLUMNS)
        .ok_or_else(|| missing(path, SPEECH_SOURCE_COLUMNS[0]))?;

    let mut records = Vec::new();
    for (n, result) in rdr.records().enumerate() {
        let row = n + 2;
        let record = result.map_err(|e| DataError::record(path, row, e.to_string()))?;
        let cell = |i: usize| record.get(i).unwrap_or("");
        records.push(parse_record(path, row, cell(idx[0]), cell(idx[1]), cell(source_idx))?);
    }
    Ok(records)
}

fn read_speeches_json(path: &Path) -> Result<Vec<SentimentRecord>, DataError> {
    let text = fs::read_to_string(path).map_err(|e| DataError::io(path, e))?;
    let rows: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(&text)
        .map_err(|e| DataError::record(path, e.line(), format!("invalid JSON: {e}")))?;

    let text_of = |v: Option<&serde_json::Value>| -> Option<String> {
        match v? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    };

    rows.iter()
        .enumerate()
        .map(|(i, obj)| {
            // JSON rows are numbered from 1.
            let row = i + 1;
            let date = text_of(obj.get("date")).ok_or_else(|| missing(path, "date"))?;
            let sentiment = text_of(obj.get("sentiment")).ok_or_else(|| missing(path, "sentiment"))?;
            let source = SPEECH_SOURCE_COLUMNS
                .iter()
                .find_map(|c| text_of(obj.get(*c)))
                .ok_or_else(|| missing(path, SPEECH_SOURCE_COLUMNS[0]))?;
            parse_record(path, row, &date, &sentiment, &source)
        })
        .collect()
}

fn read_speeches_parquet(path: &Path) -> Result<Vec<SentimentRecord>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::io(path, e))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("{}: {e}", path.display())))?;

    let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    let source_name = SPEECH_SOURCE_COLUMNS
        .iter()
        .find(|c| names.iter().any(|n| n == *c))
        .ok_or_else(|| missing(path, SPEECH_SOURCE_COLUMNS[0]))?;

    let as_text = |name: &str| -> Result<Vec<Option<String>>, DataError> {
        let col = df.column(name).map_err(|_| missing(path, name))?;
        let col = match col.dtype() {
            DataType::Datetime(_, _) => col
                .cast(&DataType::Date)
                .map_err(|e| DataError::ParquetError(format!("{name}: {e}")))?,
            _ => col.clone(),
        };
        let col = col
            .cast(&DataType::String)
            .map_err(|e| DataError::ParquetError(format!("{name}: {e}")))?;
        let ca = col
            .str()
            .map_err(|e| DataError::ParquetError(format!("{name}: {e}")))?;
        Ok(ca.into_iter().map(|v| v.map(str::to_string)).collect())
    };

    let dates = as_text("date")?;
    let sentiments = as_text("sentiment")?;
    let sources = as_text(source_name)?;
    debug!(rows = df.height(), "read speeches parquet");

    (0..df.height())
        .map(|i| {
            let row = i + 1;
            let date = dates[i].as_deref().unwrap_or("");
            let sentiment = sentiments[i].as_deref().unwrap_or("");
            let source = sources[i].as_deref().unwrap_or("");
            parse_record(path, row, date, sentiment, source)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use polars::prelude::{Column, DataFrame, NamedFrom, ParquetWriter};
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn csv_with_country_code_and_filter() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "speeches.csv",
            "date,speaker,sentiment,country_code\n\
             2008-03-04,Bernanke,hawkish,US\n\
             2008-03-05,Trichet,dovish,EU\n\
             2008-03-11,Kohn,Dovish,us\n",
        );
        let all = load_speeches(&path, None).unwrap();
        assert_eq!(all.len(), 3);
        let us = load_speeches(&path, Some("US")).unwrap();
        assert_eq!(us.len(), 2);
        assert_eq!(us[1].polarity, Polarity::Dovish);
        assert_eq!(us[0].date, NaiveDate::from_ymd_opt(2008, 3, 4).unwrap());
    }

    #[test]
    fn unknown_label_aborts_with_row() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "s.csv",
            "date,sentiment,source\n2008-03-04,hawkish,US\n2008-03-05,bullish,US\n",
        );
        let err = load_speeches(&path, None).unwrap_err();
        assert!(matches!(err, DataError::InvalidRecord { row: 3, .. }), "{err}");
        assert!(err.to_string().contains("bullish"));
    }

    #[test]
    fn missing_source_column_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "s.csv", "date,sentiment\n2008-03-04,hawkish\n");
        assert!(matches!(
            load_speeches(&path, None),
            Err(DataError::MissingColumn { .. })
        ));
    }

    #[test]
    fn json_array_of_records() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "s.json",
            r#"[{"date": "2008-03-04", "sentiment": "neutral", "source": "US"},
                {"date": "2008-04-01T10:00:00", "sentiment": "hawkish", "country_code": "US"}]"#,
        );
        let records = load_speeches(&path, Some("US")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].polarity, Polarity::Neutral);
        assert_eq!(records[1].date, NaiveDate::from_ymd_opt(2008, 4, 1).unwrap());
    }

    #[test]
    fn json_bad_date_names_row() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "s.json",
            r#"[{"date": "2008-03-04", "sentiment": "dovish", "source": "US"},
                {"date": "sometime", "sentiment": "dovish", "source": "US"}]"#,
        );
        assert!(matches!(
            load_speeches(&path, None),
            Err(DataError::InvalidRecord { row: 2, .. })
        ));
    }

    #[test]
    fn parquet_with_string_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.parquet");
        let mut df = DataFrame::new(vec![
            Column::new("date".into(), vec!["2008-03-04", "2008-05-20"]),
            Column::new("sentiment".into(), vec!["hawkish", "dovish"]),
            Column::new("source".into(), vec!["US", "US"]),
        ])
        .unwrap();
        ParquetWriter::new(fs::File::create(&path).unwrap())
            .finish(&mut df)
            .unwrap();
        let records = load_speeches(&path, None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].polarity, Polarity::Dovish);
    }

    #[test]
    fn unsupported_extension() {
        assert!(matches!(
            load_speeches(Path::new("speeches.xlsx"), None),
            Err(DataError::UnsupportedFormat { .. })
        ));
    }
}
