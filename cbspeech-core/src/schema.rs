//! File schema contracts: the boundary between data loading and analysis.
//!
//! Defines the exact column names and types that cached series and speech
//! datasets must provide. Used for validation when loading data.

use serde::{Deserialize, Serialize};

/// Expected data types in a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaType {
    Date,
    Float64,
    Utf8,
}

/// A single field in an expected schema.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaField {
    pub name: &'static str,
    pub dtype: SchemaType,
}

/// Cached macro series: one Parquet file per series.
///
/// - Columns: date, value
/// - Sort order: ascending by date
/// - Missing observations: null
pub const SERIES_SCHEMA: &[SchemaField] = &[
    SchemaField {
        name: "date",
        dtype: SchemaType::Date,
    },
    SchemaField {
        name: "value",
        dtype: SchemaType::Float64,
    },
];

/// Required speech columns. The source column may appear under any name in
/// [`SPEECH_SOURCE_COLUMNS`].
pub const SPEECH_SCHEMA: &[SchemaField] = &[
    SchemaField {
        name: "date",
        dtype: SchemaType::Date,
    },
    SchemaField {
        name: "sentiment",
        dtype: SchemaType::Utf8,
    },
];

pub const SPEECH_SOURCE_COLUMNS: &[&str] = &["source", "country_code"];

/// Accepted names for the date column of a local macro CSV.
pub const MACRO_DATE_COLUMNS: &[&str] = &["date", "Date", "datetime", "Datetime", "index"];

/// Date layouts accepted in text inputs, tried in order.
pub const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%SZ",
    "%m/%d/%Y",
];

/// Parse a date in any of [`DATE_FORMATS`]. Time-of-day is discarded.
pub fn parse_date(text: &str) -> Option<chrono::NaiveDate> {
    let text = text.trim();
    DATE_FORMATS.iter().find_map(|fmt| {
        chrono::NaiveDate::parse_from_str(text, fmt)
            .ok()
            .or_else(|| {
                chrono::NaiveDateTime::parse_from_str(text, fmt)
                    .ok()
                    .map(|dt| dt.date())
            })
    })
}

/// Find the first header in `headers` matching one of `candidates`.
pub fn find_column<'a>(headers: impl IntoIterator<Item = &'a str>, candidates: &[&str]) -> Option<usize> {
    let headers: Vec<&str> = headers.into_iter().collect();
    candidates
        .iter()
        .find_map(|c| headers.iter().position(|h| h.trim() == *c))
}
