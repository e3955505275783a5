//! Macro data provider trait and structured error types.
//!
//! The MacroProvider trait abstracts over data sources (FRED, synthetic) so we
//! can swap implementations and mock for tests. The cache and the local CSV
//! fallback sit above this trait; providers don't know about them.

use crate::domain::{nan_serde, TableError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// One raw observation of a macro series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    #[serde(with = "nan_serde::scalar")]
    pub value: f64,
}

impl Observation {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// A macro series to load: provider identifier plus the column name used in
/// every table downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesSpec {
    pub id: String,
    pub label: String,
}

impl SeriesSpec {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// FRED identifiers and labels of the default macro panel.
pub const DEFAULT_SERIES: &[(&str, &str)] = &[
    ("FEDFUNDS", "FED Funds Rate"),
    ("CPIAUCNS", "CPI"),
    ("PPIACO", "PPI"),
    ("GDP", "GDP"),
    ("UNRATE", "Unemployment"),
    ("PAYEMS", "Nonfarm Payrolls"),
];

pub fn default_series() -> Vec<SeriesSpec> {
    DEFAULT_SERIES
        .iter()
        .map(|(id, label)| SeriesSpec::new(*id, *label))
        .collect()
}

/// Structured error types for data operations.
///
/// Every variant that concerns an input record names the file and row so a
/// failed run can be diagnosed from the message alone.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("provider returned HTTP {status} for series '{series}': {message}")]
    HttpStatus {
        series: String,
        status: u16,
        message: String,
    },

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("series not found: {series}")]
    SeriesNotFound { series: String },

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("no cached data for series '{series}'; run `cbspeech fetch --series {series}` first")]
    NoCachedData { series: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: missing required column '{column}'", .path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("{} row {row}: {message}", .path.display())]
    InvalidRecord {
        path: PathBuf,
        row: usize,
        message: String,
    },

    #[error("{}: unsupported file format (expected .csv, .json or .parquet)", .path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("gap in monthly index between {before} and {after}")]
    DateGap { before: NaiveDate, after: NaiveDate },

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Table(#[from] TableError),
}

impl DataError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DataError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn record(path: impl Into<PathBuf>, row: usize, message: impl Into<String>) -> Self {
        DataError::InvalidRecord {
            path: path.into(),
            row,
            message: message.into(),
        }
    }
}

/// Result of a successful fetch for a single series.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub series_id: String,
    pub observations: Vec<Observation>,
    pub source: DataSource,
}

/// Where the data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Fred,
    Cache,
    LocalCsv,
    Synthetic,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Fred => "fred",
            DataSource::Cache => "cache",
            DataSource::LocalCsv => "local_csv",
            DataSource::Synthetic => "synthetic",
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for macro data providers.
pub trait MacroProvider {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch observations of one series over an inclusive date range.
    fn fetch(
        &self,
        series_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError>;

    /// Whether a fetch can be attempted at all (credentials present, online).
    fn is_available(&self) -> bool;
}

/// Progress callback for multi-series downloads.
pub trait DownloadProgress {
    fn on_start(&self, series_id: &str, index: usize, total: usize);

    fn on_complete(&self, series_id: &str, index: usize, total: usize, result: &Result<(), DataError>);

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that logs through `tracing`.
pub struct LogProgress;

impl DownloadProgress for LogProgress {
    fn on_start(&self, series_id: &str, index: usize, total: usize) {
        tracing::info!("[{}/{}] fetching {series_id}", index + 1, total);
    }

    fn on_complete(
        &self,
        series_id: &str,
        _index: usize,
        _total: usize,
        result: &Result<(), DataError>,
    ) {
        match result {
            Ok(()) => tracing::info!("  ok: {series_id}"),
            Err(e) => tracing::warn!("  failed: {series_id}: {e}"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        tracing::info!("download complete: {succeeded}/{total} succeeded, {failed} failed");
    }
}
