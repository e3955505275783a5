//! Parquet cache for raw macro series with Hive-style partitioning.
//!
//! Layout: `{cache_dir}/series={ID}/observations.parquet`
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Integrity validation on load (schema check, row count > 0)
//! - Quarantine for corrupt files ({filename}.quarantined)
//! - Metadata sidecar per series (hash, date range, source)

use super::provider::{DataError, DataSource, Observation};
use crate::schema::SERIES_SCHEMA;
use chrono::{Datelike, Months, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const DATA_FILE: &str = "observations.parquet";
const META_FILE: &str = "meta.json";

/// Metadata sidecar for a cached series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub series_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub observation_count: usize,
    /// Smallest spacing between observations, in months (3 for quarterly).
    #[serde(default = "monthly")]
    pub period_months: u32,
    pub data_hash: String,
    pub source: DataSource,
    pub cached_at: chrono::NaiveDateTime,
}

fn monthly() -> u32 {
    1
}

impl CacheMeta {
    /// Last month the cached data speaks for: the final observation stands
    /// for its whole period, so a quarterly value dated January covers March.
    pub fn covered_through(&self) -> NaiveDate {
        self.end_date
            .checked_add_months(Months::new(self.period_months.saturating_sub(1)))
            .unwrap_or(self.end_date)
    }
}

/// Smallest gap in months between consecutive dates; 1 when there is no gap.
fn period_months(observations: &[Observation]) -> u32 {
    let index = |d: NaiveDate| d.year() * 12 + d.month0() as i32;
    observations
        .windows(2)
        .map(|w| index(w[1].date) - index(w[0].date))
        .filter(|&gap| gap > 0)
        .min()
        .map_or(1, |gap| gap as u32)
}

/// The Parquet cache.
pub struct ParquetCache {
    cache_dir: PathBuf,
}

impl ParquetCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Root directory of the cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Directory for a specific series: `{cache_dir}/series={ID}/`
    fn series_dir(&self, series_id: &str) -> PathBuf {
        self.cache_dir.join(format!("series={series_id}"))
    }

    /// Parquet file of a series (present or not).
    pub fn data_path(&self, series_id: &str) -> PathBuf {
        self.series_dir(series_id).join(DATA_FILE)
    }

    fn meta_path(&self, series_id: &str) -> PathBuf {
        self.series_dir(series_id).join(META_FILE)
    }

    /// Write observations for a series, replacing any cached copy.
    ///
    /// Writes are atomic: write to .tmp then rename. The sidecar is written
    /// last, so a present sidecar implies a complete data file.
    pub fn write(
        &self,
        series_id: &str,
        observations: &[Observation],
        source: DataSource,
    ) -> Result<CacheMeta, DataError> {
        let (first, last) = match (observations.first(), observations.last()) {
            (Some(f), Some(l)) => (f.date, l.date),
            _ => return Err(DataError::CacheError("no observations to cache".into())),
        };

        let dir = self.series_dir(series_id);
        fs::create_dir_all(&dir).map_err(|e| DataError::io(&dir, e))?;

        let df = observations_to_dataframe(observations)?;
        let path = self.data_path(series_id);
        let tmp_path = path.with_extension("parquet.tmp");
        write_parquet(&df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::CacheError(format!("atomic rename failed: {e}"))
        })?;

        let meta = CacheMeta {
            series_id: series_id.to_string(),
            start_date: first,
            end_date: last,
            observation_count: observations.len(),
            period_months: period_months(observations),
            data_hash: blake3::hash(
                &serde_json::to_vec(observations)
                    .map_err(|e| DataError::CacheError(format!("hash serialization: {e}")))?,
            )
            .to_hex()
            .to_string(),
            source,
            cached_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
        let meta_path = self.meta_path(series_id);
        let meta_tmp = meta_path.with_extension("json.tmp");
        fs::write(&meta_tmp, meta_json).map_err(|e| DataError::io(&meta_tmp, e))?;
        fs::rename(&meta_tmp, &meta_path).map_err(|e| DataError::io(&meta_path, e))?;

        Ok(meta)
    }

    /// Load cached observations, sorted by date ascending.
    ///
    /// A file that fails validation is renamed to `*.quarantined` and the
    /// series is reported as not cached.
    pub fn load(&self, series_id: &str) -> Result<Vec<Observation>, DataError> {
        let path = self.data_path(series_id);
        if !path.exists() {
            return Err(DataError::NoCachedData {
                series: series_id.to_string(),
            });
        }

        match load_and_validate_parquet(&path) {
            Ok(mut observations) => {
                observations.sort_by_key(|o| o.date);
                Ok(observations)
            }
            Err(e) => {
                let quarantine = path.with_extension("parquet.quarantined");
                warn!(
                    path = %path.display(),
                    error = %e,
                    "quarantining corrupt cache file"
                );
                let _ = fs::rename(&path, &quarantine);
                let _ = fs::remove_file(self.meta_path(series_id));
                Err(DataError::NoCachedData {
                    series: series_id.to_string(),
                })
            }
        }
    }

    /// Metadata of a cached series, if any.
    pub fn get_meta(&self, series_id: &str) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path(series_id)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Cache status of each requested series.
    pub fn status(&self, series_ids: &[&str]) -> Vec<CacheStatus> {
        series_ids
            .iter()
            .map(|id| {
                let meta = self.get_meta(id);
                CacheStatus {
                    series_id: id.to_string(),
                    cached: meta.is_some(),
                    start_date: meta.as_ref().map(|m| m.start_date),
                    end_date: meta.as_ref().map(|m| m.end_date),
                    observation_count: meta.as_ref().map(|m| m.observation_count),
                    source: meta.as_ref().map(|m| m.source),
                }
            })
            .collect()
    }

    /// Ids of every series with a cache directory, sorted.
    pub fn list_series(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.cache_dir) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                e.file_name()
                    .to_str()
                    .and_then(|n| n.strip_prefix("series="))
                    .map(str::to_string)
            })
            .collect();
        ids.sort();
        ids
    }

    /// Whether the cached copy covers `[start, end]`. Coverage runs to
    /// [`CacheMeta::covered_through`], not just the last observation date.
    pub fn covers_range(&self, series_id: &str, start: NaiveDate, end: NaiveDate) -> CoverageResult {
        match self.get_meta(series_id) {
            None => CoverageResult::NotCached,
            Some(meta) => {
                if meta.start_date <= start && meta.covered_through() >= end {
                    CoverageResult::FullyCovered
                } else {
                    CoverageResult::PartiallyCovered {
                        cached_start: meta.start_date,
                        cached_end: meta.end_date,
                    }
                }
            }
        }
    }

    /// Delete one series from the cache. Returns whether anything was removed.
    pub fn remove(&self, series_id: &str) -> Result<bool, DataError> {
        let dir = self.series_dir(series_id);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir).map_err(|e| DataError::io(&dir, e))?;
        Ok(true)
    }
}

/// Cache status for a single series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub series_id: String,
    pub cached: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub observation_count: Option<usize>,
    pub source: Option<DataSource>,
}

/// How well the cache covers the requested date range.
#[derive(Debug, Clone, PartialEq)]
pub enum CoverageResult {
    NotCached,
    FullyCovered,
    PartiallyCovered {
        cached_start: NaiveDate,
        cached_end: NaiveDate,
    },
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

fn observations_to_dataframe(observations: &[Observation]) -> Result<DataFrame, DataError> {
    let dates: Vec<i32> = observations
        .iter()
        .map(|o| (o.date - epoch()).num_days() as i32)
        .collect();
    let values: Vec<Option<f64>> = observations
        .iter()
        .map(|o| o.value.is_finite().then_some(o.value))
        .collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| DataError::ParquetError(format!("date cast: {e}")))?,
        Column::new("value".into(), values),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), DataError> {
    let file = fs::File::create(path).map_err(|e| DataError::io(path, e))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate_parquet(path: &Path) -> Result<Vec<Observation>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::io(path, e))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(DataError::Validation("empty parquet file".into()));
    }
    for field in SERIES_SCHEMA {
        if df.column(field.name).is_err() {
            return Err(DataError::Validation(format!(
                "missing column '{}'",
                field.name
            )));
        }
    }

    let map_err = |e: PolarsError| DataError::ParquetError(format!("column read: {e}"));
    let date_ca = df
        .column("date")
        .map_err(map_err)?
        .date()
        .map_err(|e| DataError::ParquetError(format!("date column type: {e}")))?;
    let value_ca = df
        .column("value")
        .map_err(map_err)?
        .f64()
        .map_err(|e| DataError::ParquetError(format!("value column type: {e}")))?;

    let epoch = epoch();
    (0..df.height())
        .map(|i| {
            let days = date_ca
                .get(i)
                .ok_or_else(|| DataError::ParquetError(format!("null date at row {i}")))?;
            Ok(Observation::new(
                epoch + chrono::Duration::days(days as i64),
                value_ca.get(i).unwrap_or(f64::NAN),
            ))
        })
        .collect()
}
