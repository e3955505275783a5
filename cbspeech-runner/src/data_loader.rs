//! Macro and speech loading for the pipeline.
//!
//! Implements the fallback policy, per series:
//! 1. If `use_cached` and the Parquet cache covers the range → use it
//! 2. If online and a provider is available → fetch and write through to the cache
//! 3. If the fetch failed → any cached copy, then the local macro CSV
//! 4. If `synthetic` → generate seeded synthetic data (tagged)
//! 5. Otherwise → fail naming the series and the cause
//!
//! The loaded series are aligned onto one monthly calendar.

use cbspeech_core::data::{
    align_series, load_speeches, read_macro_csv, synthetic_speeches, AlignPolicy, CoverageResult,
    DataError, DataSource, MacroProvider, Observation, ParquetCache, SeriesSpec, SyntheticProvider,
};
use cbspeech_core::domain::{month_start, SentimentRecord, TimeSeriesTable};
use cbspeech_core::fingerprint::{records_fingerprint, table_fingerprint, Fingerprint};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("series '{series}' unavailable: {cause} (use --synthetic for synthetic data)")]
    SeriesUnavailable { series: String, cause: String },

    #[error("no speeches file configured (set data.speeches or use --synthetic)")]
    NoSpeeches,

    #[error("speeches file {} contains no records after filtering", .path.display())]
    EmptySpeeches { path: PathBuf },

    #[error("data error: {0}")]
    Data(#[from] DataError),
}

/// Options controlling how macro series are loaded.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// If true, never make network requests.
    pub offline: bool,
    /// If true, generate synthetic data when real data is unavailable.
    pub synthetic: bool,
    /// Prefer a cached copy that covers the range over a fresh fetch.
    pub use_cached: bool,
    pub align: AlignPolicy,
    pub macro_csv: Option<PathBuf>,
    pub seed: u64,
}

impl LoadOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            start: month_start(config.data.start),
            end: month_start(config.data.end),
            offline: config.data.offline,
            synthetic: config.data.synthetic,
            use_cached: config.run.use_cached,
            align: config.data.align,
            macro_csv: config.data.macro_csv.clone(),
            seed: config.run.seed,
        }
    }
}

/// Aligned macro table plus provenance.
#[derive(Debug, Clone)]
pub struct LoadedMacro {
    /// One column per series, named by label.
    pub table: TimeSeriesTable,
    /// Data source per series id.
    pub sources: BTreeMap<String, DataSource>,
    /// BLAKE3 fingerprint of the aligned table.
    pub dataset_hash: Fingerprint,
    pub has_synthetic: bool,
    /// Files the table was read from, for artifact freshness checks.
    pub source_files: Vec<PathBuf>,
}

/// Load and align the macro panel.
pub fn load_macro(
    series: &[SeriesSpec],
    cache: &ParquetCache,
    provider: Option<&dyn MacroProvider>,
    opts: &LoadOptions,
) -> Result<LoadedMacro, LoadError> {
    let mut labelled: Vec<(String, Vec<Observation>)> = Vec::with_capacity(series.len());
    let mut sources = BTreeMap::new();
    let mut source_files = Vec::new();
    let mut has_synthetic = false;
    let mut local: Option<TimeSeriesTable> = None;

    for spec in series {
        let id = spec.id.as_str();

        // Step 1: fresh cache
        let covered = cache.covers_range(id, opts.start, opts.end) == CoverageResult::FullyCovered;
        if opts.use_cached && covered {
            if let Ok(obs) = cache.load(id) {
                debug!(series = id, "using cached series");
                labelled.push((spec.label.clone(), in_range(obs, opts)));
                sources.insert(id.to_string(), DataSource::Cache);
                source_files.push(cache.data_path(id));
                continue;
            }
        }

        // Step 2: fetch
        let mut cause = if opts.offline {
            "offline".to_string()
        } else {
            "no provider available".to_string()
        };
        if !opts.offline {
            if let Some(prov) = provider.filter(|p| p.is_available()) {
                match prov.fetch(id, opts.start, opts.end) {
                    Ok(fetched) if !fetched.observations.is_empty() => {
                        if let Err(e) = cache.write(id, &fetched.observations, fetched.source) {
                            warn!(series = id, error = %e, "failed to write series to cache");
                        } else {
                            source_files.push(cache.data_path(id));
                        }
                        info!(
                            series = id,
                            provider = prov.name(),
                            observations = fetched.observations.len(),
                            "fetched series"
                        );
                        labelled.push((spec.label.clone(), in_range(fetched.observations, opts)));
                        sources.insert(id.to_string(), fetched.source);
                        continue;
                    }
                    Ok(_) => cause = format!("{} returned no observations", prov.name()),
                    Err(e) => {
                        warn!(series = id, error = %e, "fetch failed, trying fallbacks");
                        cause = e.to_string();
                    }
                }
            }
        }

        // Step 3a: any cached copy
        if let Ok(obs) = cache.load(id) {
            warn!(series = id, "using cached copy after fetch failure");
            labelled.push((spec.label.clone(), in_range(obs, opts)));
            sources.insert(id.to_string(), DataSource::Cache);
            source_files.push(cache.data_path(id));
            continue;
        }

        // Step 3b: local CSV
        if let Some(path) = &opts.macro_csv {
            if local.is_none() && path.exists() {
                local = Some(read_macro_csv(path)?);
            }
            if let Some(obs) = local.as_ref().and_then(|t| csv_series(t, spec)) {
                warn!(series = id, path = %path.display(), "using local CSV fallback");
                labelled.push((spec.label.clone(), in_range(obs, opts)));
                sources.insert(id.to_string(), DataSource::LocalCsv);
                source_files.push(path.clone());
                continue;
            }
        }

        // Step 4: synthetic
        if opts.synthetic {
            warn!(series = id, "generating synthetic data, results will be tagged synthetic");
            let obs = SyntheticProvider::new(opts.seed).series(id, opts.start, opts.end);
            labelled.push((spec.label.clone(), obs));
            sources.insert(id.to_string(), DataSource::Synthetic);
            has_synthetic = true;
            continue;
        }

        // Step 5: fail
        return Err(LoadError::SeriesUnavailable {
            series: id.to_string(),
            cause,
        });
    }

    let table = align_series(&labelled, opts.align, Some((opts.start, opts.end)))?;
    let dataset_hash = table_fingerprint(&table);
    source_files.sort();
    source_files.dedup();
    info!(
        rows = table.len(),
        series = table.width(),
        hash = dataset_hash.short(),
        "macro panel loaded"
    );

    Ok(LoadedMacro {
        table,
        sources,
        dataset_hash,
        has_synthetic,
        source_files,
    })
}

fn in_range(observations: Vec<Observation>, opts: &LoadOptions) -> Vec<Observation> {
    observations
        .into_iter()
        .filter(|o| {
            let m = month_start(o.date);
            m >= opts.start && m <= opts.end
        })
        .collect()
}

/// A series from the local CSV, looked up by id first, then by label.
fn csv_series(table: &TimeSeriesTable, spec: &SeriesSpec) -> Option<Vec<Observation>> {
    let values = table.column(&spec.id).or_else(|| table.column(&spec.label))?;
    Some(
        table
            .dates()
            .iter()
            .zip(values)
            .map(|(d, v)| Observation::new(*d, *v))
            .collect(),
    )
}

/// Speech records plus provenance.
#[derive(Debug, Clone)]
pub struct LoadedSpeeches {
    pub records: Vec<SentimentRecord>,
    /// File path, or "synthetic".
    pub origin: String,
    pub hash: Fingerprint,
    pub source_files: Vec<PathBuf>,
}

/// Load the labelled speeches, or synthesize them when no file is configured
/// and synthetic data is enabled.
pub fn load_speech_records(config: &PipelineConfig) -> Result<LoadedSpeeches, LoadError> {
    let filter = config.data.source_filter.as_deref();
    let (records, origin, source_files) = match &config.data.speeches {
        Some(path) => {
            let records = load_speeches(path, filter)?;
            if records.is_empty() {
                return Err(LoadError::EmptySpeeches { path: path.clone() });
            }
            (records, path.display().to_string(), vec![path.clone()])
        }
        None if config.data.synthetic => {
            warn!("no speeches file configured, generating synthetic speeches");
            let records = synthetic_speeches(
                config.run.seed,
                filter.unwrap_or("US"),
                config.data.start,
                config.data.end,
            );
            (records, "synthetic".to_string(), Vec::new())
        }
        None => return Err(LoadError::NoSpeeches),
    };
    let hash = records_fingerprint(&records);
    Ok(LoadedSpeeches {
        records,
        origin,
        hash,
        source_files,
    })
}
