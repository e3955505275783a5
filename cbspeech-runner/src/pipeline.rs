//! Pipeline orchestration.
//!
//! `load → standardize → pca → breakpoints → sentiment → regression → report`.
//! Every analysis stage is memoized in the [`StageCache`]; its key chains the
//! keys of the stages it consumes, so a change anywhere upstream invalidates
//! everything downstream. `inventory.json` marks a complete run: it is removed
//! before the first stage and written after the last one.

use cbspeech_core::analysis::PcaResult;
use cbspeech_core::data::{MacroProvider, ParquetCache};
use cbspeech_core::domain::TimeSeriesTable;
use cbspeech_core::fingerprint::Fingerprint;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

use crate::cache::{StageCache, StageKey};
use crate::config::{ConfigError, PipelineConfig};
use crate::data_loader::{load_macro, load_speech_records, LoadOptions, LoadedMacro, LoadedSpeeches};
use crate::reporting::{ArtifactManager, ArtifactPaths, RunInventory};
use crate::stage::{self, BreakpointStage, RegressionStage, SentimentStage, StageError, StageId};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("stage '{stage}' failed: {source}")]
    Stage {
        stage: StageId,
        #[source]
        source: StageError,
    },
}

impl PipelineError {
    fn stage(stage: StageId, source: impl Into<StageError>) -> Self {
        Self::Stage {
            stage,
            source: source.into(),
        }
    }

    /// The stage that failed, if any.
    pub fn failed_stage(&self) -> Option<StageId> {
        match self {
            PipelineError::Stage { stage, .. } => Some(*stage),
            PipelineError::Config(_) => None,
        }
    }
}

/// Timing and cache outcome of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageId,
    /// Memoization key; `None` for stages that are not memoized.
    pub key: Option<Fingerprint>,
    pub cache_hit: bool,
    pub elapsed_ms: u64,
}

/// Every intermediate value of a run.
#[derive(Debug, Clone)]
pub struct PipelineOutputs {
    pub macro_data: LoadedMacro,
    pub speeches: LoadedSpeeches,
    pub standardized: TimeSeriesTable,
    pub pca: PcaResult,
    pub breakpoints: BreakpointStage,
    pub sentiment: SentimentStage,
    pub regression: RegressionStage,
    pub stages: Vec<StageRecord>,
}

impl PipelineOutputs {
    pub fn cache_hits(&self) -> usize {
        self.stages.iter().filter(|s| s.cache_hit).count()
    }
}

/// A completed run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub outputs: PipelineOutputs,
    pub artifacts: ArtifactPaths,
    pub inventory: RunInventory,
}

/// Runs stages through the stage cache and records their outcome.
struct Memo {
    cache: StageCache,
    use_cached: bool,
    records: Vec<StageRecord>,
}

impl Memo {
    fn run<T, P, F>(
        &mut self,
        stage: StageId,
        params: &P,
        inputs: &[&Fingerprint],
        sources: &[PathBuf],
        compute: F,
    ) -> Result<(T, StageKey), PipelineError>
    where
        T: Serialize + DeserializeOwned,
        P: Serialize,
        F: FnOnce() -> Result<T, StageError>,
    {
        let started = Instant::now();
        let key = StageKey::derive(stage, params, inputs).map_err(|e| PipelineError::stage(stage, e))?;

        let cached = if self.use_cached {
            self.cache.load::<T>(&key, sources)
        } else {
            None
        };
        let cache_hit = cached.is_some();
        let value = match cached {
            Some(value) => value,
            None => {
                let value = compute().map_err(|e| PipelineError::stage(stage, e))?;
                if let Err(e) = self.cache.store(&key, &value) {
                    warn!(stage = %stage, error = %e, "failed to persist stage artifact");
                }
                value
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            stage = %stage,
            elapsed_ms,
            cache_hit,
            key = key.fingerprint.short(),
            "stage complete"
        );
        self.records.push(StageRecord {
            stage,
            key: Some(key.fingerprint.clone()),
            cache_hit,
            elapsed_ms,
        });
        Ok((value, key))
    }

    fn record(&mut self, stage: StageId, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(stage = %stage, elapsed_ms, "stage complete");
        self.records.push(StageRecord {
            stage,
            key: None,
            cache_hit: false,
            elapsed_ms,
        });
    }
}

/// Run the whole pipeline and write the report artifacts.
///
/// `provider` is the remote macro source; `None` means only the cache, the
/// local CSV and synthetic data are consulted.
pub fn run_pipeline(
    config: &PipelineConfig,
    provider: Option<&dyn MacroProvider>,
) -> Result<PipelineRun, PipelineError> {
    config.validate()?;
    let report_err = |e: anyhow::Error| PipelineError::stage(StageId::Report, StageError::Report(e));

    let manager = ArtifactManager::new(&config.run.output_dir).map_err(report_err)?;
    manager.remove_inventory().map_err(report_err)?;

    let mut memo = Memo {
        cache: StageCache::new(config.stage_cache_dir()),
        use_cached: config.run.use_cached,
        records: Vec::with_capacity(7),
    };

    info!(
        start = %config.data.start,
        end = %config.data.end,
        series = config.data.series.len(),
        "pipeline started"
    );

    // Load
    let started = Instant::now();
    let parquet = ParquetCache::new(&config.run.cache_dir);
    let macro_data = load_macro(
        &config.data.series,
        &parquet,
        provider,
        &LoadOptions::from_config(config),
    )
    .map_err(|e| PipelineError::stage(StageId::Load, e))?;
    let speeches = load_speech_records(config).map_err(|e| PipelineError::stage(StageId::Load, e))?;
    if macro_data.has_synthetic {
        warn!("macro panel contains synthetic series");
    }
    memo.record(StageId::Load, started);

    let (standardized, standardize_key) = memo.run(
        StageId::Standardize,
        &json!({ "rolling_window": config.analysis.rolling_window }),
        &[&macro_data.dataset_hash],
        &macro_data.source_files,
        || stage::standardize(config, &macro_data.table),
    )?;

    let (pca, pca_key) = memo.run::<PcaResult, _, _>(
        StageId::Pca,
        &(),
        &[&standardize_key.fingerprint],
        &[],
        || stage::pca(&standardized),
    )?;
    info!(
        components = pca.n_components(),
        excluded_rows = pca.excluded_rows,
        pc1_variance = pca.explained_variance_ratio.first().copied().unwrap_or(f64::NAN),
        "principal components fitted"
    );

    let a = &config.analysis;
    let (breakpoints, _) = memo.run::<BreakpointStage, _, _>(
        StageId::Breakpoints,
        &json!({
            "penalty": a.penalty,
            "min_segment": a.min_segment,
            "cost_model": a.cost_model,
        }),
        &[&pca_key.fingerprint],
        &[],
        || stage::breakpoints(config, &pca),
    )?;
    for s in &breakpoints.series {
        info!(series = %s.series, breaks = s.result.breakpoints.len(), "breakpoints");
    }

    let (sentiment, sentiment_key) = memo.run::<SentimentStage, _, _>(
        StageId::Sentiment,
        &json!({
            "rolling_window": a.rolling_window,
            "sentiment": config.sentiment,
            "range": [config.data.start, config.data.end],
        }),
        &[&speeches.hash],
        &speeches.source_files,
        || stage::sentiment(config, &speeches.records),
    )?;

    let (regression, _) = memo.run::<RegressionStage, _, _>(
        StageId::Regression,
        &json!({ "regression_window": a.regression_window }),
        &[&pca_key.fingerprint, &sentiment_key.fingerprint],
        &[],
        || stage::regression(config, &pca, &sentiment),
    )?;

    // Report
    let started = Instant::now();
    let mut outputs = PipelineOutputs {
        macro_data,
        speeches,
        standardized,
        pca,
        breakpoints,
        sentiment,
        regression,
        stages: Vec::new(),
    };
    let mut artifacts = manager.write_tables(&outputs).map_err(report_err)?;
    memo.record(StageId::Report, started);
    outputs.stages = memo.records;

    let inventory = RunInventory::build(config, &outputs, &artifacts);
    artifacts.inventory = Some(manager.write_inventory(&inventory).map_err(report_err)?);

    info!(
        output_dir = %config.run.output_dir.display(),
        artifacts = artifacts.files().len(),
        cache_hits = outputs.cache_hits(),
        "pipeline complete"
    );
    Ok(PipelineRun {
        outputs,
        artifacts,
        inventory,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        cfg.data.start = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        cfg.data.end = NaiveDate::from_ymd_opt(2012, 12, 1).unwrap();
        cfg.data.offline = true;
        cfg.data.synthetic = true;
        cfg.run.cache_dir = dir.path().join("cache");
        cfg.run.output_dir = dir.path().join("output");
        cfg
    }

    #[test]
    fn stage_records_follow_execution_order() {
        let dir = TempDir::new().unwrap();
        let run = run_pipeline(&config(&dir), None).unwrap();
        let order: Vec<StageId> = run.outputs.stages.iter().map(|s| s.stage).collect();
        assert_eq!(
            order,
            vec![
                StageId::Load,
                StageId::Standardize,
                StageId::Pca,
                StageId::Breakpoints,
                StageId::Sentiment,
                StageId::Regression,
                StageId::Report,
            ]
        );
        assert_eq!(run.outputs.cache_hits(), 0);
        assert!(run.outputs.stages[1..6].iter().all(|s| s.key.is_some()));
    }

    #[test]
    fn invalid_config_fails_before_any_stage() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.analysis.rolling_window = 0;
        let err = run_pipeline(&cfg, None).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert_eq!(err.failed_stage(), None);
        assert!(!cfg.run.output_dir.exists());
    }

    #[test]
    fn changed_penalty_recomputes_only_breakpoints() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        run_pipeline(&cfg, None).unwrap();

        cfg.run.use_cached = true;
        cfg.analysis.penalty = 8.0;
        let run = run_pipeline(&cfg, None).unwrap();
        let hit = |id: StageId| {
            run.outputs
                .stages
                .iter()
                .find(|s| s.stage == id)
                .map(|s| s.cache_hit)
                .unwrap()
        };
        assert!(hit(StageId::Standardize));
        assert!(hit(StageId::Pca));
        assert!(!hit(StageId::Breakpoints));
        assert!(hit(StageId::Sentiment));
        assert!(hit(StageId::Regression));
        assert_eq!(run.outputs.breakpoints.penalty, 8.0);
    }
}
