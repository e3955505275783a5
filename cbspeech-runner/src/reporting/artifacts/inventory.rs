//! Run inventory (JSON): parameters, provenance and headline results.
//!
//! Written last; its presence marks a complete run.

use anyhow::{Context, Result};
use cbspeech_core::analysis::{CorrelationMatrix, Regime, SentimentSummary};
use cbspeech_core::data::DataSource;
use cbspeech_core::fingerprint::Fingerprint;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::ArtifactPaths;
use crate::config::PipelineConfig;
use crate::pipeline::{PipelineOutputs, StageRecord};
use crate::stage::Autocorrelation;

pub const INVENTORY_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInventory {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    /// Effective configuration (API key omitted).
    pub parameters: PipelineConfig,
    pub rows: RowCounts,
    pub pca: PcaSummary,
    pub breakpoints: Vec<BreakpointSummary>,
    pub sentiment: SentimentSummary,
    pub correlations: CorrelationMatrix,
    pub autocorrelations: Vec<Autocorrelation>,
    /// Source per macro series id.
    pub data_sources: BTreeMap<String, DataSource>,
    pub speeches_origin: String,
    pub has_synthetic: bool,
    pub dataset_hash: Fingerprint,
    pub speeches_hash: Fingerprint,
    pub stages: Vec<StageRecord>,
    /// Files written before the inventory, relative to the output directory.
    pub artifacts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowCounts {
    pub raw_macro: usize,
    pub standardized_complete: usize,
    pub pca_scores: usize,
    pub pca_excluded: usize,
    pub speeches: usize,
    pub sentiment_months: usize,
    /// Differenced rows per regressed component.
    pub regression: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaSummary {
    pub variables: Vec<String>,
    pub eigenvalues: Vec<f64>,
    pub explained_variance_ratio: Vec<f64>,
    pub cumulative_variance: Vec<f64>,
    pub variance_threshold: f64,
    pub components_for_threshold: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointSummary {
    pub series: String,
    pub indices: Vec<usize>,
    pub dates: Vec<NaiveDate>,
    pub regimes: Vec<Regime>,
}

impl RunInventory {
    pub fn build(config: &PipelineConfig, outputs: &PipelineOutputs, artifacts: &ArtifactPaths) -> Self {
        let pca = &outputs.pca;
        let threshold = config.analysis.variance_threshold;
        Self {
            schema_version: INVENTORY_SCHEMA_VERSION,
            generated_at: Utc::now(),
            parameters: config.clone(),
            rows: RowCounts {
                raw_macro: outputs.macro_data.table.len(),
                standardized_complete: outputs.standardized.complete_row_count(),
                pca_scores: pca.scores.len(),
                pca_excluded: pca.excluded_rows,
                speeches: outputs.speeches.records.len(),
                sentiment_months: outputs.sentiment.table.len(),
                regression: outputs
                    .regression
                    .components
                    .iter()
                    .map(|c| (c.component.clone(), c.merged.len()))
                    .collect(),
            },
            pca: PcaSummary {
                variables: pca.variables.clone(),
                eigenvalues: pca.eigenvalues.clone(),
                explained_variance_ratio: pca.explained_variance_ratio.clone(),
                cumulative_variance: pca.cumulative_variance(),
                variance_threshold: threshold,
                components_for_threshold: pca.n_components_for(threshold),
            },
            breakpoints: outputs
                .breakpoints
                .series
                .iter()
                .map(|s| BreakpointSummary {
                    series: s.series.clone(),
                    indices: s.result.breakpoints.iter().map(|b| b.index).collect(),
                    dates: s.result.dates(),
                    regimes: s.result.regimes.clone(),
                })
                .collect(),
            sentiment: outputs.sentiment.summary.clone(),
            correlations: outputs.regression.correlations.clone(),
            autocorrelations: outputs.regression.autocorrelations.clone(),
            data_sources: outputs.macro_data.sources.clone(),
            speeches_origin: outputs.speeches.origin.clone(),
            has_synthetic: outputs.macro_data.has_synthetic || outputs.speeches.origin == "synthetic",
            dataset_hash: outputs.macro_data.dataset_hash.clone(),
            speeches_hash: outputs.speeches.hash.clone(),
            stages: outputs.stages.clone(),
            artifacts: artifacts.file_names(),
        }
    }

    pub fn stage(&self, stage: crate::stage::StageId) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

/// Write the inventory through a temporary file so a reader never sees a
/// partial one.
pub fn write_inventory(path: &Path, inventory: &RunInventory) -> Result<()> {
    let json = serde_json::to_string_pretty(inventory)
        .context("Failed to serialize run inventory")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .with_context(|| format!("Failed to write inventory to {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move inventory into {}", path.display()))?;
    Ok(())
}

pub fn read_inventory(path: &Path) -> Result<RunInventory> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read inventory from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Malformed inventory {}", path.display()))
}
