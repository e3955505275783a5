//! Artifact manager for persisting run outputs.

mod breakpoints;
mod inventory;
mod tables;

use anyhow::{Context, Result};
use cbspeech_core::analysis::{INFLATION_INDEX, MACRO_STRENGTH_INDEX};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::pipeline::PipelineOutputs;

pub use breakpoints::{read_breakpoints, write_breakpoints};
pub use inventory::{
    read_inventory, write_inventory, BreakpointSummary, PcaSummary, RowCounts, RunInventory,
    INVENTORY_SCHEMA_VERSION,
};
pub use tables::{read_matrix, read_table, write_matrix, write_table, LabelledMatrix};

pub const INVENTORY_FILE: &str = "inventory.json";

/// File stem suffix used for a named component (`rolling_results_<suffix>.csv`).
pub fn component_suffix(component: &str) -> Option<&'static str> {
    match component {
        MACRO_STRENGTH_INDEX => Some("macro"),
        INFLATION_INDEX => Some("inflation"),
        _ => None,
    }
}

/// Artifact paths returned after export, in write order.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub raw_macro: PathBuf,
    pub processed_macro: PathBuf,
    pub pca_components: PathBuf,
    pub pca_loadings: PathBuf,
    pub breakpoints: PathBuf,
    pub sentiment_aggregated: PathBuf,
    pub rolling_results: Vec<PathBuf>,
    pub merged: Vec<PathBuf>,
    pub correlation_matrix: PathBuf,
    pub inventory: Option<PathBuf>,
}

impl ArtifactPaths {
    pub fn files(&self) -> Vec<&Path> {
        let mut files = vec![
            self.raw_macro.as_path(),
            self.processed_macro.as_path(),
            self.pca_components.as_path(),
            self.pca_loadings.as_path(),
            self.breakpoints.as_path(),
            self.sentiment_aggregated.as_path(),
        ];
        files.extend(self.rolling_results.iter().map(PathBuf::as_path));
        files.extend(self.merged.iter().map(PathBuf::as_path));
        files.push(self.correlation_matrix.as_path());
        files.extend(self.inventory.as_deref());
        files
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files()
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect()
    }
}

/// Manages writing all artifacts for a run.
#[derive(Debug, Clone)]
pub struct ArtifactManager {
    output_dir: PathBuf,
}

impl ArtifactManager {
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&output_dir)
            .context("Failed to create artifact output directory")?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn inventory_path(&self) -> PathBuf {
        self.output_dir.join(INVENTORY_FILE)
    }

    /// Drop the completion marker of a previous run.
    pub fn remove_inventory(&self) -> Result<()> {
        let path = self.inventory_path();
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed previous inventory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }

    /// Write every table and the breakpoint JSON. The inventory is written
    /// separately, after the caller has recorded the report stage.
    pub fn write_tables(&self, outputs: &PipelineOutputs) -> Result<ArtifactPaths> {
        let dir = &self.output_dir;

        let raw_macro = dir.join("raw_macro.csv");
        write_table(&raw_macro, &outputs.macro_data.table)?;

        let processed_macro = dir.join("processed_macro.csv");
        write_table(&processed_macro, &outputs.standardized)?;

        let pca_components = dir.join("pca_components.csv");
        write_table(&pca_components, &outputs.pca.scores)?;

        let pca_loadings = dir.join("pca_loadings.csv");
        write_matrix(&pca_loadings, &LabelledMatrix::loadings(&outputs.pca))?;

        let breakpoints = dir.join("breakpoints.json");
        write_breakpoints(&breakpoints, &outputs.breakpoints)?;

        let sentiment_aggregated = dir.join("sentiment_aggregated.csv");
        write_table(&sentiment_aggregated, &outputs.sentiment.table)?;

        let mut rolling_results = Vec::new();
        let mut merged = Vec::new();
        for component in &outputs.regression.components {
            let Some(suffix) = component_suffix(&component.component) else {
                continue;
            };
            let results_path = dir.join(format!("rolling_results_{suffix}.csv"));
            write_table(&results_path, &component.results)?;
            rolling_results.push(results_path);

            let merged_path = dir.join(format!("merged_{suffix}.csv"));
            write_table(&merged_path, &component.merged)?;
            merged.push(merged_path);
        }

        let correlation_matrix = dir.join("correlation_matrix.csv");
        write_matrix(
            &correlation_matrix,
            &LabelledMatrix::correlations(&outputs.regression.correlations),
        )?;

        Ok(ArtifactPaths {
            raw_macro,
            processed_macro,
            pca_components,
            pca_loadings,
            breakpoints,
            sentiment_aggregated,
            rolling_results,
            merged,
            correlation_matrix,
            inventory: None,
        })
    }

    pub fn write_inventory(&self, inventory: &RunInventory) -> Result<PathBuf> {
        let path = self.inventory_path();
        write_inventory(&path, inventory)?;
        Ok(path)
    }
}
