//! cbspeech runner: pipeline orchestration on top of `cbspeech-core`.
//!
//! This crate provides:
//! - TOML configuration with command-line overrides
//! - Macro loading with cache/download/CSV/synthetic fallback, and speech loading
//! - Pipeline stages as pure functions, memoized by content fingerprint
//! - The orchestrator that runs them in order and names the failing stage
//! - Report artifacts (CSV/JSON) and the run inventory

pub mod cache;
pub mod config;
pub mod data_loader;
pub mod pipeline;
pub mod reporting;
pub mod stage;

pub use cache::{StageCache, StageCacheError, StageCacheSummary, StageKey};
pub use config::{ConfigError, ConfigOverrides, PipelineConfig};
pub use data_loader::{
    load_macro, load_speech_records, LoadError, LoadOptions, LoadedMacro, LoadedSpeeches,
};
pub use pipeline::{run_pipeline, PipelineError, PipelineOutputs, PipelineRun, StageRecord};
pub use reporting::{ArtifactManager, ArtifactPaths, RunInventory};
pub use stage::{BreakpointStage, RegressionStage, SentimentStage, StageError, StageId};
