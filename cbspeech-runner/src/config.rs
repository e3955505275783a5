//! Pipeline configuration.
//!
//! Loaded from a TOML file with `[data]`, `[analysis]`, `[sentiment]` and
//! `[run]` sections. Every field has a default, so an empty file (or no file)
//! is a valid configuration. Command-line flags are applied on top through
//! [`ConfigOverrides`]. The configuration is passed explicitly to every stage.
//!
//! Dates are written as quoted strings (`start = "1996-01-01"`).

use cbspeech_core::analysis::{AggregationOptions, CostModel, MissingMonthPolicy};
use cbspeech_core::data::{default_series, AlignPolicy, SeriesSpec};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub analysis: AnalysisConfig,
    pub sentiment: SentimentConfig,
    pub run: RunSettings,
}

/// Where the inputs come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Macro series to load: FRED id plus the column label used downstream.
    pub series: Vec<SeriesSpec>,
    pub align: AlignPolicy,
    /// Local macro CSV used when the remote source and the cache both fail.
    pub macro_csv: Option<PathBuf>,
    /// Labelled speeches (CSV, JSON or Parquet).
    pub speeches: Option<PathBuf>,
    /// Keep only speeches from this source (e.g. "US").
    pub source_filter: Option<String>,
    /// Falls back to the `FRED_API_KEY` environment variable. Never written
    /// to run artifacts.
    #[serde(skip_serializing)]
    pub fred_api_key: Option<String>,
    /// Never touch the network.
    pub offline: bool,
    /// Generate seeded synthetic data when real data is unavailable.
    pub synthetic: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(1996, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap_or_default(),
            series: default_series(),
            align: AlignPolicy::default(),
            macro_csv: None,
            speeches: None,
            source_filter: Some("US".into()),
            fred_api_key: None,
            offline: false,
            synthetic: false,
        }
    }
}

/// Window lengths and change-point parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub rolling_window: usize,
    pub regression_window: usize,
    pub penalty: f64,
    pub min_segment: usize,
    pub cost_model: CostModel,
    /// Cumulative explained variance used to report how many components
    /// matter.
    pub variance_threshold: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            rolling_window: 12,
            regression_window: 36,
            penalty: 4.0,
            min_segment: 2,
            cost_model: CostModel::default(),
            variance_threshold: 0.80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SentimentConfig {
    pub missing_months: MissingMonthPolicy,
    pub lag_months: usize,
    pub neutral_in_differential: bool,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            missing_months: MissingMonthPolicy::default(),
            lag_months: 1,
            neutral_in_differential: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSettings {
    pub seed: u64,
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Reuse stage artifacts and cached series when they are fresh.
    pub use_cached: bool,
    pub verbose: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            seed: 42,
            cache_dir: PathBuf::from("cache"),
            output_dir: PathBuf::from("output"),
            use_cached: false,
            verbose: false,
        }
    }
}

/// Values given on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub macro_csv: Option<PathBuf>,
    pub speeches: Option<PathBuf>,
    pub source_filter: Option<String>,
    pub offline: Option<bool>,
    pub synthetic: Option<bool>,
    pub rolling_window: Option<usize>,
    pub regression_window: Option<usize>,
    pub penalty: Option<f64>,
    pub min_segment: Option<usize>,
    pub cost_model: Option<CostModel>,
    pub missing_months: Option<MissingMonthPolicy>,
    pub lag_months: Option<usize>,
    pub seed: Option<u64>,
    pub cache_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub use_cached: Option<bool>,
    pub verbose: Option<bool>,
}

impl ConfigOverrides {
    /// Overrides that only move the cache directory.
    pub fn cache_dir(cache_dir: Option<PathBuf>) -> Self {
        Self {
            cache_dir,
            ..Self::default()
        }
    }
}

macro_rules! apply {
    ($target:expr, $value:expr) => {
        if let Some(v) = $value {
            $target = v;
        }
    };
}

impl PipelineConfig {
    /// Load a configuration from a TOML file. Does not validate.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn apply_overrides(&mut self, o: ConfigOverrides) {
        apply!(self.data.start, o.start);
        apply!(self.data.end, o.end);
        if o.macro_csv.is_some() {
            self.data.macro_csv = o.macro_csv;
        }
        if o.speeches.is_some() {
            self.data.speeches = o.speeches;
        }
        if o.source_filter.is_some() {
            self.data.source_filter = o.source_filter;
        }
        apply!(self.data.offline, o.offline);
        apply!(self.data.synthetic, o.synthetic);
        apply!(self.analysis.rolling_window, o.rolling_window);
        apply!(self.analysis.regression_window, o.regression_window);
        apply!(self.analysis.penalty, o.penalty);
        apply!(self.analysis.min_segment, o.min_segment);
        apply!(self.analysis.cost_model, o.cost_model);
        apply!(self.sentiment.missing_months, o.missing_months);
        apply!(self.sentiment.lag_months, o.lag_months);
        apply!(self.run.seed, o.seed);
        apply!(self.run.cache_dir, o.cache_dir);
        apply!(self.run.output_dir, o.output_dir);
        apply!(self.run.use_cached, o.use_cached);
        apply!(self.run.verbose, o.verbose);
    }

    /// Reject parameters no stage can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, message: String| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid { field, message })
        };
        let a = &self.analysis;
        if a.rolling_window == 0 {
            return invalid("analysis.rolling_window", "must be at least 1".into());
        }
        if a.regression_window < 2 {
            return invalid(
                "analysis.regression_window",
                format!("must be at least 2, got {}", a.regression_window),
            );
        }
        if !(a.penalty.is_finite() && a.penalty > 0.0) {
            return invalid(
                "analysis.penalty",
                format!("must be a positive finite number, got {}", a.penalty),
            );
        }
        if a.min_segment == 0 {
            return invalid("analysis.min_segment", "must be at least 1".into());
        }
        if !(a.variance_threshold > 0.0 && a.variance_threshold <= 1.0) {
            return invalid(
                "analysis.variance_threshold",
                format!("must lie in (0, 1], got {}", a.variance_threshold),
            );
        }
        if self.data.start > self.data.end {
            return invalid(
                "data.start",
                format!("{} is after data.end {}", self.data.start, self.data.end),
            );
        }
        if self.data.series.is_empty() {
            return invalid("data.series", "at least one series is required".into());
        }
        Ok(())
    }

    /// Sentiment aggregation options for this run's date range.
    pub fn aggregation_options(&self) -> AggregationOptions {
        AggregationOptions {
            missing_months: self.sentiment.missing_months,
            range: Some((self.data.start, self.data.end)),
            neutral_in_differential: self.sentiment.neutral_in_differential,
            lag_months: self.sentiment.lag_months,
        }
    }

    pub fn stage_cache_dir(&self) -> PathBuf {
        self.run.cache_dir.join("stages")
    }
}
