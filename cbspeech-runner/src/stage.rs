//! Pipeline stages as pure functions of their inputs and the configuration.
//!
//! Order: standardize → pca → breakpoints → sentiment → regression. Each stage
//! takes immutable inputs and returns a new, serializable value that the
//! stage cache can persist.

use cbspeech_core::analysis::{
    aggregate_monthly, autocorrelation, correlation_matrix, fit_pca, first_difference,
    rolling_ols, rolling_standardize, standardize_sentiment, summarize, AnalysisError,
    BreakpointResult, CorrelationMatrix, CostModel, PcaResult, Pelt, SentimentSummary,
};
use cbspeech_core::domain::{
    nan_serde, MonthlySentimentCount, SentimentRecord, TableError, TimeSeriesTable,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::cache::StageCacheError;
use crate::config::PipelineConfig;
use crate::data_loader::LoadError;

/// Sentiment columns used as regression predictors.
pub const PREDICTORS: [(&str, &str); 2] = [("hawkish_z", "hawkish"), ("dovish_z", "dovish")];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Load,
    Standardize,
    Pca,
    Breakpoints,
    Sentiment,
    Regression,
    Report,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Load => "load",
            StageId::Standardize => "standardize",
            StageId::Pca => "pca",
            StageId::Breakpoints => "breakpoints",
            StageId::Sentiment => "sentiment",
            StageId::Regression => "regression",
            StageId::Report => "report",
        }
    }

    /// Stages whose outputs are memoized.
    pub const MEMOIZED: [StageId; 5] = [
        StageId::Standardize,
        StageId::Pca,
        StageId::Breakpoints,
        StageId::Sentiment,
        StageId::Regression,
    ];
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stage failed.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Cache(#[from] StageCacheError),

    #[error("failed to derive stage key: {0}")]
    Key(#[from] serde_json::Error),

    #[error("{0:#}")]
    Report(anyhow::Error),
}

// ── Outputs ──────────────────────────────────────────────────────────

/// Change points of one named index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesBreakpoints {
    pub series: String,
    #[serde(flatten)]
    pub result: BreakpointResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointStage {
    pub penalty: f64,
    pub min_segment: usize,
    pub cost_model: CostModel,
    pub series: Vec<SeriesBreakpoints>,
}

impl BreakpointStage {
    pub fn get(&self, series: &str) -> Option<&BreakpointResult> {
        self.series.iter().find(|s| s.series == series).map(|s| &s.result)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentStage {
    pub counts: Vec<MonthlySentimentCount>,
    /// `hawkish, dovish, neutral, differential` and their z-scores.
    pub table: TimeSeriesTable,
    pub summary: SentimentSummary,
}

/// Rolling regressions of one component on the sentiment predictors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentRegression {
    pub component: String,
    /// First differences of the merged component and predictors.
    pub merged: TimeSeriesTable,
    /// `hawkish_beta, hawkish_alpha, hawkish_r2, dovish_beta, dovish_alpha, dovish_r2`.
    pub results: TimeSeriesTable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Autocorrelation {
    pub variable: String,
    pub lag: usize,
    #[serde(with = "nan_serde::scalar")]
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionStage {
    pub window: usize,
    pub components: Vec<ComponentRegression>,
    /// Pearson correlations of first differences.
    pub correlations: CorrelationMatrix,
    pub autocorrelations: Vec<Autocorrelation>,
}

impl RegressionStage {
    pub fn get(&self, component: &str) -> Option<&ComponentRegression> {
        self.components.iter().find(|c| c.component == component)
    }
}

// ── Stages ───────────────────────────────────────────────────────────

pub fn standardize(
    config: &PipelineConfig,
    raw: &TimeSeriesTable,
) -> Result<TimeSeriesTable, StageError> {
    Ok(rolling_standardize(raw, config.analysis.rolling_window)?)
}

pub fn pca(standardized: &TimeSeriesTable) -> Result<PcaResult, StageError> {
    Ok(fit_pca(standardized)?)
}

/// PELT on each named index (`Macro Strength Index`, `Inflation Index`).
pub fn breakpoints(config: &PipelineConfig, pca: &PcaResult) -> Result<BreakpointStage, StageError> {
    let a = &config.analysis;
    let pelt = Pelt::new(a.penalty, a.min_segment)?.with_model(a.cost_model);
    let named = pca.semantic_scores()?;
    let series = named
        .columns()
        .iter()
        .map(|c| {
            let result = pelt.detect(named.dates(), &c.values)?;
            debug!(series = %c.name, breaks = result.breakpoints.len(), "breakpoints detected");
            Ok(SeriesBreakpoints {
                series: c.name.clone(),
                result,
            })
        })
        .collect::<Result<Vec<_>, AnalysisError>>()?;
    Ok(BreakpointStage {
        penalty: a.penalty,
        min_segment: a.min_segment,
        cost_model: a.cost_model,
        series,
    })
}

pub fn sentiment(
    config: &PipelineConfig,
    records: &[SentimentRecord],
) -> Result<SentimentStage, StageError> {
    let options = config.aggregation_options();
    let counts = aggregate_monthly(records, &options);
    let table = standardize_sentiment(&counts, &options, config.analysis.rolling_window)?;
    Ok(SentimentStage {
        counts,
        table,
        summary: summarize(records),
    })
}

/// Merge each named index with the sentiment z-scores (outer join, forward
/// fill, complete rows), difference, and regress the index on each predictor.
pub fn regression(
    config: &PipelineConfig,
    pca: &PcaResult,
    sentiment: &SentimentStage,
) -> Result<RegressionStage, StageError> {
    let window = config.analysis.regression_window;
    let named = pca.semantic_scores()?;
    let predictor_names: Vec<&str> = PREDICTORS.iter().map(|(col, _)| *col).collect();
    let predictors = sentiment.table.select(&predictor_names)?;

    let mut components = Vec::with_capacity(named.width());
    for name in named.column_names() {
        let merged = differenced_merge(&named.select(&[name])?, &predictors)?;
        let response = merged.require(name)?;
        let mut columns = Vec::with_capacity(3 * PREDICTORS.len());
        for (column, prefix) in PREDICTORS {
            let fit = rolling_ols(merged.dates(), merged.require(column)?, response, window)?;
            columns.extend(fit.to_columns(prefix));
        }
        let results = TimeSeriesTable::new(merged.dates().to_vec(), columns)?;
        debug!(component = name, rows = merged.len(), "rolling regression done");
        components.push(ComponentRegression {
            component: name.to_string(),
            merged,
            results,
        });
    }

    let all = differenced_merge(&named, &predictors)?;
    let correlations = correlation_matrix(&all);
    let autocorrelations = all
        .columns()
        .iter()
        .map(|c| Autocorrelation {
            variable: c.name.clone(),
            lag: 1,
            value: autocorrelation(&c.values, 1),
        })
        .collect();

    Ok(RegressionStage {
        window,
        components,
        correlations,
        autocorrelations,
    })
}

fn differenced_merge(
    left: &TimeSeriesTable,
    right: &TimeSeriesTable,
) -> Result<TimeSeriesTable, StageError> {
    let merged = left.outer_join(right)?.forward_fill().drop_incomplete();
    if merged.len() < 2 {
        return Err(AnalysisError::InsufficientData {
            needed: 2,
            found: merged.len(),
        }
        .into());
    }
    Ok(first_difference(&merged)?.drop_incomplete())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbspeech_core::analysis::{INFLATION_INDEX, MACRO_STRENGTH_INDEX};
    use cbspeech_core::data::{synthetic_speeches, SyntheticProvider};
    use cbspeech_core::domain::{month_range, Column};
    use chrono::NaiveDate;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn config() -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        cfg.data.start = d(1998, 1);
        cfg.data.end = d(2012, 12);
        cfg
    }

    fn raw(cfg: &PipelineConfig) -> TimeSeriesTable {
        let provider = SyntheticProvider::new(cfg.run.seed);
        let dates = month_range(cfg.data.start, cfg.data.end);
        let columns = cfg
            .data
            .series
            .iter()
            .map(|s| {
                let obs = provider.series(&s.id, cfg.data.start, cfg.data.end);
                Column::new(s.label.clone(), obs.iter().map(|o| o.value).collect())
            })
            .collect();
        TimeSeriesTable::new(dates, columns).unwrap()
    }

    #[test]
    fn stages_chain_over_synthetic_data() {
        let cfg = config();
        let z = standardize(&cfg, &raw(&cfg)).unwrap();
        let p = pca(&z).unwrap();
        let b = breakpoints(&cfg, &p).unwrap();
        assert_eq!(b.series.len(), 2);
        assert!(b.get(MACRO_STRENGTH_INDEX).is_some());
        assert!(b.get(INFLATION_INDEX).is_some());

        let records = synthetic_speeches(cfg.run.seed, "US", cfg.data.start, cfg.data.end);
        let s = sentiment(&cfg, &records).unwrap();
        assert_eq!(s.table.len(), 180);
        assert_eq!(s.summary.total, records.len());

        let r = regression(&cfg, &p, &s).unwrap();
        assert_eq!(r.components.len(), 2);
        let macro_reg = r.get(MACRO_STRENGTH_INDEX).unwrap();
        assert_eq!(
            macro_reg.results.column_names(),
            vec![
                "hawkish_beta",
                "hawkish_alpha",
                "hawkish_r2",
                "dovish_beta",
                "dovish_alpha",
                "dovish_r2"
            ]
        );
        assert_eq!(macro_reg.results.len(), macro_reg.merged.len());
        assert_eq!(r.correlations.names.len(), 4);
        let diag = r.correlations.get("hawkish_z", "hawkish_z").unwrap();
        assert!((diag - 1.0).abs() < 1e-12);
        assert_eq!(r.autocorrelations.len(), 4);
    }

    #[test]
    fn invalid_penalty_fails_the_breakpoint_stage() {
        let mut cfg = config();
        let z = standardize(&cfg, &raw(&cfg)).unwrap();
        let p = pca(&z).unwrap();
        cfg.analysis.penalty = -1.0;
        assert!(matches!(
            breakpoints(&cfg, &p),
            Err(StageError::Analysis(AnalysisError::InvalidPenalty(_)))
        ));
    }

    #[test]
    fn disjoint_sentiment_is_insufficient_data() {
        let cfg = config();
        let z = standardize(&cfg, &raw(&cfg)).unwrap();
        let p = pca(&z).unwrap();
        let records = vec![SentimentRecord::new(
            d(1980, 3),
            cbspeech_core::domain::Polarity::Hawkish,
            "US",
        )];
        let mut early = cfg.clone();
        early.data.start = d(1980, 1);
        early.data.end = d(1980, 6);
        let s = sentiment(&early, &records).unwrap();
        assert!(matches!(
            regression(&cfg, &p, &s),
            Err(StageError::Analysis(AnalysisError::InsufficientData { .. }))
        ));
    }
}
