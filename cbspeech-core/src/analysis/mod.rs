//! Statistical components of the pipeline.
//!
//! Each component is a pure function over immutable inputs:
//! - `rolling`: trailing-window z-score standardization, first differences
//! - `pca`: principal components via Jacobi eigen-decomposition
//! - `cost` + `pelt`: penalized exact change-point segmentation
//! - `sentiment`: monthly aggregation of speech labels
//! - `regression`: rolling closed-form OLS, correlations
//!
//! Numerical degeneracies (zero-variance windows, short windows) surface as
//! `NaN` values. Precondition violations surface as `AnalysisError`.

pub mod cost;
pub mod pca;
pub mod pelt;
pub mod regression;
pub mod rolling;
pub mod sentiment;

pub use cost::{CostModel, L2Cost, RbfCost, SegmentCost};
pub use pca::{fit_pca, PcaResult, INFLATION_INDEX, MACRO_STRENGTH_INDEX};
pub use pelt::{Breakpoint, BreakpointResult, Pelt, Regime, Segmentation};
pub use regression::{
    autocorrelation, correlation_matrix, pearson, rolling_ols, CorrelationMatrix,
    RollingRegression,
};
pub use rolling::{first_difference, rolling_mean, rolling_standardize, rolling_std, rolling_zscore};
pub use sentiment::{
    aggregate_monthly, standardize_sentiment, summarize, AggregationOptions, MissingMonthPolicy,
    SentimentSummary,
};

use crate::domain::TableError;
use thiserror::Error;

/// Relative spread below which a window counts as zero-variance.
pub const VARIANCE_EPS: f64 = 1e-12;

/// Errors raised before a computation starts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("window must be at least {min}, got {got}")]
    InvalidWindow { got: usize, min: usize },

    #[error("PELT penalty must be a positive finite number, got {0}")]
    InvalidPenalty(f64),

    #[error("minimum segment length must be at least 1, got {0}")]
    InvalidMinSegment(usize),

    #[error("series lengths differ: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("missing or non-finite value at index {index}")]
    NonFinite { index: usize },

    #[error("need at least {needed} complete rows, found {found}")]
    InsufficientData { needed: usize, found: usize },

    #[error("input has zero total variance")]
    ZeroVariance,

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Arithmetic mean. NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n − 1 denominator). NaN for fewer than two values.
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64
}

pub fn sample_std(values: &[f64]) -> f64 {
    sample_variance(values).sqrt()
}

/// True when a variance is too small, relative to the level `mean`, to
/// divide by.
pub fn is_degenerate_variance(variance: f64, mean: f64) -> bool {
    let floor = VARIANCE_EPS * (1.0 + mean.abs());
    !(variance > floor * floor)
}

#[cfg(test)]
pub(crate) fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub(crate) fn month_dates(n: usize) -> Vec<chrono::NaiveDate> {
    let mut d = chrono::NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(d);
        d = crate::domain::next_month(d);
    }
    out
}
