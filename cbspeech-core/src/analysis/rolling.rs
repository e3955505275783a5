//! Trailing-window standardization.
//!
//! For a window `W`, the value at index `t` is
//! `(x[t] − mean(x[t−W+1..=t])) / std(x[t−W+1..=t])` with the sample
//! standard deviation. The first `W−1` values are NaN, as is any window that
//! contains a missing value or has (numerically) zero variance.

use super::{is_degenerate_variance, mean, sample_variance, AnalysisError};
use crate::domain::{Column, TimeSeriesTable};

/// Apply `f` to every complete trailing window of `values`.
fn map_windows(values: &[f64], window: usize, f: impl Fn(&[f64], f64) -> f64) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window {
        return out;
    }
    for t in (window - 1)..n {
        let slice = &values[(t + 1 - window)..=t];
        if slice.iter().any(|v| !v.is_finite()) {
            continue;
        }
        out[t] = f(slice, values[t]);
    }
    out
}

/// Rolling mean over a trailing window.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    map_windows(values, window, |w, _| mean(w))
}

/// Rolling sample standard deviation over a trailing window.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    map_windows(values, window, |w, _| sample_variance(w).sqrt())
}

/// Rolling z-score of a single series.
pub fn rolling_zscore(values: &[f64], window: usize) -> Vec<f64> {
    map_windows(values, window, |w, current| {
        let m = mean(w);
        let var = sample_variance(w);
        if is_degenerate_variance(var, m) {
            return f64::NAN;
        }
        (current - m) / var.sqrt()
    })
}

/// Standardize every column of `table` with a trailing window.
///
/// The output keeps the full date index; undefined values are NaN.
pub fn rolling_standardize(
    table: &TimeSeriesTable,
    window: usize,
) -> Result<TimeSeriesTable, AnalysisError> {
    if window == 0 {
        return Err(AnalysisError::InvalidWindow { got: 0, min: 1 });
    }
    let columns = table
        .columns()
        .iter()
        .map(|c| Column::new(c.name.clone(), rolling_zscore(&c.values, window)))
        .collect();
    Ok(TimeSeriesTable::new(table.dates().to_vec(), columns)?)
}

/// First differences. The first date is dropped; a difference involving a
/// missing value is missing.
pub fn first_difference(table: &TimeSeriesTable) -> Result<TimeSeriesTable, AnalysisError> {
    if table.is_empty() {
        return Ok(table.clone());
    }
    let columns: Vec<Column> = table
        .columns()
        .iter()
        .map(|c| {
            let values = c.values.windows(2).map(|w| w[1] - w[0]).collect();
            Column::new(c.name.clone(), values)
        })
        .collect();
    Ok(TimeSeriesTable::new(table.dates()[1..].to_vec(), columns)?)
}
