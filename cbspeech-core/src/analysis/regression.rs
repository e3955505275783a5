//! Rolling closed-form OLS and correlation statistics.

use super::{is_degenerate_variance, AnalysisError};
use crate::domain::{nan_serde, Column, TimeSeriesTable};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-date slope, intercept and R² of `response ~ predictor` over a
/// trailing window. Undefined values are NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingRegression {
    pub window: usize,
    pub dates: Vec<NaiveDate>,
    #[serde(with = "nan_serde::vec")]
    pub slope: Vec<f64>,
    #[serde(with = "nan_serde::vec")]
    pub intercept: Vec<f64>,
    #[serde(with = "nan_serde::vec")]
    pub r_squared: Vec<f64>,
}

impl RollingRegression {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Number of dates with a defined slope.
    pub fn defined(&self) -> usize {
        self.slope.iter().filter(|v| v.is_finite()).count()
    }

    /// Columns `{prefix}_beta`, `{prefix}_alpha`, `{prefix}_r2`.
    pub fn to_columns(&self, prefix: &str) -> Vec<Column> {
        vec![
            Column::new(format!("{prefix}_beta"), self.slope.clone()),
            Column::new(format!("{prefix}_alpha"), self.intercept.clone()),
            Column::new(format!("{prefix}_r2"), self.r_squared.clone()),
        ]
    }
}

/// Rolling OLS of `response` on `predictor` with window `window` (≥ 2).
pub fn rolling_ols(
    dates: &[NaiveDate],
    predictor: &[f64],
    response: &[f64],
    window: usize,
) -> Result<RollingRegression, AnalysisError> {
    if window < 2 {
        return Err(AnalysisError::InvalidWindow {
            got: window,
            min: 2,
        });
    }
    if predictor.len() != response.len() {
        return Err(AnalysisError::LengthMismatch {
            left: predictor.len(),
            right: response.len(),
        });
    }
    if dates.len() != predictor.len() {
        return Err(AnalysisError::LengthMismatch {
            left: dates.len(),
            right: predictor.len(),
        });
    }

    let n = dates.len();
    let mut slope = vec![f64::NAN; n];
    let mut intercept = vec![f64::NAN; n];
    let mut r_squared = vec![f64::NAN; n];
    if n >= window {
        for t in (window - 1)..n {
            let lo = t + 1 - window;
            let xs = &predictor[lo..=t];
            let ys = &response[lo..=t];
            if xs.iter().chain(ys).any(|v| !v.is_finite()) {
                continue;
            }
            if let Some(fit) = ols(xs, ys) {
                slope[t] = fit.0;
                intercept[t] = fit.1;
                r_squared[t] = fit.2;
            }
        }
    }

    Ok(RollingRegression {
        window,
        dates: dates.to_vec(),
        slope,
        intercept,
        r_squared,
    })
}

/// `(β, α, R²)` for one window, `None` when the predictor is flat.
fn ols(xs: &[f64], ys: &[f64]) -> Option<(f64, f64, f64)> {
    let n = xs.len() as f64;
    let mx = xs.iter().sum::<f64>() / n;
    let my = ys.iter().sum::<f64>() / n;
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - mx, y - my);
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    let dof = n - 1.0;
    if is_degenerate_variance(sxx / dof, mx) {
        return None;
    }
    let beta = sxy / sxx;
    let alpha = my - beta * mx;
    let r2 = if is_degenerate_variance(syy / dof, my) {
        f64::NAN
    } else {
        (sxy * sxy / (sxx * syy)).min(1.0)
    };
    Some((beta, alpha, r2))
}

/// Pearson correlation over the rows where both values are present.
/// NaN with fewer than two such rows or a flat side.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        sxx += (a - mx) * (a - mx);
        sxy += (a - mx) * (b - my);
        syy += (b - my) * (b - my);
    }
    if is_degenerate_variance(sxx / (n - 1.0), mx) || is_degenerate_variance(syy / (n - 1.0), my)
    {
        return f64::NAN;
    }
    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

/// Correlation of a series with itself shifted by `lag` rows.
pub fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    if lag >= values.len() {
        return f64::NAN;
    }
    pearson(&values[lag..], &values[..values.len() - lag])
}

/// Symmetric Pearson matrix over the columns of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub names: Vec<String>,
    #[serde(with = "nan_serde::matrix")]
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.names.iter().position(|n| n == a)?;
        let j = self.names.iter().position(|n| n == b)?;
        Some(self.values[i][j])
    }
}

/// Pairwise-complete Pearson correlations between every pair of columns.
pub fn correlation_matrix(table: &TimeSeriesTable) -> CorrelationMatrix {
    let columns = table.columns();
    let k = columns.len();
    let mut values = vec![vec![f64::NAN; k]; k];
    for i in 0..k {
        for j in i..k {
            let r = pearson(&columns[i].values, &columns[j].values);
            values[i][j] = r;
            values[j][i] = r;
        }
    }
    CorrelationMatrix {
        names: columns.iter().map(|c| c.name.clone()).collect(),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{assert_approx, month_dates};

    #[test]
    fn identical_series_fit_perfectly() {
        let x: Vec<f64> = (0..10).map(|i| (i as f64 * 0.9).sin() + i as f64 * 0.1).collect();
        let reg = rolling_ols(&month_dates(10), &x, &x, 4).unwrap();
        for t in 0..3 {
            assert!(reg.slope[t].is_nan());
        }
        for t in 3..10 {
            assert_approx(reg.slope[t], 1.0, 1e-9);
            assert_approx(reg.intercept[t], 0.0, 1e-9);
            assert_approx(reg.r_squared[t], 1.0, 1e-9);
        }
        assert_eq!(reg.defined(), 7);
    }

    #[test]
    fn recovers_a_known_line() {
        let x = vec![1.0, 2.0, 4.0, 3.0, 5.0];
        let y: Vec<f64> = x.iter().map(|v| 3.0 - 2.0 * v).collect();
        let reg = rolling_ols(&month_dates(5), &x, &y, 5).unwrap();
        assert_approx(reg.slope[4], -2.0, 1e-12);
        assert_approx(reg.intercept[4], 3.0, 1e-12);
        assert_approx(reg.r_squared[4], 1.0, 1e-12);
    }

    #[test]
    fn flat_predictor_is_undefined() {
        let x = vec![2.0, 2.0, 2.0, 2.0, 3.0];
        let y = vec![1.0, 4.0, 2.0, 5.0, 3.0];
        let reg = rolling_ols(&month_dates(5), &x, &y, 3).unwrap();
        assert!(reg.slope[2].is_nan() && reg.slope[3].is_nan());
        assert!(reg.intercept[3].is_nan() && reg.r_squared[3].is_nan());
        assert!(reg.slope[4].is_finite());
    }

    #[test]
    fn flat_response_has_zero_slope_and_undefined_r2() {
        let x = vec![1.0, 2.0, 3.0];
        let y = vec![5.0, 5.0, 5.0];
        let reg = rolling_ols(&month_dates(3), &x, &y, 3).unwrap();
        assert_approx(reg.slope[2], 0.0, 1e-12);
        assert_approx(reg.intercept[2], 5.0, 1e-12);
        assert!(reg.r_squared[2].is_nan());
    }

    #[test]
    fn missing_values_poison_their_windows() {
        let x = vec![1.0, f64::NAN, 3.0, 4.0, 5.0, 6.0];
        let y = vec![2.0, 3.0, 1.0, 5.0, 4.0, 7.0];
        let reg = rolling_ols(&month_dates(6), &x, &y, 3).unwrap();
        assert!(reg.slope[2].is_nan() && reg.slope[3].is_nan());
        assert!(reg.slope[4].is_finite());
    }

    #[test]
    fn invalid_windows_and_lengths_rejected() {
        let dates = month_dates(3);
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(
            rolling_ols(&dates, &v, &v, 1).unwrap_err(),
            AnalysisError::InvalidWindow { got: 1, min: 2 }
        );
        assert!(matches!(
            rolling_ols(&dates, &v, &v[..2], 2),
            Err(AnalysisError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn window_longer_than_series_is_all_missing() {
        let v = vec![1.0, 2.0, 3.0];
        let reg = rolling_ols(&month_dates(3), &v, &v, 36).unwrap();
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.defined(), 0);
    }

    #[test]
    fn pearson_uses_pairwise_complete_rows() {
        let x = vec![1.0, 2.0, f64::NAN, 4.0, 5.0];
        let y = vec![2.0, 4.0, 100.0, 8.0, 10.0];
        assert_approx(pearson(&x, &y), 1.0, 1e-12);
        let neg: Vec<f64> = y.iter().map(|v| -v).collect();
        assert_approx(pearson(&x, &neg), -1.0, 1e-12);
        assert!(pearson(&[1.0], &[2.0]).is_nan());
        assert!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_nan());
    }

    #[test]
    fn autocorrelation_of_a_trend_is_one() {
        let v: Vec<f64> = (0..20).map(|i| i as f64).collect();
        assert_approx(autocorrelation(&v, 1), 1.0, 1e-12);
        let alternating: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert_approx(autocorrelation(&alternating, 1), -1.0, 1e-12);
        assert!(autocorrelation(&v, 20).is_nan());
    }

    #[test]
    fn correlation_matrix_is_symmetric_with_unit_diagonal() {
        let dates = month_dates(6);
        let table = TimeSeriesTable::new(
            dates,
            vec![
                Column::new("a", vec![1.0, 3.0, 2.0, 5.0, 4.0, 6.0]),
                Column::new("b", vec![2.0, 1.0, 4.0, 3.0, 6.0, 5.0]),
                Column::new("c", vec![6.0, 5.0, 4.0, 3.0, 2.0, 1.0]),
            ],
        )
        .unwrap();
        let m = correlation_matrix(&table);
        for i in 0..3 {
            assert_approx(m.values[i][i], 1.0, 1e-12);
            for j in 0..3 {
                assert_eq!(m.values[i][j], m.values[j][i]);
            }
        }
        assert_eq!(m.get("a", "c"), Some(m.values[0][2]));
        assert!(m.get("a", "zzz").is_none());
    }
}
