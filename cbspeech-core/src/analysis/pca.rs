//! Principal component analysis of the standardized macro panel.
//!
//! The covariance matrix is diagonalized with the cyclic Jacobi method: no
//! random start and a fixed sweep order, so repeated fits of the same input
//! are bit-identical.

use super::AnalysisError;
use crate::domain::{Column, TimeSeriesTable};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const MACRO_STRENGTH_INDEX: &str = "Macro Strength Index";
pub const INFLATION_INDEX: &str = "Inflation Index";

const JACOBI_TOLERANCE: f64 = 1e-12;
const JACOBI_MAX_SWEEPS: usize = 100;

/// A fitted decomposition. Components are ordered by eigenvalue, descending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaResult {
    pub variables: Vec<String>,
    /// Per-variable means used for centring.
    pub means: Vec<f64>,
    pub eigenvalues: Vec<f64>,
    pub explained_variance_ratio: Vec<f64>,
    /// `loadings[k][j]`: weight of variable `j` in component `k`. Unit length.
    pub loadings: Vec<Vec<f64>>,
    /// Columns `PC1..PCk`, one row per complete input row.
    pub scores: TimeSeriesTable,
    /// Input rows left out because they held a missing value.
    pub excluded_rows: usize,
}

impl PcaResult {
    pub fn n_components(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn cumulative_variance(&self) -> Vec<f64> {
        self.explained_variance_ratio
            .iter()
            .scan(0.0, |acc, r| {
                *acc += r;
                Some(*acc)
            })
            .collect()
    }

    /// Smallest number of components whose cumulative explained variance
    /// reaches `threshold`.
    pub fn n_components_for(&self, threshold: f64) -> usize {
        self.cumulative_variance()
            .iter()
            .position(|&c| c >= threshold - 1e-12)
            .map(|i| i + 1)
            .unwrap_or(self.n_components())
    }

    pub fn component_name(k: usize) -> String {
        format!("PC{}", k + 1)
    }

    /// Interpretive label for the leading components.
    pub fn semantic_name(k: usize) -> Option<&'static str> {
        match k {
            0 => Some(MACRO_STRENGTH_INDEX),
            1 => Some(INFLATION_INDEX),
            _ => None,
        }
    }

    /// The named indices (`Macro Strength Index`, `Inflation Index`) as a
    /// table; only those components that exist are included.
    pub fn semantic_scores(&self) -> Result<TimeSeriesTable, AnalysisError> {
        let columns = self
            .scores
            .columns()
            .iter()
            .enumerate()
            .filter_map(|(k, c)| {
                Self::semantic_name(k).map(|name| Column::new(name, c.values.clone()))
            })
            .collect();
        Ok(TimeSeriesTable::new(self.scores.dates().to_vec(), columns)?)
    }

    /// Project a raw row onto the components.
    pub fn project(&self, row: &[f64]) -> Vec<f64> {
        self.loadings
            .iter()
            .map(|w| {
                w.iter()
                    .zip(row.iter().zip(&self.means))
                    .map(|(wj, (x, m))| wj * (x - m))
                    .sum()
            })
            .collect()
    }
}

/// Fit PCA on the complete rows of `table`.
pub fn fit_pca(table: &TimeSeriesTable) -> Result<PcaResult, AnalysisError> {
    let valid = table.drop_incomplete();
    let excluded_rows = table.len() - valid.len();
    if excluded_rows > 0 {
        warn!(excluded_rows, kept = valid.len(), "PCA: rows with missing values excluded");
    }
    let m = valid.len();
    if m < 2 {
        return Err(AnalysisError::InsufficientData {
            needed: 2,
            found: m,
        });
    }
    let p = valid.width();
    if p == 0 {
        return Err(AnalysisError::ZeroVariance);
    }

    let variables: Vec<String> = valid.column_names().iter().map(|s| s.to_string()).collect();
    let data = Array2::from_shape_fn((m, p), |(i, j)| valid.columns()[j].values[i]);
    let means = data
        .mean_axis(Axis(0))
        .ok_or(AnalysisError::InsufficientData { needed: 2, found: m })?;
    let centred = &data - &means;
    let cov = covariance_matrix(&centred);
    if !(cov.diag().sum() > 0.0) {
        return Err(AnalysisError::ZeroVariance);
    }

    let (values, vectors) = jacobi_eigen(&cov);
    let mut order: Vec<usize> = (0..p).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

    let eigenvalues: Vec<f64> = order.iter().map(|&k| values[k]).collect();
    let clamped_total: f64 = eigenvalues.iter().map(|v| v.max(0.0)).sum();
    let explained_variance_ratio = eigenvalues
        .iter()
        .map(|v| v.max(0.0) / clamped_total)
        .collect();
    let loadings: Vec<Vec<f64>> = order
        .iter()
        .map(|&k| {
            let mut w = vectors.column(k).to_vec();
            orient(&mut w);
            w
        })
        .collect();

    // p x k weight matrix, one column per component.
    let weights = Array2::from_shape_fn((p, loadings.len()), |(j, k)| loadings[k][j]);
    let projected = centred.dot(&weights);
    let score_columns = projected
        .columns()
        .into_iter()
        .enumerate()
        .map(|(k, c)| Column::new(PcaResult::component_name(k), c.to_vec()))
        .collect();
    let scores = TimeSeriesTable::new(valid.dates().to_vec(), score_columns)?;

    debug!(rows = m, variables = p, ?eigenvalues, "PCA fitted");
    Ok(PcaResult {
        variables,
        means: means.to_vec(),
        eigenvalues,
        explained_variance_ratio,
        loadings,
        scores,
        excluded_rows,
    })
}

/// Sample covariance `XᵀX / (m - 1)` of already centred rows.
fn covariance_matrix(centred: &Array2<f64>) -> Array2<f64> {
    let m = centred.nrows() as f64;
    centred.t().dot(centred) / (m - 1.0)
}

/// Flip `w` so its largest-magnitude weight is positive (first on ties).
fn orient(w: &mut [f64]) {
    let mut pivot = 0;
    for j in 1..w.len() {
        if w[j].abs() > w[pivot].abs() {
            pivot = j;
        }
    }
    if w.get(pivot).is_some_and(|&x| x < 0.0) {
        w.iter_mut().for_each(|x| *x = -*x);
    }
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns `(eigenvalues, vectors)` where column `k` of `vectors` is the
/// eigenvector for `eigenvalues[k]`. Order is the diagonal order after
/// convergence; callers sort.
pub(crate) fn jacobi_eigen(matrix: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = matrix.nrows();
    let mut a = matrix.clone();
    let mut v = Array2::<f64>::eye(n);

    let norm = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    for sweep in 0..JACOBI_MAX_SWEEPS {
        let off = off_diagonal_norm(&a);
        if off <= JACOBI_TOLERANCE * norm {
            debug!(sweep, "Jacobi converged");
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                rotate_columns(&mut a, p, q, c, s);
                for k in 0..n {
                    let (pk, qk) = (a[[p, k]], a[[q, k]]);
                    a[[p, k]] = c * pk - s * qk;
                    a[[q, k]] = s * pk + c * qk;
                }
                a[[p, q]] = 0.0;
                a[[q, p]] = 0.0;
                rotate_columns(&mut v, p, q, c, s);
            }
        }
    }

    (a.diag().to_owned(), v)
}

fn rotate_columns(m: &mut Array2<f64>, p: usize, q: usize, c: f64, s: f64) {
    for mut row in m.rows_mut() {
        let (kp, kq) = (row[p], row[q]);
        row[p] = c * kp - s * kq;
        row[q] = s * kp + c * kq;
    }
}

fn off_diagonal_norm(a: &Array2<f64>) -> f64 {
    a.indexed_iter()
        .filter(|((i, j), _)| i != j)
        .map(|(_, x)| x * x)
        .sum::<f64>()
        .sqrt()
}
