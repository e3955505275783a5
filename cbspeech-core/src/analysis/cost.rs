//! Segment cost functions for change-point detection.
//!
//! A cost is evaluated on half-open index ranges `[start, end)`. Both models
//! are additive with no per-segment constant and satisfy
//! `C(a, b) + C(b, c) ≤ C(a, c)`: splitting a segment never increases its
//! cost. That is the condition PELT pruning relies on.
//!
//! The RBF cost does not clip scaled distances the way ruptures does; see
//! [`RbfCost`].

use super::AnalysisError;
use serde::{Deserialize, Serialize};

/// A segment cost evaluated in O(1) after precomputation.
pub trait SegmentCost {
    /// Number of observations the cost was built over.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cost of the segment `[start, end)`. Requires `start < end <= len()`.
    fn cost(&self, start: usize, end: usize) -> f64;
}

/// Cost model selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CostModel {
    /// Sum of squared deviations from the segment mean (mean shifts).
    L2,
    /// Gaussian-kernel cost (distribution shifts).
    #[default]
    Rbf,
}

impl CostModel {
    pub fn name(&self) -> &'static str {
        match self {
            CostModel::L2 => "l2",
            CostModel::Rbf => "rbf",
        }
    }

    /// Build the cost over `values`. Rejects missing values.
    pub fn build(&self, values: &[f64]) -> Result<Box<dyn SegmentCost>, AnalysisError> {
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(AnalysisError::NonFinite { index });
        }
        Ok(match self {
            CostModel::L2 => Box::new(L2Cost::new(values)),
            CostModel::Rbf => Box::new(RbfCost::new(values)),
        })
    }
}

impl std::str::FromStr for CostModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l2" => Ok(CostModel::L2),
            "rbf" => Ok(CostModel::Rbf),
            other => Err(format!("unknown cost model '{other}' (expected l2 or rbf)")),
        }
    }
}

// ── L2 ──────────────────────────────────────────────────────────────

/// `Σ (x − x̄)²` over the segment, from prefix sums of `x` and `x²`.
#[derive(Debug, Clone)]
pub struct L2Cost {
    prefix: Vec<f64>,
    prefix_sq: Vec<f64>,
}

impl L2Cost {
    pub fn new(values: &[f64]) -> Self {
        let mut prefix = Vec::with_capacity(values.len() + 1);
        let mut prefix_sq = Vec::with_capacity(values.len() + 1);
        prefix.push(0.0);
        prefix_sq.push(0.0);
        let (mut s, mut sq) = (0.0, 0.0);
        for &v in values {
            s += v;
            sq += v * v;
            prefix.push(s);
            prefix_sq.push(sq);
        }
        Self { prefix, prefix_sq }
    }
}

impl SegmentCost for L2Cost {
    fn len(&self) -> usize {
        self.prefix.len() - 1
    }

    fn cost(&self, start: usize, end: usize) -> f64 {
        let n = (end - start) as f64;
        let s = self.prefix[end] - self.prefix[start];
        let sq = self.prefix_sq[end] - self.prefix_sq[start];
        (sq - s * s / n).max(0.0)
    }
}

// ── RBF ─────────────────────────────────────────────────────────────

/// Kernel cost `len − (Σ_{i,j ∈ seg} K(x_i, x_j)) / len` with
/// `K(x, y) = exp(−γ (x − y)²)`.
///
/// `γ` is the inverse median of the pairwise squared distances (1 when that
/// median is zero). The scaled distances `γ (x − y)²` are used as is: unlike
/// ruptures' `CostRbf`, they are not clipped to `[1e-2, 1e2]`, so near-equal
/// points keep a kernel value close to 1. Block sums come from a 2-D prefix
/// sum of the Gram matrix, so memory is O(n²); the pipeline's series are a
/// few hundred points.
#[derive(Debug, Clone)]
pub struct RbfCost {
    n: usize,
    gamma: f64,
    /// `(n+1) × (n+1)` row-major; `gram_prefix[i][j] = Σ_{a<i, b<j} K(a, b)`.
    gram_prefix: Vec<f64>,
}

impl RbfCost {
    pub fn new(values: &[f64]) -> Self {
        let n = values.len();
        let gamma = median_heuristic_gamma(values);
        let w = n + 1;
        let mut gram_prefix = vec![0.0; w * w];
        for i in 0..n {
            let mut row_sum = 0.0;
            for j in 0..n {
                let d = values[i] - values[j];
                row_sum += (-gamma * d * d).exp();
                gram_prefix[(i + 1) * w + (j + 1)] = gram_prefix[i * w + (j + 1)] + row_sum;
            }
        }
        Self {
            n,
            gamma,
            gram_prefix,
        }
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    fn block_sum(&self, start: usize, end: usize) -> f64 {
        let w = self.n + 1;
        self.gram_prefix[end * w + end] - self.gram_prefix[start * w + end]
            - self.gram_prefix[end * w + start]
            + self.gram_prefix[start * w + start]
    }
}

impl SegmentCost for RbfCost {
    fn len(&self) -> usize {
        self.n
    }

    fn cost(&self, start: usize, end: usize) -> f64 {
        let len = (end - start) as f64;
        (len - self.block_sum(start, end) / len).max(0.0)
    }
}

fn median_heuristic_gamma(values: &[f64]) -> f64 {
    let n = values.len();
    let mut dists = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = values[i] - values[j];
            dists.push(d * d);
        }
    }
    if dists.is_empty() {
        return 1.0;
    }
    dists.sort_by(|a, b| a.total_cmp(b));
    let m = dists.len();
    let median = if m % 2 == 1 {
        dists[m / 2]
    } else {
        0.5 * (dists[m / 2 - 1] + dists[m / 2])
    };
    if median > 0.0 {
        1.0 / median
    } else {
        1.0
    }
}
