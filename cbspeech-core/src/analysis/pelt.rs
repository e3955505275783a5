//! Exact penalized change-point detection (PELT).
//!
//! Minimizes `Σ C(segment) + λ · segments` over all segmentations whose
//! segments hold at least `min_size` points. `F(t)` is the optimal cost of the
//! first `t` points with `F(0) = −λ`; candidates for the last break before `t`
//! live in an ascending `Vec`, so ties resolve to the smallest index by
//! iteration order alone.
//!
//! Pruning is exact. At step `t` the reference point is `u = t − min_size`,
//! the latest index that can close a segment for every later `t' ≥ t`. Any
//! candidate `s < u` with `F(s) + C(s, u) > F(u)` is strictly dominated by
//! `u` from then on, given `C(s, u) + C(u, t') ≤ C(s, t')`.

use super::cost::{CostModel, SegmentCost};
use super::{mean, sample_std, AnalysisError};
use crate::domain::nan_serde;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Change-point detector configuration. Construct with [`Pelt::new`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pelt {
    penalty: f64,
    min_size: usize,
    model: CostModel,
}

/// Raw segmentation: segment-end indices of every segment except the last.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub change_points: Vec<usize>,
    pub total_cost: f64,
}

/// A detected break. It closes the segment ending at `index` (exclusive);
/// `date` is the last date of that segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub index: usize,
    pub date: NaiveDate,
    /// Cost saved by splitting at `index` given the neighbouring breaks.
    pub cost_delta: f64,
}

/// Summary statistics for one segment between breaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regime {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub n: usize,
    pub mean: f64,
    #[serde(with = "nan_serde::scalar")]
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointResult {
    pub breakpoints: Vec<Breakpoint>,
    pub total_cost: f64,
    pub regimes: Vec<Regime>,
}

impl BreakpointResult {
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.breakpoints.iter().map(|b| b.date).collect()
    }
}

impl Pelt {
    /// Rejects a non-positive or non-finite penalty and a zero minimum
    /// segment length.
    pub fn new(penalty: f64, min_size: usize) -> Result<Self, AnalysisError> {
        if !(penalty.is_finite() && penalty > 0.0) {
            return Err(AnalysisError::InvalidPenalty(penalty));
        }
        if min_size == 0 {
            return Err(AnalysisError::InvalidMinSegment(min_size));
        }
        Ok(Self {
            penalty,
            min_size,
            model: CostModel::default(),
        })
    }

    pub fn with_model(mut self, model: CostModel) -> Self {
        self.model = model;
        self
    }

    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn model(&self) -> CostModel {
        self.model
    }

    /// Segment `values` with the configured cost model.
    pub fn segment(&self, values: &[f64]) -> Result<Segmentation, AnalysisError> {
        let cost = self.model.build(values)?;
        Ok(self.segment_with(cost.as_ref()))
    }

    /// Segment using an already-built cost.
    pub fn segment_with(&self, cost: &dyn SegmentCost) -> Segmentation {
        let n = cost.len();
        if n == 0 {
            return Segmentation {
                change_points: Vec::new(),
                total_cost: 0.0,
            };
        }
        if n < 2 * self.min_size {
            return Segmentation {
                change_points: Vec::new(),
                total_cost: cost.cost(0, n),
            };
        }

        let lambda = self.penalty;
        let min = self.min_size;
        let mut f = vec![f64::INFINITY; n + 1];
        let mut prev = vec![0usize; n + 1];
        f[0] = -lambda;
        let mut candidates: Vec<usize> = vec![0];

        for t in 1..=n {
            if t > min {
                let u = t - min;
                if f[u].is_finite() {
                    let fu = f[u];
                    candidates.retain(|&s| s >= u || f[s] + cost.cost(s, u) <= fu);
                }
            }

            let mut best = f64::INFINITY;
            let mut best_s = 0;
            for &s in &candidates {
                if t - s < min {
                    // Candidates are ascending; the rest are closer still.
                    break;
                }
                let v = f[s] + cost.cost(s, t) + lambda;
                if v < best {
                    best = v;
                    best_s = s;
                }
            }
            f[t] = best;
            prev[t] = best_s;
            if best.is_finite() && t < n {
                candidates.push(t);
            }
        }

        let mut change_points = Vec::new();
        let mut t = n;
        while t > 0 {
            let s = prev[t];
            if s > 0 {
                change_points.push(s);
            }
            t = s;
        }
        change_points.reverse();
        debug!(
            n,
            breaks = change_points.len(),
            survivors = candidates.len(),
            "PELT segmentation finished"
        );

        Segmentation {
            change_points,
            total_cost: f[n],
        }
    }

    /// Detect breaks in a dated series and summarize the regimes between them.
    pub fn detect(
        &self,
        dates: &[NaiveDate],
        values: &[f64],
    ) -> Result<BreakpointResult, AnalysisError> {
        if dates.len() != values.len() {
            return Err(AnalysisError::LengthMismatch {
                left: dates.len(),
                right: values.len(),
            });
        }
        let cost = self.model.build(values)?;
        let seg = self.segment_with(cost.as_ref());

        let mut bounds = Vec::with_capacity(seg.change_points.len() + 2);
        bounds.push(0);
        bounds.extend_from_slice(&seg.change_points);
        bounds.push(values.len());

        let breakpoints = seg
            .change_points
            .iter()
            .enumerate()
            .map(|(i, &b)| {
                let (p, q) = (bounds[i], bounds[i + 2]);
                Breakpoint {
                    index: b,
                    date: dates[b - 1],
                    cost_delta: cost.cost(p, q) - cost.cost(p, b) - cost.cost(b, q),
                }
            })
            .collect();

        let regimes = if values.is_empty() {
            Vec::new()
        } else {
            bounds
                .windows(2)
                .map(|w| regime(&dates[w[0]..w[1]], &values[w[0]..w[1]]))
                .collect()
        };

        Ok(BreakpointResult {
            breakpoints,
            total_cost: seg.total_cost,
            regimes,
        })
    }
}

fn regime(dates: &[NaiveDate], values: &[f64]) -> Regime {
    Regime {
        start: dates[0],
        end: dates[dates.len() - 1],
        n: values.len(),
        mean: mean(values),
        std: sample_std(values),
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}
