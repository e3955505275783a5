//! cbspeech core: domain types, data sources and the statistical components
//! of the central-bank narrative pipeline.
//!
//! - Domain types (dated tables, speech records, monthly counts)
//! - Macro providers (FRED, synthetic), Parquet series cache, speech loaders
//! - Rolling standardization, PCA, PELT change points, sentiment
//!   aggregation, rolling regression
//! - Content fingerprints and a seeded RNG hierarchy

pub mod analysis;
pub mod data;
pub mod domain;
pub mod fingerprint;
pub mod rng;
pub mod schema;

pub use analysis::AnalysisError;
pub use data::DataError;
pub use domain::{SentimentRecord, TimeSeriesTable};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: results handed between stages are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::TimeSeriesTable>();
        require_sync::<domain::TimeSeriesTable>();
        require_send::<domain::SentimentRecord>();
        require_sync::<domain::SentimentRecord>();
        require_send::<analysis::PcaResult>();
        require_sync::<analysis::PcaResult>();
        require_send::<analysis::BreakpointResult>();
        require_sync::<analysis::BreakpointResult>();
        require_send::<analysis::RollingRegression>();
        require_sync::<analysis::RollingRegression>();
        require_send::<analysis::CorrelationMatrix>();
        require_sync::<analysis::CorrelationMatrix>();
        require_send::<fingerprint::Fingerprint>();
        require_sync::<fingerprint::Fingerprint>();
        require_send::<rng::SeedHierarchy>();
        require_sync::<rng::SeedHierarchy>();
        require_send::<data::DataError>();
    }

    /// The cost trait is object safe: PELT takes `&dyn SegmentCost`.
    #[test]
    fn segment_cost_is_object_safe() {
        fn _check(cost: &dyn analysis::SegmentCost) -> f64 {
            cost.cost(0, cost.len())
        }
        let l2 = analysis::L2Cost::new(&[1.0, 2.0]);
        assert!(_check(&l2) > 0.0);
    }
}
