//! Download orchestrator: fetch several series into the Parquet cache with
//! progress reporting.

use super::cache::{CoverageResult, ParquetCache};
use super::provider::{DataError, DownloadProgress, MacroProvider};
use chrono::NaiveDate;

/// Download multiple series and write each through to the cache.
///
/// Series whose cached copy already covers the range are skipped unless
/// `force` is set. Returns a summary of successes and failures.
pub fn download_series(
    provider: &dyn MacroProvider,
    cache: &ParquetCache,
    series_ids: &[&str],
    start: NaiveDate,
    end: NaiveDate,
    force: bool,
    progress: &dyn DownloadProgress,
) -> DownloadSummary {
    let total = series_ids.len();
    let mut succeeded = 0;
    let mut skipped = 0;
    let mut errors: Vec<(String, DataError)> = Vec::new();

    for (i, id) in series_ids.iter().enumerate() {
        progress.on_start(id, i, total);

        if !force && cache.covers_range(id, start, end) == CoverageResult::FullyCovered {
            progress.on_complete(id, i, total, &Ok(()));
            succeeded += 1;
            skipped += 1;
            continue;
        }

        let result = download_single(provider, cache, id, start, end);
        progress.on_complete(id, i, total, &result);
        match result {
            Ok(()) => succeeded += 1,
            Err(e) => errors.push((id.to_string(), e)),
        }
    }

    let failed = errors.len();
    progress.on_batch_complete(succeeded, failed, total);

    DownloadSummary {
        total,
        succeeded,
        skipped,
        failed,
        errors,
    }
}

/// Download a single series: fetch → cache.
fn download_single(
    provider: &dyn MacroProvider,
    cache: &ParquetCache,
    series_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(), DataError> {
    let fetched = provider.fetch(series_id, start, end)?;
    cache.write(series_id, &fetched.observations, fetched.source)?;
    Ok(())
}

/// Summary of a batch download operation.
#[derive(Debug)]
pub struct DownloadSummary {
    pub total: usize,
    pub succeeded: usize,
    /// Series already covered by the cache.
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<(String, DataError)>,
}

impl DownloadSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::{DataSource, FetchResult, LogProgress};
    use crate::data::synthetic::SyntheticProvider;
    use tempfile::TempDir;

    struct Offline;

    impl MacroProvider for Offline {
        fn name(&self) -> &str {
            "offline"
        }

        fn fetch(&self, _: &str, _: NaiveDate, _: NaiveDate) -> Result<FetchResult, DataError> {
            Err(DataError::NetworkUnreachable("no route to host".into()))
        }

        fn is_available(&self) -> bool {
            false
        }
    }

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    #[test]
    fn downloads_then_skips_covered_series() {
        let dir = TempDir::new().unwrap();
        let cache = ParquetCache::new(dir.path());
        let provider = SyntheticProvider::new(42);
        let ids = ["GDP", "UNRATE"];

        let first = download_series(&provider, &cache, &ids, d(2000, 1), d(2001, 12), false, &LogProgress);
        assert!(first.all_succeeded());
        assert_eq!((first.succeeded, first.skipped), (2, 0));
        assert_eq!(cache.get_meta("GDP").unwrap().source, DataSource::Synthetic);

        let second = download_series(&provider, &cache, &ids, d(2000, 1), d(2001, 12), false, &LogProgress);
        assert_eq!(second.skipped, 2);

        let forced = download_series(&provider, &cache, &ids, d(2000, 1), d(2001, 12), true, &LogProgress);
        assert_eq!(forced.skipped, 0);
    }

    #[test]
    fn failures_are_collected_per_series() {
        let dir = TempDir::new().unwrap();
        let cache = ParquetCache::new(dir.path());
        let summary = download_series(&Offline, &cache, &["GDP", "CPI"], d(2000, 1), d(2000, 2), false, &LogProgress);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.errors[0].0, "GDP");
        assert!(!summary.all_succeeded());
    }
}
