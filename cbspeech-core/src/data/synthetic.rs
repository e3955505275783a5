//! Seeded synthetic data for offline runs and tests.
//!
//! Macro series are random walks with one or two level shifts; speeches are
//! drawn month by month with a hawkish probability that follows a slow cycle.
//! Everything is a pure function of the seed, the series id and the range.

use super::provider::{DataError, DataSource, FetchResult, MacroProvider, Observation};
use crate::domain::{month_range, Polarity, SentimentRecord};
use crate::rng::SeedHierarchy;
use chrono::{Datelike, NaiveDate};
use rand::Rng;
use rand_distr::StandardNormal;

/// Macro provider that never touches the network.
#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    seeds: SeedHierarchy,
}

impl SyntheticProvider {
    pub fn new(seed: u64) -> Self {
        Self {
            seeds: SeedHierarchy::new(seed),
        }
    }

    /// Monthly observations for `series_id` over `[start, end]`.
    pub fn series(&self, series_id: &str, start: NaiveDate, end: NaiveDate) -> Vec<Observation> {
        let mut rng = self.seeds.rng_for("macro", series_id);
        let months = month_range(start, end);
        let n = months.len();
        let (level, step) = profile(series_id);

        // Shift points are drawn before the walk so they depend on the seed
        // and length only.
        let shifts: Vec<(usize, f64)> = if n > 4 {
            (0..2)
                .map(|_| {
                    let at = rng.gen_range(n / 4..n);
                    let size = rng.sample::<f64, _>(StandardNormal) * step * 8.0;
                    (at, size)
                })
                .collect()
        } else {
            Vec::new()
        };

        let mut value = level;
        months
            .into_iter()
            .enumerate()
            .map(|(i, date)| {
                value += rng.sample::<f64, _>(StandardNormal) * step;
                for &(at, size) in &shifts {
                    if at == i {
                        value += size;
                    }
                }
                Observation::new(date, value)
            })
            .collect()
    }
}

impl MacroProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        series_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        if start > end {
            return Err(DataError::Validation(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok(FetchResult {
            series_id: series_id.to_string(),
            observations: self.series(series_id, start, end),
            source: DataSource::Synthetic,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Starting level and monthly step size, roughly matching the real series.
fn profile(series_id: &str) -> (f64, f64) {
    match series_id {
        "FEDFUNDS" => (5.0, 0.15),
        "CPIAUCNS" => (160.0, 0.5),
        "PPIACO" => (125.0, 1.0),
        "GDP" => (8000.0, 60.0),
        "UNRATE" => (5.5, 0.12),
        "PAYEMS" => (120_000.0, 150.0),
        _ => (100.0, 1.0),
    }
}

/// Labelled speeches for `source` over `[start, end]`, 0 to 5 per month.
pub fn synthetic_speeches(
    seed: u64,
    source: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<SentimentRecord> {
    let mut rng = SeedHierarchy::new(seed).rng_for("speeches", source);
    let mut records = Vec::new();
    for (i, month) in month_range(start, end).into_iter().enumerate() {
        // Slow tightening/easing cycle of about eight years.
        let phase = 2.0 * std::f64::consts::PI * i as f64 / 96.0;
        let p_hawkish = 0.4 + 0.25 * phase.sin();
        let count = rng.gen_range(0..=5u32);
        for _ in 0..count {
            let day = rng.gen_range(1..=28);
            let date = month.with_day(day).unwrap_or(month);
            let u: f64 = rng.gen();
            let polarity = if u < p_hawkish {
                Polarity::Hawkish
            } else if u < p_hawkish + 0.4 {
                Polarity::Dovish
            } else {
                Polarity::Neutral
            };
            records.push(SentimentRecord::new(date, polarity, source));
        }
    }
    records.sort_by_key(|r| r.date);
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    #[test]
    fn same_seed_same_series() {
        let a = SyntheticProvider::new(42).series("GDP", d(2000, 1), d(2010, 12));
        let b = SyntheticProvider::new(42).series("GDP", d(2000, 1), d(2010, 12));
        assert_eq!(a, b);
        assert_eq!(a.len(), 132);
        assert!(a.iter().all(|o| o.value.is_finite()));
    }

    #[test]
    fn series_are_independent_streams() {
        let p = SyntheticProvider::new(42);
        let gdp = p.series("GDP", d(2000, 1), d(2001, 12));
        let cpi = p.series("CPIAUCNS", d(2000, 1), d(2001, 12));
        assert_ne!(gdp[0].value, cpi[0].value);
        let other_seed = SyntheticProvider::new(7).series("GDP", d(2000, 1), d(2001, 12));
        assert_ne!(gdp, other_seed);
    }

    #[test]
    fn walk_steps_are_standard_normal_scaled() {
        // Unknown ids walk with unit steps.
        let obs = SyntheticProvider::new(42).series("XYZ", d(1900, 1), d(1999, 12));
        let steps: Vec<f64> = obs.windows(2).map(|w| w[1].value - w[0].value).collect();
        assert_eq!(steps.len(), 1199);
        let within_one = steps.iter().filter(|s| s.abs() < 1.0).count() as f64 / 1199.0;
        assert!((0.62..0.75).contains(&within_one), "{within_one}");
        let mut sorted = steps.clone();
        sorted.sort_by(f64::total_cmp);
        let median = sorted[sorted.len() / 2];
        assert!(median.abs() < 0.15, "{median}");
    }

    #[test]
    fn fetch_tags_source_and_rejects_inverted_range() {
        let p = SyntheticProvider::new(1);
        let r = p.fetch("UNRATE", d(2000, 1), d(2000, 6)).unwrap();
        assert_eq!(r.source, DataSource::Synthetic);
        assert_eq!(r.observations.len(), 6);
        assert!(p.fetch("UNRATE", d(2001, 1), d(2000, 1)).is_err());
    }

    #[test]
    fn speeches_are_sorted_and_in_range() {
        let recs = synthetic_speeches(42, "US", d(2005, 1), d(2006, 12));
        assert!(!recs.is_empty());
        assert!(recs.windows(2).all(|w| w[0].date <= w[1].date));
        assert!(recs.iter().all(|r| r.date >= d(2005, 1) && r.date < d(2007, 1)));
        assert_eq!(recs, synthetic_speeches(42, "US", d(2005, 1), d(2006, 12)));
    }
}
