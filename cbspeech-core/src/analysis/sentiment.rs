//! Monthly aggregation of labelled speeches.
//!
//! Counts are grouped by calendar month. Months without speeches are either
//! filled with zero counts or left out, per [`MissingMonthPolicy`]; the
//! choice matters downstream because the macro panel is a full monthly
//! calendar.

use super::rolling::rolling_zscore;
use super::AnalysisError;
use crate::domain::{
    month_range, month_start, Column, MonthlySentimentCount, Polarity, SentimentRecord,
    TimeSeriesTable,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What to emit for a month with no speeches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingMonthPolicy {
    /// Emit the month with all counts zero.
    #[default]
    ZeroFill,
    /// Emit only months with at least one speech.
    Omit,
}

impl std::str::FromStr for MissingMonthPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "zero_fill" | "zero" => Ok(Self::ZeroFill),
            "omit" => Ok(Self::Omit),
            other => Err(format!("unknown missing-month policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationOptions {
    pub missing_months: MissingMonthPolicy,
    /// Inclusive month range. Records outside are dropped; with
    /// `ZeroFill` the output covers the whole range.
    pub range: Option<(NaiveDate, NaiveDate)>,
    /// Count neutral speeches in the differential's denominator.
    pub neutral_in_differential: bool,
    /// Shift counts forward by this many rows before standardizing.
    pub lag_months: usize,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            missing_months: MissingMonthPolicy::ZeroFill,
            range: None,
            neutral_in_differential: false,
            lag_months: 1,
        }
    }
}

/// Label totals over the whole record set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub total: usize,
    pub hawkish: usize,
    pub dovish: usize,
    pub neutral: usize,
    pub hawkish_pct: f64,
    pub dovish_pct: f64,
    pub neutral_pct: f64,
    pub first_month: Option<NaiveDate>,
    pub last_month: Option<NaiveDate>,
}

/// Group records by month.
pub fn aggregate_monthly(
    records: &[SentimentRecord],
    options: &AggregationOptions,
) -> Vec<MonthlySentimentCount> {
    let range = options
        .range
        .map(|(start, end)| (month_start(start), month_start(end)));
    let mut by_month: BTreeMap<NaiveDate, MonthlySentimentCount> = BTreeMap::new();
    for record in records {
        let month = month_start(record.date);
        if let Some((start, end)) = range {
            if month < start || month > end {
                continue;
            }
        }
        by_month
            .entry(month)
            .or_insert_with(|| MonthlySentimentCount::empty(month))
            .record(record.polarity);
    }

    match options.missing_months {
        MissingMonthPolicy::Omit => by_month.into_values().collect(),
        MissingMonthPolicy::ZeroFill => {
            let span = range.or_else(|| {
                let first = by_month.keys().next().copied()?;
                let last = by_month.keys().next_back().copied()?;
                Some((first, last))
            });
            let Some((start, end)) = span else {
                return Vec::new();
            };
            month_range(start, end)
                .into_iter()
                .map(|m| {
                    by_month
                        .get(&m)
                        .copied()
                        .unwrap_or_else(|| MonthlySentimentCount::empty(m))
                })
                .collect()
        }
    }
}

/// `(hawkish − dovish) / (hawkish + dovish [+ neutral])`; 0 for an empty
/// denominator.
pub fn differential(count: &MonthlySentimentCount, neutral_in_denominator: bool) -> f64 {
    let h = f64::from(count.hawkish);
    let d = f64::from(count.dovish);
    let mut denom = h + d;
    if neutral_in_denominator {
        denom += f64::from(count.neutral);
    }
    if denom == 0.0 {
        0.0
    } else {
        (h - d) / denom
    }
}

/// Build the sentiment table: lagged counts, differential and their rolling
/// z-scores (`hawkish_z`, `dovish_z`, `differential_z`).
///
/// The lag shifts rows, so under `Omit` it is a lag in observed months.
pub fn standardize_sentiment(
    counts: &[MonthlySentimentCount],
    options: &AggregationOptions,
    window: usize,
) -> Result<TimeSeriesTable, AnalysisError> {
    if window == 0 {
        return Err(AnalysisError::InvalidWindow { got: 0, min: 1 });
    }
    let dates: Vec<NaiveDate> = counts.iter().map(|c| c.month).collect();
    let lag = options.lag_months;
    let hawkish = lagged(counts, lag, |c| f64::from(c.hawkish));
    let dovish = lagged(counts, lag, |c| f64::from(c.dovish));
    let neutral = lagged(counts, lag, |c| f64::from(c.neutral));
    let diff = lagged(counts, lag, |c| {
        differential(c, options.neutral_in_differential)
    });

    let hawkish_z = rolling_zscore(&hawkish, window);
    let dovish_z = rolling_zscore(&dovish, window);
    let differential_z = rolling_zscore(&diff, window);

    let columns = vec![
        Column::new("hawkish", hawkish),
        Column::new("dovish", dovish),
        Column::new("neutral", neutral),
        Column::new("differential", diff),
        Column::new("hawkish_z", hawkish_z),
        Column::new("dovish_z", dovish_z),
        Column::new("differential_z", differential_z),
    ];
    Ok(TimeSeriesTable::new(dates, columns)?)
}

fn lagged(
    counts: &[MonthlySentimentCount],
    lag: usize,
    f: impl Fn(&MonthlySentimentCount) -> f64,
) -> Vec<f64> {
    (0..counts.len())
        .map(|i| if i < lag { f64::NAN } else { f(&counts[i - lag]) })
        .collect()
}

pub fn summarize(records: &[SentimentRecord]) -> SentimentSummary {
    let count = |p: Polarity| records.iter().filter(|r| r.polarity == p).count();
    let (hawkish, dovish, neutral) = (
        count(Polarity::Hawkish),
        count(Polarity::Dovish),
        count(Polarity::Neutral),
    );
    let total = records.len();
    let pct = |n: usize| {
        if total == 0 {
            0.0
        } else {
            100.0 * n as f64 / total as f64
        }
    };
    SentimentSummary {
        total,
        hawkish,
        dovish,
        neutral,
        hawkish_pct: pct(hawkish),
        dovish_pct: pct(dovish),
        neutral_pct: pct(neutral),
        first_month: records.iter().map(|r| month_start(r.date)).min(),
        last_month: records.iter().map(|r| month_start(r.date)).max(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::assert_approx;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rec(date: NaiveDate, p: Polarity) -> SentimentRecord {
        SentimentRecord::new(date, p, "US")
    }

    fn spring_2008() -> Vec<SentimentRecord> {
        vec![
            rec(d(2008, 3, 4), Polarity::Hawkish),
            rec(d(2008, 3, 11), Polarity::Dovish),
            rec(d(2008, 3, 18), Polarity::Hawkish),
            rec(d(2008, 3, 27), Polarity::Hawkish),
            rec(d(2008, 5, 2), Polarity::Neutral),
            rec(d(2008, 5, 20), Polarity::Dovish),
        ]
    }

    #[test]
    fn march_2008_counts_and_zero_filled_april() {
        let counts = aggregate_monthly(&spring_2008(), &AggregationOptions::default());
        assert_eq!(counts.len(), 3);
        assert_eq!(counts[0].month, d(2008, 3, 1));
        assert_eq!((counts[0].hawkish, counts[0].dovish), (3, 1));
        assert_approx(differential(&counts[0], false), 0.5, 1e-12);
        assert_eq!(counts[1], MonthlySentimentCount::empty(d(2008, 4, 1)));
        assert_eq!(differential(&counts[1], false), 0.0);
    }

    #[test]
    fn omit_policy_skips_empty_months() {
        let options = AggregationOptions {
            missing_months: MissingMonthPolicy::Omit,
            ..Default::default()
        };
        let counts = aggregate_monthly(&spring_2008(), &options);
        let months: Vec<NaiveDate> = counts.iter().map(|c| c.month).collect();
        assert_eq!(months, vec![d(2008, 3, 1), d(2008, 5, 1)]);
    }

    #[test]
    fn range_bounds_and_fills_output() {
        let options = AggregationOptions {
            range: Some((d(2008, 2, 1), d(2008, 4, 30))),
            ..Default::default()
        };
        let counts = aggregate_monthly(&spring_2008(), &options);
        let months: Vec<NaiveDate> = counts.iter().map(|c| c.month).collect();
        assert_eq!(months, vec![d(2008, 2, 1), d(2008, 3, 1), d(2008, 4, 1)]);
        assert_eq!(counts.iter().map(|c| c.total()).sum::<u32>(), 4);
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(aggregate_monthly(&[], &AggregationOptions::default()).is_empty());
    }

    #[test]
    fn neutral_can_join_the_denominator() {
        let c = MonthlySentimentCount {
            month: d(2008, 5, 1),
            hawkish: 2,
            dovish: 1,
            neutral: 1,
        };
        assert_approx(differential(&c, false), 1.0 / 3.0, 1e-12);
        assert_approx(differential(&c, true), 0.25, 1e-12);
    }

    #[test]
    fn lag_shifts_counts_forward() {
        let counts = aggregate_monthly(&spring_2008(), &AggregationOptions::default());
        let table = standardize_sentiment(&counts, &AggregationOptions::default(), 2).unwrap();
        let hawkish = table.column("hawkish").unwrap();
        assert!(hawkish[0].is_nan());
        assert_eq!(hawkish[1], 3.0);
        assert_eq!(hawkish[2], 0.0);
        assert_eq!(
            table.column_names(),
            vec![
                "hawkish",
                "dovish",
                "neutral",
                "differential",
                "hawkish_z",
                "dovish_z",
                "differential_z"
            ]
        );
    }

    #[test]
    fn z_columns_use_the_rolling_window() {
        let options = AggregationOptions {
            lag_months: 0,
            ..Default::default()
        };
        let counts = aggregate_monthly(&spring_2008(), &options);
        let table = standardize_sentiment(&counts, &options, 2).unwrap();
        let z = table.column("hawkish_z").unwrap();
        assert!(z[0].is_nan());
        // window [3, 0]: mean 1.5, sample std 3/√2
        assert_approx(z[1], -1.5 / (4.5_f64).sqrt(), 1e-12);
    }

    #[test]
    fn zero_window_rejected() {
        assert!(matches!(
            standardize_sentiment(&[], &AggregationOptions::default(), 0),
            Err(AnalysisError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn summary_percentages() {
        let s = summarize(&spring_2008());
        assert_eq!((s.total, s.hawkish, s.dovish, s.neutral), (6, 3, 2, 1));
        assert_approx(s.hawkish_pct, 50.0, 1e-12);
        assert_eq!(s.first_month, Some(d(2008, 3, 1)));
        assert_eq!(s.last_month, Some(d(2008, 5, 1)));
    }

    #[test]
    fn policy_parses() {
        assert_eq!("zero-fill".parse::<MissingMonthPolicy>().unwrap(), MissingMonthPolicy::ZeroFill);
        assert_eq!("Omit".parse::<MissingMonthPolicy>().unwrap(), MissingMonthPolicy::Omit);
    }
}
