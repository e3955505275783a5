//! Multi-series time alignment.
//!
//! Given observations for several macro series, snap them to month starts
//! and align them on one monthly calendar.

use super::provider::{DataError, Observation};
use crate::domain::{first_month_gap, month_range, month_start, Column, TimeSeriesTable};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How to treat months where some series has no observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignPolicy {
    /// Carry the last observation forward (quarterly GDP onto a monthly
    /// calendar). Months before a series starts stay missing.
    #[default]
    ForwardFill,
    /// Drop months with any missing value. The remaining index must be
    /// gap-free.
    DropIncomplete,
}

/// Snap observations to month starts. When a month holds several
/// observations the last non-missing one wins.
pub fn to_monthly(observations: &[Observation]) -> BTreeMap<NaiveDate, f64> {
    let mut monthly = BTreeMap::new();
    for obs in observations {
        let slot = monthly.entry(month_start(obs.date)).or_insert(f64::NAN);
        if obs.value.is_finite() || slot.is_nan() {
            *slot = obs.value;
        }
    }
    monthly
}

/// Align labelled series onto a common monthly calendar.
///
/// The calendar spans `range` when given, otherwise the union of all
/// observation months.
pub fn align_series(
    series: &[(String, Vec<Observation>)],
    policy: AlignPolicy,
    range: Option<(NaiveDate, NaiveDate)>,
) -> Result<TimeSeriesTable, DataError> {
    let monthly: Vec<(String, BTreeMap<NaiveDate, f64>)> = series
        .iter()
        .map(|(label, obs)| (label.clone(), to_monthly(obs)))
        .collect();

    let span = range.map(|(s, e)| (month_start(s), month_start(e))).or_else(|| {
        let first = monthly.iter().filter_map(|(_, m)| m.keys().next()).min()?;
        let last = monthly.iter().filter_map(|(_, m)| m.keys().next_back()).max()?;
        Some((*first, *last))
    });
    let Some((start, end)) = span else {
        return Ok(TimeSeriesTable::default());
    };

    let dates = month_range(start, end);
    let columns = monthly
        .iter()
        .map(|(label, m)| {
            let values = dates
                .iter()
                .map(|d| m.get(d).copied().unwrap_or(f64::NAN))
                .collect();
            Column::new(label.clone(), values)
        })
        .collect();
    let table = TimeSeriesTable::new(dates, columns)?;

    match policy {
        AlignPolicy::ForwardFill => Ok(table.forward_fill()),
        AlignPolicy::DropIncomplete => {
            let complete = table.drop_incomplete();
            if let Some((before, after)) = first_month_gap(complete.dates()) {
                return Err(DataError::DateGap { before, after });
            }
            Ok(complete)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn quarterly_and_monthly() -> Vec<(String, Vec<Observation>)> {
        vec![
            (
                "GDP".into(),
                vec![
                    Observation::new(d(2020, 1, 1), 100.0),
                    Observation::new(d(2020, 4, 1), 90.0),
                ],
            ),
            (
                "UNRATE".into(),
                (1..=5)
                    .map(|m| Observation::new(d(2020, m, 1), 3.5 + m as f64))
                    .collect(),
            ),
        ]
    }

    #[test]
    fn forward_fill_spreads_quarterly_values() {
        let table = align_series(&quarterly_and_monthly(), AlignPolicy::ForwardFill, None).unwrap();
        assert_eq!(table.len(), 5);
        assert_eq!(
            table.column("GDP").unwrap(),
            &[100.0, 100.0, 100.0, 90.0, 90.0]
        );
    }

    #[test]
    fn drop_incomplete_keeps_contiguous_complete_rows() {
        let mut series = quarterly_and_monthly();
        series[0].1.push(Observation::new(d(2020, 2, 1), 98.0));
        series[0].1.push(Observation::new(d(2020, 3, 1), 95.0));
        let table = align_series(&series, AlignPolicy::DropIncomplete, None).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.dates()[3], d(2020, 4, 1));
    }

    #[test]
    fn drop_incomplete_reports_first_gap() {
        let err = align_series(&quarterly_and_monthly(), AlignPolicy::DropIncomplete, None)
            .unwrap_err();
        match err {
            DataError::DateGap { before, after } => {
                assert_eq!(before, d(2020, 1, 1));
                assert_eq!(after, d(2020, 4, 1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn daily_observations_snap_to_last_value_of_month() {
        let monthly = to_monthly(&[
            Observation::new(d(2020, 1, 2), 1.0),
            Observation::new(d(2020, 1, 30), 2.0),
            Observation::new(d(2020, 1, 31), f64::NAN),
        ]);
        assert_eq!(monthly.len(), 1);
        assert_eq!(monthly[&d(2020, 1, 1)], 2.0);
    }

    #[test]
    fn explicit_range_pads_with_missing() {
        let table = align_series(
            &quarterly_and_monthly(),
            AlignPolicy::ForwardFill,
            Some((d(2019, 11, 15), d(2020, 2, 1))),
        )
        .unwrap();
        assert_eq!(table.dates()[0], d(2019, 11, 1));
        assert_eq!(table.len(), 4);
        assert!(table.column("UNRATE").unwrap()[0].is_nan());
    }
}
