//! Monthly time-series table.
//!
//! A `TimeSeriesTable` is a shared date index plus ordered, named `f64`
//! columns. Missing values are `f64::NAN`; every column has exactly one value
//! per date. Dates are strictly increasing and normally the first day of a
//! month (see [`month_start`]).

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Violations of the table invariants.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TableError {
    #[error("duplicate date {date} in table index")]
    DuplicateDate { date: NaiveDate },

    #[error("dates not increasing: {next} follows {prev}")]
    UnsortedDates { prev: NaiveDate, next: NaiveDate },

    #[error("column '{column}' has {got} values, index has {expected} dates")]
    LengthMismatch {
        column: String,
        expected: usize,
        got: usize,
    },

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("unknown column '{0}'")]
    UnknownColumn(String),
}

/// One named series of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(with = "super::nan_serde::vec")]
    pub values: Vec<f64>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesTable {
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
}

impl TimeSeriesTable {
    /// Build a table, checking the date index and column lengths.
    pub fn new(dates: Vec<NaiveDate>, columns: Vec<Column>) -> Result<Self, TableError> {
        for pair in dates.windows(2) {
            if pair[1] == pair[0] {
                return Err(TableError::DuplicateDate { date: pair[1] });
            }
            if pair[1] < pair[0] {
                return Err(TableError::UnsortedDates {
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }
        for (i, col) in columns.iter().enumerate() {
            if col.values.len() != dates.len() {
                return Err(TableError::LengthMismatch {
                    column: col.name.clone(),
                    expected: dates.len(),
                    got: col.values.len(),
                });
            }
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(TableError::DuplicateColumn(col.name.clone()));
            }
        }
        Ok(Self { dates, columns })
    }

    /// Single-column convenience constructor.
    pub fn single(
        dates: Vec<NaiveDate>,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<Self, TableError> {
        Self::new(dates, vec![Column::new(name, values)])
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Column lookup that reports the missing name.
    pub fn require(&self, name: &str) -> Result<&[f64], TableError> {
        self.column(name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))
    }

    /// Number of dates.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Values of every column at row `i`, in column order.
    pub fn row(&self, i: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c.values[i]).collect()
    }

    /// True when row `i` has no missing value.
    pub fn row_is_complete(&self, i: usize) -> bool {
        self.columns.iter().all(|c| c.values[i].is_finite())
    }

    /// Number of rows with no missing value.
    pub fn complete_row_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.row_is_complete(i)).count()
    }

    /// New table with only the named columns, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Self, TableError> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let values = self.require(name)?;
            columns.push(Column::new(*name, values.to_vec()));
        }
        Self::new(self.dates.clone(), columns)
    }

    /// New table with an extra column appended.
    pub fn with_column(&self, column: Column) -> Result<Self, TableError> {
        let mut columns = self.columns.clone();
        columns.push(column);
        Self::new(self.dates.clone(), columns)
    }

    /// New table with columns renamed through `rename`.
    pub fn rename(&self, rename: impl Fn(&str) -> String) -> Self {
        Self {
            dates: self.dates.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(rename(&c.name), c.values.clone()))
                .collect(),
        }
    }

    /// New table keeping only rows for which `keep(row_index)` holds.
    pub fn filter_rows(&self, keep: impl Fn(usize) -> bool) -> Self {
        let idx: Vec<usize> = (0..self.len()).filter(|&i| keep(i)).collect();
        Self {
            dates: idx.iter().map(|&i| self.dates[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), idx.iter().map(|&i| c.values[i]).collect()))
                .collect(),
        }
    }

    /// New table with rows containing any missing value dropped.
    pub fn drop_incomplete(&self) -> Self {
        self.filter_rows(|i| self.row_is_complete(i))
    }

    /// Forward-fill missing values in every column. Leading gaps stay missing.
    pub fn forward_fill(&self) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let mut last = f64::NAN;
                let values = c
                    .values
                    .iter()
                    .map(|&v| {
                        if v.is_finite() {
                            last = v;
                        }
                        last
                    })
                    .collect();
                Column::new(c.name.clone(), values)
            })
            .collect();
        Self {
            dates: self.dates.clone(),
            columns,
        }
    }

    /// Outer join on the union of both date indexes. Columns from `other`
    /// are appended; dates absent from one side are NaN on that side.
    pub fn outer_join(&self, other: &Self) -> Result<Self, TableError> {
        let mut dates: Vec<NaiveDate> = self.dates.iter().chain(other.dates.iter()).copied().collect();
        dates.sort();
        dates.dedup();

        let reindex = |table: &Self| -> Vec<Column> {
            table
                .columns
                .iter()
                .map(|c| {
                    let values = dates
                        .iter()
                        .map(|d| match table.dates.binary_search(d) {
                            Ok(i) => c.values[i],
                            Err(_) => f64::NAN,
                        })
                        .collect();
                    Column::new(c.name.clone(), values)
                })
                .collect()
        };

        let mut columns = reindex(self);
        columns.extend(reindex(other));
        Self::new(dates, columns)
    }

    /// Approximate equality: same index, same names, values within `tol`
    /// (NaN matches NaN).
    pub fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        self.dates == other.dates
            && self.columns.len() == other.columns.len()
            && self.columns.iter().zip(&other.columns).all(|(a, b)| {
                a.name == b.name
                    && a.values.len() == b.values.len()
                    && a.values.iter().zip(&b.values).all(|(x, y)| {
                        (x.is_nan() && y.is_nan()) || (x - y).abs() <= tol
                    })
            })
    }
}

// ── Month helpers ───────────────────────────────────────────────────

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the month after `date`'s month.
pub fn next_month(date: NaiveDate) -> NaiveDate {
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1).unwrap_or(date)
}

/// Every month start from `start`'s month to `end`'s month, inclusive.
pub fn month_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let last = month_start(end);
    let mut cur = month_start(start);
    while cur <= last {
        out.push(cur);
        cur = next_month(cur);
    }
    out
}

/// Find the first hole in a monthly index. Returns `(before, after)` of the
/// first pair of consecutive dates that are not one month apart.
pub fn first_month_gap(dates: &[NaiveDate]) -> Option<(NaiveDate, NaiveDate)> {
    dates
        .windows(2)
        .find(|w| next_month(w[0]) != w[1])
        .map(|w| (w[0], w[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    #[test]
    fn rejects_duplicate_dates() {
        let err = TimeSeriesTable::single(vec![d(2020, 1), d(2020, 1)], "a", vec![1.0, 2.0])
            .unwrap_err();
        assert_eq!(err, TableError::DuplicateDate { date: d(2020, 1) });
    }

    #[test]
    fn rejects_unsorted_dates() {
        let err = TimeSeriesTable::single(vec![d(2020, 2), d(2020, 1)], "a", vec![1.0, 2.0])
            .unwrap_err();
        assert!(matches!(err, TableError::UnsortedDates { .. }));
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = TimeSeriesTable::single(vec![d(2020, 1)], "a", vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, TableError::LengthMismatch { .. }));
    }

    #[test]
    fn forward_fill_keeps_leading_gap() {
        let t = TimeSeriesTable::single(
            vec![d(2020, 1), d(2020, 2), d(2020, 3), d(2020, 4)],
            "a",
            vec![f64::NAN, 1.0, f64::NAN, 3.0],
        )
        .unwrap();
        let filled = t.forward_fill();
        let v = filled.column("a").unwrap();
        assert!(v[0].is_nan());
        assert_eq!(&v[1..], &[1.0, 1.0, 3.0]);
    }

    #[test]
    fn outer_join_unions_dates() {
        let a = TimeSeriesTable::single(vec![d(2020, 1), d(2020, 3)], "a", vec![1.0, 3.0]).unwrap();
        let b = TimeSeriesTable::single(vec![d(2020, 2), d(2020, 3)], "b", vec![20.0, 30.0]).unwrap();
        let j = a.outer_join(&b).unwrap();
        assert_eq!(j.dates(), &[d(2020, 1), d(2020, 2), d(2020, 3)]);
        assert!(j.column("a").unwrap()[1].is_nan());
        assert!(j.column("b").unwrap()[0].is_nan());
        assert_eq!(j.row(2), vec![3.0, 30.0]);
    }

    #[test]
    fn month_range_spans_year_boundary() {
        let r = month_range(
            NaiveDate::from_ymd_opt(2019, 11, 15).unwrap(),
            NaiveDate::from_ymd_opt(2020, 2, 3).unwrap(),
        );
        assert_eq!(r, vec![d(2019, 11), d(2019, 12), d(2020, 1), d(2020, 2)]);
    }

    #[test]
    fn month_gap_detected() {
        assert_eq!(first_month_gap(&[d(2020, 1), d(2020, 2), d(2020, 4)]), Some((d(2020, 2), d(2020, 4))));
        assert_eq!(first_month_gap(&[d(2020, 12), d(2021, 1)]), None);
    }

    #[test]
    fn select_and_drop_incomplete() {
        let t = TimeSeriesTable::new(
            vec![d(2020, 1), d(2020, 2)],
            vec![Column::new("a", vec![1.0, f64::NAN]), Column::new("b", vec![2.0, 3.0])],
        )
        .unwrap();
        assert_eq!(t.drop_incomplete().len(), 1);
        let s = t.select(&["b"]).unwrap();
        assert_eq!(s.column_names(), vec!["b"]);
        assert!(t.select(&["zzz"]).is_err());
    }
}
