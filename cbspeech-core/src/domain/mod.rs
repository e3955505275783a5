//! Domain types shared by every pipeline stage.

pub mod nan_serde;
pub mod sentiment;
pub mod table;

pub use sentiment::{MonthlySentimentCount, Polarity, SentimentRecord};
pub use table::{
    first_month_gap, month_range, month_start, next_month, Column, TableError, TimeSeriesTable,
};
