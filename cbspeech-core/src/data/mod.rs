//! Data loading: macro providers, the Parquet series cache, CSV/JSON/Parquet
//! inputs and monthly alignment.

pub mod align;
pub mod cache;
pub mod csv_io;
pub mod download;
pub mod fred;
pub mod provider;
pub mod speeches;
pub mod synthetic;

pub use align::{align_series, to_monthly, AlignPolicy};
pub use cache::{CacheMeta, CacheStatus, CoverageResult, ParquetCache};
pub use csv_io::{format_float, parse_float, read_macro_csv, read_table_csv, write_table_csv};
pub use download::{download_series, DownloadSummary};
pub use fred::{FredProvider, FRED_API_KEY_ENV};
pub use provider::{
    default_series, DataError, DataSource, DownloadProgress, FetchResult, LogProgress,
    MacroProvider, Observation, SeriesSpec, DEFAULT_SERIES,
};
pub use speeches::{filter_source, load_speeches};
pub use synthetic::{synthetic_speeches, SyntheticProvider};
