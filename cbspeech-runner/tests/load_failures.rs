//! Failure paths and offline fallbacks of a full run.

use cbspeech_core::analysis::AnalysisError;
use cbspeech_core::data::{DataSource, DEFAULT_SERIES};
use cbspeech_runner::reporting::INVENTORY_FILE;
use cbspeech_runner::{run_pipeline, LoadError, PipelineConfig, PipelineError, StageError, StageId};
use chrono::NaiveDate;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn config(root: &Path) -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.data.start = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
    cfg.data.end = NaiveDate::from_ymd_opt(2012, 12, 1).unwrap();
    cfg.data.offline = true;
    cfg.data.synthetic = false;
    cfg.run.cache_dir = root.join("cache");
    cfg.run.output_dir = root.join("output");
    cfg
}

/// A monthly macro CSV with one column per default series id.
fn write_macro_csv(dir: &Path) -> PathBuf {
    let path = dir.join("macro.csv");
    let mut text = String::from("date");
    for (id, _) in DEFAULT_SERIES {
        text.push(',');
        text.push_str(id);
    }
    text.push('\n');
    for t in 0..156 {
        let (year, month) = (2000 + t / 12, t % 12 + 1);
        write!(text, "{year}-{month:02}-01").unwrap();
        for (j, _) in DEFAULT_SERIES.iter().enumerate() {
            let j = j as f64;
            let x = t as f64;
            let value = 10.0 * (j + 1.0) + 0.05 * j * x + (x * (0.1 + 0.07 * j) + j).sin();
            write!(text, ",{value}").unwrap();
        }
        text.push('\n');
    }
    std::fs::write(&path, text).unwrap();
    path
}

fn write_speeches(dir: &Path, year: i32) -> PathBuf {
    let path = dir.join("speeches.csv");
    let mut text = String::from("date,sentiment,country_code\n");
    for month in 1..=12 {
        let label = if month % 2 == 0 { "hawkish" } else { "dovish" };
        writeln!(text, "{year}-{month:02}-10,{label},US").unwrap();
    }
    std::fs::write(&path, text).unwrap();
    path
}

fn failed_stage(err: &PipelineError) -> StageId {
    err.failed_stage().expect("stage error")
}

#[test]
fn offline_without_fallbacks_fails_in_load_and_clears_the_old_inventory() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    std::fs::create_dir_all(&cfg.run.output_dir).unwrap();
    let stale = cfg.run.output_dir.join(INVENTORY_FILE);
    std::fs::write(&stale, "{}").unwrap();

    let err = run_pipeline(&cfg, None).unwrap_err();
    assert_eq!(failed_stage(&err), StageId::Load);
    match err {
        PipelineError::Stage {
            source: StageError::Load(LoadError::SeriesUnavailable { series, cause }),
            ..
        } => {
            assert_eq!(series, "FEDFUNDS");
            assert_eq!(cause, "offline");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!stale.exists());
}

#[test]
fn local_csv_fallback_still_needs_speeches() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    cfg.data.macro_csv = Some(write_macro_csv(dir.path()));

    let err = run_pipeline(&cfg, None).unwrap_err();
    assert_eq!(failed_stage(&err), StageId::Load);
    assert!(matches!(
        err,
        PipelineError::Stage {
            source: StageError::Load(LoadError::NoSpeeches),
            ..
        }
    ));
    assert!(err.to_string().contains("stage 'load' failed"));
}

#[test]
fn offline_run_from_local_files_is_not_synthetic() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    cfg.data.macro_csv = Some(write_macro_csv(dir.path()));
    cfg.data.speeches = Some(write_speeches(dir.path(), 2005));
    cfg.sentiment.missing_months = cbspeech_core::analysis::MissingMonthPolicy::Omit;
    cfg.analysis.rolling_window = 4;
    cfg.analysis.regression_window = 3;

    let run = run_pipeline(&cfg, None).unwrap();
    assert!(!run.inventory.has_synthetic);
    assert!(run
        .inventory
        .data_sources
        .values()
        .all(|s| *s == DataSource::LocalCsv));
    assert_eq!(run.inventory.rows.raw_macro, 156);
    assert_eq!(run.inventory.rows.speeches, 12);
    assert!(cfg.run.output_dir.join(INVENTORY_FILE).is_file());
}

#[test]
fn speeches_outside_the_macro_window_fail_the_regression_stage() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    cfg.data.synthetic = true;
    cfg.data.speeches = Some(write_speeches(dir.path(), 1985));

    let err = run_pipeline(&cfg, None).unwrap_err();
    assert_eq!(failed_stage(&err), StageId::Regression);
    assert!(matches!(
        err,
        PipelineError::Stage {
            source: StageError::Analysis(AnalysisError::InsufficientData { .. }),
            ..
        }
    ));
    assert!(!cfg.run.output_dir.join(INVENTORY_FILE).exists());
    assert!(!cfg.run.output_dir.join("pca_components.csv").exists());
}
