//! End-to-end runs over synthetic inputs.

use cbspeech_core::analysis::{INFLATION_INDEX, MACRO_STRENGTH_INDEX};
use cbspeech_core::data::DataSource;
use cbspeech_runner::reporting::{
    read_breakpoints, read_inventory, read_matrix, read_table, INVENTORY_FILE,
};
use cbspeech_runner::{run_pipeline, PipelineConfig, StageId};
use chrono::NaiveDate;
use std::path::Path;
use tempfile::TempDir;

fn config(root: &Path) -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.data.start = NaiveDate::from_ymd_opt(1998, 1, 1).unwrap();
    cfg.data.end = NaiveDate::from_ymd_opt(2014, 12, 1).unwrap();
    cfg.data.offline = true;
    cfg.data.synthetic = true;
    cfg.run.cache_dir = root.join("cache");
    cfg.run.output_dir = root.join("output");
    cfg
}

const EXPECTED: &[&str] = &[
    "raw_macro.csv",
    "processed_macro.csv",
    "pca_components.csv",
    "pca_loadings.csv",
    "breakpoints.json",
    "sentiment_aggregated.csv",
    "rolling_results_macro.csv",
    "rolling_results_inflation.csv",
    "merged_macro.csv",
    "merged_inflation.csv",
    "correlation_matrix.csv",
];

#[test]
fn synthetic_run_writes_every_artifact() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    let run = run_pipeline(&cfg, None).unwrap();

    let out = &cfg.run.output_dir;
    for name in EXPECTED {
        assert!(out.join(name).is_file(), "missing {name}");
    }
    assert!(out.join(INVENTORY_FILE).is_file());
    assert_eq!(run.artifacts.file_names().last().map(String::as_str), Some(INVENTORY_FILE));

    let inventory = read_inventory(&out.join(INVENTORY_FILE)).unwrap();
    assert_eq!(inventory.artifacts, EXPECTED);
    assert!(inventory.has_synthetic);
    assert_eq!(inventory.speeches_origin, "synthetic");
    assert!(inventory.data_sources.values().all(|s| *s == DataSource::Synthetic));
    assert_eq!(inventory.data_sources.len(), cfg.data.series.len());
    assert_eq!(inventory.rows.raw_macro, 204);
    assert_eq!(inventory.rows.pca_scores + inventory.rows.pca_excluded, 204);
    assert_eq!(inventory.pca.eigenvalues.len(), 6);
    assert!(inventory.pca.components_for_threshold >= 1);
    assert_eq!(inventory.breakpoints.len(), 2);
    assert_eq!(inventory.stages.len(), 7);
    assert_eq!(inventory.stage(StageId::Report).map(|s| s.cache_hit), Some(false));
    assert!(inventory.parameters.data.fred_api_key.is_none());
}

#[test]
fn artifacts_read_back_into_the_run_values() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    let run = run_pipeline(&cfg, None).unwrap();
    let out = &cfg.run.output_dir;

    let processed = read_table(&out.join("processed_macro.csv")).unwrap();
    assert!(processed.approx_eq(&run.outputs.standardized, 0.0));

    let components = read_table(&out.join("pca_components.csv")).unwrap();
    assert!(components.approx_eq(&run.outputs.pca.scores, 0.0));

    let loadings = read_matrix(&out.join("pca_loadings.csv")).unwrap();
    assert_eq!(loadings.rows, run.outputs.pca.variables);
    assert_eq!(
        loadings.get(&run.outputs.pca.variables[2], "PC1"),
        Some(run.outputs.pca.loadings[0][2])
    );

    let breakpoints = read_breakpoints(&out.join("breakpoints.json")).unwrap();
    assert_eq!(breakpoints, run.outputs.breakpoints);
    assert!(breakpoints.get(MACRO_STRENGTH_INDEX).is_some());
    assert!(breakpoints.get(INFLATION_INDEX).is_some());

    let rolling = read_table(&out.join("rolling_results_macro.csv")).unwrap();
    let expected = &run.outputs.regression.get(MACRO_STRENGTH_INDEX).unwrap().results;
    assert!(rolling.approx_eq(expected, 0.0));

    let correlations = read_matrix(&out.join("correlation_matrix.csv")).unwrap();
    assert_eq!(correlations.rows.len(), 4);
    let r = correlations.get(MACRO_STRENGTH_INDEX, "hawkish_z").unwrap();
    assert_eq!(
        Some(r),
        run.outputs.regression.correlations.get(MACRO_STRENGTH_INDEX, "hawkish_z")
    );
}

#[test]
fn cached_rerun_hits_every_stage_and_reproduces_outputs() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    let first = run_pipeline(&cfg, None).unwrap();
    let before: Vec<Vec<u8>> = EXPECTED
        .iter()
        .map(|n| std::fs::read(cfg.run.output_dir.join(n)).unwrap())
        .collect();

    cfg.run.use_cached = true;
    let second = run_pipeline(&cfg, None).unwrap();
    for record in &second.outputs.stages {
        let memoized = StageId::MEMOIZED.contains(&record.stage);
        assert_eq!(record.cache_hit, memoized, "{}", record.stage);
    }
    assert_eq!(second.outputs.cache_hits(), StageId::MEMOIZED.len());

    let keys = |run: &cbspeech_runner::PipelineRun| -> Vec<_> {
        run.outputs.stages.iter().map(|s| s.key.clone()).collect()
    };
    assert_eq!(keys(&first), keys(&second));

    for (name, bytes) in EXPECTED.iter().zip(before) {
        let after = std::fs::read(cfg.run.output_dir.join(name)).unwrap();
        assert_eq!(after, bytes, "{name} changed on a cached rerun");
    }
}

#[test]
fn identical_configs_in_separate_directories_agree() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    let run_a = run_pipeline(&config(a.path()), None).unwrap();
    let run_b = run_pipeline(&config(b.path()), None).unwrap();

    assert_eq!(run_a.inventory.dataset_hash, run_b.inventory.dataset_hash);
    assert_eq!(run_a.inventory.speeches_hash, run_b.inventory.speeches_hash);
    for name in EXPECTED {
        let left = std::fs::read(a.path().join("output").join(name)).unwrap();
        let right = std::fs::read(b.path().join("output").join(name)).unwrap();
        assert_eq!(left, right, "{name} differs");
    }
}

#[test]
fn speeches_file_drives_the_sentiment_table() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    let speeches = dir.path().join("speeches.csv");
    let mut csv = String::from("date,sentiment,source\n");
    for year in 1998..=2014 {
        for month in 1..=12 {
            let label = match (year + month) % 3 {
                0 => "hawkish",
                1 => "dovish",
                _ => "neutral",
            };
            csv.push_str(&format!("{year}-{month:02}-15,{label},US\n"));
            if month % 4 == 0 {
                csv.push_str(&format!("{year}-{month:02}-20,hawkish,ECB\n"));
            }
        }
    }
    std::fs::write(&speeches, csv).unwrap();
    cfg.data.speeches = Some(speeches.clone());

    let run = run_pipeline(&cfg, None).unwrap();
    assert_eq!(run.outputs.speeches.records.len(), 17 * 12);
    assert_eq!(run.inventory.speeches_origin, speeches.display().to_string());
    assert_eq!(run.outputs.sentiment.summary.total, 17 * 12);
    assert_eq!(run.outputs.sentiment.table.len(), 17 * 12);

    let sentiment = read_table(&cfg.run.output_dir.join("sentiment_aggregated.csv")).unwrap();
    assert_eq!(
        sentiment.column_names(),
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
    // lag of one month
    assert!(sentiment.require("hawkish").unwrap()[0].is_nan());
    // January 1998 held one dovish US speech
    assert_eq!(sentiment.require("dovish").unwrap()[1], 1.0);
    assert_eq!(sentiment.require("hawkish").unwrap()[1], 0.0);
}
