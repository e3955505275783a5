//! cbspeech CLI: pipeline, download, and cache management commands.
//!
//! Commands:
//! - `run`: execute the full pipeline from a TOML config plus flag overrides
//! - `fetch`: download FRED series into the Parquet cache
//! - `cache status`: report cached series and stage artifacts
//! - `cache clean`: remove stage artifacts and/or cached series

use anyhow::{bail, Context, Result};
use cbspeech_core::analysis::{CostModel, MissingMonthPolicy, MACRO_STRENGTH_INDEX};
use cbspeech_core::data::{
    download_series, FredProvider, LogProgress, MacroProvider, ParquetCache,
};
use cbspeech_runner::{
    run_pipeline, ConfigOverrides, PipelineConfig, PipelineRun, StageCache,
};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "cbspeech",
    about = "Central-bank speech sentiment against macro regimes"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write the report artifacts.
    Run(RunArgs),
    /// Download FRED series into the Parquet cache.
    Fetch {
        /// Path to a TOML config file (series list, dates, API key).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Series ids to download. Defaults to the configured panel.
        #[arg(long, num_args = 1..)]
        series: Vec<String>,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: Option<NaiveDate>,

        /// End date (YYYY-MM-DD).
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Re-download even if the cache covers the range.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Cache directory.
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start date (YYYY-MM-DD).
    #[arg(long)]
    start: Option<NaiveDate>,

    /// End date (YYYY-MM-DD).
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Labelled speeches (CSV, JSON or Parquet).
    #[arg(long)]
    speeches: Option<PathBuf>,

    /// Local macro CSV used when FRED and the cache both fail.
    #[arg(long)]
    macro_csv: Option<PathBuf>,

    /// Keep only speeches from this source.
    #[arg(long)]
    source: Option<String>,

    /// Offline mode: no network access.
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Use seeded synthetic data when real data is unavailable.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// PELT penalty.
    #[arg(long)]
    penalty: Option<f64>,

    /// Minimum segment length between breakpoints.
    #[arg(long)]
    min_segment: Option<usize>,

    /// Segment cost model: l2 or rbf.
    #[arg(long)]
    cost_model: Option<CostModel>,

    /// Rolling standardization window (months).
    #[arg(long)]
    rolling_window: Option<usize>,

    /// Rolling regression window (months).
    #[arg(long)]
    regression_window: Option<usize>,

    /// Months without speeches: zero_fill or omit.
    #[arg(long)]
    missing_months: Option<MissingMonthPolicy>,

    /// Months the sentiment counts are lagged by.
    #[arg(long)]
    lag_months: Option<usize>,

    /// Seed for synthetic data.
    #[arg(long)]
    seed: Option<u64>,

    /// Cache directory (series and stage artifacts).
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Output directory for report artifacts.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Reuse fresh stage artifacts and cached series.
    #[arg(long, default_value_t = false)]
    use_cached: bool,

    /// Debug logging.
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        let flag = |set: bool| set.then_some(true);
        ConfigOverrides {
            start: self.start,
            end: self.end,
            macro_csv: self.macro_csv.clone(),
            speeches: self.speeches.clone(),
            source_filter: self.source.clone(),
            offline: flag(self.offline),
            synthetic: flag(self.synthetic),
            rolling_window: self.rolling_window,
            regression_window: self.regression_window,
            penalty: self.penalty,
            min_segment: self.min_segment,
            cost_model: self.cost_model,
            missing_months: self.missing_months,
            lag_months: self.lag_months,
            seed: self.seed,
            cache_dir: self.cache_dir.clone(),
            output_dir: self.output_dir.clone(),
            use_cached: flag(self.use_cached),
            verbose: flag(self.verbose),
        }
    }
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cached series and stage artifacts.
    Status {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Remove stage artifacts and/or cached series. Both when neither flag is given.
    Clean {
        /// Remove memoized stage artifacts.
        #[arg(long, default_value_t = false)]
        stages: bool,

        /// Remove cached macro series.
        #[arg(long, default_value_t = false)]
        series: bool,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Actually delete (without this flag, only previews what would be removed).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_cmd(args),
        Commands::Fetch {
            config,
            series,
            start,
            end,
            force,
            cache_dir,
        } => {
            init_tracing(false);
            let mut cfg = load_config(config.as_deref())?;
            cfg.apply_overrides(ConfigOverrides {
                start,
                end,
                cache_dir,
                ..Default::default()
            });
            fetch_cmd(&cfg, series, force)
        }
        Commands::Cache { action } => {
            init_tracing(false);
            match action {
                CacheAction::Status { config, cache_dir } => {
                    let mut cfg = load_config(config.as_deref())?;
                    cfg.apply_overrides(ConfigOverrides::cache_dir(cache_dir));
                    cache_status_cmd(&cfg)
                }
                CacheAction::Clean {
                    stages,
                    series,
                    config,
                    cache_dir,
                    confirm,
                } => {
                    let mut cfg = load_config(config.as_deref())?;
                    cfg.apply_overrides(ConfigOverrides::cache_dir(cache_dir));
                    let both = !stages && !series;
                    cache_clean_cmd(&cfg, stages || both, series || both, confirm)
                }
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => Ok(PipelineConfig::from_file(path)?),
        None => Ok(PipelineConfig::default()),
    }
}

fn fred_provider(cfg: &PipelineConfig) -> Option<FredProvider> {
    match FredProvider::from_env_or(cfg.data.fred_api_key.clone()) {
        Ok(provider) if provider.is_available() => Some(provider),
        Ok(_) => {
            warn!("no FRED API key (set FRED_API_KEY or data.fred_api_key), skipping downloads");
            None
        }
        Err(e) => {
            warn!(error = %e, "FRED client unavailable");
            None
        }
    }
}

fn run_cmd(args: RunArgs) -> Result<()> {
    let mut cfg = load_config(args.config.as_deref())?;
    cfg.apply_overrides(args.overrides());
    init_tracing(cfg.run.verbose);

    let provider = if cfg.data.offline { None } else { fred_provider(&cfg) };
    let provider_ref = provider.as_ref().map(|p| p as &dyn MacroProvider);

    let run = run_pipeline(&cfg, provider_ref)?;
    print_summary(&cfg, &run);
    println!("Artifacts saved to: {}", cfg.run.output_dir.display());
    Ok(())
}

fn fetch_cmd(cfg: &PipelineConfig, series: Vec<String>, force: bool) -> Result<()> {
    let Some(provider) = fred_provider(cfg) else {
        bail!("cannot fetch without a FRED API key");
    };
    let ids: Vec<String> = if series.is_empty() {
        cfg.data.series.iter().map(|s| s.id.clone()).collect()
    } else {
        series
    };
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let cache = ParquetCache::new(&cfg.run.cache_dir);

    let summary = download_series(
        &provider,
        &cache,
        &id_refs,
        cfg.data.start,
        cfg.data.end,
        force,
        &LogProgress,
    );

    println!(
        "Fetched {}/{} series ({} already cached)",
        summary.succeeded, summary.total, summary.skipped
    );
    if !summary.all_succeeded() {
        for (id, err) in &summary.errors {
            eprintln!("Error for {id}: {err}");
        }
        bail!("{} series failed to download", summary.failed);
    }
    Ok(())
}

fn cache_status_cmd(cfg: &PipelineConfig) -> Result<()> {
    let cache_dir = &cfg.run.cache_dir;
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let parquet = ParquetCache::new(cache_dir);
    let mut ids: Vec<String> = cfg.data.series.iter().map(|s| s.id.clone()).collect();
    for id in parquet.list_series() {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

    println!("Cache: {}", cache_dir.display());
    println!();
    println!("{:<10} {:<25} {:>6} {:<10}", "Series", "Date Range", "Obs", "Source");
    println!("{}", "-".repeat(54));
    for status in parquet.status(&id_refs) {
        match (status.start_date, status.end_date) {
            (Some(start), Some(end)) => println!(
                "{:<10} {:<25} {:>6} {:<10}",
                status.series_id,
                format!("{start} to {end}"),
                status.observation_count.unwrap_or(0),
                status.source.map(|s| s.as_str()).unwrap_or("-"),
            ),
            _ => println!("{:<10} (not cached)", status.series_id),
        }
    }

    let stages = StageCache::new(cfg.stage_cache_dir());
    println!();
    println!("{:<12} {:>9} {:>10}", "Stage", "Artifacts", "Size");
    println!("{}", "-".repeat(33));
    for s in stages.summary() {
        println!("{:<12} {:>9} {:>10}", s.stage, s.artifacts, format_size(s.bytes));
    }
    Ok(())
}

fn cache_clean_cmd(cfg: &PipelineConfig, stages: bool, series: bool, confirm: bool) -> Result<()> {
    let cache_dir = &cfg.run.cache_dir;
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let stage_cache = StageCache::new(cfg.stage_cache_dir());
    let parquet = ParquetCache::new(cache_dir);
    let artifact_count: usize = stage_cache.summary().iter().map(|s| s.artifacts).sum();
    let cached_series = parquet.list_series();

    if stages {
        println!("Stage artifacts: {artifact_count}");
    }
    if series {
        println!("Cached series: {}", cached_series.join(", "));
    }

    if !confirm {
        println!();
        println!("Dry run: pass --confirm to actually delete.");
        return Ok(());
    }

    if stages {
        let removed = stage_cache
            .clear()
            .context("Failed to clear stage artifacts")?;
        println!("Removed {removed} stage artifact(s).");
    }
    if series {
        for id in &cached_series {
            parquet.remove(id)?;
            println!("Removed: {id}");
        }
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn print_summary(cfg: &PipelineConfig, run: &PipelineRun) {
    let inv = &run.inventory;
    println!();
    println!("=== Pipeline Result ===");
    println!("Period:         {} to {}", cfg.data.start, cfg.data.end);
    println!(
        "Macro rows:     {} ({} in PCA, {} excluded)",
        inv.rows.raw_macro, inv.rows.pca_scores, inv.rows.pca_excluded
    );
    println!(
        "Speeches:       {} from {}",
        inv.sentiment.total, inv.speeches_origin
    );
    println!();
    println!("--- PCA ---");
    for (k, ratio) in inv.pca.explained_variance_ratio.iter().take(3).enumerate() {
        println!("PC{}:            {:.1}% of variance", k + 1, ratio * 100.0);
    }
    println!(
        "Components for {:.0}%: {}",
        inv.pca.variance_threshold * 100.0,
        inv.pca.components_for_threshold
    );
    println!();
    println!("--- Breakpoints ---");
    for b in &inv.breakpoints {
        let dates: Vec<String> = b.dates.iter().map(NaiveDate::to_string).collect();
        println!("{}: {} [{}]", b.series, dates.len(), dates.join(", "));
    }
    println!();
    println!("--- Sentiment ---");
    println!(
        "Hawkish {:.1}% / Dovish {:.1}% / Neutral {:.1}%",
        inv.sentiment.hawkish_pct, inv.sentiment.dovish_pct, inv.sentiment.neutral_pct
    );
    for predictor in ["hawkish_z", "dovish_z"] {
        if let Some(r) = inv.correlations.get(MACRO_STRENGTH_INDEX, predictor) {
            println!("corr(Δ{MACRO_STRENGTH_INDEX}, Δ{predictor}): {r:.3}");
        }
    }
    println!();
    println!(
        "Stages:         {} cache hit(s) of {}",
        run.outputs.cache_hits(),
        run.outputs.stages.len()
    );
    if inv.has_synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}
