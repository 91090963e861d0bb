//! seedbench - resumable multi-seed benchmark CLI
//!
//! Runs an external training pipeline once per seed, records every attempt,
//! and folds per-iteration metric artifacts into cumulative tables.
//!
//! ## Commands
//!
//! - `run`: plan, execute the remaining iterations, aggregate
//! - `plan`: show where a batch would resume
//! - `align`: alignment check for one iteration tag
//! - `merge`: summary merge for one iteration tag
//! - `best`: select the best stacking meta-learner across iterations
//! - `seeds`: audit the seed recorded in each iteration log
//! - `records`: print the run record table

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use seedbench_core::{
    audit_seeds, resolve_device, select_best_stacker, Aggregator, AlignmentReport, BenchConfig,
    CsvRunRecordStore, Device, IterationTag, MergeReport, ResumePlan, ResumePlanner,
    RunRecordStore, DEFAULT_CONFIG_FILE,
};
use seedbench_runner::BatchController;

#[derive(Parser)]
#[command(name = "seedbench")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resumable multi-seed benchmark orchestration", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (default: ./seedbench.toml when present)
    #[arg(long, global = true, env = "SEEDBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Override the output directory
    #[arg(long, global = true, env = "SEEDBENCH_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the batch: resume, execute remaining iterations, aggregate
    Run {
        /// Total number of iterations in the batch
        #[arg(long, env = "SEEDBENCH_TOTAL_ITERATIONS")]
        total: Option<u32>,

        /// Added to the iteration index to form the seed
        #[arg(long, env = "SEEDBENCH_SEED_OFFSET")]
        seed_offset: Option<u64>,

        /// Accelerator id, or "none" to skip probing
        #[arg(long)]
        device: Option<String>,

        /// Seconds to pause between iterations
        #[arg(long)]
        pause: Option<u64>,
    },

    /// Show where a batch would resume
    Plan {
        /// Total number of iterations in the batch
        #[arg(long, env = "SEEDBENCH_TOTAL_ITERATIONS")]
        total: Option<u32>,

        /// Also count iteration logs as attempts
        #[arg(long)]
        from_logs: bool,
    },

    /// Check that every stacking input exists for a tag and count aligned samples
    Align {
        /// Iteration tag, e.g. iter3
        #[arg(long)]
        tag: IterationTag,
    },

    /// Merge a tag's metric files into the per-tag and cumulative summaries
    Merge {
        /// Iteration tag, e.g. iter3
        #[arg(long)]
        tag: IterationTag,
    },

    /// Select the best stacking meta-learner across iterations
    Best {
        /// Directory holding stacker artifacts (default: output directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Print the seed found in each iteration log
    Seeds,

    /// Print the run record table
    Records,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    seedbench_core::init_tracing(cli.json, level);

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }

    match cli.command {
        Commands::Run {
            total,
            seed_offset,
            device,
            pause,
        } => {
            if let Some(total) = total {
                config.total_iterations = total;
            }
            if let Some(offset) = seed_offset {
                config.seed_offset = offset;
            }
            if let Some(device) = device {
                config.device = Some(device);
            }
            if let Some(pause) = pause {
                config.pause_between_iterations_secs = pause;
            }
            cmd_run(config).await
        }
        Commands::Plan { total, from_logs } => {
            if let Some(total) = total {
                config.total_iterations = total;
            }
            cmd_plan(&config, from_logs)
        }
        Commands::Align { tag } => cmd_align(&config, &tag),
        Commands::Merge { tag } => cmd_merge(&config, &tag),
        Commands::Best { dir } => cmd_best(dir.as_deref().unwrap_or(config.output_dir.as_path())),
        Commands::Seeds => cmd_seeds(&config),
        Commands::Records => cmd_records(&config),
    }
}

/// Explicit path must exist; the default file is optional.
fn load_config(path: Option<&Path>) -> Result<BenchConfig> {
    match path {
        Some(path) => BenchConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            BenchConfig::from_file(DEFAULT_CONFIG_FILE).context("Failed to load seedbench.toml")
        }
        None => Ok(BenchConfig::default()),
    }
}

fn open_store(config: &BenchConfig) -> Arc<CsvRunRecordStore> {
    Arc::new(CsvRunRecordStore::new(config.run_records_path()))
}

/// Run the batch
async fn cmd_run(config: BenchConfig) -> Result<()> {
    let device = resolve_device(config.device_override()).await;
    let store = open_store(&config);

    let report = BatchController::new(config, store, device)
        .run()
        .await
        .context("Batch aborted")?;

    match report.plan {
        ResumePlan::Complete => {
            println!("All iterations already attempted, nothing to run");
            return Ok(());
        }
        ResumePlan::Next(first) => println!("Resumed at iteration {}", first),
    }

    println!("Device: {}", report.device);
    for it in &report.iterations {
        let status = it.outcome.status().as_str();
        println!(
            "  {}  seed={}  {}  {}s",
            it.context.tag, it.context.seed, status, it.record.duration_sec
        );
    }
    for agg in &report.aggregations {
        let alignment = match &agg.alignment {
            Ok(AlignmentReport::Aligned(summary)) => format!("aligned={}", summary.aligned_count),
            Ok(AlignmentReport::Skipped { missing, .. }) => {
                format!("stacking skipped (missing {})", missing.join(", "))
            }
            Err(e) => format!("alignment error: {}", e),
        };
        let merge = match &agg.merge {
            Ok(report) => merge_label(report),
            Err(e) => format!("merge error: {}", e),
        };
        println!("  {}  {}  {}", agg.tag, alignment, merge);
    }
    println!(
        "Attempted {} iteration(s), {} failed",
        report.attempted(),
        report.failed()
    );

    Ok(())
}

/// Show the resume point
fn cmd_plan(config: &BenchConfig, from_logs: bool) -> Result<()> {
    let store = open_store(config);
    let mut observed: BTreeSet<IterationTag> = store
        .recorded_tags()
        .context("Failed to read run records")?
        .into_iter()
        .collect();
    if from_logs {
        observed.extend(ResumePlanner::tags_from_log_dir(&config.log_dir_path())?);
    }

    match ResumePlanner::plan(&observed, config.total_iterations) {
        ResumePlan::Next(index) => println!(
            "Next iteration: iter{} of {} ({} already attempted)",
            index,
            config.total_iterations,
            observed.len()
        ),
        ResumePlan::Complete => println!(
            "Complete: {} iteration(s) attempted, total {}",
            observed.len(),
            config.total_iterations
        ),
    }
    Ok(())
}

/// Alignment check for one tag
fn cmd_align(config: &BenchConfig, tag: &IterationTag) -> Result<()> {
    let aggregator = Aggregator::from_config(config);
    match aggregator.check_alignment(tag)? {
        AlignmentReport::Aligned(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        AlignmentReport::Skipped {
            missing, sentinel, ..
        } => {
            println!("Missing stacking inputs for {}: {}", tag, missing.join(", "));
            println!("Sentinel written: {}", sentinel.display());
        }
    }
    Ok(())
}

/// Summary merge for one tag
fn cmd_merge(config: &BenchConfig, tag: &IterationTag) -> Result<()> {
    let aggregator = Aggregator::from_config(config);
    let report = aggregator.merge_summary(tag)?;
    println!("{}: {}", tag, merge_label(&report));
    Ok(())
}

fn merge_label(report: &MergeReport) -> String {
    match report {
        MergeReport::Merged { files, rows, .. } => {
            format!("merged {} file(s), {} row(s)", files, rows)
        }
        MergeReport::AlreadyMerged { files, .. } => {
            format!("already in cumulative summary ({} file(s))", files)
        }
        MergeReport::NoMetrics { .. } => "no metrics found".to_string(),
    }
}

/// Best stacker across iterations
fn cmd_best(dir: &Path) -> Result<()> {
    let best = select_best_stacker(dir)
        .with_context(|| format!("Failed to select best stacker in {}", dir.display()))?;

    println!("Best iteration: {}", best.tag);
    println!("Average Macro-F1: {:.4}", best.avg_macro_f1);
    println!("Iterations compared: {}", best.iterations_found);
    for path in &best.copied {
        println!("  copied {}", path.display());
    }
    println!("Model card: {}", best.model_card.display());
    Ok(())
}

/// Seed audit over iteration logs
fn cmd_seeds(config: &BenchConfig) -> Result<()> {
    let log_dir = config.log_dir_path();
    let audits = audit_seeds(&log_dir)?;
    if audits.is_empty() {
        println!("No iteration logs in {}", log_dir.display());
        return Ok(());
    }

    for audit in &audits {
        match audit.seed {
            Some(seed) => println!("{}\t{}", audit.tag, seed),
            None => println!("{}\t(no seed found)", audit.tag),
        }
    }

    let expected: Vec<u64> = audits
        .iter()
        .map(|a| u64::from(a.tag.index()) + config.seed_offset)
        .collect();
    let mismatched = audits
        .iter()
        .zip(&expected)
        .filter(|(a, want)| a.seed.is_some_and(|s| s != **want))
        .count();
    if mismatched > 0 {
        bail!("{} iteration(s) ran with an unexpected seed", mismatched);
    }
    info!(logs = audits.len(), "Seed audit passed");
    Ok(())
}

/// Print the run record table
fn cmd_records(config: &BenchConfig) -> Result<()> {
    let store = open_store(config);
    let records = store.load_all().context("Failed to read run records")?;
    if records.is_empty() {
        println!("No run records in {}", store.path().display());
        return Ok(());
    }

    println!(
        "{:<10} {:<26} {:<26} {:>10}  {}",
        "iteration", "start", "end", "duration_s", "gpu"
    );
    for r in &records {
        println!(
            "{:<10} {:<26} {:<26} {:>10}  {}",
            r.iteration_tag.to_string(),
            r.start_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            r.end_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            r.duration_sec,
            r.gpu_id
        );
    }
    let unaccelerated = records
        .iter()
        .filter(|r| r.gpu_id == Device::None.to_string())
        .count();
    info!(
        records = records.len(),
        unaccelerated,
        "Run records listed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_tag_argument() {
        let cli = Cli::try_parse_from(["seedbench", "align", "--tag", "iter4"]).unwrap();
        match cli.command {
            Commands::Align { tag } => assert_eq!(tag, IterationTag::new(4)),
            _ => panic!("expected align"),
        }
        assert!(Cli::try_parse_from(["seedbench", "merge", "--tag", "4"]).is_err());
    }

    #[test]
    fn test_load_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.toml");
        std::fs::write(&path, "total_iterations = 9\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.total_iterations, 9);
        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
