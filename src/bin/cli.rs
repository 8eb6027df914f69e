//! Harvester CLI
//!
//! Local execution entry point.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use harvester::{
    error::Result,
    models::Config,
    pipeline::{self, MergeOptions},
    services::{Classifier, ReplaySource},
    storage::Checkpoint,
};

/// Harvester - agility event participant extraction
#[derive(Parser, Debug)]
#[command(
    name = "harvester",
    version,
    about = "Resumable extraction and reconciliation of agility event participants"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Output directory (overrides config and OUT_DIR)
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest events and participants into the dated CSV sinks
    Extract {
        /// Replay a captured JSON document instead of fetching pages
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Ignore the stored checkpoint and start over
        #[arg(long)]
        fresh: bool,

        /// Maximum events this run (0 = unlimited)
        #[arg(long)]
        max_events: Option<usize>,

        /// Maximum participants per event this run (0 = unlimited)
        #[arg(long)]
        max_participants: Option<usize>,
    },

    /// Reconcile harvested records into the final JSON document
    Merge {
        /// Participant records: file or directory (default: output dir)
        #[arg(long)]
        primary: Option<PathBuf>,

        /// Event detail records: file or directory
        #[arg(long)]
        secondary: Option<PathBuf>,

        /// Final document path (default: from config)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Inspect or reset the checkpoint
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Classify a rounds string and print the three axes
    Classify {
        /// Rounds string, e.g. "G2/M(J12)"
        rounds: String,

        /// Participant federation, enables federated re-parsing
        #[arg(long, default_value = "")]
        federation: String,
    },

    /// Validate configuration
    Validate,
}

#[derive(Subcommand, Debug)]
enum CheckpointAction {
    /// Show completed and in-progress events
    Show,
    /// Delete the checkpoint file
    Clear,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Flag set on Ctrl-C; the run stops at the next participant boundary.
fn install_stop_flag() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received; stopping after the current participant");
            flag.store(true, Ordering::Relaxed);
        }
    });
    stop
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Load configuration
    let mut config = Config::load_or_default(&cli.config);
    config.apply_env();
    if let Some(dir) = &cli.out_dir {
        config.paths.output_dir = dir.to_string_lossy().into_owned();
    }

    match cli.command {
        Command::Extract {
            replay,
            fresh,
            max_events,
            max_participants,
        } => {
            if fresh {
                config.extract.resume = false;
            }
            if let Some(n) = max_events {
                config.extract.max_events = n;
            }
            if let Some(n) = max_participants {
                config.extract.max_participants = n;
            }
            config.validate()?;

            let stop = install_stop_flag();
            let outcome = match replay {
                Some(path) => {
                    let source = ReplaySource::from_path(&path)?;
                    pipeline::run_extract(&config, source, stop).await?
                }
                None => extract_html(&config, stop).await?,
            };

            log::info!(
                "Wrote {} participant rows to {}",
                outcome.participants_written,
                outcome.participants_sink.display()
            );
            if outcome.stopped {
                log::info!("Run interrupted; re-run to resume.");
            }
        }

        Command::Merge {
            primary,
            secondary,
            output,
        } => {
            config.validate()?;
            let defaults = MergeOptions::from_config(&config);
            let options = MergeOptions {
                primary: primary.unwrap_or(defaults.primary),
                secondary,
                output: output.unwrap_or(defaults.output),
            };
            let report = pipeline::run_merge(&config, &options)?;
            log::info!(
                "Final document: {} records at {}",
                report.output_records,
                report.output.display()
            );
        }

        Command::Checkpoint { action } => {
            let mut checkpoint = Checkpoint::open(config.paths.checkpoint_path(), true);
            match action {
                CheckpointAction::Show => {
                    let summary = checkpoint.summary();
                    log::info!("Checkpoint: {}", checkpoint.path().display());
                    log::info!("    Completed events: {}", summary.completed);
                    log::info!("    In-progress events: {}", summary.in_progress);
                    for (event_id, next) in &checkpoint.state().in_progress {
                        log::info!("        {} (next participant: {})", event_id, next);
                    }
                    log::info!("    Recorded failures: {}", summary.failures);
                    if let Some(updated) = checkpoint.state().updated_at {
                        log::info!("    Last updated: {}", updated);
                    }
                }
                CheckpointAction::Clear => {
                    checkpoint.clear()?;
                    log::info!("Checkpoint cleared: {}", checkpoint.path().display());
                }
            }
        }

        Command::Classify { rounds, federation } => {
            let classifier = Classifier::new(&config.classifier)?;
            let c = classifier.classify(&rounds, &federation);
            let [grade, category, extra] = c.as_strings();
            println!("grade: {grade}");
            println!("category: {category}");
            println!("extra_category: {extra}");
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            harvester::services::Normalizer::new(&config.normalizer, config.extract.max_slots)?;
            Classifier::new(&config.classifier)?;
            log::info!("✓ Config OK (synonym tables and classification rules compile)");
        }
    }

    Ok(())
}

#[cfg(feature = "html")]
async fn extract_html(
    config: &Config,
    stop: Arc<AtomicBool>,
) -> Result<pipeline::ExtractOutcome> {
    let timeout = std::time::Duration::from_secs(config.extract.fetch_timeout_secs);
    let source = harvester::services::HtmlPageSource::new(&config.source, timeout)?;
    pipeline::run_extract(config, source, stop).await
}

#[cfg(not(feature = "html"))]
async fn extract_html(
    _config: &Config,
    _stop: Arc<AtomicBool>,
) -> Result<pipeline::ExtractOutcome> {
    Err(harvester::error::AppError::config(
        "built without the `html` feature; use --replay <capture.json>",
    ))
}
