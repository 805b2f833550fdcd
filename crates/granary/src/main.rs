//! granary - back up and query a local Granola meeting cache

mod cli;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use granary_core::{DateRange, GranaryConfig, MeetingStore, PatternKind, RefreshOutcome};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "granary",
    version,
    about = "Back up and query a local Granola meeting cache",
    long_about = "Reads the meeting app's local cache (read-only), keeps a merged backup that\n\
                  survives the app's cache eviction, and answers queries over it.\n\
                  \n\
                  Examples:\n\
                    granary search \"roadmap\"              # Search titles, people, transcripts\n\
                    granary transcript <id>               # Print a transcript\n\
                    granary patterns topics --start 2026-01-01\n\
                    granary backup                        # Merge the cache into the backup now\n\
                    granary watch --interval 60           # Keep the backup current\n\
                  \n\
                  Environment Variables:\n\
                    GRANARY_CACHE_PATH                    # Source cache file\n\
                    GRANARY_BACKUP_DIR                    # Backup and snapshot directory\n\
                    GRANARY_MAX_SNAPSHOTS                 # Snapshots to retain\n\
                    GRANARY_LOG                           # Log filter (default: warn)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Source cache file (default: ~/Library/Application Support/Granola/cache-v3.json)
    #[arg(long, env = "GRANARY_CACHE_PATH", global = true)]
    cache_path: Option<PathBuf>,

    /// Backup directory (default: <data dir>/granary)
    #[arg(long, env = "GRANARY_BACKUP_DIR", global = true)]
    backup_dir: Option<PathBuf>,

    /// Number of snapshots to keep
    #[arg(long, env = "GRANARY_MAX_SNAPSHOTS", default_value_t = 10, global = true)]
    max_snapshots: usize,

    /// Log filter directive, overridden by RUST_LOG
    #[arg(long, env = "GRANARY_LOG", default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Search meetings by title, participants and transcript
    Search {
        query: String,
        /// Max results (1-50)
        #[arg(long, short = 'n', default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show meeting details
    Meeting {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Print a meeting transcript
    Transcript {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Print meeting notes (AI summary preferred)
    Notes {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Analyze patterns across meetings
    Patterns {
        #[arg(value_enum)]
        kind: PatternArg,
        /// Inclusive start date (YYYY-MM-DD, local time)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Inclusive end date (YYYY-MM-DD, local time)
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Rows to show for ranked patterns
        #[arg(long)]
        top: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Merge the source cache into the backup now
    Backup {
        #[arg(long)]
        json: bool,
    },
    /// List retained snapshots
    Snapshots {
        #[arg(long)]
        json: bool,
    },
    /// Poll the source cache and keep the backup current
    Watch {
        /// Poll interval in seconds
        #[arg(long, default_value = "30")]
        interval: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PatternArg {
    Participants,
    Frequency,
    Topics,
}

impl PatternArg {
    fn kind(self) -> PatternKind {
        match self {
            PatternArg::Participants => PatternKind::Participants,
            PatternArg::Frequency => PatternKind::Frequency,
            PatternArg::Topics => PatternKind::Topics,
        }
    }

    fn default_top(self) -> usize {
        match self {
            PatternArg::Participants => 10,
            PatternArg::Frequency => usize::MAX,
            PatternArg::Topics => 15,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = GranaryConfig::new(cli.cache_path, cli.backup_dir)
        .with_max_snapshots(cli.max_snapshots);
    debug!(
        cache = %config.cache_path.display(),
        backup = %config.backup_dir.display(),
        "Resolved configuration"
    );

    let store = MeetingStore::open(config)
        .await
        .context("Failed to open meeting backup")?;

    match cli.command {
        Command::Search { query, limit, json } => {
            let outcome = store.search(&query, limit).await;
            let has_data = !store.current().store.is_empty();
            println!("{}", cli::format_search(&query, &outcome, has_data, json, &Local));
        }
        Command::Meeting { id, json } => {
            let lookup = store.get_meeting(&id).await;
            println!("{}", cli::format_meeting(&id, &lookup, json, &Local));
        }
        Command::Transcript { id, json } => {
            let lookup = store.get_transcript(&id).await;
            println!("{}", cli::format_transcript(&id, &lookup, json));
        }
        Command::Notes { id, json } => {
            let lookup = store.get_notes(&id).await;
            println!("{}", cli::format_notes(&id, &lookup, json, &Local));
        }
        Command::Patterns {
            kind,
            start,
            end,
            top,
            json,
        } => {
            let range = DateRange::new(start, end);
            let outcome = store.analyze_patterns(kind.kind(), range, Local).await;
            let has_data = !store.current().store.is_empty();
            let top = top.unwrap_or_else(|| kind.default_top());
            println!("{}", cli::format_patterns(&outcome, has_data, top, json));
        }
        Command::Backup { json } => {
            let outcome = store.force_refresh().await;
            let meetings = store.current().store.meeting_count();
            println!(
                "{}",
                cli::format_refresh(&outcome, meetings, &store.config().cache_path, json)
            );
            if let RefreshOutcome::Failed(reason) = outcome {
                bail!("backup failed: {reason}");
            }
        }
        Command::Snapshots { json } => {
            println!("{}", cli::format_snapshots(&store.list_snapshots(), json));
        }
        Command::Watch { interval } => {
            run_watch(&store, Duration::from_secs(interval.max(1))).await?;
        }
    }

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("Invalid log filter '{level}'"))?,
    };

    // stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn run_watch(store: &MeetingStore, interval: Duration) -> Result<()> {
    let mut events = store.event_bus().subscribe();
    let mut ticker = tokio::time::interval(interval);

    info!(
        source = %store.config().cache_path.display(),
        interval_secs = interval.as_secs(),
        "Watching source cache"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                store.refresh().await;
                loop {
                    match events.try_recv() {
                        Ok(event) => println!("{}", cli::format_event(&event)),
                        Err(TryRecvError::Lagged(missed)) => {
                            debug!(missed, "Dropped store events");
                        }
                        Err(_) => break,
                    }
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                info!("Stopping watch");
                break;
            }
        }
    }

    Ok(())
}
