//! # Scripture Search CLI (`ssearch`)
//!
//! ## Usage
//!
//! ```bash
//! ssearch --config ./config/ssearch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ssearch init` | Create the SQLite database and schema |
//! | `ssearch ingest scriptures` | Load one volume of verses from the data directory |
//! | `ssearch ingest lessons` | Load one year of Come, Follow Me lessons |
//! | `ssearch ingest conference` | Fetch and load one conference (or `--all`) |
//! | `ssearch embed <corpus>` | Build context windows and embeddings for pending records |
//! | `ssearch stats` | Per-partition counts and embedding coverage |
//! | `ssearch export conference` | Dump one conference as JSON |
//!
//! A partition that already has records is skipped unless `--force` is
//! given, in which case it is deleted and reloaded.

use anyhow::Result;
use clap::{ArgAction, ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use scripture_search::models::{ConferenceMonth, Corpus, Lang, Testament, Volume};
use scripture_search::progress::ProgressMode;
use scripture_search::{config, enrich, export, ingest, migrate, stats};

/// Scripture Search: ingest scripture, lessons and conference talks for
/// semantic search.
#[derive(Parser)]
#[command(name = "ssearch", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ssearch.toml")]
    config: PathBuf,

    /// More log output (`-v` info, `-vv` debug). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Load one partition of content.
    Ingest {
        #[command(subcommand)]
        target: IngestTarget,
    },

    /// Generate context text and embeddings for records that have none.
    Embed {
        corpus: Corpus,

        #[arg(long)]
        lang: Lang,

        /// Maximum number of records to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Override `embedding.batch_size`.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Only report how many records are pending.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show record counts per partition.
    Stats,

    /// Export stored content as JSON.
    Export {
        #[command(subcommand)]
        target: ExportTarget,
    },
}

#[derive(Subcommand)]
enum IngestTarget {
    /// Verses of one scripture volume.
    Scriptures {
        #[arg(long)]
        volume: Volume,

        #[arg(long)]
        lang: Lang,

        /// Delete and reload an existing partition.
        #[arg(long)]
        force: bool,

        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Come, Follow Me lessons for one year.
    Lessons {
        #[arg(long)]
        year: i32,

        #[arg(long)]
        lang: Lang,

        /// Defaults to the testament studied in `year`.
        #[arg(long)]
        testament: Option<Testament>,

        #[arg(long)]
        force: bool,

        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// General conference talks, one session or the full range.
    #[command(group(ArgGroup::new("session").required(true).args(["year", "all"])))]
    Conference {
        #[arg(long, requires = "month")]
        year: Option<i32>,

        #[arg(long, requires = "year")]
        month: Option<ConferenceMonth>,

        /// Every conference from `ingest.first_conference_year` through
        /// `ingest.latest_conference`.
        #[arg(long, conflicts_with_all = ["year", "month"])]
        all: bool,

        #[arg(long)]
        lang: Lang,

        #[arg(long)]
        force: bool,

        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },
}

#[derive(Subcommand)]
enum ExportTarget {
    /// One conference session, grouped by talk.
    Conference {
        #[arg(long)]
        year: i32,

        #[arg(long)]
        month: ConferenceMonth,

        #[arg(long)]
        lang: Lang,

        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("init");
            println!("  database: {}", cfg.db.path.display());
            println!("ok");
        }
        Commands::Ingest { target } => match target {
            IngestTarget::Scriptures {
                volume,
                lang,
                force,
                progress,
            } => {
                let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
                ingest::run_ingest_scriptures(&cfg, volume, lang, force, mode).await?;
            }
            IngestTarget::Lessons {
                year,
                lang,
                testament,
                force,
                progress,
            } => {
                let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
                ingest::run_ingest_lessons(&cfg, year, testament, lang, force, mode).await?;
            }
            IngestTarget::Conference {
                year,
                month,
                all,
                lang,
                force,
                progress,
            } => {
                let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
                let conference = match (year, month) {
                    (Some(y), Some(m)) if !all => Some((y, m)),
                    _ => None,
                };
                ingest::run_ingest_conference(&cfg, conference, lang, force, mode).await?;
            }
        },
        Commands::Embed {
            corpus,
            lang,
            limit,
            batch_size,
            dry_run,
        } => {
            enrich::run_embed(&cfg, corpus, lang, limit, batch_size, dry_run).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Export { target } => match target {
            ExportTarget::Conference {
                year,
                month,
                lang,
                output,
            } => {
                export::run_export_conference(&cfg, year, month, lang, output.as_deref()).await?;
            }
        },
    }

    Ok(())
}
