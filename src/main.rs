//! `pgn-ingest` binary.
//!
//! Reads `pgn-ingest.toml` (or the path given with `--config`) plus
//! `PGN_INGEST_*` environment variables, then splits a month archive into
//! shard files, or opens the configured sink and runs either ingestion of
//! archive files or the shard merge.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use pgn_ingest::{merge, split, AppConfig, FileSink, Sink, SqliteSink};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Ingest lichess PGN archives into tables")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "pgn-ingest.toml")]
    config: PathBuf,

    /// Write to this SQLite database (overrides `sqlite_path`).
    #[arg(long, global = true)]
    sqlite: Option<PathBuf>,

    /// Write JSONL/CSV staging files to this directory (overrides `staging_dir`).
    #[arg(long, global = true, conflicts_with = "sqlite")]
    staging_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest archive files named `lichess_db_{variant}_rated_{month}[_{shard}].pgn`.
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Worker threads; defaults to one per CPU.
        #[arg(short, long)]
        threads: Option<usize>,

        /// Skip the header-key pre-scan of each file.
        #[arg(long)]
        no_prescan: bool,
    },
    /// Merge header shard tables into one table per variant and month.
    Merge,
    /// Split a month archive `lichess_db_{variant}_rated_{month}.pgn` into
    /// numbered shard files.
    Split {
        file: PathBuf,

        /// Directory for the shard files; defaults to the archive's directory.
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Games per shard file (overrides `split.games_per_shard`).
        #[arg(short, long)]
        games: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();

    let settings = config::Config::builder()
        .add_source(config::File::from(cli.config.clone()).required(false))
        .add_source(
            config::Environment::with_prefix("PGN_INGEST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("failed to read config file")?;
    let mut app: AppConfig = settings
        .try_deserialize()
        .context("failed to deserialise AppConfig")?;

    if let Some(path) = cli.sqlite {
        app.sqlite_path = Some(path);
        app.staging_dir = None;
    }
    if let Some(dir) = cli.staging_dir {
        app.staging_dir = Some(dir);
        app.sqlite_path = None;
    }

    match cli.command {
        Command::Ingest {
            files,
            threads,
            no_prescan,
        } => {
            let sink = open_sink(&app)?;
            if threads.is_some() {
                app.ingest.threads = threads;
            }
            if no_prescan {
                app.ingest.prescan_headers = false;
            }

            let reports = pgn_ingest::ingest_files(&files, sink.as_ref(), &app.ingest)
                .context("failed to start ingestion")?;

            let mut failed = 0;
            for report in &reports {
                match &report.result {
                    Ok(summary) => println!(
                        "{}: {} games, {} moves, {} invalid",
                        report.path.display(),
                        summary.games,
                        summary.moves,
                        summary.invalid_games
                    ),
                    Err(e) => {
                        failed += 1;
                        eprintln!("{}: failed: {e}", report.path.display());
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} of {} shards failed", reports.len());
            }
        }
        Command::Merge => {
            let sink = open_sink(&app)?;
            let outcomes = merge::merge_all(sink.as_ref()).context("merge failed")?;
            for outcome in &outcomes {
                println!(
                    "{}: {} rows from {} shards",
                    outcome.canonical, outcome.rows, outcome.shards_merged
                );
            }
        }
        Command::Split {
            file,
            out_dir,
            games,
        } => {
            let out_dir = out_dir
                .or_else(|| file.parent().map(PathBuf::from))
                .unwrap_or_default();
            let games = games.unwrap_or(app.split.games_per_shard);
            let report = split::split_file(&file, &out_dir, games)
                .with_context(|| format!("failed to split {}", file.display()))?;
            for shard in &report.shards {
                println!("{}", shard.display());
            }
            println!("{} games in {} shards", report.games, report.shards.len());
        }
    }

    Ok(())
}

fn open_sink(app: &AppConfig) -> anyhow::Result<Arc<dyn Sink>> {
    if let Some(path) = &app.sqlite_path {
        let sink = SqliteSink::open(path)
            .with_context(|| format!("failed to open database at {path:?}"))?;
        return Ok(Arc::new(sink));
    }
    if let Some(dir) = &app.staging_dir {
        let sink = FileSink::open(dir)
            .with_context(|| format!("failed to open staging directory {dir:?}"))?;
        return Ok(Arc::new(sink));
    }
    bail!("no sink configured: set sqlite_path or staging_dir, or pass --sqlite / --staging-dir")
}
