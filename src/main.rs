//! # news-harvest CLI (`nhv`)
//!
//! The `nhv` binary drives the two collection stages and inspects their
//! progress.
//!
//! ## Usage
//!
//! ```bash
//! nhv --config ./config/nhv.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nhv init` | Create the checkpoint database (idempotent) |
//! | `nhv sync links` | Collect article URLs for every catalog entity |
//! | `nhv sync content` | Fetch and extract text for every collected URL |
//! | `nhv sync all` | Run both stages, links first |
//! | `nhv export <stage>` | Rebuild a stage's output artifact from the store |
//! | `nhv status` | Show checkpoint coverage and failure counts |
//!
//! A `sync` run is resumable: every completed item is checkpointed before
//! the next one starts, so re-running after a crash (or after the outer
//! retry budget is exhausted) skips everything already done.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use news_harvest::config::{self, Config};
use news_harvest::export::OutputFormat;
use news_harvest::fetch::{ArticleAdapter, FetchAdapter, NewsSearchAdapter};
use news_harvest::models::Stage;
use news_harvest::pipeline::{self, StageOptions};
use news_harvest::progress::ProgressMode;
use news_harvest::retry::RetrySupervisor;
use news_harvest::{catalog, checkpoint, db, export, stats};

/// news-harvest: a checkpointed, resumable news collection pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file holding the catalog path, checkpoint location, retry budget, and
/// output format.
#[derive(Parser)]
#[command(
    name = "nhv",
    about = "checkpointed, resumable news collection for ranked entity catalogs",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/nhv.toml")]
    config: PathBuf,

    /// Verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create the checkpoint database and its tables.
    ///
    /// Idempotent: running it multiple times is safe, and `sync` runs it
    /// implicitly.
    Init,

    /// Run a collection stage under the outer retry supervisor.
    ///
    /// Stage is `links`, `content`, or `all` (both, links first). Completed
    /// items are skipped; pass `--full` to re-fetch everything.
    Sync {
        /// Stage to run: `links`, `content`, or `all`.
        stage: String,

        /// Ignore checkpoints and re-fetch every catalog item.
        #[arg(long)]
        full: bool,

        /// Maximum number of catalog items to handle this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Progress output on stderr: `off`, `human`, or `json`.
        /// Defaults to `human` when stderr is a TTY, otherwise `off`.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Rebuild a stage's output artifact from the checkpoint store alone.
    ///
    /// No fetching happens; the artifact is always derivable from the store.
    Export {
        /// Stage to export: `links` or `content`.
        stage: String,

        /// Override the configured output format (json, binary, columnar).
        #[arg(long)]
        format: Option<String>,

        /// Override the output file path.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show checkpoint coverage and recorded failures per stage.
    Status,
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn parse_stage(s: &str) -> Result<Stage> {
    match s {
        "links" => Ok(Stage::Links),
        "content" => Ok(Stage::Content),
        other => bail!("unknown stage '{}' (expected links or content)", other),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            run_init(&cfg).await?;
            println!("Checkpoint database initialized.");
        }
        Commands::Sync {
            stage,
            full,
            limit,
            progress,
        } => {
            let options = StageOptions { full, limit };
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            match stage.as_str() {
                "links" => sync_links(&cfg, options, mode).await?,
                "content" => sync_content(&cfg, options, mode).await?,
                "all" => {
                    sync_links(&cfg, options, mode).await?;
                    sync_content(&cfg, options, mode).await?;
                }
                other => bail!("unknown stage '{}' (expected links, content, or all)", other),
            }
        }
        Commands::Export {
            stage,
            format,
            output,
        } => {
            let stage = parse_stage(&stage)?;
            let format = match format {
                Some(f) => Some(f.parse::<OutputFormat>()?),
                None => None,
            };
            export::run_export(&cfg, stage, format, output.as_deref()).await?;
        }
        Commands::Status => {
            stats::run_status(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_init(cfg: &Config) -> Result<()> {
    let pool = db::connect(&cfg.checkpoint.path).await?;
    for stage in [Stage::Links, Stage::Content] {
        checkpoint::CheckpointStore::new(pool.clone(), stage)
            .initialize()
            .await?;
    }
    pool.close().await;
    Ok(())
}

/// Links stage: catalog entities → news-search queries → article URLs.
///
/// Catalog problems abort immediately (retrying cannot fix a bad catalog);
/// everything after that runs under the retry supervisor.
async fn sync_links(cfg: &Config, options: StageOptions, mode: ProgressMode) -> Result<()> {
    let items = catalog::load_links_catalog(cfg)?;
    let adapter = NewsSearchAdapter::new(&cfg.search)?;
    run_supervised(cfg, Stage::Links, &items, &adapter, options, mode).await
}

/// Content stage: collected URLs → extracted article text. The catalog is
/// the links stage's aggregate, read from the checkpoint store.
async fn sync_content(cfg: &Config, options: StageOptions, mode: ProgressMode) -> Result<()> {
    let links = {
        let pool = db::connect(&cfg.checkpoint.path).await?;
        let store = checkpoint::CheckpointStore::new(pool.clone(), Stage::Links);
        store.initialize().await?;
        let links = store.load_all().await?;
        pool.close().await;
        links
    };

    let items = catalog::content_catalog_from(&links);
    if items.is_empty() {
        bail!("no collected links to fetch; run `nhv sync links` first");
    }

    let adapter = ArticleAdapter::new(&cfg.fetch)?;
    run_supervised(cfg, Stage::Content, &items, &adapter, options, mode).await
}

async fn run_supervised(
    cfg: &Config,
    stage: Stage,
    items: &[news_harvest::models::WorkItem],
    adapter: &dyn FetchAdapter,
    options: StageOptions,
    mode: ProgressMode,
) -> Result<()> {
    let reporter_box = mode.reporter();
    let reporter = reporter_box.as_ref();
    let mut supervisor = RetrySupervisor::new(&cfg.run);

    supervisor
        .supervise(|attempt| {
            if attempt > 1 {
                tracing::info!(stage = stage.label(), attempt, "restarting run");
            }
            async move {
                pipeline::run_stage(cfg, stage, items, adapter, reporter, options)
                    .await
                    .map(|_| ())
            }
        })
        .await?;

    Ok(())
}
