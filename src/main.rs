//! # Career Scout CLI (`scout`)
//!
//! The `scout` binary serves the chat API, ingests the corpus, and answers
//! one-off questions from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! scout --config ./config/scout.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scout serve` | Start the HTTP server; initialization runs in the background |
//! | `scout ingest` | Load, split, tag, and index the corpus |
//! | `scout ask "<question>"` | Answer one question and print its sources |
//! | `scout status` | Show whether an index exists and how many chunks it holds |
//! | `scout config` | Print the active chunking, retrieval, and temperature constants |
//!
//! Diagnostics go to stderr through `tracing` (filter with `RUST_LOG`);
//! command results go to stdout.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use career_scout::chat;
use career_scout::config::{self, Config};
use career_scout::context::{spawn_initialization, AppContext, Core};
use career_scout::ingest::ingest;
use career_scout::store::index_file_presence;
use career_scout::store::sqlite::count_indexed;
use career_scout::workers::WorkerPool;

/// Career Scout: answers questions about one person's career from a
/// curated document corpus.
#[derive(Parser)]
#[command(
    name = "scout",
    about = "Career Scout: retrieval-augmented Q&A over a curated career corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/scout.toml`. See `config/scout.example.toml`.
    #[arg(long, global = true, default_value = "./config/scout.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` immediately; core bring-up and the document
    /// check run in the background and are reported by `/api/init-status`.
    Serve,

    /// Ingest the corpus into the index.
    ///
    /// Ingestion only adds. Refuses to run against an existing index unless
    /// `--append` is given.
    Ingest {
        /// Add to an existing index instead of refusing.
        #[arg(long)]
        append: bool,

        /// Corpus directory; overrides `[corpus].root`.
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Answer a single question.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Show index status.
    Status,

    /// Print the active tuning constants as JSON.
    Config,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            career_scout::server::run_server(cfg).await?;
        }
        Commands::Ingest { append, root } => {
            run_ingest(cfg, append, root).await?;
        }
        Commands::Ask { question } => {
            run_ask(cfg, &question).await?;
        }
        Commands::Status => {
            run_status(&cfg).await?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&cfg.introspect())?);
        }
    }

    Ok(())
}

async fn run_ingest(cfg: Config, append: bool, root: Option<PathBuf>) -> anyhow::Result<()> {
    let index_file = cfg.store.index_file();
    if index_file_presence(&index_file).exists && !append {
        bail!(
            "An index already exists at {}. Ingestion only adds chunks; re-run with --append to add to it anyway.",
            index_file.display()
        );
    }
    let root = root.unwrap_or_else(|| cfg.corpus.root.clone());

    let cfg = Arc::new(cfg);
    let bring_up_cfg = cfg.clone();
    let core = tokio::task::spawn_blocking(move || Core::bring_up(&bring_up_cfg))
        .await
        .context("core bring-up panicked")??;

    let workers = WorkerPool::new(&cfg.workers);
    let report = ingest(core.store.clone(), &workers, &cfg, &root).await?;

    println!("ingest {}", root.display());
    println!("  documents: {}", report.documents);
    println!("  chunks written: {}", report.chunks);
    println!("  batches: {}", report.batches);
    if !report.failed_formats.is_empty() {
        let failed: Vec<&str> = report.failed_formats.iter().map(|f| f.label()).collect();
        println!("  skipped formats: {}", failed.join(", "));
    }
    println!("ok");
    Ok(())
}

async fn run_ask(cfg: Config, question: &str) -> anyhow::Result<()> {
    let ctx = Arc::new(AppContext::new(cfg));
    let bring_up_cfg = ctx.config.clone();
    spawn_initialization(
        ctx.clone(),
        move || Core::bring_up(&bring_up_cfg),
        CancellationToken::new(),
    )
    .await
    .context("initialization task panicked")?;

    let reply = chat::answer(&ctx, "cli", question).await?;
    println!("{}", reply.answer);
    if !reply.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &reply.sources {
            println!("  - {}", source);
        }
    }
    Ok(())
}

async fn run_status(cfg: &Config) -> anyhow::Result<()> {
    let index_file = cfg.store.index_file();
    let presence = index_file_presence(&index_file);

    println!("index: {}", index_file.display());
    if !presence.exists {
        println!("  status: empty");
        println!("  run `scout ingest` to build it");
        return Ok(());
    }
    let count = count_indexed(&index_file, &cfg.store.collection).await?;
    println!("  status: present");
    println!("  collection: {}", cfg.store.collection);
    println!("  chunks: {}", count);
    Ok(())
}
