//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest crawl engine.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use sumi_harvest::config::{load_or_default, Config};
use sumi_harvest::embedding::HashingEmbedder;
use sumi_harvest::output::{print_corpus_stats, print_job_summary};
use sumi_harvest::storage::{open_storage, Storage};
use sumi_harvest::Scheduler;
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: a polite, bounded crawl engine
///
/// Sumi-Harvest crawls a bounded set of pages from seed URLs while respecting
/// robots.txt and conditional-request etiquette, and stores page content and
/// embeddings in a SQLite corpus.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A polite, bounded crawl engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP control surface
    Serve {
        /// Override the configured listen address
        #[arg(long, value_name = "ADDR")]
        listen: Option<SocketAddr>,
    },

    /// Run one crawl job in the foreground and print its summary
    Crawl {
        /// Seed URL (repeatable)
        #[arg(long = "seed", value_name = "URL", required = true)]
        seeds: Vec<String>,

        /// Page budget (defaults to the configured default)
        #[arg(long)]
        max_pages: Option<usize>,

        /// Store metadata only, no content or embeddings
        #[arg(long)]
        dry_run: bool,
    },

    /// Show corpus statistics from the database and exit
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = match load_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    if let Some(path) = &cli.config {
        tracing::info!("Configuration loaded from {}", path.display());
    }

    match cli.command {
        Command::Serve { listen } => handle_serve(config, listen).await,
        Command::Crawl {
            seeds,
            max_pages,
            dry_run,
        } => handle_crawl(config, seeds, max_pages, dry_run).await,
        Command::Stats => handle_stats(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,tower_http=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn build_scheduler(config: &Config) -> Result<Arc<Scheduler>> {
    let embedder = Arc::new(HashingEmbedder::new(config.embeddings.dimensions));
    let scheduler = Scheduler::open(config, embedder)
        .with_context(|| format!("failed to open {}", config.storage.database_path))?;
    Ok(Arc::new(scheduler))
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// Handles `serve`: runs the control surface until a shutdown signal
async fn handle_serve(config: Config, listen: Option<SocketAddr>) -> Result<()> {
    let addr = match listen {
        Some(addr) => addr,
        None => config
            .server
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address {}", config.server.listen_addr))?,
    };

    let scheduler = build_scheduler(&config)?;
    sumi_harvest::server::serve(addr, Arc::clone(&scheduler), shutdown_signal())
        .await
        .with_context(|| format!("server on {} failed", addr))?;

    scheduler.shutdown()?;
    Ok(())
}

/// Handles `crawl`: runs one job, flushing buffers if interrupted
async fn handle_crawl(
    config: Config,
    seeds: Vec<String>,
    max_pages: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    let scheduler = build_scheduler(&config)?;
    let job = scheduler.create_job(&seeds, max_pages, dry_run)?;
    tracing::info!("Starting job {} with {} seed(s)", job.id(), job.seeds().len());

    tokio::select! {
        snapshot = scheduler.run_job(Arc::clone(&job)) => {
            print_job_summary(&snapshot);
            Ok(())
        }
        _ = shutdown_signal() => {
            tracing::warn!("Crawl interrupted, flushing buffered records");
            scheduler.shutdown()?;
            print_job_summary(&job.snapshot());
            Ok(())
        }
    }
}

/// Handles `stats`: shows corpus statistics from the database
fn handle_stats(config: &Config) -> Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let store = open_storage(
        std::path::Path::new(&config.storage.database_path),
        config.storage.batch_size,
    )?;
    print_corpus_stats(&store.corpus_stats()?);

    Ok(())
}
