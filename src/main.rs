//! # codequery CLI
//!
//! | Command | Description |
//! |---------|-------------|
//! | `codequery init` | Create the SQLite database and run schema migrations |
//! | `codequery serve` | Start the HTTP API server |
//! | `codequery add <name> <url>` | Register a repository and ingest it inline |
//! | `codequery ingest <id>` | Re-run ingestion for a registered repository |
//! | `codequery search <id> "<query>"` | Retrieve the most similar chunks |
//!
//! All commands accept a `--config` flag pointing to a TOML configuration
//! file. See `config/codequery.example.toml` for a full example.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use codequery::acquire::GitAcquirer;
use codequery::config::{load_config, Config};
use codequery::embedding::{create_embedder, Embedder};
use codequery::index::VectorIndex;
use codequery::ingest::{IngestOutcome, Orchestrator};
use codequery::repos::RepoStore;
use codequery::retrieve::retrieve;
use codequery::{db, migrate, server};

/// codequery — chat with a code repository: ingestion, embedding, and
/// retrieval with citations.
#[derive(Parser)]
#[command(
    name = "codequery",
    about = "Chat with a code repository: ingestion, embedding, and retrieval with citations",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/codequery.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Start the HTTP API server.
    Serve,

    /// Register a repository and run one ingestion inline.
    Add {
        /// Display name for the repository.
        name: String,
        /// GitHub URL (https://github.com/... or git@github.com:...).
        github_url: String,
    },

    /// Run ingestion for an already-registered repository.
    Ingest {
        /// Repository id from `add` or the API.
        repository_id: i64,
    },

    /// Retrieve the chunks most similar to a query.
    Search {
        /// Repository id to search within.
        repository_id: i64,
        /// Free-text question.
        query: String,
        /// Maximum number of results.
        #[arg(long)]
        top_k: Option<usize>,
    },
}

struct Services {
    repos: RepoStore,
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    orchestrator: Orchestrator,
}

async fn build_services(config: &Config) -> Result<Services> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let repos = RepoStore::new(pool.clone());
    let embedder = create_embedder(&config.embedding)?;
    let index = VectorIndex::open(pool, embedder.dims()).await?;
    let acquirer = Arc::new(GitAcquirer::new(config.acquisition.scratch_dir.clone()));
    let orchestrator = Orchestrator::new(
        repos.clone(),
        index.clone(),
        embedder.clone(),
        acquirer,
        config.chunking.max_chunk_size,
        config.embedding.batch_size,
    );

    Ok(Services {
        repos,
        index,
        embedder,
        orchestrator,
    })
}

fn print_outcome(outcome: &IngestOutcome) {
    match outcome {
        IngestOutcome::Ready { chunks } => {
            println!("ready ({} chunks indexed)", chunks);
        }
        IngestOutcome::Failed { error } => {
            println!("failed: {}", error);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("database initialized at {}", config.db.path.display());
        }

        Commands::Serve => {
            server::run_server(&config).await?;
        }

        Commands::Add { name, github_url } => {
            let services = build_services(&config).await?;
            let repo = services.repos.create(&name, &github_url).await?;
            println!("registered repository {} ({})", repo.id, repo.github_url);
            let outcome = services.orchestrator.run(repo.id).await;
            print_outcome(&outcome);
        }

        Commands::Ingest { repository_id } => {
            let services = build_services(&config).await?;
            let outcome = services.orchestrator.run(repository_id).await;
            print_outcome(&outcome);
        }

        Commands::Search {
            repository_id,
            query,
            top_k,
        } => {
            let services = build_services(&config).await?;
            let hits = retrieve(
                services.embedder.as_ref(),
                &services.index,
                repository_id,
                &query,
                top_k.unwrap_or(config.retrieval.top_k),
            )
            .await?;

            if hits.is_empty() {
                println!("No results.");
            } else {
                for (i, hit) in hits.iter().enumerate() {
                    println!(
                        "{}. [{:.3}] {}:{}-{}",
                        i + 1,
                        hit.similarity,
                        hit.file_path,
                        hit.start_line,
                        hit.end_line
                    );
                    let excerpt: String = hit.content.lines().take(3).collect::<Vec<_>>().join(" | ");
                    println!("    {}", excerpt);
                    println!();
                }
            }
        }
    }

    Ok(())
}
