//! # Triage Engine CLI (`triage`)
//!
//! The `triage` binary is the operational interface for the triage
//! engine: database initialization, document ingestion, search, log
//! analysis, and repository sync.
//!
//! ## Usage
//!
//! ```bash
//! triage --config ./config/triage.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `triage init` | Create the SQLite database and run schema migrations |
//! | `triage add` | Add a knowledge document from a file |
//! | `triage update <id>` | Patch an existing document |
//! | `triage delete <id>` | Soft-delete a document |
//! | `triage search "<query>"` | Search the knowledge base |
//! | `triage analyze <log>` | Analyze a log file and print remediation actions |
//! | `triage sync <name>` | Sync a configured repository into the store |
//! | `triage repos` | List repository sync records |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use triage_engine::config::{self, Config};
use triage_engine::embedding::{create_embedder, Embedder};
use triage_engine::ingest::{self, DocumentInput, DocumentPatch};
use triage_engine::llm;
use triage_engine::models::DocType;
use triage_engine::orchestrator;
use triage_engine::repo_sync::{self, GitHubContentsApi};
use triage_engine::search;
use triage_engine::store::sqlite::{self, SqliteStore};
use triage_engine::store::Store;

/// Triage Engine CLI — knowledge retrieval and exception-driven
/// remediation synthesis for incident support.
#[derive(Parser)]
#[command(
    name = "triage",
    about = "Triage Engine — knowledge retrieval and remediation synthesis for incident support",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/triage.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent.
    Init,

    /// Add a knowledge document from a file.
    Add {
        /// Path to the file whose content becomes the document body.
        file: PathBuf,

        /// Document title. Defaults to the file name.
        #[arg(long)]
        title: Option<String>,

        /// Document type: documentation, runbook, troubleshooting, code,
        /// config, readme, other.
        #[arg(long = "type", default_value = "documentation")]
        doc_type: String,

        /// Comma-separated tags.
        #[arg(long, default_value = "")]
        tags: String,
    },

    /// Patch an existing document. Unset flags leave fields unchanged.
    Update {
        /// Document id.
        id: String,

        /// New title.
        #[arg(long)]
        title: Option<String>,

        /// File whose content replaces the document body.
        #[arg(long)]
        file: Option<PathBuf>,

        /// New document type.
        #[arg(long = "type")]
        doc_type: Option<String>,

        /// New comma-separated tags.
        #[arg(long)]
        tags: Option<String>,
    },

    /// Soft-delete a document and remove its chunks.
    Delete {
        /// Document id.
        id: String,
    },

    /// Search the knowledge base.
    ///
    /// Uses similarity search when an embedding provider is configured,
    /// with a transparent lexical fallback otherwise.
    Search {
        /// The search query string.
        query: String,

        /// Incident id to record surfaced matches against.
        #[arg(long)]
        incident: Option<String>,

        /// Maximum number of results per category.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Analyze a log file and print the resulting remediation actions.
    Analyze {
        /// Path to the log file.
        file: PathBuf,

        /// One-line incident summary for the analysis prompt.
        #[arg(long, default_value = "")]
        summary: String,

        /// Incident id to record retrieval against.
        #[arg(long)]
        incident: Option<String>,
    },

    /// Sync a configured repository's content into the document store.
    Sync {
        /// Repository name as configured under `[repositories.<name>]`.
        name: String,
    },

    /// List repository sync records and their states.
    Repos,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = sqlite::connect(&cfg.db.path).await?;
            sqlite::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Add {
            file,
            title,
            doc_type,
            tags,
        } => {
            let store = open_store(&cfg).await?;
            let embedder = embedder_for(&cfg);
            let content = std::fs::read_to_string(&file)?;
            let title = title.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "untitled".to_string())
            });
            let doc = ingest::add_document(
                store,
                embedder.as_ref(),
                cfg.chunking.max_chunk_chars,
                DocumentInput {
                    title,
                    content,
                    doc_type: parse_doc_type(&doc_type)?,
                    file_path: Some(file.to_string_lossy().into_owned()),
                    repository: None,
                    tags: parse_tags(&tags),
                },
            )
            .await?;
            println!("Added document {} ({})", doc.id, doc.title);
        }
        Commands::Update {
            id,
            title,
            file,
            doc_type,
            tags,
        } => {
            let store = open_store(&cfg).await?;
            let embedder = embedder_for(&cfg);
            let content = match file {
                Some(path) => Some(std::fs::read_to_string(path)?),
                None => None,
            };
            let doc_type = match doc_type {
                Some(s) => Some(parse_doc_type(&s)?),
                None => None,
            };
            let doc = ingest::update_document(
                store,
                embedder.as_ref(),
                cfg.chunking.max_chunk_chars,
                &id,
                DocumentPatch {
                    title,
                    content,
                    doc_type,
                    tags: tags.map(|t| parse_tags(&t)),
                },
            )
            .await?;
            println!("Updated document {} ({})", doc.id, doc.title);
        }
        Commands::Delete { id } => {
            let store = open_store(&cfg).await?;
            ingest::delete_document(store, &id).await?;
            println!("Deleted document {}", id);
        }
        Commands::Search {
            query,
            incident,
            limit,
        } => {
            let store = open_store(&cfg).await?;
            let embedder = embedder_for(&cfg);
            let response = search::search(
                store,
                embedder.as_ref(),
                &cfg.retrieval,
                &query,
                incident.as_deref(),
                limit,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Analyze {
            file,
            summary,
            incident,
        } => {
            let store = open_store(&cfg).await?;
            let embedder = embedder_for(&cfg);
            let providers = llm::create_providers(&cfg.llm);
            let log_text = std::fs::read_to_string(&file)?;
            let result = orchestrator::analyze_log(
                store,
                embedder.as_ref(),
                &cfg.retrieval,
                &providers,
                &log_text,
                &summary,
                incident.as_deref(),
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Sync { name } => {
            let Some(repo_cfg) = cfg.repositories.get(&name) else {
                anyhow::bail!("no repository named '{}' in config", name);
            };
            let store = open_store(&cfg).await?;
            let embedder = embedder_for(&cfg);
            let api = GitHubContentsApi::new(repo_cfg).map_err(|e| anyhow::anyhow!("{}", e))?;
            let state = repo_sync::sync_repository(
                store,
                embedder.as_ref(),
                cfg.chunking.max_chunk_chars,
                &name,
                repo_cfg,
                &api,
            )
            .await?;
            println!("Sync of '{}' finished: {}", name, state.as_str());
        }
        Commands::Repos => {
            let store = open_store(&cfg).await?;
            let records = store.list_repositories().await?;
            if records.is_empty() {
                println!("No repositories synced yet.");
            }
            for r in records {
                let message = r.message.as_deref().unwrap_or("-");
                println!(
                    "{}  {}/{}@{}  {}  {}",
                    r.name,
                    r.owner,
                    r.repo,
                    r.branch,
                    r.state.as_str(),
                    message
                );
            }
        }
    }

    Ok(())
}

async fn open_store(cfg: &Config) -> Result<Arc<dyn Store>> {
    let pool = sqlite::connect(&cfg.db.path).await?;
    sqlite::run_migrations(&pool).await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

/// Configured embedder, degrading to the disabled provider (lexical
/// search only) when construction fails.
fn embedder_for(cfg: &Config) -> Box<dyn Embedder> {
    match create_embedder(&cfg.embedding) {
        Ok(embedder) => embedder,
        Err(e) => {
            tracing::warn!(error = %e, "embedding provider unavailable, using lexical search");
            Box::new(triage_engine::embedding::DisabledEmbedder)
        }
    }
}

fn parse_doc_type(s: &str) -> Result<DocType> {
    DocType::parse(s).ok_or_else(|| {
        anyhow::anyhow!(
            "unknown document type '{}'. Expected documentation, runbook, troubleshooting, code, config, readme, or other",
            s
        )
    })
}

fn parse_tags(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
