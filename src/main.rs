//! # Agent KB CLI (`akb`)
//!
//! The `akb` binary is the primary interface for the knowledge base. It
//! provides commands for database initialization, document import, agent
//! management, retrieval queries, re-embedding, and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! akb --config ./config/akb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `akb init` | Create the SQLite database and run schema migrations |
//! | `akb import <path>` | Import a file or directory of `.md`/`.txt` files |
//! | `akb agent create <name> --doc <id>` | Create or update an agent's document set |
//! | `akb agent list` | List agents |
//! | `akb retrieve <agent> "<query>"` | Run a scoped retrieval query |
//! | `akb embed rebuild` | Re-embed all chunks with the configured provider |
//! | `akb serve` | Start the HTTP API server |

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use agent_kb::config;
use agent_kb::embedding;
use agent_kb::store::sqlite::SqliteStore;
use agent_kb::{agents, db, import, migrate, retrieve, server};

/// Agent KB CLI — import, embed, and retrieve document context for agents.
#[derive(Parser)]
#[command(
    name = "akb",
    about = "Agent KB — knowledge-base import, embedding, and scoped retrieval",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/akb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, chunks, agents). Idempotent.
    Init,

    /// Import a document file, or every `.md`/`.txt` file under a directory.
    ///
    /// Each file is split into chunks, embedded with the configured
    /// provider, and stored. Re-importing unchanged content is a no-op;
    /// changed content replaces the document's chunks.
    Import {
        /// File or directory to import.
        path: PathBuf,

        /// Document title (single-file imports only; defaults to the
        /// file stem).
        #[arg(long)]
        title: Option<String>,
    },

    /// Manage agents and their document scopes.
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },

    /// Run a retrieval query scoped to an agent's documents.
    Retrieve {
        /// Agent name or id.
        agent: String,

        /// The query text.
        query: String,

        /// Maximum number of chunks to return (defaults to retrieval.top_k).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Start the HTTP API server.
    Serve,
}

#[derive(Subcommand)]
enum AgentAction {
    /// Create an agent, or replace an existing agent's document set.
    Create {
        /// Agent name.
        name: String,

        /// Document id the agent may retrieve from (repeatable).
        #[arg(long = "doc")]
        docs: Vec<String>,
    },
    /// List all agents with their document sets.
    List,
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Delete and regenerate all embeddings.
    ///
    /// Useful when switching embedding models or dimensions.
    Rebuild {
        /// Override the batch size from config.
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let pool = db::connect(&cfg).await?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { path, title } => {
            let store = Arc::new(SqliteStore::new(pool.clone()));
            let provider: Arc<dyn embedding::EmbeddingProvider> =
                embedding::create_provider(&cfg.embedding)?.into();
            let importer = import::Importer::new(store, provider, cfg.chunking.max_tokens);
            import::run_import(&importer, &path, title.as_deref()).await?;
        }
        Commands::Agent { action } => {
            let store = SqliteStore::new(pool.clone());
            match action {
                AgentAction::Create { name, docs } => {
                    agents::run_agent_create(&store, &name, docs).await?;
                }
                AgentAction::List => {
                    agents::run_agent_list(&store).await?;
                }
            }
        }
        Commands::Retrieve {
            agent,
            query,
            top_k,
        } => {
            let store = Arc::new(SqliteStore::new(pool.clone()));
            let provider: Arc<dyn embedding::EmbeddingProvider> =
                embedding::create_provider(&cfg.embedding)?.into();
            let retriever = retrieve::Retriever::new(store, provider, cfg.retrieval.top_k);
            retrieve::run_retrieve(&retriever, &agent, &query, top_k).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Rebuild { batch_size } => {
                let store = SqliteStore::new(pool.clone());
                let provider = embedding::create_provider(&cfg.embedding)?;
                let batch = batch_size.unwrap_or(cfg.embedding.batch_size);
                import::run_reembed(&store, provider.as_ref(), batch).await?;
            }
        },
        Commands::Serve => {
            let store = Arc::new(SqliteStore::new(pool.clone()));
            let provider: Arc<dyn embedding::EmbeddingProvider> =
                embedding::create_provider(&cfg.embedding)?.into();
            server::run_server(&cfg, store, provider).await?;
        }
    }

    pool.close().await;
    Ok(())
}
