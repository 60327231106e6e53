use std::path::PathBuf;

use anyhow::{bail, Context};
use axum::Router;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use mortgage_chat::core::config::{ConfigService, Settings};
use mortgage_chat::core::logging;
use mortgage_chat::db::{import_data, Database};
use mortgage_chat::llm::embeddings;
use mortgage_chat::rag::ingest::{DEFAULT_PROBE_K, DEFAULT_PROBE_QUERIES};
use mortgage_chat::rag::{build_vector_store, probe_vector_store, SqliteVectorStore};
use mortgage_chat::server;
use mortgage_chat::state::AppState;

#[derive(Parser)]
#[command(name = "mortgage-chat", version, about = "Mortgage guideline chatbot service")]
struct Cli {
    /// YAML config file (defaults to $MORTGAGE_CONFIG_PATH or ./config.yml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply migrations and start the HTTP server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Apply database migrations
    Migrate,
    /// Import lenders, programs, rules and guidelines from a JSON export
    Import {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Rebuild the document vector store from the PDF directory
    Ingest {
        #[arg(long)]
        pdf_dir: Option<PathBuf>,
    },
    /// Print vector store diagnostics
    Probe {
        #[arg(long = "query")]
        queries: Vec<String>,
        #[arg(long, default_value_t = DEFAULT_PROBE_K)]
        k: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => ConfigService::new(path),
        None => ConfigService::from_env(),
    };
    let mut settings = config
        .load()
        .with_context(|| format!("Failed to load configuration ({})", config.config_path().display()))?;
    logging::init(&settings.logging);
    tracing::debug!("Effective configuration: {}", ConfigService::redacted(&settings));

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            serve(settings).await
        }
        Command::Migrate => {
            let db = open_database(&settings).await?;
            db.migrate().await.context("Failed to apply migrations")?;
            println!("Migrations applied.");
            Ok(())
        }
        Command::Import { file } => {
            let path = file.unwrap_or_else(|| settings.ingest.data_file.clone());
            let db = open_database(&settings).await?;
            db.migrate().await.context("Failed to apply migrations")?;
            let report = import_data(&db, &path)
                .await
                .with_context(|| format!("Import of {} failed", path.display()))?;
            println!("{}", report);
            Ok(())
        }
        Command::Ingest { pdf_dir } => {
            if let Some(dir) = pdf_dir {
                settings.ingest.pdf_dir = dir;
            }
            let embedder = embeddings::from_settings(&settings.embeddings)
                .context("Failed to create embedding client")?;
            let report = build_vector_store(
                &settings.ingest,
                &settings.vector_store,
                embedder.as_ref(),
                settings.embeddings.batch_size,
            )
            .await?;
            println!("{}", report);
            Ok(())
        }
        Command::Probe { queries, k } => {
            let queries = if queries.is_empty() {
                DEFAULT_PROBE_QUERIES.iter().map(|q| q.to_string()).collect()
            } else {
                queries
            };
            let embedder = embeddings::from_settings(&settings.embeddings)
                .context("Failed to create embedding client")?;
            let store = SqliteVectorStore::open(settings.vector_store.db_path())
                .await
                .context("Failed to open vector store")?;
            let report = probe_vector_store(
                &store,
                embedder.as_ref(),
                &settings.vector_store.collection_name,
                &queries,
                k,
            )
            .await?;
            println!("{}", report);
            Ok(())
        }
    }
}

async fn open_database(settings: &Settings) -> anyhow::Result<Database> {
    Database::connect(&settings.database_url)
        .await
        .context("Failed to connect to database")
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    let has_key = settings
        .llm
        .groq_api_key
        .as_deref()
        .is_some_and(|key| !key.trim().is_empty());
    if !has_key {
        bail!("GROQ_API_KEY is required");
    }

    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);
    let state = AppState::initialize(settings).await?;

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);
    if !state.documents_available {
        tracing::warn!("Document search is disabled; run `mortgage-chat ingest` to build the vector store");
    }

    let app: Router = server::router::router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
