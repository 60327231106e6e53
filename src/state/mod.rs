use std::sync::Arc;

use crate::agent::Agent;
use crate::chat::ChatService;
use crate::core::config::Settings;
use crate::db::Database;
use crate::llm::{embeddings, GroqProvider, LlmProvider};
use crate::rag::{SqliteVectorStore, VectorStore};
use crate::tools::{DocumentSearch, Toolbox};

pub mod error;

use error::InitializationError;

/// Shared application state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db: Database,
    pub chat: ChatService,
    pub documents_available: bool,
}

impl AppState {
    /// Connects the database, applies migrations, builds the Groq client and
    /// opens the vector store.
    ///
    /// A vector store that cannot be opened is logged and left out; document
    /// search then answers with an "unavailable" message.
    pub async fn initialize(settings: Settings) -> Result<Arc<Self>, InitializationError> {
        let db = Database::connect(&settings.database_url)
            .await
            .map_err(|e| InitializationError::Database(e.into()))?;
        db.migrate()
            .await
            .map_err(|e| InitializationError::Database(e.into()))?;

        let llm: Arc<dyn LlmProvider> = Arc::new(
            GroqProvider::from_settings(&settings.llm)
                .map_err(|e| InitializationError::Llm(e.into()))?,
        );

        let documents = match open_documents(&settings).await {
            Ok(documents) => Some(documents),
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        };

        Ok(Self::with_providers(settings, db, llm, documents))
    }

    /// Wires the services from already constructed backends.
    pub fn with_providers(
        settings: Settings,
        db: Database,
        llm: Arc<dyn LlmProvider>,
        documents: Option<DocumentSearch>,
    ) -> Arc<Self> {
        let documents_available = documents.is_some();
        let tools = Toolbox::new(
            db.clone(),
            llm.clone(),
            settings.llm.clone(),
            &settings.agent,
            documents,
        );
        let agent = Agent::new(
            llm,
            tools,
            settings.llm.clone(),
            settings.agent.max_iterations,
        );
        let chat = ChatService::new(db.clone(), agent, &settings.agent);

        Arc::new(AppState {
            settings: Arc::new(settings),
            db,
            chat,
            documents_available,
        })
    }
}

async fn open_documents(settings: &Settings) -> Result<DocumentSearch, InitializationError> {
    let embedder = embeddings::from_settings(&settings.embeddings)
        .map_err(|e| InitializationError::VectorStore(e.into()))?;
    let store = SqliteVectorStore::open(settings.vector_store.db_path())
        .await
        .map_err(|e| InitializationError::VectorStore(e.into()))?;

    let collection = &settings.vector_store.collection_name;
    match store.embedding_model(collection).await {
        Ok(Some(model)) if model != embedder.model() => tracing::warn!(
            "Collection {} was indexed with {} but queries use {}; re-run ingest",
            collection,
            model,
            embedder.model()
        ),
        Ok(_) => {}
        Err(e) => tracing::warn!("Could not read vector store metadata: {}", e),
    }

    tracing::info!(
        "Vector store opened at {} (collection {})",
        store.db_path().display(),
        settings.vector_store.collection_name
    );

    Ok(DocumentSearch {
        store: Arc::new(store),
        embedder: Arc::from(embedder),
        collection: settings.vector_store.collection_name.clone(),
    })
}
