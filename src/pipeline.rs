//! The RAG pipeline: the single capability exposed to the application.
//!
//! Query time: rewrite -> embed -> search -> assemble -> generate, one
//! sequential chain per call. Ingestion: chunk -> embed -> insert. Both run
//! against explicitly constructed store and engine handles owned by the
//! application root.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::chunker::ChunkRequest;
use crate::completion::CompletionController;
use crate::core::config::{AppConfig, ChunkingConfig};
use crate::core::errors::ApiError;
use crate::index::VectorIndex;
use crate::llm::ExclusiveEngine;
use crate::memory::ChatMemory;
use crate::prompt;
use crate::retriever::Retriever;
use crate::rewrite::QueryRewriter;
use crate::store::{RecordStore, StoredUnit};

pub struct RagPipeline {
    store: Arc<dyn RecordStore>,
    engine: ExclusiveEngine,
    index: VectorIndex,
    memory: ChatMemory,
    retriever: Retriever,
    controller: CompletionController,
    system_instructions: String,
    history_limit: usize,
    chunking: ChunkingConfig,
}

impl RagPipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        engine: ExclusiveEngine,
        config: &AppConfig,
    ) -> Result<Self, ApiError> {
        let index = VectorIndex::new(store.clone());
        let memory = ChatMemory::new(store.clone());

        let rewriter = QueryRewriter::new(engine.clone(), config.rewrite.clone())?;
        let retriever = Retriever::new(
            rewriter,
            engine.clone(),
            index.clone(),
            config.retrieval.clone(),
        );
        let controller = CompletionController::new(
            engine.clone(),
            memory.clone(),
            config.prompt_format,
            config.generation.clone(),
        );

        Ok(Self {
            store,
            engine,
            index,
            memory,
            retriever,
            controller,
            system_instructions: config.system_instructions.clone(),
            history_limit: config.chat.history_limit,
            chunking: config.chunking.clone(),
        })
    }

    /// Answers one query, optionally streaming partial output to `on_partial`.
    ///
    /// Returns the final reply text. Engine failure during the main
    /// completion surfaces as a fixed user-safe reply; store failures are
    /// fatal to the call and surface as `Err`.
    pub async fn answer_query(
        &self,
        query: &str,
        on_partial: Option<mpsc::Sender<String>>,
    ) -> Result<String, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ApiError::BadRequest("query must not be empty".to_string()));
        }

        let history = self.memory.recent(self.history_limit).await?;
        let retrieved = self.retriever.retrieve(query, &history).await?;

        // The prompt carries the original query; the rewrite steered
        // retrieval only.
        let prompt = prompt::assemble(
            query,
            &history,
            &retrieved.candidates,
            &self.system_instructions,
        );

        self.controller.generate(query, &prompt, on_partial).await
    }

    /// Chunks and indexes one source. Zero units is an ingestion failure,
    /// never a silent success.
    pub async fn ingest(&self, request: ChunkRequest) -> Result<usize, ApiError> {
        let units = request.into_units(&self.chunking)?;
        if units.is_empty() {
            return Err(ApiError::Ingestion(
                "source produced no units".to_string(),
            ));
        }

        let vectors = self.engine.embed(&units).await?;
        if vectors.len() != units.len() {
            return Err(ApiError::Engine(format!(
                "embedding count mismatch: {} units, {} vectors",
                units.len(),
                vectors.len()
            )));
        }

        for (text, vector) in units.iter().zip(&vectors) {
            self.index.insert(text, vector).await?;
        }

        tracing::info!("ingested {} unit(s)", units.len());
        Ok(units.len())
    }

    /// One-time ingestion guarded by a store flag.
    ///
    /// Returns `Ok(None)` when the flag is already set. The flag is written
    /// only after every unit landed, so a failed ingestion retries next run.
    pub async fn ingest_once(
        &self,
        flag_key: &str,
        request: ChunkRequest,
    ) -> Result<Option<usize>, ApiError> {
        if self.store.get_flag(flag_key).await?.is_some() {
            return Ok(None);
        }

        let count = self.ingest(request).await?;
        self.store.set_flag(flag_key, "done").await?;
        Ok(Some(count))
    }

    pub async fn list_units(&self) -> Result<Vec<StoredUnit>, ApiError> {
        self.index.all().await
    }

    pub async fn delete_unit(&self, id: &str) -> Result<bool, ApiError> {
        self.index.delete(id).await
    }

    pub async fn clear_units(&self) -> Result<usize, ApiError> {
        self.index.clear().await
    }

    pub async fn unit_count(&self) -> Result<usize, ApiError> {
        self.store.unit_count().await
    }

    /// Clears conversation memory; called by the surrounding application at
    /// session start.
    pub async fn reset_session(&self) -> Result<(), ApiError> {
        self.memory.clear().await.map(|_| ())
    }

    pub async fn engine_healthy(&self) -> bool {
        self.engine.health_check().await.unwrap_or(false)
    }
}
