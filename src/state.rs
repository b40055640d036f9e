use std::sync::Arc;

use crate::core::config::{AppConfig, AppPaths, ConfigService};
use crate::core::errors::ApiError;
use crate::llm::{ExclusiveEngine, LlamaServerEngine};
use crate::pipeline::RagPipeline;
use crate::store::{RecordStore, SqliteStore};

/// Application state shared across all routes.
///
/// Owns the store and engine handles; everything downstream receives them by
/// reference, never through ambient global state.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: AppConfig,
    pub store: Arc<dyn RecordStore>,
    pub engine: ExclusiveEngine,
    pub pipeline: Arc<RagPipeline>,
}

impl AppState {
    /// Initializes the application state: discover paths, load config, open
    /// the store (creating its schema if absent), bind the engine, and wire
    /// the pipeline.
    pub async fn initialize() -> Result<Arc<Self>, ApiError> {
        let paths = Arc::new(AppPaths::new());
        Self::initialize_with_paths(paths).await
    }

    pub async fn initialize_with_paths(paths: Arc<AppPaths>) -> Result<Arc<Self>, ApiError> {
        let config = ConfigService::new(paths.clone()).load()?;

        let store: Arc<dyn RecordStore> =
            Arc::new(SqliteStore::open(paths.db_path.clone()).await?);

        let engine = ExclusiveEngine::new(Arc::new(LlamaServerEngine::new(
            config.engine.base_url.clone(),
        )));

        let pipeline = Arc::new(RagPipeline::new(store.clone(), engine.clone(), &config)?);

        Ok(Arc::new(AppState {
            paths,
            config,
            store,
            engine,
            pipeline,
        }))
    }
}
