pub mod defaults;
pub mod paths;
pub mod service;

pub use paths::AppPaths;
pub use service::{
    AppConfig, ChatConfig, ChunkingConfig, ConfigService, EngineConfig, GenerationConfig,
    RetrievalConfig, RewriteConfig,
};
