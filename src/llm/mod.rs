pub mod engine;
pub mod exclusive;
pub mod llama_server;
pub mod types;

pub use engine::GenerationEngine;
pub use exclusive::ExclusiveEngine;
pub use llama_server::LlamaServerEngine;
pub use types::CompletionRequest;
