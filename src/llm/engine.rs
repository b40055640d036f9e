use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::CompletionRequest;
use crate::core::errors::ApiError;

/// The on-device inference capability this crate consumes.
///
/// Model files, acquisition and installation live behind the implementation;
/// the pipeline only ever sees text in, text (or vectors) out.
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Engine binding name (e.g. "llama_server"), for logs and health output.
    fn name(&self) -> &str;

    /// Check whether the engine is reachable.
    async fn health_check(&self) -> Result<bool, ApiError>;

    /// Completion, whole result at once.
    async fn complete(&self, request: CompletionRequest) -> Result<String, ApiError>;

    /// Streaming completion: a one-pass, ordered, finite sequence of token
    /// strings. The receiver ends when generation hits a stop condition;
    /// dropping it abandons consumption but need not cancel generation.
    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError>;

    /// Map texts to fixed-dimension embedding vectors, one per input.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}
