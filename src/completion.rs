//! Completion control: drive generation, stream partials, persist the turn.

use tokio::sync::mpsc;

use crate::core::config::GenerationConfig;
use crate::core::errors::ApiError;
use crate::llm::{CompletionRequest, ExclusiveEngine};
use crate::memory::ChatMemory;
use crate::prompt::{Prompt, PromptFormat};
use crate::store::ChatRole;

/// Returned (and persisted) in place of an answer when the engine fails.
/// Generation failures stop here; they are not part of the error taxonomy
/// below this layer.
pub const FALLBACK_REPLY: &str =
    "Sorry, I ran into a problem while generating this answer. Please try again.";

pub struct CompletionController {
    engine: ExclusiveEngine,
    memory: ChatMemory,
    format: PromptFormat,
    config: GenerationConfig,
}

impl CompletionController {
    pub fn new(
        engine: ExclusiveEngine,
        memory: ChatMemory,
        format: PromptFormat,
        config: GenerationConfig,
    ) -> Self {
        Self {
            engine,
            memory,
            format,
            config,
        }
    }

    /// Runs one completion for `prompt` and returns the cleaned reply.
    ///
    /// Tokens are forwarded to `on_partial` in arrival order, batched per
    /// `flush_every_tokens`. Afterwards the original query and the reply are
    /// appended to chat memory as two turns, in that order, exactly once per
    /// call; only store failures propagate as errors.
    pub async fn generate(
        &self,
        original_query: &str,
        prompt: &Prompt,
        on_partial: Option<mpsc::Sender<String>>,
    ) -> Result<String, ApiError> {
        let request = CompletionRequest {
            prompt: self.format.render(prompt),
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            top_p: self.config.top_p,
            top_k: self.config.top_k,
            stop: self.format.stop_sequences(),
        };

        let reply = match self.run_stream(request, on_partial).await {
            Ok(raw) => self.format.scrub(&raw),
            Err(err) => {
                tracing::error!("generation failed: {}", err);
                FALLBACK_REPLY.to_string()
            }
        };

        self.memory.append(ChatRole::User, original_query).await?;
        self.memory.append(ChatRole::Assistant, &reply).await?;

        Ok(reply)
    }

    async fn run_stream(
        &self,
        request: CompletionRequest,
        mut on_partial: Option<mpsc::Sender<String>>,
    ) -> Result<String, ApiError> {
        let mut rx = self.engine.stream(request).await?;
        let flush_every = self.config.flush_every_tokens.max(1);

        let mut full = String::new();
        let mut pending = String::new();
        let mut pending_tokens = 0usize;

        while let Some(item) = rx.recv().await {
            let token = item?;
            full.push_str(&token);

            if on_partial.is_some() {
                pending.push_str(&token);
                pending_tokens += 1;
                if pending_tokens >= flush_every {
                    self.flush(&mut on_partial, &mut pending).await;
                    pending_tokens = 0;
                }
            }
        }

        if !pending.is_empty() {
            self.flush(&mut on_partial, &mut pending).await;
        }

        Ok(full)
    }

    /// Sends the pending batch; a closed sink stops further forwarding but
    /// never stops generation (the stream runs to its own stop condition).
    async fn flush(&self, on_partial: &mut Option<mpsc::Sender<String>>, pending: &mut String) {
        match on_partial.take() {
            Some(sink) => {
                if sink.send(std::mem::take(pending)).await.is_ok() {
                    *on_partial = Some(sink);
                } else {
                    tracing::debug!("partial-output sink dropped; continuing to completion");
                    pending.clear();
                }
            }
            None => pending.clear(),
        }
    }
}
