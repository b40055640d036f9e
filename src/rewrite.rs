//! History-aware query rewriting.
//!
//! A query like "how much did I spend on that?" is useless as a retrieval
//! key. When history exists and the query looks under-specified, we ask the
//! engine for a standalone rewrite; the rewrite only ever steers retrieval.
//! Failure here is always soft: the original query is the fallback.

use regex::Regex;

use crate::core::config::RewriteConfig;
use crate::core::errors::ApiError;
use crate::llm::{CompletionRequest, ExclusiveEngine};
use crate::store::ConversationTurn;

/// Why the original query was kept, when it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepReason {
    HistoryEmpty,
    SelfContained,
    RewriteTooShort,
    EngineFailed,
}

/// Outcome of the rewrite step: an explicit result, not control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    Rewritten(String),
    Kept(KeepReason),
}

impl RewriteOutcome {
    /// The query retrieval should use, falling back to the original.
    pub fn retrieval_query<'a>(&'a self, original: &'a str) -> &'a str {
        match self {
            RewriteOutcome::Rewritten(query) => query,
            RewriteOutcome::Kept(_) => original,
        }
    }
}

pub struct QueryRewriter {
    engine: ExclusiveEngine,
    config: RewriteConfig,
    trigger: Option<Regex>,
}

impl QueryRewriter {
    pub fn new(engine: ExclusiveEngine, config: RewriteConfig) -> Result<Self, ApiError> {
        let trigger = if config.trigger_words.is_empty() {
            None
        } else {
            let alternation = config
                .trigger_words
                .iter()
                .map(|word| regex::escape(word))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = format!(r"(?i)\b(?:{})\b", alternation);
            Some(Regex::new(&pattern).map_err(ApiError::internal)?)
        };

        Ok(Self {
            engine,
            config,
            trigger,
        })
    }

    /// A query is ambiguous when it uses an anaphoric trigger word or is
    /// shorter than the configured minimum (too short to stand alone).
    pub fn is_ambiguous(&self, query: &str) -> bool {
        let trimmed = query.trim();
        if trimmed.chars().count() < self.config.min_query_chars {
            return true;
        }
        self.trigger
            .as_ref()
            .map(|re| re.is_match(trimmed))
            .unwrap_or(false)
    }

    /// Resolves the retrieval query for `query` against `history`.
    ///
    /// Never fails: any engine error is logged and the original query wins.
    pub async fn resolve(&self, query: &str, history: &[ConversationTurn]) -> RewriteOutcome {
        if history.is_empty() {
            return RewriteOutcome::Kept(KeepReason::HistoryEmpty);
        }
        if !self.is_ambiguous(query) {
            return RewriteOutcome::Kept(KeepReason::SelfContained);
        }

        let request = CompletionRequest::new(self.rewrite_prompt(query, history))
            .with_temperature(0.0)
            .with_max_tokens(self.config.max_tokens);

        match self.engine.complete(request).await {
            Ok(raw) => {
                let cleaned = raw
                    .trim()
                    .trim_matches(|c| c == '"' || c == '\'' || c == '`')
                    .trim()
                    .to_string();
                if cleaned.chars().count() > self.config.min_rewrite_chars {
                    RewriteOutcome::Rewritten(cleaned)
                } else {
                    tracing::debug!("discarding degenerate rewrite: {:?}", cleaned);
                    RewriteOutcome::Kept(KeepReason::RewriteTooShort)
                }
            }
            Err(err) => {
                tracing::warn!("query rewrite failed, keeping original query: {}", err);
                RewriteOutcome::Kept(KeepReason::EngineFailed)
            }
        }
    }

    fn rewrite_prompt(&self, query: &str, history: &[ConversationTurn]) -> String {
        let window = self.config.history_window.max(1);
        let start = history.len().saturating_sub(window);
        let transcript = history[start..]
            .iter()
            .map(|turn| format!("{}: {}", turn.role.as_str(), turn.text))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Rewrite the final user question as a single standalone question \
             that needs no prior conversation to understand. Resolve every \
             pronoun and reference using the conversation. Return only the \
             rewritten question.\n\nConversation:\n{}\n\nQuestion: {}\n\n\
             Standalone question:",
            transcript, query
        )
    }
}
