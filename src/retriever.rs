//! Retrieval orchestration: rewrite, embed, search.

use crate::core::config::RetrievalConfig;
use crate::core::errors::ApiError;
use crate::index::{RetrievalCandidate, VectorIndex};
use crate::llm::ExclusiveEngine;
use crate::rewrite::QueryRewriter;
use crate::store::ConversationTurn;

/// What retrieval produced for one query.
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    /// The query actually embedded (the rewrite when one was accepted).
    pub retrieval_query: String,
    /// Ranked candidates; empty is a valid, common outcome.
    pub candidates: Vec<RetrievalCandidate>,
}

pub struct Retriever {
    rewriter: QueryRewriter,
    engine: ExclusiveEngine,
    index: VectorIndex,
    options: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        rewriter: QueryRewriter,
        engine: ExclusiveEngine,
        index: VectorIndex,
        options: RetrievalConfig,
    ) -> Self {
        Self {
            rewriter,
            engine,
            index,
            options,
        }
    }

    pub async fn retrieve(
        &self,
        query: &str,
        history: &[ConversationTurn],
    ) -> Result<RetrievedContext, ApiError> {
        let outcome = self.rewriter.resolve(query, history).await;
        let retrieval_query = outcome.retrieval_query(query).to_string();

        let mut vectors = self.engine.embed(std::slice::from_ref(&retrieval_query)).await?;
        let query_vector = vectors
            .pop()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::Engine("embedding returned no vector".to_string()))?;

        let candidates = self.index.search(&query_vector, &self.options).await?;
        tracing::debug!(
            "retrieved {} candidate(s) for query of {} chars",
            candidates.len(),
            retrieval_query.chars().count()
        );

        Ok(RetrievedContext {
            retrieval_query,
            candidates,
        })
    }
}
