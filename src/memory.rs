//! Bounded, ordered conversation memory over the record store.

use std::sync::Arc;

use crate::core::errors::ApiError;
use crate::store::{ChatRole, ConversationTurn, RecordStore};

#[derive(Clone)]
pub struct ChatMemory {
    store: Arc<dyn RecordStore>,
}

impl ChatMemory {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn append(&self, role: ChatRole, text: &str) -> Result<(), ApiError> {
        self.store.append_turn(role, text).await
    }

    /// The most recent `limit` turns, oldest first. A `limit` of 0 is empty.
    ///
    /// No automatic expiry: the surrounding application clears memory at
    /// session start via `clear`.
    pub async fn recent(&self, limit: usize) -> Result<Vec<ConversationTurn>, ApiError> {
        self.store.list_turns(limit).await
    }

    pub async fn clear(&self) -> Result<usize, ApiError> {
        self.store.clear_turns().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    async fn test_memory() -> ChatMemory {
        let tmp = std::env::temp_dir().join(format!("moneta-memory-test-{}.db", uuid::Uuid::new_v4()));
        ChatMemory::new(Arc::new(SqliteStore::open(tmp).await.unwrap()))
    }

    #[tokio::test]
    async fn recent_returns_bounded_tail_oldest_first() {
        let memory = test_memory().await;

        memory.append(ChatRole::User, "q1").await.unwrap();
        memory.append(ChatRole::Assistant, "a1").await.unwrap();
        memory.append(ChatRole::User, "q2").await.unwrap();

        let turns = memory.recent(2).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text, "a1");
        assert_eq!(turns[0].role, ChatRole::Assistant);
        assert_eq!(turns[1].text, "q2");

        assert!(memory.recent(0).await.unwrap().is_empty());

        memory.clear().await.unwrap();
        assert!(memory.recent(10).await.unwrap().is_empty());
    }
}
