//! RecordStore trait — the persistence capability consumed by the pipeline.
//!
//! Covers the three record families the engine needs: embedded text units,
//! role-tagged conversation turns, and opaque bookkeeping flags. The primary
//! implementation is `SqliteStore` in the `sqlite` module.

pub mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// An embedded text unit as persisted.
///
/// Units are immutable once written; `seq` is the store's insertion counter
/// and is what "more recently inserted" means everywhere in the crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredUnit {
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub seq: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    pub fn from_db(raw: &str) -> ChatRole {
        if raw == "assistant" {
            ChatRole::Assistant
        } else {
            ChatRole::User
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: ChatRole,
    pub text: String,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist one unit with its embedding; returns the new unit id.
    async fn put_unit(&self, text: &str, vector: &[f32]) -> Result<String, ApiError>;

    /// All units in insertion order (ascending `seq`).
    async fn list_units(&self) -> Result<Vec<StoredUnit>, ApiError>;

    /// Delete one unit; `Ok(false)` when the id was not present.
    async fn delete_unit(&self, id: &str) -> Result<bool, ApiError>;

    /// Delete every unit; returns how many were removed.
    async fn clear_units(&self) -> Result<usize, ApiError>;

    async fn unit_count(&self) -> Result<usize, ApiError>;

    async fn append_turn(&self, role: ChatRole, text: &str) -> Result<(), ApiError>;

    /// The most recent `limit` turns, oldest first. `limit == 0` is empty.
    async fn list_turns(&self, limit: usize) -> Result<Vec<ConversationTurn>, ApiError>;

    async fn clear_turns(&self) -> Result<usize, ApiError>;

    async fn get_flag(&self, key: &str) -> Result<Option<String>, ApiError>;

    async fn set_flag(&self, key: &str, value: &str) -> Result<(), ApiError>;
}
