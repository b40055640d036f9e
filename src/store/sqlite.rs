//! SQLite-backed record store.
//!
//! Single-file database holding units, conversation turns and flags.
//! Embeddings are stored as little-endian f32 BLOBs next to their text.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::{ChatRole, ConversationTurn, RecordStore, StoredUnit};
use crate::core::errors::ApiError;

pub struct SqliteStore {
    pool: SqlitePool,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl SqliteStore {
    pub async fn open(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::store)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS units (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS flags (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn row_to_unit(row: &sqlx::sqlite::SqliteRow) -> StoredUnit {
        let embedding_bytes: Vec<u8> = row.get("embedding");
        StoredUnit {
            id: row.get("id"),
            text: row.get("text"),
            vector: Self::deserialize_embedding(&embedding_bytes),
            seq: row.get("seq"),
        }
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn put_unit(&self, text: &str, vector: &[f32]) -> Result<String, ApiError> {
        let id = uuid::Uuid::new_v4().to_string();
        let blob = Self::serialize_embedding(vector);

        sqlx::query("INSERT INTO units (id, text, embedding) VALUES (?1, ?2, ?3)")
            .bind(&id)
            .bind(text)
            .bind(&blob)
            .execute(&self.pool)
            .await
            .map_err(ApiError::store)?;

        Ok(id)
    }

    async fn list_units(&self) -> Result<Vec<StoredUnit>, ApiError> {
        let rows = sqlx::query("SELECT seq, id, text, embedding FROM units ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::store)?;

        Ok(rows.iter().map(Self::row_to_unit).collect())
    }

    async fn delete_unit(&self, id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM units WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::store)?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_units(&self) -> Result<usize, ApiError> {
        let result = sqlx::query("DELETE FROM units")
            .execute(&self.pool)
            .await
            .map_err(ApiError::store)?;

        Ok(result.rows_affected() as usize)
    }

    async fn unit_count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM units")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::store)?;

        Ok(count as usize)
    }

    async fn append_turn(&self, role: ChatRole, text: &str) -> Result<(), ApiError> {
        sqlx::query("INSERT INTO turns (role, content) VALUES (?1, ?2)")
            .bind(role.as_str())
            .bind(text)
            .execute(&self.pool)
            .await
            .map_err(ApiError::store)?;

        Ok(())
    }

    async fn list_turns(&self, limit: usize) -> Result<Vec<ConversationTurn>, ApiError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        // Tail of the log, re-ordered oldest first.
        let rows = sqlx::query(
            "SELECT role, content FROM
                 (SELECT id, role, content FROM turns ORDER BY id DESC LIMIT ?1)
             ORDER BY id ASC",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::store)?;

        Ok(rows
            .iter()
            .map(|row| {
                let role: String = row.get("role");
                ConversationTurn {
                    role: ChatRole::from_db(&role),
                    text: row.get("content"),
                }
            })
            .collect())
    }

    async fn clear_turns(&self) -> Result<usize, ApiError> {
        let result = sqlx::query("DELETE FROM turns")
            .execute(&self.pool)
            .await
            .map_err(ApiError::store)?;

        Ok(result.rows_affected() as usize)
    }

    async fn get_flag(&self, key: &str) -> Result<Option<String>, ApiError> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM flags WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::store)?;

        Ok(value)
    }

    async fn set_flag(&self, key: &str, value: &str) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT OR REPLACE INTO flags (key, value, updated_at)
             VALUES (?1, ?2, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        let tmp = std::env::temp_dir().join(format!("moneta-store-test-{}.db", uuid::Uuid::new_v4()));
        SqliteStore::open(tmp).await.unwrap()
    }

    #[tokio::test]
    async fn units_round_trip_in_insertion_order() {
        let store = test_store().await;

        let a = store.put_unit("first", &[1.0, 0.0]).await.unwrap();
        let b = store.put_unit("second", &[0.0, 1.0]).await.unwrap();
        assert_ne!(a, b);

        let units = store.list_units().await.unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].text, "first");
        assert_eq!(units[0].vector, vec![1.0, 0.0]);
        assert!(units[0].seq < units[1].seq);
    }

    #[tokio::test]
    async fn delete_unit_removes_it_from_listing() {
        let store = test_store().await;

        let id = store.put_unit("gone soon", &[1.0]).await.unwrap();
        store.put_unit("stays", &[1.0]).await.unwrap();

        assert!(store.delete_unit(&id).await.unwrap());
        assert!(!store.delete_unit(&id).await.unwrap());

        let units = store.list_units().await.unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text, "stays");
        assert_eq!(store.unit_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn turns_tail_is_oldest_first() {
        let store = test_store().await;

        for i in 0..5 {
            let role = if i % 2 == 0 {
                ChatRole::User
            } else {
                ChatRole::Assistant
            };
            store.append_turn(role, &format!("turn {}", i)).await.unwrap();
        }

        let tail = store.list_turns(2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].text, "turn 3");
        assert_eq!(tail[1].text, "turn 4");
        assert_eq!(tail[1].role, ChatRole::User);

        assert!(store.list_turns(0).await.unwrap().is_empty());

        assert_eq!(store.clear_turns().await.unwrap(), 5);
        assert!(store.list_turns(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn flags_overwrite_in_place() {
        let store = test_store().await;

        assert_eq!(store.get_flag("seeded").await.unwrap(), None);
        store.set_flag("seeded", "v1").await.unwrap();
        store.set_flag("seeded", "v2").await.unwrap();
        assert_eq!(store.get_flag("seeded").await.unwrap(), Some("v2".to_string()));
    }
}
