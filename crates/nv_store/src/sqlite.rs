//! SQLite backend via sqlx.
//!
//! One table, `kv_records`, keyed by `(collection, id)`. The composite primary
//! key doubles as the per-collection index, so `list` is a range read.

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};

use crate::error::StoreError;
use crate::kv::KvBackend;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv_records (
    collection TEXT NOT NULL,
    id         TEXT NOT NULL,
    value      TEXT NOT NULL,
    PRIMARY KEY (collection, id)
) WITHOUT ROWID";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Persistence(err.to_string())
    }
}

/// Cheap to clone (the pool is reference counted).
#[derive(Clone)]
pub struct SqliteKv {
    pool: SqlitePool,
}

impl SqliteKv {
    /// Open (or create) the database file and make sure the table exists.
    ///
    /// WAL journal mode is set on the connection options, not through a
    /// statement, because SQLite refuses to switch journal mode inside a
    /// transaction.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts).await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        tracing::debug!(path = %db_path.display(), "sqlite store opened");
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl KvBackend for SqliteKv {
    async fn put(&self, collection: &str, id: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO kv_records (collection, id, value) VALUES (?, ?, ?)
             ON CONFLICT(collection, id) DO UPDATE SET value = excluded.value",
        )
        .bind(collection)
        .bind(id)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<String>, StoreError> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM kv_records WHERE collection = ? AND id = ?",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, String)>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT id, value FROM kv_records WHERE collection = ? ORDER BY id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM kv_records WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn sqlite_kv_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.db");

        let kv = SqliteKv::open(&path).await.expect("open store");
        kv.put("notes", "n2", "{\"v\":2}").await.unwrap();
        kv.put("notes", "n1", "{\"v\":1}").await.unwrap();
        kv.put("notes", "n1", "{\"v\":11}").await.unwrap();
        kv.put("meta", "salt", "\"AAAA\"").await.unwrap();
        kv.close().await;

        let kv = SqliteKv::open(&path).await.expect("reopen store");
        assert_eq!(
            kv.list("notes").await.unwrap(),
            vec![
                ("n1".to_string(), "{\"v\":11}".to_string()),
                ("n2".to_string(), "{\"v\":2}".to_string()),
            ]
        );
        assert_eq!(kv.get("meta", "salt").await.unwrap().as_deref(), Some("\"AAAA\""));
        assert!(kv.delete("notes", "n1").await.unwrap());
        assert!(!kv.delete("notes", "n1").await.unwrap());
        assert_eq!(kv.get("notes", "n1").await.unwrap(), None);
        kv.close().await;
    }

    #[tokio::test]
    async fn open_in_missing_directory_is_a_persistence_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("no/such/dir/vault.db");
        match SqliteKv::open(&path).await {
            Err(StoreError::Persistence(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("open should fail"),
        }
    }
}
