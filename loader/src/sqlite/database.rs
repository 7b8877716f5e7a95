use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use super::DatabaseError;

/// Writers wait this long for the WAL lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pooled connection to the analytics database with migrations applied.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the database file at `path`, creating it and its parent
    /// directories when missing.
    pub async fn open(path: &Path, max_connections: u32) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let db = Self::connect(options, max_connections.max(1)).await?;
        tracing::info!(path = %path.display(), max_connections, "Database opened");
        Ok(db)
    }

    /// Private in-memory database. Limited to one connection because every
    /// `:memory:` connection is a separate database.
    #[cfg(test)]
    pub async fn new_in_memory() -> Result<Self, DatabaseError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect(options, 1).await
    }

    async fn connect(
        options: SqliteConnectOptions,
        max_connections: u32,
    ) -> Result<Self, DatabaseError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for in-flight queries and close every connection.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("Database closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics::KeyValueStore;

    use crate::sqlite::SqliteStore;

    #[tokio::test]
    async fn test_schema_is_migrated() {
        let db = Database::new_in_memory().await.unwrap();
        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table'")
                .fetch_all(db.pool())
                .await
                .unwrap();
        let names: Vec<&str> = tables.iter().map(|(name,)| name.as_str()).collect();
        for table in ["kv", "set_members", "list_items", "filter_members"] {
            assert!(names.contains(&table), "missing table {table}");
        }
    }

    #[tokio::test]
    async fn test_open_creates_nested_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("analytics.db");
        let db = Database::open(&db_path, 2).await.unwrap();
        assert!(db_path.exists());
        db.close().await;
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("analytics.db");

        let db = Database::open(&db_path, 2).await.unwrap();
        let store = SqliteStore::new(&db);
        store.set("scheduled_game:s1", "[\"alice\",\"bob\"]").await.unwrap();
        store
            .expire("scheduled_game:s1", Duration::from_secs(3600))
            .await
            .unwrap();
        store.set_add("scheduled_games", "s1").await.unwrap();
        db.close().await;

        let db = Database::open(&db_path, 2).await.unwrap();
        let store = SqliteStore::new(&db);
        assert!(store
            .set_members("scheduled_games")
            .await
            .unwrap()
            .contains("s1"));
        let ttl = store.ttl("scheduled_game:s1").await.unwrap();
        assert!(ttl.is_some_and(|t| t > Duration::from_secs(3500)));
        db.close().await;
    }
}
