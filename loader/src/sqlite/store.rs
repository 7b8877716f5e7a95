//! SQLite implementation of the analytics store contract.
//!
//! Scalars live in `kv`, sets in `set_members`, lists in `list_items` and
//! the email filter in `filter_members`. Expiry deadlines are wall-clock
//! milliseconds, so TTLs survive a restart; expired rows are filtered on
//! read and removed lazily on write.

use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use analytics::store::resolve_range;
use analytics::{KeyValueStore, StoreError};
use sqlx::SqlitePool;

use super::Database;

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// SQLite implementation of [`KeyValueStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT value FROM kv WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, expires_at) VALUES (?, ?, NULL)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = NULL
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        for sql in [
            "DELETE FROM kv WHERE key = ?",
            "DELETE FROM set_members WHERE key = ?",
            "DELETE FROM list_items WHERE key = ?",
        ] {
            sqlx::query(sql)
                .bind(key)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT EXISTS(SELECT 1 FROM kv WHERE key = ?1
                              AND (expires_at IS NULL OR expires_at > ?2))
                OR EXISTS(SELECT 1 FROM set_members WHERE key = ?1)
                OR EXISTS(SELECT 1 FROM list_items WHERE key = ?1)
            "#,
        )
        .bind(key)
        .bind(now_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.0 != 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = now_millis();
        let deadline = now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));
        sqlx::query(
            "UPDATE kv SET expires_at = ? WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(deadline)
        .bind(key)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = now_millis();
        let row: Option<(Option<i64>,)> = sqlx::query_as(
            "SELECT expires_at FROM kv WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row
            .and_then(|(deadline,)| deadline)
            .map(|at| Duration::from_millis(at.saturating_sub(now).max(0) as u64)))
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        // One statement, so concurrent writers serialize on the write lock
        // instead of upgrading a read transaction. An expired key restarts at
        // 1; a non-integer value matches no row.
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO kv (key, value, expires_at) VALUES (?1, '1', NULL)
            ON CONFLICT(key) DO UPDATE SET
                value = CASE
                    WHEN kv.expires_at IS NOT NULL AND kv.expires_at <= ?2 THEN '1'
                    ELSE CAST(CAST(trim(kv.value) AS INTEGER) + 1 AS TEXT)
                END,
                expires_at = CASE
                    WHEN kv.expires_at IS NOT NULL AND kv.expires_at <= ?2 THEN NULL
                    ELSE kv.expires_at
                END
            WHERE (kv.expires_at IS NOT NULL AND kv.expires_at <= ?2)
                OR CAST(CAST(trim(kv.value) AS INTEGER) AS TEXT) = trim(kv.value)
            RETURNING value
            "#,
        )
        .bind(key)
        .bind(now_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let not_an_integer = || StoreError::NotAnInteger {
            key: key.to_string(),
        };
        let (raw,) = row.ok_or_else(not_an_integer)?;
        raw.parse::<i64>().map_err(|_| not_an_integer())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO set_members (key, member) VALUES (?, ?)")
            .bind(key)
            .bind(member)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM set_members WHERE key = ? AND member = ?")
            .bind(key)
            .bind(member)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<HashSet<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT member FROM set_members WHERE key = ?")
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        Ok(rows.into_iter().map(|(member,)| member).collect())
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM set_members WHERE key = ? AND member = ?)",
        )
        .bind(key)
        .bind(member)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.0 != 0)
    }

    async fn list_range(&self, key: &str, start: i64, end: i64) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT value FROM list_items WHERE key = ? ORDER BY id")
                .bind(key)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;
        let items: Vec<String> = rows.into_iter().map(|(value,)| value).collect();
        Ok(match resolve_range(items.len(), start, end) {
            Some((from, to)) => items[from..=to].to_vec(),
            None => vec![],
        })
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO list_items (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn filter_add(&self, filter: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO filter_members (filter, value) VALUES (?, ?)")
            .bind(filter)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn filter_contains(&self, filter: &str, value: &str) -> Result<bool, StoreError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM filter_members WHERE filter = ? AND value = ?)",
        )
        .bind(filter)
        .bind(value)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.0 != 0)
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        for table in ["kv", "set_members", "list_items", "filter_members"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)?;
        tracing::info!("Store flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics::keys;

    async fn store() -> SqliteStore {
        let db = Database::new_in_memory().await.unwrap();
        SqliteStore::new(&db)
    }

    #[tokio::test]
    async fn test_scalar_round_trip_and_delete() {
        let store = store().await;
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v1").await.unwrap();
        store.set("k", "v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
        assert!(store.exists("k").await.unwrap());
        store.delete("k").await.unwrap();
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_increment() {
        let store = store().await;
        assert_eq!(store.increment("c").await.unwrap(), 1);
        assert_eq!(store.increment("c").await.unwrap(), 2);
        store.set("bad", "x").await.unwrap();
        assert!(matches!(
            store.increment("bad").await,
            Err(StoreError::NotAnInteger { .. })
        ));
        assert_eq!(store.get("bad").await.unwrap().as_deref(), Some("x"));
        store.set("padded", " 41 ").await.unwrap();
        assert_eq!(store.increment("padded").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_expire_and_ttl() {
        let store = store().await;
        store.set("k", "v").await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), None);
        store
            .expire("k", Duration::from_secs(3600))
            .await
            .unwrap();
        let ttl = store.ttl("k").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(3600));
        assert!(ttl > Duration::from_secs(3500));

        // A deadline in the past reads as absent.
        sqlx::query("UPDATE kv SET expires_at = 1 WHERE key = 'k'")
            .execute(&store.pool)
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
        assert_eq!(store.increment("k").await.unwrap(), 1);
        assert_eq!(store.ttl("k").await.unwrap(), None);
        assert_eq!(store.increment("k").await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_on_shared_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("analytics.db"), 4)
            .await
            .unwrap();
        let store = std::sync::Arc::new(SqliteStore::new(&db));

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.increment("wins:alice").await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.get("wins:alice").await.unwrap().as_deref(), Some("20"));
        db.close().await;
    }

    #[tokio::test]
    async fn test_sets() {
        let store = store().await;
        store.set_add("s", "a").await.unwrap();
        store.set_add("s", "a").await.unwrap();
        store.set_add("s", "b").await.unwrap();
        assert_eq!(store.set_members("s").await.unwrap().len(), 2);
        store.set_remove("s", "a").await.unwrap();
        store.set_remove("s", "zz").await.unwrap();
        let members = store.set_members("s").await.unwrap();
        assert!(members.contains("b") && members.len() == 1);
        assert!(store.exists("s").await.unwrap());
        assert!(store.set_contains("s", "b").await.unwrap());
        assert!(!store.set_contains("s", "a").await.unwrap());
        assert!(!store.set_contains("other", "b").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_range_semantics() {
        let store = store().await;
        for v in ["a", "b", "c", "d"] {
            store.list_push("l", v).await.unwrap();
        }
        assert_eq!(store.list_range("l", 0, -1).await.unwrap(), vec!["a", "b", "c", "d"]);
        assert_eq!(store.list_range("l", 1, 2).await.unwrap(), vec!["b", "c"]);
        assert_eq!(store.list_range("l", -2, -1).await.unwrap(), vec!["c", "d"]);
        assert!(store.list_range("missing", 0, -1).await.unwrap().is_empty());
        store.delete("l").await.unwrap();
        assert!(store.list_range("l", 0, -1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filter_and_flush() {
        let store = store().await;
        store
            .filter_add(keys::EMAIL_FILTER, "a@example.com")
            .await
            .unwrap();
        assert!(store
            .filter_contains(keys::EMAIL_FILTER, "a@example.com")
            .await
            .unwrap());
        assert!(!store
            .filter_contains(keys::EMAIL_FILTER, "b@example.com")
            .await
            .unwrap());

        store.set("k", "v").await.unwrap();
        store.flush().await.unwrap();
        assert!(!store.exists("k").await.unwrap());
        assert!(!store
            .filter_contains(keys::EMAIL_FILTER, "a@example.com")
            .await
            .unwrap());
    }
}
