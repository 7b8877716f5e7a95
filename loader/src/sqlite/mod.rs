//! SQLite-backed store.
//!
//! [`Database`] wraps a `sqlx::SqlitePool` in WAL mode and applies the
//! embedded migrations from `migrations/` on open. [`SqliteStore`] implements
//! the analytics [`KeyValueStore`](analytics::KeyValueStore) on top of it.

mod database;
mod store;

pub use database::Database;
pub use store::SqliteStore;

/// Errors opening the database.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
}
