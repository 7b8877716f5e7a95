//! Configuration for the chess analytics loader
//!
//! Handles data directory configuration with the following precedence:
//! 1. CHESS_ANALYTICS_DATA_DIR environment variable
//! 2. ~/.config/chess-analytics/data (production default)
//! 3. ./data (fallback for development)

use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_DIR: &str = ".config/chess-analytics/data";
const DEV_DATA_DIR: &str = "./data";
const DB_FILE_NAME: &str = "analytics.db";
const DEFAULT_EXPIRY_WORKERS: usize = 5;
const DEFAULT_DB_CONNECTIONS: u32 = 5;

pub const PLAYERS_FILE: &str = "players.csv";
pub const SCHEDULE_FILE: &str = "schedule.csv";
pub const GAME_RECORDS_FILE: &str = "game_records.csv";

/// Get the data directory holding the database and the default CSV inputs.
///
/// Priority:
/// 1. CHESS_ANALYTICS_DATA_DIR env variable if set
/// 2. $HOME/.config/chess-analytics/data if HOME is set
/// 3. ./data as fallback
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CHESS_ANALYTICS_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(DEFAULT_CONFIG_DIR);
    }

    PathBuf::from(DEV_DATA_DIR)
}

/// SQLite database file. CHESS_ANALYTICS_DB_PATH overrides
/// `<data_dir>/analytics.db`.
pub fn get_db_path(data_dir: &Path) -> PathBuf {
    match std::env::var("CHESS_ANALYTICS_DB_PATH") {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => data_dir.join(DB_FILE_NAME),
    }
}

/// Expiry worker pool size from CHESS_ANALYTICS_EXPIRY_WORKERS, default 5.
pub fn expiry_worker_count() -> usize {
    parse_worker_count(std::env::var("CHESS_ANALYTICS_EXPIRY_WORKERS").ok().as_deref())
}

fn parse_worker_count(raw: Option<&str>) -> usize {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => DEFAULT_EXPIRY_WORKERS,
        Some(value) => match value.parse::<usize>() {
            Ok(n) => n.max(1),
            Err(_) => {
                tracing::warn!(value, "Invalid CHESS_ANALYTICS_EXPIRY_WORKERS, using default");
                DEFAULT_EXPIRY_WORKERS
            }
        },
    }
}

/// SQLite pool size from CHESS_ANALYTICS_DB_CONNECTIONS, default 5.
pub fn db_max_connections() -> u32 {
    match std::env::var("CHESS_ANALYTICS_DB_CONNECTIONS") {
        Ok(raw) => raw.trim().parse::<u32>().map(|n| n.max(1)).unwrap_or_else(|_| {
            tracing::warn!(value = %raw, "Invalid CHESS_ANALYTICS_DB_CONNECTIONS, using default");
            DEFAULT_DB_CONNECTIONS
        }),
        Err(_) => DEFAULT_DB_CONNECTIONS,
    }
}

/// `explicit` if given, otherwise `<data_dir>/<file_name>`.
pub fn input_path(explicit: Option<PathBuf>, data_dir: &Path, file_name: &str) -> PathBuf {
    explicit.unwrap_or_else(|| data_dir.join(file_name))
}
