use crate::moves::SanError;
use crate::store::StoreError;

/// Errors surfaced by the analytics core.
///
/// Missing or non-numeric counters never appear here; reads substitute a
/// neutral value instead. Only store failures and rejected input do.
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("unknown player: {0}")]
    UnknownPlayer(String),
    #[error("player {user_id:?} needs a non-empty id and email")]
    MalformedPlayer { user_id: String },
    #[error("malformed game {game_id}: {reason}")]
    MalformedMatch { game_id: String, reason: String },
    #[error("game {game_id} has invalid move {token:?}: {source}")]
    InvalidMove {
        game_id: String,
        token: String,
        #[source]
        source: SanError,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expiry scheduler is shut down")]
    SchedulerClosed,
}

impl AnalyticsError {
    /// Input-quality problems that skip one unit of work rather than
    /// signalling an unavailable store.
    pub fn is_data_quality(&self) -> bool {
        matches!(
            self,
            Self::UnknownPlayer(_)
                | Self::MalformedPlayer { .. }
                | Self::MalformedMatch { .. }
                | Self::InvalidMove { .. }
        )
    }
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
