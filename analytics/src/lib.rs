//! Incremental chess match analytics over a key-value/set store.

pub mod counters;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod keys;
pub mod moves;
pub mod players;
pub mod queries;
pub mod schedule;
pub mod service;
pub mod store;
pub mod types;

pub use error::{AnalyticsError, AnalyticsResult};
pub use graph::PlayerGraph;
pub use ingest::{IngestSummary, MatchIngestor};
pub use moves::{parse_san, sequence_key, SanError};
pub use players::PlayerRegistry;
pub use queries::AnalyticsQueries;
pub use schedule::{RecoveryReport, ScheduleConfig, ScheduleManager, ScheduleState};
pub use service::AnalyticsService;
pub use store::{KeyValueStore, MemoryStore, StoreError};
pub use types::{
    CountedValue, MatchRecord, Player, RankedPlayer, ScheduledMatch, ShortestGame, Winner,
};
