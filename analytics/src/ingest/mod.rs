//! Incremental analytics write path.
//!
//! [`MatchIngestor::ingest`] persists one finalized game and updates every
//! derived aggregate: leaderboards, opening and sequence extrema, the check
//! counter and the shortest-game tracker, then retires any matching scheduled
//! game.
//!
//! Counter reads fail open. Store write failures abort the call and leave
//! earlier steps applied; the next ingestion touching the same counters
//! corrects derived pointers.

pub mod extrema;
pub mod leaderboard;
pub mod sequences;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::Instrument;

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::keys;
use crate::moves::parse_san;
use crate::schedule::ScheduleManager;
use crate::store::KeyValueStore;
use crate::types::{MatchRecord, RankedPlayer};

use extrema::{update_pointer, update_shortest_game, Extremum};
use leaderboard::rebuild_leaderboard;
use sequences::scan_moves;

/// What one ingestion changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub game_id: String,
    /// `(winner, loser)` for decisive games.
    pub result: Option<(String, String)>,
    pub top_players: Vec<RankedPlayer>,
    pub bottom_players: Vec<RankedPlayer>,
    pub most_frequent_opening_updated: bool,
    pub sequences_touched: usize,
    pub check_count: u32,
    pub shortest_game_updated: bool,
}

/// Single-writer ingestion front end.
///
/// Calls are serialized through an internal lock so the read-compare-write
/// updates of the global pointers never interleave within one process.
pub struct MatchIngestor<S> {
    store: Arc<S>,
    schedules: Arc<ScheduleManager<S>>,
    write_lock: Mutex<()>,
}

impl<S: KeyValueStore + 'static> MatchIngestor<S> {
    pub fn new(store: Arc<S>, schedules: Arc<ScheduleManager<S>>) -> Self {
        Self {
            store,
            schedules,
            write_lock: Mutex::new(()),
        }
    }

    /// Ingest one finalized game.
    ///
    /// Rejects (without writing anything) games that reference unknown
    /// players or carry unparseable moves; see
    /// [`AnalyticsError::is_data_quality`].
    pub async fn ingest(&self, record: &MatchRecord) -> AnalyticsResult<IngestSummary> {
        let _guard = self.write_lock.lock().await;
        let span = tracing::info_span!("ingest", game_id = %record.game_id);
        self.ingest_inner(record).instrument(span).await
    }

    async fn ingest_inner(&self, record: &MatchRecord) -> AnalyticsResult<IngestSummary> {
        self.validate(record).await?;
        tracing::info!(
            white = %record.white_player_id,
            black = %record.black_player_id,
            turns = record.turns,
            "Ingesting game"
        );

        let store = self.store.as_ref();
        let game_id = record.game_id.as_str();
        let white = record.white_player_id.as_str();
        let black = record.black_player_id.as_str();

        // 1. Body and player links.
        store.set(&keys::game(game_id), &record.to_body()?).await?;
        store.set_add(&keys::player_games(white), game_id).await?;
        store.set_add(&keys::player_games(black), game_id).await?;
        let (first, second) = canonical_pair(white, black);
        store
            .set_add(&keys::player_versus(first, second), game_id)
            .await?;

        // 2-3. Win/loss counters and leaderboards.
        let mut summary = IngestSummary {
            game_id: game_id.to_string(),
            result: None,
            top_players: vec![],
            bottom_players: vec![],
            most_frequent_opening_updated: false,
            sequences_touched: 0,
            check_count: 0,
            shortest_game_updated: false,
        };
        if let Some((winner, loser)) = record.decisive_pair() {
            store.increment(&keys::wins(winner)).await?;
            store.increment(&keys::losses(loser)).await?;
            summary.top_players =
                rebuild_leaderboard(store, keys::TOP_PLAYERS, keys::wins, winner).await?;
            summary.bottom_players =
                rebuild_leaderboard(store, keys::BOTTOM_PLAYERS, keys::losses, loser).await?;
            summary.result = Some((winner.to_string(), loser.to_string()));
        } else {
            tracing::debug!(winner = ?record.winner, "No decisive result, leaderboards unchanged");
        }

        // 4. Openings.
        summary.most_frequent_opening_updated = self.record_opening(record).await?;

        // 5-6. Sequences and their extrema.
        let scan = scan_moves(store, &record.moves).await?;
        for (sequence, count) in scan.tally.iter() {
            store.set(&keys::sequence(sequence), &count.to_string()).await?;
            store.set_add(&keys::sequence_games(sequence), game_id).await?;
            store.set_add(&keys::player_sequences(white), sequence).await?;
            store.set_add(&keys::player_sequences(black), sequence).await?;
        }
        if let Some((sequence, count)) = scan.tally.max() {
            update_pointer(
                store,
                keys::MOST_COMMON_SEQUENCE,
                keys::sequence,
                Extremum::Max,
                sequence,
                count,
                Some(scan.tally.counts()),
            )
            .await?;
        }
        if let Some((sequence, count)) = scan.tally.min() {
            update_pointer(
                store,
                keys::LEAST_COMMON_SEQUENCE,
                keys::sequence,
                Extremum::Min,
                sequence,
                count,
                Some(scan.tally.counts()),
            )
            .await?;
        }
        summary.sequences_touched = scan.tally.len();

        // 7. Checks.
        store
            .set(
                &keys::game_check_count(game_id),
                &scan.check_count.to_string(),
            )
            .await?;
        summary.check_count = scan.check_count;

        // 8. Shortest game.
        summary.shortest_game_updated = update_shortest_game(store, game_id, record.turns).await?;

        // 9. Retire the schedule, if any.
        self.schedules.complete(game_id, white, black).await?;

        tracing::info!(
            checks = summary.check_count,
            sequences = summary.sequences_touched,
            decisive = summary.result.is_some(),
            "Game ingested"
        );
        Ok(summary)
    }

    async fn validate(&self, record: &MatchRecord) -> AnalyticsResult<()> {
        if record.game_id.trim().is_empty() {
            return Err(AnalyticsError::MalformedMatch {
                game_id: record.game_id.clone(),
                reason: "empty game id".to_string(),
            });
        }
        for player in [&record.white_player_id, &record.black_player_id] {
            if !self.store.exists(&keys::player(player)).await? {
                tracing::warn!(player = %player, "Game references unknown player");
                return Err(AnalyticsError::UnknownPlayer(player.clone()));
            }
        }
        for token in &record.moves {
            if let Err(source) = parse_san(token) {
                tracing::warn!(token = %token, "Game contains an unparseable move");
                return Err(AnalyticsError::InvalidMove {
                    game_id: record.game_id.clone(),
                    token: token.clone(),
                    source,
                });
            }
        }
        Ok(())
    }

    async fn record_opening(&self, record: &MatchRecord) -> AnalyticsResult<bool> {
        let store = self.store.as_ref();
        let opening = record.opening.as_str();
        for player in [&record.white_player_id, &record.black_player_id] {
            store.set_add(&keys::player_openings(player), opening).await?;
            store
                .increment(&keys::player_opening_count(player, opening))
                .await?;
        }
        let count = store.increment(&keys::opening(opening)).await?;
        let moved = update_pointer(
            store,
            keys::MOST_FREQUENT_OPENING,
            keys::opening,
            Extremum::Max,
            opening,
            count,
            None,
        )
        .await?;
        if moved {
            tracing::debug!(opening, count, "Most frequent opening updated");
        }
        Ok(moved)
    }
}

/// Order a player pair so both lookups resolve to the same versus key.
pub fn canonical_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ScheduleConfig;
    use crate::store::MemoryStore;
    use crate::types::{ScheduledMatch, Winner};

    async fn setup() -> (Arc<MemoryStore>, MatchIngestor<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for player in ["alice", "bob", "carol"] {
            store
                .set(&keys::player(player), &format!("{player}@example.com"))
                .await
                .unwrap();
            store.set_add(keys::PLAYERS, player).await.unwrap();
        }
        let schedules = Arc::new(ScheduleManager::new(
            store.clone(),
            ScheduleConfig::default(),
        ));
        let ingestor = MatchIngestor::new(store.clone(), schedules);
        (store, ingestor)
    }

    fn game(id: &str, white: &str, black: &str, winner: &str, moves: &[&str]) -> MatchRecord {
        MatchRecord {
            game_id: id.to_string(),
            moves: moves.iter().map(|m| m.to_string()).collect(),
            winner: Winner::from(winner),
            victory_status: "resign".to_string(),
            turns: moves.len() as u32,
            white_player_id: white.to_string(),
            black_player_id: black.to_string(),
            opening: "C20".to_string(),
        }
    }

    #[tokio::test]
    async fn test_ingest_links_players_and_body() {
        let (store, ingestor) = setup().await;
        let record = game("g1", "alice", "bob", "white", &["e4", "e5", "Nf3"]);
        ingestor.ingest(&record).await.unwrap();

        let body = store.get(&keys::game("g1")).await.unwrap().unwrap();
        assert_eq!(MatchRecord::from_body("g1", &body).unwrap(), record);
        assert!(store
            .set_members(&keys::player_games("alice"))
            .await
            .unwrap()
            .contains("g1"));
        assert!(store
            .set_members(&keys::player_games("bob"))
            .await
            .unwrap()
            .contains("g1"));
        assert!(store
            .set_members(&keys::player_versus("alice", "bob"))
            .await
            .unwrap()
            .contains("g1"));
    }

    #[tokio::test]
    async fn test_decisive_game_updates_counters_and_boards() {
        let (store, ingestor) = setup().await;
        let summary = ingestor
            .ingest(&game("g1", "alice", "bob", "Black", &["e4", "e5", "Nf3"]))
            .await
            .unwrap();
        assert_eq!(
            summary.result,
            Some(("bob".to_string(), "alice".to_string()))
        );
        assert_eq!(store.get(&keys::wins("bob")).await.unwrap(), Some("1".into()));
        assert_eq!(
            store.get(&keys::losses("alice")).await.unwrap(),
            Some("1".into())
        );
        assert_eq!(
            store.list_range(keys::TOP_PLAYERS, 0, -1).await.unwrap(),
            vec!["bob"]
        );
        assert_eq!(
            store.list_range(keys::BOTTOM_PLAYERS, 0, -1).await.unwrap(),
            vec!["alice"]
        );
    }

    #[tokio::test]
    async fn test_draw_leaves_boards_untouched() {
        let (store, ingestor) = setup().await;
        let summary = ingestor
            .ingest(&game("g1", "alice", "bob", "draw", &["e4", "e5", "Nf3"]))
            .await
            .unwrap();
        assert!(summary.result.is_none());
        assert!(!store.exists(&keys::wins("alice")).await.unwrap());
        assert!(!store.exists(keys::TOP_PLAYERS).await.unwrap());
    }

    #[tokio::test]
    async fn test_opening_counters() {
        let (store, ingestor) = setup().await;
        ingestor
            .ingest(&game("g1", "alice", "bob", "white", &["e4", "e5", "Nf3"]))
            .await
            .unwrap();
        ingestor
            .ingest(&game("g2", "alice", "carol", "white", &["e4", "e5", "Nf3"]))
            .await
            .unwrap();
        assert_eq!(store.get(&keys::opening("C20")).await.unwrap(), Some("2".into()));
        assert_eq!(
            store
                .get(&keys::player_opening_count("alice", "C20"))
                .await
                .unwrap(),
            Some("2".into())
        );
        assert!(store
            .set_members(&keys::player_openings("carol"))
            .await
            .unwrap()
            .contains("C20"));
        assert_eq!(
            store.get(keys::MOST_FREQUENT_OPENING).await.unwrap(),
            Some("C20".into())
        );
    }

    #[tokio::test]
    async fn test_sequence_indices() {
        let (store, ingestor) = setup().await;
        ingestor
            .ingest(&game("g1", "alice", "bob", "white", &["e4", "e5+", "Nf3"]))
            .await
            .unwrap();
        assert_eq!(
            store.get(&keys::sequence("e4>e5+>Nf3")).await.unwrap(),
            Some("1".into())
        );
        assert!(store
            .set_members(&keys::sequence_games("e4>e5+>Nf3"))
            .await
            .unwrap()
            .contains("g1"));
        assert!(store
            .set_members(&keys::player_sequences("bob"))
            .await
            .unwrap()
            .contains("e4>e5+>Nf3"));
        assert_eq!(
            store.get(&keys::game_check_count("g1")).await.unwrap(),
            Some("1".into())
        );
        assert_eq!(
            store.get(keys::MOST_COMMON_SEQUENCE).await.unwrap(),
            Some("e4>e5+>Nf3".into())
        );
        assert_eq!(
            store.get(keys::LEAST_COMMON_SEQUENCE).await.unwrap(),
            Some("e4>e5+>Nf3".into())
        );
    }

    #[tokio::test]
    async fn test_sequence_extrema_follow_counts() {
        let (store, ingestor) = setup().await;
        ingestor
            .ingest(&game("g1", "alice", "bob", "white", &["e4", "e5", "Nf3"]))
            .await
            .unwrap();
        ingestor
            .ingest(&game("g2", "alice", "bob", "white", &["d4", "d5", "c4"]))
            .await
            .unwrap();
        ingestor
            .ingest(&game("g3", "alice", "bob", "white", &["e4", "e5", "Nf3"]))
            .await
            .unwrap();
        assert_eq!(
            store.get(keys::MOST_COMMON_SEQUENCE).await.unwrap(),
            Some("e4>e5>Nf3".into())
        );
        // The pointer still names d4>d5>c4 (count 1) because g3 only saw a
        // count-2 sequence, which does not beat it.
        assert_eq!(
            store.get(keys::LEAST_COMMON_SEQUENCE).await.unwrap(),
            Some("d4>d5>c4".into())
        );
    }

    #[tokio::test]
    async fn test_short_game_keeps_sequence_pointers_unset() {
        let (store, ingestor) = setup().await;
        ingestor
            .ingest(&game("g1", "alice", "bob", "white", &["e4", "e5"]))
            .await
            .unwrap();
        assert!(!store.exists(keys::MOST_COMMON_SEQUENCE).await.unwrap());
        assert!(!store.exists(keys::LEAST_COMMON_SEQUENCE).await.unwrap());
    }

    #[tokio::test]
    async fn test_expiry_after_ingest_keeps_game_and_counters() {
        let store = Arc::new(MemoryStore::new());
        for player in ["alice", "bob"] {
            store
                .set(&keys::player(player), &format!("{player}@example.com"))
                .await
                .unwrap();
            store.set_add(keys::PLAYERS, player).await.unwrap();
        }
        let schedules = Arc::new(ScheduleManager::new(
            store.clone(),
            ScheduleConfig::default(),
        ));
        let ingestor = MatchIngestor::new(store.clone(), schedules.clone());
        let scheduled = ScheduledMatch::new("g1", "alice", "bob");
        schedules.schedule(&scheduled).await.unwrap();

        // The timer fired and its job is waiting in the queue while the
        // result arrives.
        ingestor
            .ingest(&game("g1", "alice", "bob", "white", &["e4", "e5", "Nf3"]))
            .await
            .unwrap();
        let body = store.get(&keys::game("g1")).await.unwrap();
        let retired = crate::schedule::expire_scheduled(store.as_ref(), &scheduled)
            .await
            .unwrap();

        assert!(!retired);
        assert_eq!(store.get(&keys::game("g1")).await.unwrap(), body);
        assert!(body.is_some());
        assert_eq!(store.get(&keys::wins("alice")).await.unwrap(), Some("1".into()));
        assert_eq!(store.get(&keys::losses("bob")).await.unwrap(), Some("1".into()));
        assert_eq!(store.get(&keys::opening("C20")).await.unwrap(), Some("1".into()));
        assert!(store
            .set_contains(&keys::player_games("alice"), "g1")
            .await
            .unwrap());
        assert!(store.set_members(keys::SCHEDULED_GAMES).await.unwrap().is_empty());
        assert!(!store.exists(&keys::scheduled_game("g1")).await.unwrap());
        schedules.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_player_rejected_without_writes() {
        let (store, ingestor) = setup().await;
        let err = ingestor
            .ingest(&game("g1", "alice", "mallory", "white", &["e4"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::UnknownPlayer(ref p) if p == "mallory"));
        assert!(err.is_data_quality());
        assert!(!store.exists(&keys::game("g1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_move_rejected() {
        let (store, ingestor) = setup().await;
        let err = ingestor
            .ingest(&game("g1", "alice", "bob", "white", &["e4", "zz9"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidMove { ref token, .. } if token == "zz9"));
        assert!(!store.exists(&keys::player_games("alice")).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_outage_aborts_ingest() {
        let (store, ingestor) = setup().await;
        store.set_offline(true);
        let err = ingestor
            .ingest(&game("g1", "alice", "bob", "white", &["e4"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::Store(_)));
        assert!(!err.is_data_quality());
    }

    #[test]
    fn test_canonical_pair_is_symmetric() {
        assert_eq!(canonical_pair("bob", "alice"), ("alice", "bob"));
        assert_eq!(canonical_pair("alice", "bob"), ("alice", "bob"));
    }
}
