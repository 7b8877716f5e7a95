//! Player graph queries.
//!
//! The graph is never materialized. A player's neighbours are the opponents
//! named in the games of `player:<id>:games`, resolved on demand. Games that
//! are missing or fail to decode are skipped with a warning.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::counters::read_counter;
use crate::error::AnalyticsResult;
use crate::keys;
use crate::store::KeyValueStore;
use crate::types::MatchRecord;

/// Read-only traversal over the opponent relation.
pub struct PlayerGraph<S> {
    store: Arc<S>,
}

impl<S: KeyValueStore> PlayerGraph<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Every player `player` has faced at least once.
    pub async fn opponents(&self, player: &str) -> AnalyticsResult<HashSet<String>> {
        let store = self.store.as_ref();
        let mut opponents = HashSet::new();
        for game_id in store.set_members(&keys::player_games(player)).await? {
            let Some(body) = store.get(&keys::game(&game_id)).await? else {
                tracing::warn!(player, game_id = %game_id, "Skipping game with no stored record");
                continue;
            };
            let record = match MatchRecord::from_body(&game_id, &body) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(player, game_id = %game_id, "Skipping malformed game record: {}", e);
                    continue;
                }
            };
            match record.opponent_of(player) {
                Some(opponent) if opponent != player => {
                    opponents.insert(opponent.to_string());
                }
                Some(_) => {}
                None => {
                    tracing::warn!(player, game_id = %game_id, "Game does not involve player, skipping");
                }
            }
        }
        Ok(opponents)
    }

    /// Players exactly two opponent-hops from `player`, excluding `player`
    /// and its direct opponents.
    pub async fn friends_of_friends(&self, player: &str) -> AnalyticsResult<HashSet<String>> {
        let direct = self.opponents(player).await?;
        let mut result = HashSet::new();
        for friend in &direct {
            for candidate in self.opponents(friend).await? {
                if candidate != player && !direct.contains(&candidate) {
                    result.insert(candidate);
                }
            }
        }
        tracing::debug!(player, direct = direct.len(), found = result.len(), "Friends of friends resolved");
        Ok(result)
    }

    /// [`friends_of_friends`](Self::friends_of_friends) restricted to players
    /// with strictly more wins than `player`. Missing win counters read as 0.
    pub async fn stronger_friends_of_friends(
        &self,
        player: &str,
    ) -> AnalyticsResult<HashSet<String>> {
        let store = self.store.as_ref();
        let own_wins = read_counter(store, &keys::wins(player)).await?;
        let mut stronger = HashSet::new();
        for candidate in self.friends_of_friends(player).await? {
            if read_counter(store, &keys::wins(&candidate)).await? > own_wins {
                stronger.insert(candidate);
            }
        }
        Ok(stronger)
    }

    /// Size of the largest set of players transitively linked by games.
    ///
    /// Every registered player starts a traversal unless an earlier one
    /// already reached it, so a player with no games counts as a component
    /// of size 1. Returns 0 when no players are registered.
    pub async fn largest_connected_component(&self) -> AnalyticsResult<usize> {
        let mut players: Vec<String> = self
            .store
            .set_members(keys::PLAYERS)
            .await?
            .into_iter()
            .collect();
        players.sort();

        let mut visited: HashSet<String> = HashSet::with_capacity(players.len());
        let mut largest = 0;
        let mut components = 0;

        for start in players {
            if visited.contains(&start) {
                continue;
            }
            let mut queue = VecDeque::new();
            visited.insert(start.clone());
            queue.push_back(start);
            let mut size = 0;

            while let Some(current) = queue.pop_front() {
                size += 1;
                for neighbour in self.opponents(&current).await? {
                    if visited.insert(neighbour.clone()) {
                        queue.push_back(neighbour);
                    }
                }
            }
            components += 1;
            largest = largest.max(size);
        }

        tracing::debug!(components, largest, "Connected components traversed");
        Ok(largest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Winner;

    async fn add_player(store: &MemoryStore, id: &str) {
        store
            .set(&keys::player(id), &format!("{id}@example.com"))
            .await
            .unwrap();
        store.set_add(keys::PLAYERS, id).await.unwrap();
    }

    /// Store a game and link it to both players, bypassing ingestion.
    async fn add_game(store: &MemoryStore, id: &str, white: &str, black: &str) {
        let record = MatchRecord {
            game_id: id.to_string(),
            moves: vec!["e4".to_string()],
            winner: Winner::White,
            victory_status: "resign".to_string(),
            turns: 1,
            white_player_id: white.to_string(),
            black_player_id: black.to_string(),
            opening: "B00".to_string(),
        };
        store
            .set(&keys::game(id), &record.to_body().unwrap())
            .await
            .unwrap();
        store.set_add(&keys::player_games(white), id).await.unwrap();
        store.set_add(&keys::player_games(black), id).await.unwrap();
    }

    fn names(set: &HashSet<String>) -> Vec<&str> {
        let mut names: Vec<&str> = set.iter().map(String::as_str).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_friends_of_friends_excludes_self_and_direct() {
        let store = Arc::new(MemoryStore::new());
        for p in ["a", "b", "c", "d", "e"] {
            add_player(&store, p).await;
        }
        // a-b (twice), a-c, b-c, b-d, c-e
        add_game(&store, "g1", "a", "b").await;
        add_game(&store, "g2", "c", "a").await;
        add_game(&store, "g3", "b", "c").await;
        add_game(&store, "g4", "b", "d").await;
        add_game(&store, "g5", "e", "c").await;
        add_game(&store, "g6", "a", "b").await;

        let graph = PlayerGraph::new(store);
        let fof = graph.friends_of_friends("a").await.unwrap();
        assert_eq!(names(&fof), vec!["d", "e"]);
        assert!(!fof.contains("a"));
        assert!(!fof.contains("b"));
    }

    #[tokio::test]
    async fn test_stronger_friends_of_friends() {
        let store = Arc::new(MemoryStore::new());
        for p in ["a", "b", "c", "d"] {
            add_player(&store, p).await;
        }
        add_game(&store, "g1", "a", "b").await;
        add_game(&store, "g2", "b", "c").await;
        add_game(&store, "g3", "b", "d").await;
        store.set(&keys::wins("a"), "2").await.unwrap();
        store.set(&keys::wins("c"), "3").await.unwrap();
        store.set(&keys::wins("d"), "2").await.unwrap();

        let graph = PlayerGraph::new(store);
        let stronger = graph.stronger_friends_of_friends("a").await.unwrap();
        assert_eq!(names(&stronger), vec!["c"]);
    }

    #[tokio::test]
    async fn test_missing_wins_count_as_zero() {
        let store = Arc::new(MemoryStore::new());
        for p in ["a", "b", "c"] {
            add_player(&store, p).await;
        }
        add_game(&store, "g1", "a", "b").await;
        add_game(&store, "g2", "b", "c").await;
        store.set(&keys::wins("c"), "1").await.unwrap();

        let graph = PlayerGraph::new(store);
        assert_eq!(
            names(&graph.stronger_friends_of_friends("a").await.unwrap()),
            vec!["c"]
        );
    }

    #[tokio::test]
    async fn test_unresolvable_games_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        for p in ["a", "b"] {
            add_player(&store, p).await;
        }
        add_game(&store, "g1", "a", "b").await;
        store
            .set_add(&keys::player_games("a"), "missing")
            .await
            .unwrap();
        store.set(&keys::game("broken"), "{not json").await.unwrap();
        store
            .set_add(&keys::player_games("a"), "broken")
            .await
            .unwrap();

        let graph = PlayerGraph::new(store);
        assert_eq!(names(&graph.opponents("a").await.unwrap()), vec!["b"]);
    }

    #[tokio::test]
    async fn test_largest_component_counts_isolated_players() {
        let store = Arc::new(MemoryStore::new());
        for p in ["a", "b", "c", "d", "e"] {
            add_player(&store, p).await;
        }
        add_game(&store, "g1", "a", "b").await;
        add_game(&store, "g2", "c", "d").await;

        let graph = PlayerGraph::new(store.clone());
        assert_eq!(graph.largest_connected_component().await.unwrap(), 2);

        add_game(&store, "g3", "b", "c").await;
        assert_eq!(graph.largest_connected_component().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_largest_component_without_players() {
        let graph = PlayerGraph::new(Arc::new(MemoryStore::new()));
        assert_eq!(graph.largest_connected_component().await.unwrap(), 0);

        let store = Arc::new(MemoryStore::new());
        add_player(&store, "solo").await;
        let graph = PlayerGraph::new(store);
        assert_eq!(graph.largest_connected_component().await.unwrap(), 1);
    }
}
