//! Read-side views over the maintained analytics.
//!
//! Nothing here writes. Pointers whose backing counter is missing read as
//! absent rather than as an error.

use std::sync::Arc;

use crate::counters::{read_counter, read_optional_counter};
use crate::error::AnalyticsResult;
use crate::keys;
use crate::moves::sequence_key;
use crate::store::KeyValueStore;
use crate::types::{CountedValue, MatchRecord, RankedPlayer, ScheduledMatch, ShortestGame};

pub struct AnalyticsQueries<S> {
    store: Arc<S>,
}

impl<S: KeyValueStore> AnalyticsQueries<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Leading `limit` entries of the top leaderboard with their win counts.
    pub async fn top_players(&self, limit: usize) -> AnalyticsResult<Vec<RankedPlayer>> {
        self.leaderboard(keys::TOP_PLAYERS, keys::wins, limit).await
    }

    /// Leading `limit` entries of the bottom leaderboard with their loss counts.
    pub async fn bottom_players(&self, limit: usize) -> AnalyticsResult<Vec<RankedPlayer>> {
        self.leaderboard(keys::BOTTOM_PLAYERS, keys::losses, limit)
            .await
    }

    async fn leaderboard(
        &self,
        list_key: &str,
        counter_key: fn(&str) -> String,
        limit: usize,
    ) -> AnalyticsResult<Vec<RankedPlayer>> {
        if limit == 0 {
            return Ok(vec![]);
        }
        let end = i64::try_from(limit).unwrap_or(i64::MAX) - 1;
        let store = self.store.as_ref();
        let mut ranked = Vec::new();
        for player_id in store.list_range(list_key, 0, end).await? {
            let count = read_counter(store, &counter_key(&player_id)).await?;
            ranked.push(RankedPlayer { player_id, count });
        }
        Ok(ranked)
    }

    pub async fn shortest_game(&self) -> AnalyticsResult<Option<ShortestGame>> {
        let store = self.store.as_ref();
        let Some(game_id) = store.get(keys::SHORTEST_GAME).await? else {
            return Ok(None);
        };
        let turns = read_optional_counter(store, keys::SHORTEST_GAME_TURNS)
            .await?
            .and_then(|t| u32::try_from(t).ok());
        Ok(turns.map(|turns| ShortestGame { game_id, turns }))
    }

    /// Check markers counted when `game_id` was ingested.
    pub async fn check_count(&self, game_id: &str) -> AnalyticsResult<Option<u32>> {
        let count = read_optional_counter(self.store.as_ref(), &keys::game_check_count(game_id))
            .await?;
        Ok(count.and_then(|c| u32::try_from(c).ok()))
    }

    pub async fn most_frequent_opening(&self) -> AnalyticsResult<Option<CountedValue>> {
        self.pointer(keys::MOST_FREQUENT_OPENING, keys::opening)
            .await
    }

    pub async fn most_common_sequence(&self) -> AnalyticsResult<Option<CountedValue>> {
        self.pointer(keys::MOST_COMMON_SEQUENCE, keys::sequence)
            .await
    }

    pub async fn least_common_sequence(&self) -> AnalyticsResult<Option<CountedValue>> {
        self.pointer(keys::LEAST_COMMON_SEQUENCE, keys::sequence)
            .await
    }

    async fn pointer(
        &self,
        pointer_key: &str,
        counter_key: fn(&str) -> String,
    ) -> AnalyticsResult<Option<CountedValue>> {
        let store = self.store.as_ref();
        let Some(value) = store.get(pointer_key).await? else {
            return Ok(None);
        };
        let count = read_optional_counter(store, &counter_key(&value)).await?;
        Ok(count.map(|count| CountedValue { value, count }))
    }

    /// The opening `player` has used most. Ties go to the lexicographically
    /// smallest code.
    pub async fn player_most_used_opening(
        &self,
        player: &str,
    ) -> AnalyticsResult<Option<CountedValue>> {
        let store = self.store.as_ref();
        let mut openings: Vec<String> = store
            .set_members(&keys::player_openings(player))
            .await?
            .into_iter()
            .collect();
        openings.sort();

        let mut best: Option<CountedValue> = None;
        for opening in openings {
            let count = read_counter(store, &keys::player_opening_count(player, &opening)).await?;
            if best.as_ref().map_or(true, |b| count > b.count) {
                best = Some(CountedValue {
                    value: opening,
                    count,
                });
            }
        }
        Ok(best)
    }

    /// Every resolvable game `player` took part in, ordered by game id.
    pub async fn match_history(&self, player: &str) -> AnalyticsResult<Vec<MatchRecord>> {
        let store = self.store.as_ref();
        let mut game_ids: Vec<String> = store
            .set_members(&keys::player_games(player))
            .await?
            .into_iter()
            .collect();
        game_ids.sort();

        let mut history = Vec::with_capacity(game_ids.len());
        for game_id in game_ids {
            match self.game(&game_id).await? {
                Some(record) => history.push(record),
                None => tracing::warn!(player, game_id = %game_id, "Game missing from history"),
            }
        }
        Ok(history)
    }

    /// A stored game, or `None` when it is missing or cannot be decoded.
    pub async fn game(&self, game_id: &str) -> AnalyticsResult<Option<MatchRecord>> {
        let Some(body) = self.store.get(&keys::game(game_id)).await? else {
            return Ok(None);
        };
        match MatchRecord::from_body(game_id, &body) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(game_id = %game_id, "Malformed game record: {}", e);
                Ok(None)
            }
        }
    }

    /// Pending scheduled games for `player`. Entries whose record already
    /// expired are left out.
    pub async fn scheduled_games(&self, player: &str) -> AnalyticsResult<Vec<ScheduledMatch>> {
        let store = self.store.as_ref();
        let mut ids: Vec<String> = store
            .set_members(&keys::player_scheduled_games(player))
            .await?
            .into_iter()
            .collect();
        ids.sort();

        let mut pending = Vec::new();
        for game_id in ids {
            let Some(body) = store.get(&keys::scheduled_game(&game_id)).await? else {
                continue;
            };
            match ScheduledMatch::from_body(&game_id, &body) {
                Ok(scheduled) => pending.push(scheduled),
                Err(e) => {
                    tracing::warn!(game_id = %game_id, "Malformed scheduled record: {}", e)
                }
            }
        }
        Ok(pending)
    }

    /// Ids in the global scheduled set, sorted.
    pub async fn all_scheduled_games(&self) -> AnalyticsResult<Vec<String>> {
        let mut ids: Vec<String> = self
            .store
            .set_members(keys::SCHEDULED_GAMES)
            .await?
            .into_iter()
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Games played between two players, from either side.
    pub async fn games_between(&self, first: &str, second: &str) -> AnalyticsResult<Vec<String>> {
        let store = self.store.as_ref();
        let mut games = store.set_members(&keys::player_versus(first, second)).await?;
        if first != second {
            games.extend(store.set_members(&keys::player_versus(second, first)).await?);
        }
        let mut games: Vec<String> = games.into_iter().collect();
        games.sort();
        Ok(games)
    }

    /// Games containing the three consecutive moves `m1 m2 m3`.
    pub async fn search_sequence_in_all_games(
        &self,
        m1: &str,
        m2: &str,
        m3: &str,
    ) -> AnalyticsResult<Vec<String>> {
        let sequence = sequence_key(m1, m2, m3);
        let mut games: Vec<String> = self
            .store
            .set_members(&keys::sequence_games(&sequence))
            .await?
            .into_iter()
            .collect();
        games.sort();
        Ok(games)
    }

    /// [`search_sequence_in_all_games`](Self::search_sequence_in_all_games)
    /// limited to games `player` took part in.
    pub async fn search_sequence_in_player_games(
        &self,
        player: &str,
        m1: &str,
        m2: &str,
        m3: &str,
    ) -> AnalyticsResult<Vec<String>> {
        let store = self.store.as_ref();
        let sequence = sequence_key(m1, m2, m3);
        let with_sequence = store.set_members(&keys::sequence_games(&sequence)).await?;
        let played = store.set_members(&keys::player_games(player)).await?;
        let mut games: Vec<String> = with_sequence.intersection(&played).cloned().collect();
        games.sort();
        Ok(games)
    }
}
