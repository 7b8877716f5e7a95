use crate::counters::read_counter;
use crate::store::{KeyValueStore, StoreError};
use crate::types::RankedPlayer;

/// Maximum number of players kept on a leaderboard.
pub const LEADERBOARD_SIZE: usize = 10;

/// Rebuild a bounded leaderboard list from scratch.
///
/// Candidates are the current list members plus `affected`, each ranked by the
/// counter at `counter_key(player)` as read now. The sort is stable, so equal
/// counts keep list order (newcomers rank after existing members on ties).
/// The list is rewritten in full.
pub async fn rebuild_leaderboard<S, F>(
    store: &S,
    list_key: &str,
    counter_key: F,
    affected: &str,
) -> Result<Vec<RankedPlayer>, StoreError>
where
    S: KeyValueStore,
    F: Fn(&str) -> String,
{
    let mut candidates: Vec<String> = Vec::with_capacity(LEADERBOARD_SIZE + 1);
    for member in store.list_range(list_key, 0, -1).await? {
        if !candidates.contains(&member) {
            candidates.push(member);
        }
    }
    if !candidates.iter().any(|p| p == affected) {
        candidates.push(affected.to_string());
    }

    let mut ranked = Vec::with_capacity(candidates.len());
    for player_id in candidates {
        let count = read_counter(store, &counter_key(&player_id)).await?;
        ranked.push(RankedPlayer { player_id, count });
    }
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(LEADERBOARD_SIZE);

    store.delete(list_key).await?;
    for entry in &ranked {
        store.list_push(list_key, &entry.player_id).await?;
    }

    tracing::debug!(
        list_key,
        size = ranked.len(),
        leader = ranked.first().map(|r| r.player_id.as_str()),
        "Leaderboard rebuilt"
    );
    Ok(ranked)
}
