//! Process-wide extremum pointers.
//!
//! Each pointer names the current record holder; its count lives under the
//! holder's own counter key. Ties go to the incoming candidate (`>=` for
//! maxima, `<=` for minima), so the most recently updated value wins. A
//! pointer that is unset, or whose counter is missing, is replaced
//! unconditionally.

use std::collections::HashMap;

use crate::counters::read_optional_counter;
use crate::keys;
use crate::store::{KeyValueStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Max,
    Min,
}

impl Extremum {
    fn replaces(self, candidate: i64, current: i64) -> bool {
        match self {
            Self::Max => candidate >= current,
            Self::Min => candidate <= current,
        }
    }
}

/// Compare `candidate` against the record holder at `pointer_key` and take
/// over the pointer if it wins. `fresh` holds counts already computed in this
/// ingestion, consulted before the store. Returns whether the pointer moved.
pub async fn update_pointer<S, F>(
    store: &S,
    pointer_key: &str,
    counter_key: F,
    kind: Extremum,
    candidate: &str,
    candidate_count: i64,
    fresh: Option<&HashMap<String, i64>>,
) -> Result<bool, StoreError>
where
    S: KeyValueStore,
    F: Fn(&str) -> String,
{
    let current_count = match store.get(pointer_key).await? {
        Some(holder) => match fresh.and_then(|f| f.get(&holder)) {
            Some(count) => Some(*count),
            None => read_optional_counter(store, &counter_key(&holder)).await?,
        },
        None => None,
    };

    let replace = match current_count {
        Some(current) => kind.replaces(candidate_count, current),
        None => true,
    };
    if replace {
        store.set(pointer_key, candidate).await?;
    }
    Ok(replace)
}

/// Replace the shortest-game pointer when `turns` is less than or equal to
/// the recorded turn count. A missing count counts as +infinity.
pub async fn update_shortest_game<S: KeyValueStore>(
    store: &S,
    game_id: &str,
    turns: u32,
) -> Result<bool, StoreError> {
    let current = read_optional_counter(store, keys::SHORTEST_GAME_TURNS).await?;
    let replace = current.map_or(true, |c| i64::from(turns) <= c);
    if replace {
        store
            .set(keys::SHORTEST_GAME_TURNS, &turns.to_string())
            .await?;
        store.set(keys::SHORTEST_GAME, game_id).await?;
    }
    Ok(replace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_unset_pointer_takes_candidate() {
        let store = MemoryStore::new();
        let moved = update_pointer(
            &store,
            keys::MOST_FREQUENT_OPENING,
            keys::opening,
            Extremum::Max,
            "C20",
            1,
            None,
        )
        .await
        .unwrap();
        assert!(moved);
        assert_eq!(
            store.get(keys::MOST_FREQUENT_OPENING).await.unwrap(),
            Some("C20".to_string())
        );
    }

    #[tokio::test]
    async fn test_max_tie_favors_candidate() {
        let store = MemoryStore::new();
        store.set(keys::MOST_FREQUENT_OPENING, "C20").await.unwrap();
        store.set(&keys::opening("C20"), "3").await.unwrap();
        let moved = update_pointer(
            &store,
            keys::MOST_FREQUENT_OPENING,
            keys::opening,
            Extremum::Max,
            "B01",
            3,
            None,
        )
        .await
        .unwrap();
        assert!(moved);

        let moved = update_pointer(
            &store,
            keys::MOST_FREQUENT_OPENING,
            keys::opening,
            Extremum::Max,
            "A00",
            2,
            None,
        )
        .await
        .unwrap();
        assert!(!moved);
        assert_eq!(
            store.get(keys::MOST_FREQUENT_OPENING).await.unwrap(),
            Some("B01".to_string())
        );
    }

    #[tokio::test]
    async fn test_min_tie_favors_candidate() {
        let store = MemoryStore::new();
        store.set(keys::LEAST_COMMON_SEQUENCE, "a>b>c").await.unwrap();
        store.set(&keys::sequence("a>b>c"), "1").await.unwrap();
        let moved = update_pointer(
            &store,
            keys::LEAST_COMMON_SEQUENCE,
            keys::sequence,
            Extremum::Min,
            "d>e>f",
            1,
            None,
        )
        .await
        .unwrap();
        assert!(moved);
        let moved = update_pointer(
            &store,
            keys::LEAST_COMMON_SEQUENCE,
            keys::sequence,
            Extremum::Min,
            "g>h>i",
            2,
            None,
        )
        .await
        .unwrap();
        assert!(!moved);
    }

    #[tokio::test]
    async fn test_holder_with_missing_counter_is_replaced() {
        let store = MemoryStore::new();
        store.set(keys::MOST_COMMON_SEQUENCE, "x>y>z").await.unwrap();
        let moved = update_pointer(
            &store,
            keys::MOST_COMMON_SEQUENCE,
            keys::sequence,
            Extremum::Max,
            "a>b>c",
            1,
            None,
        )
        .await
        .unwrap();
        assert!(moved);
    }

    #[tokio::test]
    async fn test_fresh_counts_take_precedence() {
        let store = MemoryStore::new();
        store.set(keys::MOST_COMMON_SEQUENCE, "x>y>z").await.unwrap();
        store.set(&keys::sequence("x>y>z"), "1").await.unwrap();
        let fresh = HashMap::from([("x>y>z".to_string(), 5)]);
        let moved = update_pointer(
            &store,
            keys::MOST_COMMON_SEQUENCE,
            keys::sequence,
            Extremum::Max,
            "a>b>c",
            4,
            Some(&fresh),
        )
        .await
        .unwrap();
        assert!(!moved);
    }

    #[tokio::test]
    async fn test_shortest_game_ties_favor_latest() {
        let store = MemoryStore::new();
        assert!(update_shortest_game(&store, "m1", 40).await.unwrap());
        assert!(update_shortest_game(&store, "m2", 25).await.unwrap());
        assert!(!update_shortest_game(&store, "m4", 30).await.unwrap());
        assert!(update_shortest_game(&store, "m3", 25).await.unwrap());
        assert_eq!(
            store.get(keys::SHORTEST_GAME).await.unwrap(),
            Some("m3".to_string())
        );
        assert_eq!(
            store.get(keys::SHORTEST_GAME_TURNS).await.unwrap(),
            Some("25".to_string())
        );
    }

    #[tokio::test]
    async fn test_shortest_game_malformed_turns_is_infinity() {
        let store = MemoryStore::new();
        store.set(keys::SHORTEST_GAME_TURNS, "lots").await.unwrap();
        assert!(update_shortest_game(&store, "m1", 500).await.unwrap());
    }
}
