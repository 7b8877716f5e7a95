//! Fail-open counter reads.
//!
//! Absent or non-numeric counters read as `None`; callers pick the neutral
//! value (0 for maxima, +infinity for minima). Store failures still propagate.

use crate::store::{KeyValueStore, StoreError};

pub async fn read_optional_counter<S: KeyValueStore>(
    store: &S,
    key: &str,
) -> Result<Option<i64>, StoreError> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };
    match raw.trim().parse::<i64>() {
        Ok(n) => Ok(Some(n)),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring non-numeric counter");
            Ok(None)
        }
    }
}

/// Counter value with missing/malformed treated as zero.
pub async fn read_counter<S: KeyValueStore>(store: &S, key: &str) -> Result<i64, StoreError> {
    Ok(read_optional_counter(store, key).await?.unwrap_or(0))
}
