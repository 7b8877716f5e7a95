use std::collections::HashMap;

use crate::counters::read_counter;
use crate::keys;
use crate::moves::{has_check_marker, sequence_windows};
use crate::store::{KeyValueStore, StoreError};

/// Per-ingestion tally of three-move sequences.
///
/// Each sequence is seeded from its persisted global count the first time it
/// is seen in this game, then incremented once per occurrence. Insertion
/// order is kept so extremum selection within one game is deterministic
/// (first seen wins a tie).
#[derive(Debug, Default)]
pub struct SequenceTally {
    order: Vec<String>,
    counts: HashMap<String, i64>,
}

impl SequenceTally {
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn counts(&self) -> &HashMap<String, i64> {
        &self.counts
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.order
            .iter()
            .map(|s| (s.as_str(), self.counts.get(s).copied().unwrap_or(0)))
    }

    pub fn max(&self) -> Option<(&str, i64)> {
        self.iter().fold(None, |best, (seq, count)| match best {
            Some((_, c)) if c >= count => best,
            _ => Some((seq, count)),
        })
    }

    pub fn min(&self) -> Option<(&str, i64)> {
        self.iter().fold(None, |best, (seq, count)| match best {
            Some((_, c)) if c <= count => best,
            _ => Some((seq, count)),
        })
    }

    fn bump(&mut self, sequence: String, seed: i64) {
        match self.counts.get_mut(&sequence) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(sequence.clone(), seed + 1);
                self.order.push(sequence);
            }
        }
    }
}

/// Result of scanning one game's moves.
#[derive(Debug, Default)]
pub struct MoveScan {
    pub tally: SequenceTally,
    pub check_count: u32,
}

/// Walk every three-move window, seeding the tally from the store and
/// counting check markers.
///
/// A window contributes a check when its first move carries a marker; the
/// final two moves never start a window and are counted afterwards.
pub async fn scan_moves<S: KeyValueStore>(
    store: &S,
    moves: &[String],
) -> Result<MoveScan, StoreError> {
    let mut scan = MoveScan::default();

    for (i, sequence) in sequence_windows(moves).enumerate() {
        let seed = if scan.tally.counts.contains_key(&sequence) {
            0
        } else {
            read_counter(store, &keys::sequence(&sequence)).await?
        };
        scan.tally.bump(sequence, seed);
        if has_check_marker(&moves[i]) {
            scan.check_count += 1;
        }
    }

    let tail_start = moves.len().saturating_sub(2);
    scan.check_count += moves[tail_start..]
        .iter()
        .filter(|m| has_check_marker(m))
        .count() as u32;

    Ok(scan)
}
