//! Scheduled-game lifecycle.
//!
//! A scheduled game moves from `scheduled` to exactly one of `ingested`,
//! `expired` or `withdrawn`. Every exit path removes the same indices, and
//! removal is idempotent, so an expiry racing with ingestion is harmless.

pub mod timer;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::keys;
use crate::store::KeyValueStore;
use crate::types::ScheduledMatch;

pub use timer::{ExpiryFuture, ExpiryHandler, ExpiryScheduler};

/// How long a scheduled game stays open before it expires.
pub const SCHEDULE_HORIZON: Duration = Duration::from_secs(72 * 60 * 60);

/// Configuration for the scheduled-game manager.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub horizon: Duration,
    /// Number of concurrent expiry workers.
    pub worker_count: usize,
    /// Fired timers waiting for a worker.
    pub queue_capacity: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            horizon: SCHEDULE_HORIZON,
            worker_count: 5,
            queue_capacity: 64,
        }
    }
}

/// Terminal states of a scheduled game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    Ingested,
    Expired,
    Withdrawn,
}

impl std::fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Ingested => "ingested",
            Self::Expired => "expired",
            Self::Withdrawn => "withdrawn",
        };
        f.write_str(label)
    }
}

/// Outcome of [`ScheduleManager::recover_pending_schedules`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub rearmed: usize,
    pub cleaned: usize,
}

/// Owns the expiry timers and the scheduled-game indices.
pub struct ScheduleManager<S> {
    store: Arc<S>,
    scheduler: ExpiryScheduler,
    config: ScheduleConfig,
}

impl<S: KeyValueStore + 'static> ScheduleManager<S> {
    /// Create the manager and start its expiry workers.
    pub fn new(store: Arc<S>, config: ScheduleConfig) -> Self {
        let handler_store = store.clone();
        let handler: ExpiryHandler = Arc::new(move |scheduled: ScheduledMatch| -> ExpiryFuture {
            let store = handler_store.clone();
            Box::pin(async move {
                if let Err(e) = expire_scheduled(store.as_ref(), &scheduled).await {
                    tracing::error!(
                        game_id = %scheduled.game_id,
                        "Failed to expire scheduled game: {}",
                        e
                    );
                }
            })
        });
        let scheduler =
            ExpiryScheduler::start(config.worker_count, config.queue_capacity, handler);

        tracing::info!(
            horizon_secs = config.horizon.as_secs(),
            worker_count = config.worker_count,
            "Schedule manager initialized"
        );

        Self {
            store,
            scheduler,
            config,
        }
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Register a scheduled game and arm its expiry.
    pub async fn schedule(&self, scheduled: &ScheduledMatch) -> AnalyticsResult<()> {
        if scheduled.game_id.trim().is_empty() {
            return Err(AnalyticsError::MalformedMatch {
                game_id: scheduled.game_id.clone(),
                reason: "empty game id".to_string(),
            });
        }
        for player in [&scheduled.player_1, &scheduled.player_2] {
            if !self.store.exists(&keys::player(player)).await? {
                tracing::warn!(game_id = %scheduled.game_id, player = %player, "Schedule references unknown player");
                return Err(AnalyticsError::UnknownPlayer(player.clone()));
            }
        }

        let store = self.store.as_ref();
        let record_key = keys::scheduled_game(&scheduled.game_id);
        store.set(&record_key, &scheduled.to_body()?).await?;
        store
            .set_add(keys::SCHEDULED_GAMES, &scheduled.game_id)
            .await?;
        for player in [&scheduled.player_1, &scheduled.player_2] {
            store
                .set_add(&keys::player_scheduled_games(player), &scheduled.game_id)
                .await?;
        }
        store.expire(&record_key, self.config.horizon).await?;

        self.scheduler
            .arm(scheduled.clone(), self.config.horizon)
            .await
    }

    /// Retire a scheduled game because its result was ingested. No-op when
    /// nothing was scheduled under `game_id`.
    pub async fn complete(&self, game_id: &str, white: &str, black: &str) -> AnalyticsResult<bool> {
        let cancelled = self.scheduler.cancel(game_id).await;
        let mut players = vec![white.to_string(), black.to_string()];
        if let Some(stored) = self.load(game_id).await? {
            players.push(stored.player_1);
            players.push(stored.player_2);
        }
        let players: Vec<&str> = players.iter().map(String::as_str).collect();
        let was_indexed = retire(
            self.store.as_ref(),
            game_id,
            &players,
            ScheduleState::Ingested,
        )
        .await?;
        Ok(cancelled || was_indexed)
    }

    /// Withdraw a scheduled game before it is played or expires.
    ///
    /// Returns `false` when `game_id` was not scheduled.
    pub async fn withdraw(&self, game_id: &str) -> AnalyticsResult<bool> {
        let cancelled = self.scheduler.cancel(game_id).await;
        let players = match self.load(game_id).await? {
            Some(stored) => vec![stored.player_1, stored.player_2],
            None => {
                tracing::warn!(game_id = %game_id, "Scheduled record missing, clearing global index only");
                vec![]
            }
        };
        let players: Vec<&str> = players.iter().map(String::as_str).collect();
        let was_indexed = retire(
            self.store.as_ref(),
            game_id,
            &players,
            ScheduleState::Withdrawn,
        )
        .await?;
        Ok(cancelled || was_indexed)
    }

    /// The stored schedule for `game_id`, if it is still pending.
    pub async fn load(&self, game_id: &str) -> AnalyticsResult<Option<ScheduledMatch>> {
        match self.store.get(&keys::scheduled_game(game_id)).await? {
            Some(body) => match ScheduledMatch::from_body(game_id, &body) {
                Ok(scheduled) => Ok(Some(scheduled)),
                Err(e) => {
                    tracing::warn!(game_id = %game_id, "Ignoring malformed scheduled record: {}", e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub async fn is_timer_armed(&self, game_id: &str) -> bool {
        self.scheduler.is_armed(game_id).await
    }

    /// Re-arm timers for schedules that survived a restart.
    ///
    /// Records still present are re-armed for their remaining TTL, or for
    /// the full horizon when the TTL was lost. Index entries whose record is
    /// gone expired while nothing was running and are cleaned up now.
    pub async fn recover_pending_schedules(&self) -> AnalyticsResult<RecoveryReport> {
        let store = self.store.as_ref();
        let mut report = RecoveryReport::default();
        let mut pending: Vec<String> = store
            .set_members(keys::SCHEDULED_GAMES)
            .await?
            .into_iter()
            .collect();
        pending.sort();

        let mut all_players: Option<Vec<String>> = None;
        for game_id in pending {
            let Some(scheduled) = self.load(&game_id).await? else {
                // The record held the player pair; without it every
                // player's scheduled set has to be checked.
                if all_players.is_none() {
                    let mut players: Vec<String> =
                        store.set_members(keys::PLAYERS).await?.into_iter().collect();
                    players.sort();
                    all_players = Some(players);
                }
                let players: Vec<&str> = all_players
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(String::as_str)
                    .collect();
                retire(store, &game_id, &players, ScheduleState::Expired).await?;
                report.cleaned += 1;
                continue;
            };

            let record_key = keys::scheduled_game(&game_id);
            let delay = match store.ttl(&record_key).await? {
                Some(remaining) => remaining,
                None => {
                    store.expire(&record_key, self.config.horizon).await?;
                    self.config.horizon
                }
            };
            tracing::info!(game_id = %game_id, delay_secs = delay.as_secs(), "Recovering scheduled game");
            self.scheduler.arm(scheduled, delay).await?;
            report.rearmed += 1;
        }

        if report.rearmed > 0 || report.cleaned > 0 {
            tracing::info!(
                rearmed = report.rearmed,
                cleaned = report.cleaned,
                "Schedule recovery complete"
            );
        } else {
            tracing::debug!("Schedule recovery complete, nothing pending");
        }
        Ok(report)
    }

    /// Cancel all pending timers. Stored schedules keep their TTLs so a later
    /// [`recover_pending_schedules`](Self::recover_pending_schedules) can
    /// re-arm them.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}

/// Expiry action run by the timer workers. Only schedule keys are touched,
/// so a game ingested after its timer fired keeps its record and counters.
pub(crate) async fn expire_scheduled<S: KeyValueStore>(
    store: &S,
    scheduled: &ScheduledMatch,
) -> AnalyticsResult<bool> {
    let players = [scheduled.player_1.as_str(), scheduled.player_2.as_str()];
    retire(store, &scheduled.game_id, &players, ScheduleState::Expired).await
}

/// Remove every index entry for `game_id`. Returns whether it was still in
/// the global scheduled set.
async fn retire<S: KeyValueStore>(
    store: &S,
    game_id: &str,
    players: &[&str],
    state: ScheduleState,
) -> AnalyticsResult<bool> {
    let was_indexed = store.set_contains(keys::SCHEDULED_GAMES, game_id).await?;

    store.delete(&keys::scheduled_game(game_id)).await?;
    store.set_remove(keys::SCHEDULED_GAMES, game_id).await?;
    let unique: BTreeSet<&str> = players.iter().copied().collect();
    for player in unique {
        store
            .set_remove(&keys::player_scheduled_games(player), game_id)
            .await?;
    }

    if was_indexed {
        tracing::info!(game_id = %game_id, state = %state, "Scheduled game retired");
    } else {
        tracing::debug!(game_id = %game_id, state = %state, "Scheduled game already retired");
    }
    Ok(was_indexed)
}
