use std::sync::Arc;

use crate::error::AnalyticsResult;
use crate::graph::PlayerGraph;
use crate::ingest::{IngestSummary, MatchIngestor};
use crate::players::PlayerRegistry;
use crate::queries::AnalyticsQueries;
use crate::schedule::{RecoveryReport, ScheduleConfig, ScheduleManager};
use crate::store::KeyValueStore;
use crate::types::{MatchRecord, Player, ScheduledMatch};

/// Everything a driver needs, wired to one store.
///
/// Writes go through the ingestor and the schedule manager; reads through
/// [`queries`](Self::queries) and [`graph`](Self::graph) never block on them.
pub struct AnalyticsService<S> {
    store: Arc<S>,
    players: PlayerRegistry<S>,
    schedules: Arc<ScheduleManager<S>>,
    ingestor: MatchIngestor<S>,
    queries: AnalyticsQueries<S>,
    graph: PlayerGraph<S>,
}

impl<S: KeyValueStore + 'static> AnalyticsService<S> {
    /// Must be called inside a Tokio runtime; the expiry workers start here.
    pub fn new(store: Arc<S>, config: ScheduleConfig) -> Self {
        let schedules = Arc::new(ScheduleManager::new(store.clone(), config));
        Self {
            players: PlayerRegistry::new(store.clone()),
            ingestor: MatchIngestor::new(store.clone(), schedules.clone()),
            queries: AnalyticsQueries::new(store.clone()),
            graph: PlayerGraph::new(store.clone()),
            schedules,
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn players(&self) -> &PlayerRegistry<S> {
        &self.players
    }

    pub fn schedules(&self) -> &ScheduleManager<S> {
        &self.schedules
    }

    pub fn queries(&self) -> &AnalyticsQueries<S> {
        &self.queries
    }

    pub fn graph(&self) -> &PlayerGraph<S> {
        &self.graph
    }

    pub async fn register_player(&self, player: &Player) -> AnalyticsResult<()> {
        self.players.register(player).await
    }

    pub async fn schedule_match(&self, scheduled: &ScheduledMatch) -> AnalyticsResult<()> {
        self.schedules.schedule(scheduled).await
    }

    pub async fn withdraw(&self, game_id: &str) -> AnalyticsResult<bool> {
        self.schedules.withdraw(game_id).await
    }

    pub async fn ingest(&self, record: &MatchRecord) -> AnalyticsResult<IngestSummary> {
        self.ingestor.ingest(record).await
    }

    pub async fn recover_pending_schedules(&self) -> AnalyticsResult<RecoveryReport> {
        self.schedules.recover_pending_schedules().await
    }

    pub async fn shutdown(&self) {
        self.schedules.shutdown().await;
    }
}
