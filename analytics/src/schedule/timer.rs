use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::types::ScheduledMatch;

pub type ExpiryFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Callback run by an expiry worker when a timer fires.
pub type ExpiryHandler = Arc<dyn Fn(ScheduledMatch) -> ExpiryFuture + Send + Sync>;

struct ArmedTimer {
    token: u64,
    handle: JoinHandle<()>,
}

type TimerMap = Arc<Mutex<HashMap<String, ArmedTimer>>>;

/// Cancellable one-shot timers keyed by game id.
///
/// Each armed timer is a sleeping task. When it wakes it claims its own map
/// entry (only if it has not been cancelled or replaced in the meantime) and
/// hands the game to a bounded job queue drained by a fixed worker pool, so
/// expiry callbacks never run on the caller's task.
pub struct ExpiryScheduler {
    timers: TimerMap,
    job_tx: Mutex<Option<mpsc::Sender<ScheduledMatch>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    next_token: AtomicU64,
}

impl ExpiryScheduler {
    /// Start `worker_count` workers (at least one) sharing a queue of
    /// `queue_capacity` pending expiries.
    pub fn start(worker_count: usize, queue_capacity: usize, handler: ExpiryHandler) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<ScheduledMatch>(queue_capacity.max(1));
        let shared_rx = Arc::new(Mutex::new(job_rx));
        let timers: TimerMap = Arc::new(Mutex::new(HashMap::new()));

        let worker_count = worker_count.max(1);
        let workers = (0..worker_count)
            .map(|worker_id| {
                let rx = shared_rx.clone();
                let timers = timers.clone();
                let handler = handler.clone();
                let span = tracing::info_span!("expiry_worker", worker_id);
                tokio::spawn(run_expiry_worker(worker_id, rx, timers, handler).instrument(span))
            })
            .collect();

        tracing::info!(worker_count, queue_capacity, "Expiry scheduler started");

        Self {
            timers,
            job_tx: Mutex::new(Some(job_tx)),
            workers: Mutex::new(workers),
            next_token: AtomicU64::new(1),
        }
    }

    /// Arm (or re-arm) the timer for `scheduled.game_id` to fire after `delay`.
    /// A previously armed timer for the same id is cancelled.
    pub async fn arm(&self, scheduled: ScheduledMatch, delay: Duration) -> AnalyticsResult<()> {
        // Lock order is `timers` then `job_tx`, the same as `shutdown`, so a
        // timer is either drained by a concurrent shutdown or refused here.
        let mut timers = self.timers.lock().await;
        let tx = match self.job_tx.lock().await.as_ref() {
            Some(tx) => tx.clone(),
            None => return Err(AnalyticsError::SchedulerClosed),
        };
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let game_id = scheduled.game_id.clone();

        // Still held across the spawn so the task cannot look up its entry
        // before it has been inserted.
        let task_timers = self.timers.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut timers = task_timers.lock().await;
                match timers.get(&scheduled.game_id) {
                    Some(armed) if armed.token == token => {
                        timers.remove(&scheduled.game_id);
                    }
                    _ => return,
                }
            }
            tracing::debug!(game_id = %scheduled.game_id, "Expiry timer fired");
            if tx.send(scheduled).await.is_err() {
                tracing::debug!("Expiry queue closed, dropping fired timer");
            }
        });

        if let Some(previous) = timers.insert(game_id.clone(), ArmedTimer { token, handle }) {
            previous.handle.abort();
            tracing::debug!(game_id = %game_id, "Replaced existing expiry timer");
        }
        tracing::info!(game_id = %game_id, delay_secs = delay.as_secs(), "Scheduled expiry");
        Ok(())
    }

    /// Cancel the timer for `game_id`. Returns whether one was pending.
    ///
    /// A timer that already fired is not recalled; its callback must
    /// tolerate the indices being gone.
    pub async fn cancel(&self, game_id: &str) -> bool {
        match self.timers.lock().await.remove(game_id) {
            Some(armed) => {
                armed.handle.abort();
                tracing::debug!(game_id = %game_id, "Cancelled expiry timer");
                true
            }
            None => false,
        }
    }

    pub async fn is_armed(&self, game_id: &str) -> bool {
        self.timers.lock().await.contains_key(game_id)
    }

    pub async fn pending(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// Abort every pending timer, close the queue and wait for the workers to
    /// finish the jobs already queued. Persisted state is untouched, so
    /// startup recovery can re-arm what was cancelled here.
    pub async fn shutdown(&self) {
        let dropped = {
            let mut timers = self.timers.lock().await;
            let count = timers.len();
            for (_, armed) in timers.drain() {
                armed.handle.abort();
            }
            self.job_tx.lock().await.take();
            count
        };

        let workers: Vec<_> = self.workers.lock().await.drain(..).collect();
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::warn!("Expiry worker ended abnormally: {}", e);
            }
        }
        tracing::info!(cancelled = dropped, "Expiry scheduler shut down");
    }
}

async fn run_expiry_worker(
    worker_id: usize,
    job_rx: Arc<Mutex<mpsc::Receiver<ScheduledMatch>>>,
    timers: TimerMap,
    handler: ExpiryHandler,
) {
    tracing::debug!(worker_id, "Expiry worker started");

    loop {
        let scheduled = {
            let mut rx = job_rx.lock().await;
            match rx.recv().await {
                Some(job) => job,
                None => {
                    tracing::debug!(worker_id, "Expiry queue closed, worker exiting");
                    break;
                }
            }
        };

        // Re-armed between firing and pickup: the newer timer owns the id.
        if timers.lock().await.contains_key(&scheduled.game_id) {
            tracing::debug!(worker_id, game_id = %scheduled.game_id, "Skipping stale expiry");
            continue;
        }

        tracing::info!(worker_id, game_id = %scheduled.game_id, "Expiring scheduled game");
        handler(scheduled).await;
    }
}
