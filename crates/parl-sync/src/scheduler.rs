use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::{OverlapPolicy, SyncConfig};
use crate::ingest::{CycleSummary, Ingestor};

/// Fires an ingestion cycle at startup and then once per `interval` for as
/// long as `run_forever` is polled. Spawned cycles are owned by the
/// scheduler until they finish or `shutdown` aborts them.
pub struct Scheduler {
    ingestor: Ingestor,
    interval: Duration,
    overlap: OverlapPolicy,
    running: Arc<AtomicBool>,
    cycles: Mutex<Cycles>,
}

#[derive(Default)]
struct Cycles {
    tasks: JoinSet<CycleSummary>,
    closed: bool,
}

struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Scheduler {
    pub fn new(ingestor: Ingestor, interval: Duration, overlap: OverlapPolicy) -> Self {
        Self {
            ingestor,
            interval: interval.max(Duration::from_millis(1)),
            overlap,
            running: Arc::new(AtomicBool::new(false)),
            cycles: Mutex::new(Cycles::default()),
        }
    }

    pub fn from_config(ingestor: Ingestor, config: &SyncConfig) -> Self {
        Self::new(ingestor, config.sync_interval, config.overlap)
    }

    /// Start one cycle in the background. Returns `false` when the overlap
    /// policy skips the tick or the scheduler has been shut down.
    pub fn tick(&self) -> bool {
        let mut cycles = self.cycles();
        reap(&mut cycles.tasks);
        if cycles.closed {
            warn!("scheduler is shut down; ignoring tick");
            return false;
        }

        let guard = match self.overlap {
            OverlapPolicy::Concurrent => None,
            OverlapPolicy::SkipIfRunning => {
                if self
                    .running
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    warn!("previous ingestion cycle still running; skipping tick");
                    return false;
                }
                Some(RunningGuard(Arc::clone(&self.running)))
            }
        };

        let ingestor = self.ingestor.clone();
        cycles.tasks.spawn(async move {
            let _guard = guard;
            ingestor.run_cycle().await
        });
        true
    }

    /// Number of cycles spawned and not yet reaped.
    pub fn in_flight(&self) -> usize {
        let mut cycles = self.cycles();
        reap(&mut cycles.tasks);
        cycles.tasks.len()
    }

    /// Wait for every cycle started before this call. Later ticks still run.
    pub async fn wait_idle(&self) {
        let mut tasks = std::mem::take(&mut self.cycles().tasks);
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
    }

    /// Refuse further ticks, give in-flight cycles `grace` to finish, then
    /// abort the rest. No cycle task is alive once this returns.
    pub async fn shutdown(&self, grace: Duration) {
        let mut tasks = {
            let mut cycles = self.cycles();
            cycles.closed = true;
            std::mem::take(&mut cycles.tasks)
        };
        if tasks.is_empty() {
            return;
        }

        info!(
            in_flight = tasks.len(),
            grace_secs = grace.as_secs_f64(),
            "waiting for in-flight ingestion cycles"
        );
        let drain = async {
            while let Some(joined) = tasks.join_next().await {
                log_join(joined);
            }
        };
        let drained = tokio::time::timeout(grace, drain).await;
        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                "shutdown grace elapsed; aborting in-flight ingestion cycles"
            );
            tasks.shutdown().await;
        }
    }

    pub async fn run_forever(&self) {
        info!(
            interval_secs = self.interval.as_secs(),
            overlap = ?self.overlap,
            "ingestion scheduler started"
        );
        // The first tick of a tokio interval completes immediately.
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            info!(at = %chrono::Utc::now().to_rfc3339(), "ingestion tick");
            self.tick();
        }
    }

    fn cycles(&self) -> MutexGuard<'_, Cycles> {
        self.cycles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn reap(tasks: &mut JoinSet<CycleSummary>) {
    while let Some(joined) = tasks.try_join_next() {
        log_join(joined);
    }
}

fn log_join(joined: Result<CycleSummary, JoinError>) {
    if let Err(err) = joined {
        if err.is_cancelled() {
            info!("ingestion cycle aborted at shutdown");
        } else {
            error!(error = %err, "ingestion cycle task panicked");
        }
    }
}
