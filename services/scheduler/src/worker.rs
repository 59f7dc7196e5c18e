//! Requeue worker.
//!
//! Keeps a due time per resource identity and runs the reconciler for every
//! identity whose time has come. Identities are listed from the store on a
//! resync interval; between resyncs the reconciler's own requeue requests
//! drive the schedule.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use upsched_schedule::{ActionKind, ResourceKey, ScheduledResource};

use crate::reconciler::{ReconcileOutcome, ReconcileResult, Reconciler};

/// Default due-check interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Default store listing interval.
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Default first retry delay after a failed pass.
pub const DEFAULT_BACKOFF_MIN: Duration = Duration::from_secs(5);

/// Default retry delay ceiling.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(5 * 60);

/// Worker timing.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub tick_interval: Duration,
    pub resync_interval: Duration,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            backoff_min: DEFAULT_BACKOFF_MIN,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }
}

/// Per-identity exponential backoff for failed passes.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,

    /// Consecutive failures per identity.
    failures: BTreeMap<ResourceKey, u32>,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
            failures: BTreeMap::new(),
        }
    }

    /// Record a failure and return the delay before the next attempt.
    pub fn record_failure(&mut self, key: &ResourceKey) -> Duration {
        let count = self.failures.entry(key.clone()).or_insert(0);
        *count = count.saturating_add(1);

        let factor = 2u32.saturating_pow(*count - 1);
        self.min.saturating_mul(factor).min(self.max)
    }

    pub fn failures(&self, key: &ResourceKey) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }

    /// Forget failures for an identity (on success).
    pub fn clear(&mut self, key: &ResourceKey) {
        self.failures.remove(key);
    }

    /// Drop identities that are no longer tracked.
    pub fn retain(&mut self, mut keep: impl FnMut(&ResourceKey) -> bool) {
        self.failures.retain(|key, _| keep(key));
    }
}

/// Due times for every identity the worker knows about.
///
/// An identity missing from the map is parked: it asked for no further pass
/// and is re-armed by the next resync.
#[derive(Debug)]
pub struct WorkQueue {
    due: BTreeMap<ResourceKey, Instant>,

    /// Snapshot of each resource as of the last resync.
    seen: BTreeMap<ResourceKey, ScheduledResource>,

    backoff: Backoff,
}

impl WorkQueue {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            due: BTreeMap::new(),
            seen: BTreeMap::new(),
            backoff,
        }
    }

    /// Align the queue with the store's current resources.
    ///
    /// New, changed and parked identities become due at `now`; unchanged ones
    /// keep their due time; vanished ones are dropped.
    pub fn resync(&mut self, resources: Vec<ScheduledResource>, now: Instant) {
        let mut due = BTreeMap::new();
        let mut seen = BTreeMap::new();
        for resource in resources {
            let key = resource.key();
            let changed = self.seen.get(&key) != Some(&resource);
            let at = match self.due.get(&key) {
                Some(at) if !changed => *at,
                _ => now,
            };
            due.insert(key.clone(), at);
            seen.insert(key, resource);
        }
        self.due = due;
        self.seen = seen;

        let due = &self.due;
        self.backoff.retain(|key| due.contains_key(key));
    }

    /// Remove and return every identity due at `now`.
    pub fn take_due(&mut self, now: Instant) -> Vec<ResourceKey> {
        let ready: Vec<_> = self
            .due
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &ready {
            self.due.remove(key);
        }
        ready
    }

    /// Schedule the next pass for `key` from the result of this one.
    ///
    /// Returns the delay applied, or `None` if the identity was parked.
    pub fn complete(
        &mut self,
        key: ResourceKey,
        result: &ReconcileResult<ReconcileOutcome>,
        now: Instant,
    ) -> Option<Duration> {
        let delay = match result {
            Ok(outcome) => {
                self.backoff.clear(&key);
                outcome.requeue_after
            }
            Err(_) => Some(self.backoff.record_failure(&key)),
        };

        if let Some(delay) = delay {
            self.due.insert(key, now + delay);
        }
        delay
    }

    pub fn due_at(&self, key: &ResourceKey) -> Option<Instant> {
        self.due.get(key).copied()
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn len(&self) -> usize {
        self.due.len()
    }

    pub fn is_empty(&self) -> bool {
        self.due.is_empty()
    }
}

/// Counts for one batch of passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub processed: usize,
    pub announced: usize,
    pub applied: usize,
    pub apply_failed: usize,
    pub errors: usize,
}

impl BatchStats {
    fn observe(&mut self, result: &ReconcileResult<ReconcileOutcome>) {
        self.processed += 1;
        match result {
            Ok(outcome) => match outcome.action {
                ActionKind::Announce => self.announced += 1,
                ActionKind::Apply if outcome.persisted => self.applied += 1,
                ActionKind::Apply => self.apply_failed += 1,
                _ => {}
            },
            Err(_) => self.errors += 1,
        }
    }
}

/// Drives the reconciler from the work queue.
pub struct SchedulerWorker {
    reconciler: Arc<Reconciler>,
    config: WorkerConfig,
}

impl SchedulerWorker {
    pub fn new(reconciler: Arc<Reconciler>, config: WorkerConfig) -> Self {
        Self { reconciler, config }
    }

    pub fn new_queue(&self) -> WorkQueue {
        WorkQueue::new(Backoff::new(self.config.backoff_min, self.config.backoff_max))
    }

    /// Run until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_ms = self.config.tick_interval.as_millis() as u64,
            resync_secs = self.config.resync_interval.as_secs(),
            "Starting upgrade scheduler worker"
        );

        let mut queue = self.new_queue();
        let mut tick = tokio::time::interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first resync tick fires immediately and seeds the queue.
        let mut resync = tokio::time::interval(self.config.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = resync.tick() => {
                    self.resync(&mut queue).await;
                }
                _ = tick.tick() => {
                    self.run_due(&mut queue).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Upgrade scheduler worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// List the store and align the queue with it.
    pub async fn resync(&self, queue: &mut WorkQueue) {
        match self.reconciler.store().list_resources().await {
            Ok(resources) => {
                queue.resync(resources, Instant::now());
                debug!(tracked = queue.len(), "Resynced resource identities");
            }
            Err(e) => warn!(error = %e, "Failed to list resources"),
        }
    }

    /// Run every due identity once, concurrently.
    pub async fn run_due(&self, queue: &mut WorkQueue) -> BatchStats {
        let mut stats = BatchStats::default();
        let due = queue.take_due(Instant::now());
        if due.is_empty() {
            return stats;
        }

        let results = join_all(due.iter().map(|key| self.reconciler.reconcile(key))).await;
        let finished = Instant::now();

        for (key, result) in due.into_iter().zip(results) {
            stats.observe(&result);
            if let Err(e) = &result {
                let failures = queue.backoff().failures(&key) + 1;
                warn!(resource = %key, error = %e, failures, "Reconciliation failed");
            }
            queue.complete(key, &result, finished);
        }

        if stats.announced > 0 || stats.applied > 0 || stats.apply_failed > 0 {
            info!(
                processed = stats.processed,
                announced = stats.announced,
                applied = stats.applied,
                apply_failed = stats.apply_failed,
                errors = stats.errors,
                "Reconciliation batch complete"
            );
        }

        stats
    }
}
