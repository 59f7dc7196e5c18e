//! Reconciliation driver: one pass per resource identity.
//!
//! A pass fetches the resource, asks the engine for a decision, performs the
//! side effects the decision describes, and reports when the identity should
//! be looked at again. Ordering matters in two places:
//!
//! - Announcements are emitted only after the marker is persisted, so a
//!   failed write re-announces next pass instead of never.
//! - An apply writes the version, clears the schedule, and persists in one
//!   resource update; a failure leaves the schedule in place for the next pass.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use upsched_schedule::requeue::DEFAULT_REQUEUE;
use upsched_schedule::{
    apply_outcome, Action, ActionKind, Decision, Engine, Guard, MetricUpdate, Mutation, ResourceKey,
    ScheduleError, ScheduledResource, UpgradeLabels, Version, GAUGE_ERROR, GAUGE_IDLE,
};

use crate::adapter::{AdapterError, AdapterRegistry, VersionAdapter};
use crate::clock::Clock;
use crate::events::EventRecorder;
use crate::metrics::UpgradeMetrics;
use crate::store::{ResourceStore, StoreError};

/// Result type for reconciliation passes.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Errors that end a pass early.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid upgrade schedule: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("failed to persist resource: {0}")]
    Persistence(StoreError),

    #[error("no version adapter for source '{source_kind}'")]
    AdapterNotFound { source_kind: String },

    #[error("store error: {0}")]
    Store(StoreError),
}

/// What a pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub key: ResourceKey,

    /// `None` when the resource no longer exists.
    pub guard: Option<Guard>,

    pub action: ActionKind,

    /// False only for an apply whose write failed.
    pub persisted: bool,

    /// `None` means no further pass was requested.
    pub requeue_after: Option<Duration>,
}

/// Runs reconciliation passes against a store.
pub struct Reconciler {
    store: Arc<dyn ResourceStore>,
    engine: Engine,
    adapters: AdapterRegistry,
    recorder: Arc<dyn EventRecorder>,
    metrics: Arc<UpgradeMetrics>,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        engine: Engine,
        recorder: Arc<dyn EventRecorder>,
        metrics: Arc<UpgradeMetrics>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let adapters = AdapterRegistry::new(engine.keys());
        Self {
            store,
            engine,
            adapters,
            recorder,
            metrics,
            clock,
        }
    }

    /// Replace the default adapter registry.
    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<UpgradeMetrics> {
        &self.metrics
    }

    /// Run one pass for `key`.
    #[instrument(skip(self), fields(resource = %key))]
    pub async fn reconcile(&self, key: &ResourceKey) -> ReconcileResult<ReconcileOutcome> {
        let resource = match self.store.get_resource(key).await {
            Ok(Some(resource)) => resource,
            Ok(None) => {
                debug!("Resource no longer exists");
                self.set_gauge(UpgradeLabels::unversioned(&key.namespace, &key.name), GAUGE_IDLE);
                return Ok(ReconcileOutcome {
                    key: key.clone(),
                    guard: None,
                    action: ActionKind::NoOp,
                    persisted: true,
                    requeue_after: None,
                });
            }
            Err(e) => {
                warn!(error = %e, "Failed to read resource");
                self.set_gauge(UpgradeLabels::unversioned(&key.namespace, &key.name), GAUGE_ERROR);
                return Err(ReconcileError::Store(e));
            }
        };

        let decision = self.engine.decide(&resource, self.clock.now());
        debug!(
            guard = %decision.guard,
            action = %decision.action.kind(),
            next_check_secs = decision.next_check.map(|d| d.as_secs()),
            "Decision made"
        );

        match (&decision.action, &decision.mutation) {
            (Action::ReportError(err), _) => {
                self.metrics.record(&decision.metrics);
                error!(error = %err, "Invalid upgrade schedule");
                Err(ReconcileError::Schedule(err.clone()))
            }
            (Action::Apply, Some(Mutation::ApplyVersion { from, to })) => {
                self.apply(resource, &decision, from, to).await
            }
            (_, Some(mutation)) => self.persist(resource, &decision, mutation).await,
            (_, None) => {
                self.metrics.record(&decision.metrics);
                Ok(self.outcome(key, &decision, true, decision.next_check))
            }
        }
    }

    /// Persist an annotation-only mutation, then notify.
    async fn persist(
        &self,
        mut resource: ScheduledResource,
        decision: &Decision,
        mutation: &Mutation,
    ) -> ReconcileResult<ReconcileOutcome> {
        let key = resource.key();
        mutation.apply_to(&mut resource, self.engine.keys());

        if let Err(e) = self.store.update_resource(&resource).await {
            warn!(error = %e, action = %decision.action.kind(), "Failed to persist resource");
            self.set_gauge(decision_labels(decision, &key), GAUGE_ERROR);
            return Err(ReconcileError::Persistence(e));
        }

        if let Some(notification) = &decision.notification {
            self.recorder.record(&key, notification);
        }
        self.metrics.record(&decision.metrics);

        match decision.action {
            Action::Announce => info!("Upgrade announced"),
            Action::AlreadyApplied => info!("Target version already running, schedule cleared"),
            _ => {}
        }

        Ok(self.outcome(&key, decision, true, decision.next_check))
    }

    async fn apply(
        &self,
        resource: ScheduledResource,
        decision: &Decision,
        from: &Version,
        to: &Version,
    ) -> ReconcileResult<ReconcileOutcome> {
        let key = resource.key();
        let labels = decision_labels(decision, &key);

        let adapter = match self.adapters.select(&resource) {
            Ok(adapter) => adapter,
            Err(e) => {
                error!(error = %e, "Cannot apply scheduled upgrade");
                self.metrics.record(&apply_outcome(&labels, false));
                return Err(ReconcileError::AdapterNotFound {
                    source_kind: self.adapters.source_kind(&resource).to_string(),
                });
            }
        };

        self.metrics.record(&decision.metrics);
        info!(
            from = %from,
            to = %to,
            adapter = adapter.name(),
            "Applying scheduled upgrade"
        );

        if let Err(e) = self.write_upgrade(adapter.as_ref(), resource, from, to).await {
            error!(error = %e, from = %from, to = %to, "Scheduled upgrade failed");
            self.metrics.record(&apply_outcome(&labels, false));
            return Ok(self.outcome(&key, decision, false, Some(DEFAULT_REQUEUE)));
        }

        if let Some(notification) = &decision.notification {
            self.recorder.record(&key, notification);
        }
        self.metrics.record(&apply_outcome(&labels, true));
        info!(from = %from, to = %to, "Scheduled upgrade applied");

        Ok(self.outcome(&key, decision, true, decision.next_check))
    }

    async fn write_upgrade(
        &self,
        adapter: &dyn VersionAdapter,
        mut resource: ScheduledResource,
        from: &Version,
        to: &Version,
    ) -> Result<(), AdapterError> {
        adapter
            .write_version(&mut resource, from, to, self.store.as_ref())
            .await?;
        resource.clear_schedule(self.engine.keys());
        self.store.update_resource(&resource).await?;
        Ok(())
    }

    fn set_gauge(&self, labels: UpgradeLabels, value: f64) {
        self.metrics.record(&[MetricUpdate::UpgradeInfo { labels, value }]);
    }

    fn outcome(
        &self,
        key: &ResourceKey,
        decision: &Decision,
        persisted: bool,
        requeue_after: Option<Duration>,
    ) -> ReconcileOutcome {
        ReconcileOutcome {
            key: key.clone(),
            guard: Some(decision.guard),
            action: decision.action.kind(),
            persisted,
            requeue_after,
        }
    }
}

/// Series labels a decision reports under.
fn decision_labels(decision: &Decision, key: &ResourceKey) -> UpgradeLabels {
    decision
        .metrics
        .first()
        .map(|m| m.labels().clone())
        .unwrap_or_else(|| UpgradeLabels::unversioned(&key.namespace, &key.name))
}
