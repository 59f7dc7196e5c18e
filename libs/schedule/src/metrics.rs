//! Metric deltas returned by the engine.
//!
//! The engine never touches a registry. It describes what should change and
//! the caller feeds these updates into whatever exporter it owns.

/// Gauge value for "nothing pending" and "just completed".
pub const GAUGE_IDLE: f64 = 0.0;

/// Gauge value for an error state.
pub const GAUGE_ERROR: f64 = -1.0;

/// Series labels shared by the upgrade gauge and counters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UpgradeLabels {
    pub namespace: String,
    pub name: String,
    pub origin_version: String,
    pub target_version: String,
}

impl UpgradeLabels {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        origin_version: impl Into<String>,
        target_version: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            origin_version: origin_version.into(),
            target_version: target_version.into(),
        }
    }

    /// Labels without a version pair, used when no schedule is in play.
    pub fn unversioned(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(namespace, name, "", "")
    }
}

/// One change to the observability surface.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricUpdate {
    /// Set the schedule gauge: 0 idle, -1 error, else the target Unix time.
    UpgradeInfo { labels: UpgradeLabels, value: f64 },

    /// An apply was attempted.
    Applied(UpgradeLabels),

    /// An apply persisted.
    Succeeded(UpgradeLabels),

    /// An apply (or a previously started schedule) failed.
    Failed(UpgradeLabels),
}

impl MetricUpdate {
    pub fn labels(&self) -> &UpgradeLabels {
        match self {
            MetricUpdate::UpgradeInfo { labels, .. }
            | MetricUpdate::Applied(labels)
            | MetricUpdate::Succeeded(labels)
            | MetricUpdate::Failed(labels) => labels,
        }
    }
}

/// Deltas for the outcome of persisting an apply.
pub fn apply_outcome(labels: &UpgradeLabels, succeeded: bool) -> Vec<MetricUpdate> {
    if succeeded {
        vec![
            MetricUpdate::Succeeded(labels.clone()),
            MetricUpdate::UpgradeInfo {
                labels: labels.clone(),
                value: GAUGE_IDLE,
            },
        ]
    } else {
        vec![
            MetricUpdate::Failed(labels.clone()),
            MetricUpdate::UpgradeInfo {
                labels: labels.clone(),
                value: GAUGE_ERROR,
            },
        ]
    }
}
