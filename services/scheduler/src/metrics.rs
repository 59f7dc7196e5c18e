//! Upgrade metrics registry and Prometheus text exposition.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Mutex;

use upsched_schedule::{MetricUpdate, UpgradeLabels};

/// Common prefix of every exported family.
pub const METRIC_PREFIX: &str = "upgrade_scheduler_resource_scheduled_upgrades";

#[derive(Debug, Default)]
struct Families {
    time: BTreeMap<UpgradeLabels, f64>,
    applied: BTreeMap<UpgradeLabels, u64>,
    failed: BTreeMap<UpgradeLabels, u64>,
    succeeded: BTreeMap<UpgradeLabels, u64>,
}

/// Registry for the upgrade gauge and counters.
#[derive(Debug, Default)]
pub struct UpgradeMetrics {
    families: Mutex<Families>,
}

impl UpgradeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a batch of deltas.
    pub fn record(&self, updates: &[MetricUpdate]) {
        let mut families = self.lock();
        for update in updates {
            match update {
                MetricUpdate::UpgradeInfo { labels, value } => {
                    families.time.insert(labels.clone(), *value);
                }
                MetricUpdate::Applied(labels) => {
                    *families.applied.entry(labels.clone()).or_default() += 1;
                }
                MetricUpdate::Failed(labels) => {
                    *families.failed.entry(labels.clone()).or_default() += 1;
                }
                MetricUpdate::Succeeded(labels) => {
                    *families.succeeded.entry(labels.clone()).or_default() += 1;
                }
            }
        }
    }

    pub fn time(&self, labels: &UpgradeLabels) -> Option<f64> {
        self.lock().time.get(labels).copied()
    }

    pub fn applied(&self, labels: &UpgradeLabels) -> u64 {
        self.lock().applied.get(labels).copied().unwrap_or(0)
    }

    pub fn failed(&self, labels: &UpgradeLabels) -> u64 {
        self.lock().failed.get(labels).copied().unwrap_or(0)
    }

    pub fn succeeded(&self, labels: &UpgradeLabels) -> u64 {
        self.lock().succeeded.get(labels).copied().unwrap_or(0)
    }

    /// Counter sums across all series, as `(applied, failed, succeeded)`.
    pub fn totals(&self) -> (u64, u64, u64) {
        let families = self.lock();
        (
            families.applied.values().sum(),
            families.failed.values().sum(),
            families.succeeded.values().sum(),
        )
    }

    /// Render every family in the Prometheus text format.
    pub fn render(&self) -> String {
        let families = self.lock();
        let mut out = String::new();

        write_family(
            &mut out,
            "time",
            "gauge",
            "Scheduled upgrade time as a Unix timestamp; 0 when idle, -1 on error.",
            &families.time,
        );
        write_family(
            &mut out,
            "applied_total",
            "counter",
            "Number of scheduled upgrades applied.",
            &families.applied,
        );
        write_family(
            &mut out,
            "failed_total",
            "counter",
            "Number of scheduled upgrades that failed.",
            &families.failed,
        );
        write_family(
            &mut out,
            "succeeded_total",
            "counter",
            "Number of scheduled upgrades that succeeded.",
            &families.succeeded,
        );

        out
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Families> {
        self.families.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn write_family<V: std::fmt::Display>(
    out: &mut String,
    suffix: &str,
    kind: &str,
    help: &str,
    series: &BTreeMap<UpgradeLabels, V>,
) {
    let name = format!("{METRIC_PREFIX}_{suffix}");
    // Writing to a String cannot fail.
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
    for (labels, value) in series {
        let _ = writeln!(
            out,
            "{name}{{resource_name=\"{}\",resource_namespace=\"{}\",origin_version=\"{}\",target_version=\"{}\"}} {value}",
            escape(&labels.name),
            escape(&labels.namespace),
            escape(&labels.origin_version),
            escape(&labels.target_version),
        );
    }
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use upsched_schedule::{apply_outcome, GAUGE_ERROR};

    fn labels() -> UpgradeLabels {
        UpgradeLabels::new("default", "test", "14.2.2", "15.2.1")
    }

    #[test]
    fn test_record_counters_and_gauge() {
        let metrics = UpgradeMetrics::new();
        metrics.record(&[MetricUpdate::Applied(labels())]);
        metrics.record(&apply_outcome(&labels(), true));

        assert_eq!(metrics.applied(&labels()), 1);
        assert_eq!(metrics.succeeded(&labels()), 1);
        assert_eq!(metrics.failed(&labels()), 0);
        assert_eq!(metrics.time(&labels()), Some(0.0));
        assert_eq!(metrics.totals(), (1, 0, 1));
    }

    #[test]
    fn test_gauge_is_overwritten() {
        let metrics = UpgradeMetrics::new();
        metrics.record(&[MetricUpdate::UpgradeInfo {
            labels: labels(),
            value: 1_612_019_040.0,
        }]);
        metrics.record(&[MetricUpdate::UpgradeInfo {
            labels: labels(),
            value: GAUGE_ERROR,
        }]);
        assert_eq!(metrics.time(&labels()), Some(GAUGE_ERROR));
    }

    #[test]
    fn test_render_exposition() {
        let metrics = UpgradeMetrics::new();
        metrics.record(&[
            MetricUpdate::UpgradeInfo {
                labels: labels(),
                value: 2_556_129_600.0,
            },
            MetricUpdate::Failed(labels()),
        ]);

        let text = metrics.render();
        assert!(text.contains("# TYPE upgrade_scheduler_resource_scheduled_upgrades_time gauge\n"));
        assert!(text.contains(
            "upgrade_scheduler_resource_scheduled_upgrades_time{resource_name=\"test\",resource_namespace=\"default\",origin_version=\"14.2.2\",target_version=\"15.2.1\"} 2556129600\n"
        ));
        assert!(text.contains(
            "upgrade_scheduler_resource_scheduled_upgrades_failed_total{resource_name=\"test\",resource_namespace=\"default\",origin_version=\"14.2.2\",target_version=\"15.2.1\"} 1\n"
        ));
        assert!(text.contains("# TYPE upgrade_scheduler_resource_scheduled_upgrades_applied_total counter\n"));
    }

    #[test]
    fn test_escape_label_values() {
        assert_eq!(escape("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
    }
}
