//! Upgrade decision engine.
//!
//! Maps `(resource snapshot, now)` to a [`Decision`]. Guards are evaluated in
//! a fixed order and the first match wins:
//!
//! 1. deletion requested
//! 2. paused
//! 3. no schedule requested
//! 4. invalid schedule (time or either version fails to parse)
//! 5. announcement due
//! 6. upgrade time not reached
//! 7. already satisfied
//! 8. apply
//!
//! The engine performs no I/O. Whatever should change is returned as data:
//! a [`Mutation`] to persist, a [`Notification`] to emit, metric deltas to
//! record, and the delay before the next pass.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use semver::Version;

use crate::clock::{
    announcement_window_open, format_remaining, is_out_of_working_hours, parse_schedule_time,
    remaining, upgrade_time_reached,
};
use crate::error::ScheduleError;
use crate::metrics::{MetricUpdate, UpgradeLabels, GAUGE_ERROR, GAUGE_IDLE};
use crate::requeue::{next_check, DEFAULT_REQUEUE};
use crate::resource::{ScheduleKeys, ScheduledResource};
use crate::version::{compare, parse_version, VersionStatus, CURRENT_VERSION_FIELD, TARGET_VERSION_FIELD};

/// Event reason attached to upgrade announcements.
pub const ANNOUNCEMENT_REASON: &str = "UpgradeAnnouncement";

/// Static inputs to every decision.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub keys: ScheduleKeys,

    /// Installation name quoted in announcements.
    pub installation: String,

    /// Contact quoted in announcements for out-of-hours upgrades.
    pub out_of_hours_contact: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            keys: ScheduleKeys::default(),
            installation: "local".to_string(),
            out_of_hours_contact: "the on-call channel".to_string(),
        }
    }
}

/// The guard that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Guard {
    Deleted,
    Paused,
    NoScheduleRequested,
    InvalidSchedule,
    AnnouncementDue,
    TimeNotReached,
    AlreadySatisfied,
    ApplyUpgrade,
}

impl Guard {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deleted => "deleted",
            Self::Paused => "paused",
            Self::NoScheduleRequested => "no_schedule_requested",
            Self::InvalidSchedule => "invalid_schedule",
            Self::AnnouncementDue => "announcement_due",
            Self::TimeNotReached => "time_not_reached",
            Self::AlreadySatisfied => "already_satisfied",
            Self::ApplyUpgrade => "apply_upgrade",
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller should do with the resource this pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    NoOp,
    ReportError(ScheduleError),
    Announce,
    Wait,
    AlreadyApplied,
    Apply,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::NoOp => ActionKind::NoOp,
            Self::ReportError(_) => ActionKind::ReportError,
            Self::Announce => ActionKind::Announce,
            Self::Wait => ActionKind::Wait,
            Self::AlreadyApplied => ActionKind::AlreadyApplied,
            Self::Apply => ActionKind::Apply,
        }
    }
}

/// Fieldless mirror of [`Action`] for logging and outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    NoOp,
    ReportError,
    Announce,
    Wait,
    AlreadyApplied,
    Apply,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoOp => "no_op",
            Self::ReportError => "report_error",
            Self::Announce => "announce",
            Self::Wait => "wait",
            Self::AlreadyApplied => "already_applied",
            Self::Apply => "apply",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change to persist onto the resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Record that the announcement for `target` went out.
    MarkAnnounced { target: Version },

    /// Drop the schedule and the announcement marker.
    ClearSchedule,

    /// Write `to` as the running version, then drop the schedule.
    ///
    /// The version write is the adapter's job; [`Mutation::apply_to`] only
    /// performs the annotation side.
    ApplyVersion { from: Version, to: Version },
}

impl Mutation {
    /// Apply the annotation-level part of this mutation.
    pub fn apply_to(&self, resource: &mut ScheduledResource, keys: &ScheduleKeys) {
        match self {
            Mutation::MarkAnnounced { target } => {
                resource
                    .annotations
                    .insert(keys.announcement.clone(), target.to_string());
            }
            Mutation::ClearSchedule | Mutation::ApplyVersion { .. } => {
                resource.clear_schedule(keys);
            }
        }
    }
}

/// Notification severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Warning => "Warning",
        }
    }
}

/// Message for the event sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub reason: &'static str,
    pub message: String,
    pub severity: Severity,
}

/// Result of evaluating one resource at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub guard: Guard,
    pub action: Action,
    pub mutation: Option<Mutation>,
    pub notification: Option<Notification>,

    /// `None` means the engine asks for no further pass.
    pub next_check: Option<Duration>,

    pub metrics: Vec<MetricUpdate>,
}

impl Decision {
    fn quiescent(guard: Guard, next_check: Option<Duration>, labels: UpgradeLabels) -> Self {
        Self {
            guard,
            action: Action::NoOp,
            mutation: None,
            notification: None,
            next_check,
            metrics: vec![MetricUpdate::UpgradeInfo {
                labels,
                value: GAUGE_IDLE,
            }],
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.action, Action::ReportError(_))
    }
}

/// A schedule that passed validation.
#[derive(Debug, Clone)]
struct Schedule {
    current: Version,
    target: Version,
    at: DateTime<Utc>,
    status: VersionStatus,
    announced: bool,
}

/// The decision engine.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    settings: EngineSettings,
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn keys(&self) -> &ScheduleKeys {
        &self.settings.keys
    }

    /// Evaluate `resource` at `now`.
    pub fn decide(&self, resource: &ScheduledResource, now: DateTime<Utc>) -> Decision {
        let keys = &self.settings.keys;
        let unversioned = UpgradeLabels::unversioned(&resource.namespace, &resource.name);

        if resource.deletion_requested {
            return Decision::quiescent(Guard::Deleted, None, unversioned);
        }

        if resource.paused {
            return Decision::quiescent(Guard::Paused, Some(DEFAULT_REQUEUE), unversioned);
        }

        let (Some(raw_target), Some(raw_time)) = (
            resource.annotation(&keys.target_release),
            resource.annotation(&keys.target_time),
        ) else {
            return Decision::quiescent(Guard::NoScheduleRequested, Some(DEFAULT_REQUEUE), unversioned);
        };

        let schedule = match self.validate(resource, raw_target, raw_time) {
            Ok(schedule) => schedule,
            Err(err) => return self.invalid(resource, raw_target, err),
        };

        let labels = UpgradeLabels::new(
            &resource.namespace,
            &resource.name,
            schedule.current.to_string(),
            schedule.target.to_string(),
        );
        let pending_gauge = MetricUpdate::UpgradeInfo {
            labels: labels.clone(),
            value: schedule.at.timestamp() as f64,
        };
        let time_reached = upgrade_time_reached(schedule.at, now);

        if announcement_window_open(schedule.at, now)
            && !time_reached
            && !schedule.announced
            && !schedule.status.is_satisfied()
        {
            return Decision {
                guard: Guard::AnnouncementDue,
                action: Action::Announce,
                mutation: Some(Mutation::MarkAnnounced {
                    target: schedule.target.clone(),
                }),
                notification: Some(self.announcement(resource, &schedule, now)),
                next_check: Some(next_check(now, Some(schedule.at))),
                metrics: vec![pending_gauge],
            };
        }

        if !time_reached {
            let wake_for = (!schedule.status.is_satisfied()).then_some(schedule.at);
            return Decision {
                guard: Guard::TimeNotReached,
                action: Action::Wait,
                mutation: None,
                notification: None,
                next_check: Some(next_check(now, wake_for)),
                metrics: vec![pending_gauge],
            };
        }

        if schedule.status.is_satisfied() {
            return Decision {
                guard: Guard::AlreadySatisfied,
                action: Action::AlreadyApplied,
                mutation: Some(Mutation::ClearSchedule),
                notification: None,
                next_check: Some(DEFAULT_REQUEUE),
                metrics: vec![MetricUpdate::UpgradeInfo {
                    labels,
                    value: GAUGE_IDLE,
                }],
            };
        }

        // A schedule first seen after its time still gets its announcement,
        // riding along with the apply.
        let late_announcement =
            (!schedule.announced).then(|| self.announcement(resource, &schedule, now));

        Decision {
            guard: Guard::ApplyUpgrade,
            action: Action::Apply,
            mutation: Some(Mutation::ApplyVersion {
                from: schedule.current.clone(),
                to: schedule.target.clone(),
            }),
            notification: late_announcement,
            next_check: Some(DEFAULT_REQUEUE),
            metrics: vec![MetricUpdate::Applied(labels)],
        }
    }

    fn validate(
        &self,
        resource: &ScheduledResource,
        raw_target: &str,
        raw_time: &str,
    ) -> Result<Schedule, ScheduleError> {
        let keys = &self.settings.keys;

        let at = parse_schedule_time(raw_time)?;
        let raw_current = resource.label(&keys.release_label).ok_or_else(|| {
            ScheduleError::InvalidVersion {
                field: CURRENT_VERSION_FIELD,
                value: String::new(),
                reason: format!("label {} is not set", keys.release_label),
            }
        })?;
        let current = parse_version(CURRENT_VERSION_FIELD, raw_current)?;
        let target = parse_version(TARGET_VERSION_FIELD, raw_target)?;

        let status = compare(&target, &current);
        let announced = self.announcement_sent(resource, &target);

        Ok(Schedule {
            current,
            target,
            at,
            status,
            announced,
        })
    }

    /// The marker counts for `target` unless it names a different version.
    fn announcement_sent(&self, resource: &ScheduledResource, target: &Version) -> bool {
        match resource.annotations.get(&self.settings.keys.announcement) {
            None => false,
            Some(marker) => match Version::parse(marker.trim()) {
                Ok(announced) => &announced == target,
                Err(_) => true,
            },
        }
    }

    fn invalid(&self, resource: &ScheduledResource, raw_target: &str, err: ScheduleError) -> Decision {
        let keys = &self.settings.keys;
        let mut metrics = vec![MetricUpdate::UpgradeInfo {
            labels: UpgradeLabels::unversioned(&resource.namespace, &resource.name),
            value: GAUGE_ERROR,
        }];

        // Only a schedule that was already underway counts as a failure;
        // an annotation nobody has fixed yet is not an operational error.
        if resource.annotations.contains_key(&keys.announcement) {
            metrics.push(MetricUpdate::Failed(UpgradeLabels::new(
                &resource.namespace,
                &resource.name,
                resource.label(&keys.release_label).unwrap_or_default(),
                raw_target,
            )));
        }

        Decision {
            guard: Guard::InvalidSchedule,
            action: Action::ReportError(err),
            mutation: None,
            notification: None,
            next_check: None,
            metrics,
        }
    }

    fn announcement(&self, resource: &ScheduledResource, schedule: &Schedule, now: DateTime<Utc>) -> Notification {
        let when = if upgrade_time_reached(schedule.at, now) {
            "is starting now".to_string()
        } else {
            format!(
                "is scheduled to start in {}",
                format_remaining(remaining(schedule.at, now))
            )
        };

        let mut message = format!(
            "The upgrade of {}/{} in {} from release version {} to {} {}.",
            resource.namespace,
            resource.name,
            self.settings.installation,
            schedule.current,
            schedule.target,
            when,
        );
        if is_out_of_working_hours(schedule.at) {
            message.push_str(&format!(
                " Please contact us via {} in case of anomalies.",
                self.settings.out_of_hours_contact
            ));
        }

        Notification {
            reason: ANNOUNCEMENT_REASON,
            message,
            severity: Severity::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use proptest::prelude::*;

    const TIME_LAYOUT: &str = "%d %b %y %H:%M UTC";

    /// Friday 2026-10-16 12:00 UTC, inside working hours.
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn engine() -> Engine {
        Engine::new(EngineSettings {
            installation: "gauss".to_string(),
            out_of_hours_contact: "#ops-urgent".to_string(),
            ..Default::default()
        })
    }

    fn scheduled(current: &str, target: &str, at: DateTime<Utc>) -> ScheduledResource {
        let keys = ScheduleKeys::default();
        ScheduledResource::new("default", "test")
            .with_label(&keys.release_label, current)
            .with_annotation(&keys.target_release, target)
            .with_annotation(&keys.target_time, at.format(TIME_LAYOUT).to_string())
    }

    /// Persist a decision the way the label adapter would.
    fn persist(resource: &mut ScheduledResource, decision: &Decision) {
        let keys = ScheduleKeys::default();
        if let Some(mutation) = &decision.mutation {
            if let Mutation::ApplyVersion { to, .. } = mutation {
                resource.labels.insert(keys.release_label.clone(), to.to_string());
            }
            mutation.apply_to(resource, &keys);
        }
    }

    fn count_applied(decision: &Decision) -> usize {
        decision
            .metrics
            .iter()
            .filter(|m| matches!(m, MetricUpdate::Applied(_)))
            .count()
    }

    #[test]
    fn test_announce_inside_window() {
        let resource = scheduled("14.2.2", "15.2.1", now() + TimeDelta::minutes(10));
        let decision = engine().decide(&resource, now());

        assert_eq!(decision.guard, Guard::AnnouncementDue);
        assert_eq!(decision.action, Action::Announce);
        assert_eq!(
            decision.mutation,
            Some(Mutation::MarkAnnounced {
                target: Version::new(15, 2, 1)
            })
        );
        let notification = decision.notification.unwrap();
        assert_eq!(notification.reason, ANNOUNCEMENT_REASON);
        assert!(notification.message.contains("15.2.1"));
        assert!(notification.message.contains("14.2.2"));
        assert!(notification.message.contains("default/test"));
        assert!(notification.message.contains("gauss"));
        assert!(notification.message.contains("in 10m"));
        assert!(!notification.message.contains("#ops-urgent"));
        assert_eq!(decision.next_check, Some(DEFAULT_REQUEUE));
    }

    #[test]
    fn test_announce_out_of_hours_adds_contact() {
        // Saturday 2026-10-17 19:00 UTC
        let target = Utc.with_ymd_and_hms(2026, 10, 17, 19, 0, 0).unwrap();
        let resource = scheduled("14.2.2", "15.2.1", target);
        let decision = engine().decide(&resource, target - TimeDelta::minutes(3));

        assert_eq!(decision.action, Action::Announce);
        let message = decision.notification.unwrap().message;
        assert!(message.contains("Please contact us via #ops-urgent"));
        assert_eq!(decision.next_check, Some(Duration::from_secs(3 * 60 + 1)));
    }

    #[test]
    fn test_announce_is_not_repeated() {
        let mut resource = scheduled("14.2.2", "15.2.1", now() + TimeDelta::minutes(10));
        let first = engine().decide(&resource, now());
        persist(&mut resource, &first);

        let second = engine().decide(&resource, now() + TimeDelta::minutes(1));
        assert_eq!(second.action, Action::Wait);
        assert!(second.notification.is_none());
        assert!(second.mutation.is_none());
    }

    #[test]
    fn test_legacy_marker_counts_as_announced() {
        let keys = ScheduleKeys::default();
        let resource = scheduled("14.2.2", "15.2.1", now() + TimeDelta::minutes(10))
            .with_annotation(&keys.announcement, "true");
        assert_eq!(engine().decide(&resource, now()).action, Action::Wait);
    }

    #[test]
    fn test_changed_target_announces_again() {
        let keys = ScheduleKeys::default();
        let resource = scheduled("14.2.2", "15.3.0", now() + TimeDelta::minutes(10))
            .with_annotation(&keys.announcement, "15.2.1");
        let decision = engine().decide(&resource, now());
        assert_eq!(decision.action, Action::Announce);
        assert!(decision.notification.unwrap().message.contains("15.3.0"));
    }

    #[test]
    fn test_apply_when_time_passed() {
        let resource = scheduled("14.2.2", "15.2.1", now() - TimeDelta::hours(1));
        let decision = engine().decide(&resource, now());

        assert_eq!(decision.guard, Guard::ApplyUpgrade);
        assert_eq!(decision.action, Action::Apply);
        assert_eq!(
            decision.mutation,
            Some(Mutation::ApplyVersion {
                from: Version::new(14, 2, 2),
                to: Version::new(15, 2, 1),
            })
        );
        assert_eq!(count_applied(&decision), 1);
        assert_eq!(decision.next_check, Some(DEFAULT_REQUEUE));

        // Never announced, so the announcement rides along.
        let notification = decision.notification.as_ref().unwrap();
        assert!(notification.message.contains("is starting now"));

        let mut resource = resource;
        persist(&mut resource, &decision);
        let keys = ScheduleKeys::default();
        assert_eq!(resource.label(&keys.release_label), Some("15.2.1"));
        assert!(!resource.has_schedule(&keys));
        assert!(!resource.annotations.contains_key(&keys.announcement));
    }

    #[test]
    fn test_apply_after_announcement_has_no_notification() {
        let keys = ScheduleKeys::default();
        let resource = scheduled("14.2.2", "15.2.1", now() - TimeDelta::minutes(1))
            .with_annotation(&keys.announcement, "15.2.1");
        let decision = engine().decide(&resource, now());
        assert_eq!(decision.action, Action::Apply);
        assert!(decision.notification.is_none());
    }

    #[test]
    fn test_apply_at_exact_target_time() {
        let keys = ScheduleKeys::default();
        let resource = scheduled("14.2.2", "15.2.1", now()).with_annotation(&keys.announcement, "15.2.1");
        assert_eq!(engine().decide(&resource, now()).action, Action::Apply);
    }

    #[test]
    fn test_already_satisfied_clears_schedule() {
        let resource = scheduled("14.2.2", "14.2.0", now() - TimeDelta::hours(1));
        let decision = engine().decide(&resource, now());

        assert_eq!(decision.guard, Guard::AlreadySatisfied);
        assert_eq!(decision.action, Action::AlreadyApplied);
        assert_eq!(decision.mutation, Some(Mutation::ClearSchedule));
        assert!(decision.notification.is_none());
        assert!(decision.metrics.iter().all(|m| matches!(
            m,
            MetricUpdate::UpgradeInfo { value, .. } if *value == GAUGE_IDLE
        )));

        let mut resource = resource;
        persist(&mut resource, &decision);
        let keys = ScheduleKeys::default();
        assert_eq!(resource.label(&keys.release_label), Some("14.2.2"));
        assert!(!resource.has_schedule(&keys));
    }

    #[test]
    fn test_satisfied_future_schedule_waits_at_default_cadence() {
        let resource = scheduled("14.2.2", "14.2.0", now() + TimeDelta::minutes(2));
        let decision = engine().decide(&resource, now());
        assert_eq!(decision.action, Action::Wait);
        assert_eq!(decision.next_check, Some(DEFAULT_REQUEUE));
    }

    #[test]
    fn test_far_future_waits() {
        let keys = ScheduleKeys::default();
        let resource = ScheduledResource::new("default", "test2")
            .with_label(&keys.release_label, "14.2.2")
            .with_annotation(&keys.target_release, "15.2.1")
            .with_annotation(&keys.target_time, "31 Dec 50 20:00 UTC");
        let decision = engine().decide(&resource, now());

        assert_eq!(decision.guard, Guard::TimeNotReached);
        assert_eq!(decision.action, Action::Wait);
        assert!(decision.mutation.is_none());
        assert_eq!(decision.next_check, Some(DEFAULT_REQUEUE));
        assert_eq!(
            decision.metrics,
            vec![MetricUpdate::UpgradeInfo {
                labels: UpgradeLabels::new("default", "test2", "14.2.2", "15.2.1"),
                value: 2_556_129_600.0,
            }]
        );
    }

    #[test]
    fn test_wait_shrinks_near_target() {
        let keys = ScheduleKeys::default();
        let resource = scheduled("14.2.2", "15.2.1", now() + TimeDelta::minutes(2))
            .with_annotation(&keys.announcement, "15.2.1");
        let decision = engine().decide(&resource, now());
        assert_eq!(decision.action, Action::Wait);
        assert_eq!(decision.next_check, Some(Duration::from_secs(121)));
    }

    #[test]
    fn test_malformed_time_reports_error() {
        let keys = ScheduleKeys::default();
        let resource = ScheduledResource::new("default", "test")
            .with_label(&keys.release_label, "14.2.2")
            .with_annotation(&keys.target_release, "15.2.1")
            .with_annotation(&keys.target_time, "2021-01-30 15:04");
        let decision = engine().decide(&resource, now());

        assert_eq!(decision.guard, Guard::InvalidSchedule);
        assert!(matches!(
            decision.action,
            Action::ReportError(ScheduleError::InvalidScheduleTime { .. })
        ));
        assert!(decision.mutation.is_none());
        assert!(decision.next_check.is_none());
        assert_eq!(
            decision.metrics,
            vec![MetricUpdate::UpgradeInfo {
                labels: UpgradeLabels::unversioned("default", "test"),
                value: GAUGE_ERROR,
            }]
        );
    }

    #[test]
    fn test_invalid_target_version_reports_error() {
        let resource = scheduled("14.2.2", "15.2", now());
        let decision = engine().decide(&resource, now());
        assert!(matches!(
            decision.action,
            Action::ReportError(ScheduleError::InvalidVersion { field, .. }) if field == TARGET_VERSION_FIELD
        ));
    }

    #[test]
    fn test_missing_release_label_reports_error() {
        let keys = ScheduleKeys::default();
        let mut resource = scheduled("14.2.2", "15.2.1", now());
        resource.labels.remove(&keys.release_label);
        let decision = engine().decide(&resource, now());
        assert!(matches!(
            decision.action,
            Action::ReportError(ScheduleError::InvalidVersion { field, .. }) if field == CURRENT_VERSION_FIELD
        ));
    }

    #[test]
    fn test_invalid_after_announcement_counts_failure() {
        let keys = ScheduleKeys::default();
        let resource = scheduled("14.2.2", "not-a-version", now())
            .with_annotation(&keys.announcement, "15.2.1");
        let decision = engine().decide(&resource, now());
        assert!(decision.is_error());
        assert!(decision.metrics.contains(&MetricUpdate::Failed(UpgradeLabels::new(
            "default",
            "test",
            "14.2.2",
            "not-a-version"
        ))));
    }

    #[test]
    fn test_deleted_wins_over_everything() {
        let mut resource = scheduled("14.2.2", "15.2.1", now() - TimeDelta::hours(1));
        resource.deletion_requested = true;
        resource.paused = true;
        let decision = engine().decide(&resource, now());
        assert_eq!(decision.guard, Guard::Deleted);
        assert_eq!(decision.action, Action::NoOp);
        assert!(decision.next_check.is_none());
    }

    #[test]
    fn test_paused_is_quiescent() {
        let mut resource = scheduled("14.2.2", "15.2.1", now() - TimeDelta::hours(1));
        resource.paused = true;
        let decision = engine().decide(&resource, now());
        assert_eq!(decision.guard, Guard::Paused);
        assert_eq!(decision.action, Action::NoOp);
        assert!(decision.mutation.is_none());
        assert_eq!(decision.next_check, Some(DEFAULT_REQUEUE));
    }

    #[test]
    fn test_partial_schedule_is_not_a_schedule() {
        let keys = ScheduleKeys::default();
        let resource = ScheduledResource::new("default", "test")
            .with_label(&keys.release_label, "14.2.2")
            .with_annotation(&keys.target_time, "30 Jan 21 15:04 UTC");
        let decision = engine().decide(&resource, now());
        assert_eq!(decision.guard, Guard::NoScheduleRequested);
        assert_eq!(decision.next_check, Some(DEFAULT_REQUEUE));
    }

    #[test]
    fn test_invalid_time_is_reported_before_announcement() {
        // Broken time plus a broken version: the time is checked first.
        let resource = ScheduledResource::new("default", "test")
            .with_annotation(&ScheduleKeys::default().target_release, "x")
            .with_annotation(&ScheduleKeys::default().target_time, "soon");
        let decision = engine().decide(&resource, now());
        assert!(matches!(
            decision.action,
            Action::ReportError(ScheduleError::InvalidScheduleTime { .. })
        ));
    }

    fn version_strategy() -> impl Strategy<Value = Version> {
        (0u64..30, 0u64..6, 0u64..6).prop_map(|(major, minor, patch)| Version::new(major, minor, patch))
    }

    proptest! {
        #[test]
        fn prop_apply_then_reevaluate_is_quiescent(
            current in version_strategy(),
            target in version_strategy(),
            minutes_past in 0i64..10_000,
        ) {
            prop_assume!(target > current);
            let mut resource = scheduled(
                &current.to_string(),
                &target.to_string(),
                now() - TimeDelta::minutes(minutes_past),
            );
            let decision = engine().decide(&resource, now());
            prop_assert_eq!(decision.action.kind(), ActionKind::Apply);

            persist(&mut resource, &decision);
            let again = engine().decide(&resource, now());
            prop_assert_eq!(again.guard, Guard::NoScheduleRequested);
        }

        #[test]
        fn prop_passes_are_monotonic_and_announce_once(
            current in version_strategy(),
            target in version_strategy(),
            start_offset in -40i64..40,
            step_secs in 20i64..400,
        ) {
            let mut resource = scheduled(
                &current.to_string(),
                &target.to_string(),
                now() + TimeDelta::minutes(start_offset),
            );
            let keys = ScheduleKeys::default();
            let mut announcements = 0;
            let mut seen = current.clone();

            for pass in 0..60 {
                let at = now() + TimeDelta::seconds(pass * step_secs);
                let decision = engine().decide(&resource, at);
                if decision.notification.is_some() {
                    announcements += 1;
                }
                persist(&mut resource, &decision);

                let running = Version::parse(resource.label(&keys.release_label).unwrap()).unwrap();
                prop_assert!(running >= seen);
                seen = running;
            }

            prop_assert!(announcements <= 1);
            if target <= current {
                prop_assert_eq!(seen, current);
            }
        }

        #[test]
        fn prop_announced_marker_never_reemits(
            current in version_strategy(),
            target in version_strategy(),
            offset_secs in -3_600i64..3_600,
        ) {
            let keys = ScheduleKeys::default();
            let resource = scheduled(&current.to_string(), &target.to_string(), now() + TimeDelta::seconds(offset_secs))
                .with_annotation(&keys.announcement, target.to_string());
            let decision = engine().decide(&resource, now());
            prop_assert!(decision.notification.is_none());
            prop_assert_ne!(decision.action.kind(), ActionKind::Announce);
        }
    }
}
