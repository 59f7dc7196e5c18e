//! Requeue planning: when the engine must be invoked again for a resource.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Cadence while nothing is imminent.
pub const DEFAULT_REQUEUE: Duration = Duration::from_secs(5 * 60);

/// Added to a short requeue so the next pass lands after the target time.
pub const REQUEUE_SKEW: Duration = Duration::from_secs(1);

/// Compute the delay before the next check.
///
/// Without a target (no schedule, or a satisfied one) this is the default
/// cadence. Far targets also get the default cadence rather than a single
/// long wakeup. Within the last five minutes the delay shrinks to the
/// remaining time plus the skew, capped at the default.
pub fn next_check(now: DateTime<Utc>, target: Option<DateTime<Utc>>) -> Duration {
    let Some(target) = target else {
        return DEFAULT_REQUEUE;
    };

    // Negative remaining time fails the conversion and collapses to zero.
    let remaining = (target - now).to_std().unwrap_or(Duration::ZERO);
    if remaining >= DEFAULT_REQUEUE {
        return DEFAULT_REQUEUE;
    }

    (remaining + REQUEUE_SKEW).min(DEFAULT_REQUEUE)
}
