//! Error types for schedule evaluation.

use thiserror::Error;

/// Errors produced while validating a resource's schedule.
///
/// Both variants describe input the operator has to correct; neither is
/// retried into success by the engine itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// A release version string is not a valid semantic version.
    #[error("invalid {field} '{value}': {reason}")]
    InvalidVersion {
        field: &'static str,
        value: String,
        reason: String,
    },

    /// The target upgrade time is not in `DD Mon YY HH:MM TZ` form.
    #[error("invalid schedule time '{value}': {reason}")]
    InvalidScheduleTime { value: String, reason: String },
}

impl ScheduleError {
    /// Returns true if this error came from a version string.
    pub fn is_version_error(&self) -> bool {
        matches!(self, ScheduleError::InvalidVersion { .. })
    }

    /// Returns true if this error came from the target time.
    pub fn is_time_error(&self) -> bool {
        matches!(self, ScheduleError::InvalidScheduleTime { .. })
    }
}
