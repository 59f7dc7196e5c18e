//! Release version parsing and ordering.

use semver::Version;

use crate::error::ScheduleError;

/// Field name used in errors for the running version.
pub const CURRENT_VERSION_FIELD: &str = "current release version";

/// Field name used in errors for the desired version.
pub const TARGET_VERSION_FIELD: &str = "target release version";

/// Whether a scheduled target still has to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionStatus {
    /// The current version is below the target.
    Pending,

    /// The current version is at or above the target.
    Satisfied,
}

impl VersionStatus {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }
}

/// Parse a release version strictly (`major.minor.patch[-pre][+build]`).
pub fn parse_version(field: &'static str, raw: &str) -> Result<Version, ScheduleError> {
    Version::parse(raw.trim()).map_err(|e| ScheduleError::InvalidVersion {
        field,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Compare a target against the running version.
///
/// Ordering follows semver precedence; build metadata is ignored.
pub fn compare(target: &Version, current: &Version) -> VersionStatus {
    if current.cmp_precedence(target).is_ge() {
        VersionStatus::Satisfied
    } else {
        VersionStatus::Pending
    }
}

/// Parse both strings and compare them.
pub fn compare_raw(target: &str, current: &str) -> Result<VersionStatus, ScheduleError> {
    let target = parse_version(TARGET_VERSION_FIELD, target)?;
    let current = parse_version(CURRENT_VERSION_FIELD, current)?;
    Ok(compare(&target, &current))
}
