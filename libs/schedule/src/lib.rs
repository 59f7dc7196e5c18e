//! # upsched-schedule
//!
//! Decision engine for time-triggered release upgrades.
//!
//! ## Design Principles
//!
//! - The engine is a pure function of `(resource snapshot, now)`
//! - The resource's own metadata is the only schedule state
//! - Every instant is UTC; "now" is always supplied by the caller
//! - Side effects are returned as data and performed by the driver
//!
//! ## Schedule Metadata
//!
//! A resource requests an upgrade with two annotations:
//!
//! - `upgrade-schedule.io/target-release-version`: e.g. `15.2.1`
//! - `upgrade-schedule.io/target-upgrade-time`: e.g. `30 Jan 21 15:04 UTC`
//!
//! The running version lives in the `upgrade-schedule.io/release-version`
//! label. Once the announcement goes out, the target version is recorded in
//! `upgrade-schedule.io/upgrade-announcement-sent`. All key names can be
//! overridden through [`ScheduleKeys`].

pub mod clock;
mod engine;
mod error;
mod metrics;
pub mod requeue;
mod resource;
pub mod version;

pub use engine::*;
pub use error::ScheduleError;
pub use metrics::*;
pub use resource::*;
pub use version::VersionStatus;

/// Re-export semver for consumers handling versions from decisions
pub use semver::Version;
