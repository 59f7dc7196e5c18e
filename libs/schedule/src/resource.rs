//! Resource identity, the persisted resource shape, and the metadata keys
//! the engine recognizes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default prefix for every recognized annotation and label key.
pub const KEY_PREFIX: &str = "upgrade-schedule.io";

/// Discriminator value selecting the embedded-configuration adapter.
pub const VERSION_SOURCE_VALUES_CONFIG: &str = "values-config";

/// Errors from parsing a `namespace/name` key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("resource key missing '/' separator: '{0}'")]
    MissingSeparator(String),

    #[error("resource key has an empty namespace or name: '{0}'")]
    EmptyPart(String),
}

/// Stable identity of a scheduled resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ResourceKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((namespace, name)) = s.split_once('/') else {
            return Err(KeyParseError::MissingSeparator(s.to_string()));
        };
        if namespace.is_empty() || name.is_empty() {
            return Err(KeyParseError::EmptyPart(s.to_string()));
        }
        Ok(Self::new(namespace, name))
    }
}

/// Names of the annotations and labels that carry schedule state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleKeys {
    /// Annotation holding the desired release version.
    pub target_release: String,

    /// Annotation holding the upgrade time (`DD Mon YY HH:MM TZ`).
    pub target_time: String,

    /// Annotation marking that the announcement was issued.
    pub announcement: String,

    /// Label holding the currently running release version.
    pub release_label: String,

    /// Label selecting how the new version gets written.
    pub version_source: String,
}

impl Default for ScheduleKeys {
    fn default() -> Self {
        Self {
            target_release: format!("{KEY_PREFIX}/target-release-version"),
            target_time: format!("{KEY_PREFIX}/target-upgrade-time"),
            announcement: format!("{KEY_PREFIX}/upgrade-announcement-sent"),
            release_label: format!("{KEY_PREFIX}/release-version"),
            version_source: format!("{KEY_PREFIX}/version-source"),
        }
    }
}

/// A resource whose metadata may carry an upgrade schedule.
///
/// The resource itself is the durable schedule state: nothing about a
/// schedule is kept anywhere else between passes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScheduledResource {
    pub namespace: String,
    pub name: String,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// Reconciliation suspended by the hosting framework.
    #[serde(default)]
    pub paused: bool,

    /// Deletion has been requested; the lifecycle owner takes over.
    #[serde(default)]
    pub deletion_requested: bool,
}

impl ScheduledResource {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.namespace, &self.name)
    }

    /// Builder-style label setter.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Builder-style annotation setter.
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Annotation value, with empty strings treated as absent.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Label value, with empty strings treated as absent.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Returns true if both schedule annotations are present.
    pub fn has_schedule(&self, keys: &ScheduleKeys) -> bool {
        self.annotation(&keys.target_release).is_some() && self.annotation(&keys.target_time).is_some()
    }

    /// Removes the schedule and the announcement marker.
    pub fn clear_schedule(&mut self, keys: &ScheduleKeys) {
        self.annotations.remove(&keys.target_release);
        self.annotations.remove(&keys.target_time);
        self.annotations.remove(&keys.announcement);
    }
}
