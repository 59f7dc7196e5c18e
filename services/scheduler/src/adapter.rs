//! Version write strategies.
//!
//! An adapter decides which field carries the new release version. The
//! resource's version-source label picks the adapter; without it the release
//! label itself is rewritten.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use upsched_schedule::{ResourceKey, ScheduleKeys, ScheduledResource, Version, VERSION_SOURCE_VALUES_CONFIG};

use crate::store::{ResourceStore, StoreError};

/// Source kind for the release-label adapter.
pub const VERSION_SOURCE_LABEL: &str = "label";

/// Suffix of the config object rewritten by [`ValuesConfigAdapter`].
pub const USER_CONFIG_SUFFIX: &str = "-userconfig";

/// Data key inside the config object holding the values document.
pub const VALUES_DATA_KEY: &str = "values";

/// Adapter errors.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("no version adapter registered for source '{source_kind}'")]
    NotRegistered { source_kind: String },

    #[error("config object {key} not found")]
    ConfigNotFound { key: ResourceKey },

    #[error("version {version} not found in {key} data key '{data_key}'")]
    VersionNotFound {
        key: ResourceKey,
        version: String,
        data_key: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Writes a new release version somewhere on or beside a resource.
#[async_trait]
pub trait VersionAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Write `to` in place of `from`.
    ///
    /// Changes to `resource` are persisted by the caller together with the
    /// schedule clearing. Anything else must be persisted here.
    async fn write_version(
        &self,
        resource: &mut ScheduledResource,
        from: &Version,
        to: &Version,
        store: &dyn ResourceStore,
    ) -> Result<(), AdapterError>;
}

/// Rewrites the release-version label.
#[derive(Debug, Clone)]
pub struct LabelAdapter {
    release_label: String,
}

impl LabelAdapter {
    pub fn new(release_label: impl Into<String>) -> Self {
        Self {
            release_label: release_label.into(),
        }
    }
}

#[async_trait]
impl VersionAdapter for LabelAdapter {
    fn name(&self) -> &'static str {
        VERSION_SOURCE_LABEL
    }

    async fn write_version(
        &self,
        resource: &mut ScheduledResource,
        _from: &Version,
        to: &Version,
        _store: &dyn ResourceStore,
    ) -> Result<(), AdapterError> {
        resource
            .labels
            .insert(self.release_label.clone(), to.to_string());
        Ok(())
    }
}

/// Rewrites `version: <from>` inside the `<name>-userconfig` values document
/// and moves the release label along with it.
///
/// A document that already reads `version: <to>` and no longer mentions
/// `<from>` is taken as written by an earlier, partially persisted pass.
#[derive(Debug, Clone)]
pub struct ValuesConfigAdapter {
    release_label: String,
}

impl ValuesConfigAdapter {
    pub fn new(release_label: impl Into<String>) -> Self {
        Self {
            release_label: release_label.into(),
        }
    }

    pub fn config_key(resource: &ScheduledResource) -> ResourceKey {
        ResourceKey::new(&resource.namespace, format!("{}{USER_CONFIG_SUFFIX}", resource.name))
    }
}

#[async_trait]
impl VersionAdapter for ValuesConfigAdapter {
    fn name(&self) -> &'static str {
        VERSION_SOURCE_VALUES_CONFIG
    }

    async fn write_version(
        &self,
        resource: &mut ScheduledResource,
        from: &Version,
        to: &Version,
        store: &dyn ResourceStore,
    ) -> Result<(), AdapterError> {
        let key = Self::config_key(resource);
        let mut config = store
            .get_config(&key)
            .await?
            .ok_or_else(|| AdapterError::ConfigNotFound { key: key.clone() })?;

        let old = format!("version: {from}");
        let new = format!("version: {to}");
        let Some(values) = config.data.get_mut(VALUES_DATA_KEY) else {
            return Err(AdapterError::VersionNotFound {
                key,
                version: from.to_string(),
                data_key: VALUES_DATA_KEY,
            });
        };

        if values.contains(&old) {
            *values = values.replace(&old, &new);
            store.update_config(&config).await?;
            debug!(config = %key, from = %from, to = %to, "Rewrote version in values config");
        } else if values.contains(&new) {
            debug!(config = %key, to = %to, "Values config already carries target version");
        } else {
            return Err(AdapterError::VersionNotFound {
                key,
                version: from.to_string(),
                data_key: VALUES_DATA_KEY,
            });
        }

        resource
            .labels
            .insert(self.release_label.clone(), to.to_string());
        Ok(())
    }
}

/// Maps version-source discriminator values to adapters.
pub struct AdapterRegistry {
    version_source_label: String,
    adapters: BTreeMap<String, Arc<dyn VersionAdapter>>,
}

impl AdapterRegistry {
    /// Registry with the label and values-config adapters.
    pub fn new(keys: &ScheduleKeys) -> Self {
        let mut registry = Self {
            version_source_label: keys.version_source.clone(),
            adapters: BTreeMap::new(),
        };
        registry.register(Arc::new(LabelAdapter::new(&keys.release_label)));
        registry.register(Arc::new(ValuesConfigAdapter::new(&keys.release_label)));
        registry
    }

    /// Register an adapter under its own name, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn VersionAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    /// The discriminator value for a resource, defaulting to the label source.
    pub fn source_kind<'a>(&self, resource: &'a ScheduledResource) -> &'a str {
        resource
            .label(&self.version_source_label)
            .unwrap_or(VERSION_SOURCE_LABEL)
    }

    pub fn select(&self, resource: &ScheduledResource) -> Result<Arc<dyn VersionAdapter>, AdapterError> {
        let source_kind = self.source_kind(resource);
        self.adapters
            .get(source_kind)
            .cloned()
            .ok_or_else(|| AdapterError::NotRegistered {
                source_kind: source_kind.to_string(),
            })
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("version_source_label", &self.version_source_label)
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}
