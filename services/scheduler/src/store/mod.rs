//! Resource store port.
//!
//! The store delivers resource snapshots and persists updates. It is the only
//! place schedule state lives: the driver keeps nothing between passes except
//! due times.

mod file;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use upsched_schedule::{ResourceKey, ScheduledResource};

pub use file::{FileStore, StateFile, STATE_VERSION};
pub use memory::MemoryStore;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: ResourceKey },

    #[error("state I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure injected by a test double.
    #[error("injected failure: {0}")]
    Injected(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// A bundled configuration blob, addressed like a resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigObject {
    pub namespace: String,
    pub name: String,

    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl ConfigObject {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.namespace, &self.name)
    }
}

/// Read and write access to scheduled resources and their config objects.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// All resource identities currently known.
    async fn list_keys(&self) -> Result<Vec<ResourceKey>, StoreError>;

    /// All resources currently known, in key order.
    async fn list_resources(&self) -> Result<Vec<ScheduledResource>, StoreError> {
        let mut resources = Vec::new();
        for key in self.list_keys().await? {
            if let Some(resource) = self.get_resource(&key).await? {
                resources.push(resource);
            }
        }
        Ok(resources)
    }

    /// Fetch a resource; `Ok(None)` if it does not exist.
    async fn get_resource(&self, key: &ResourceKey) -> Result<Option<ScheduledResource>, StoreError>;

    /// Replace an existing resource.
    async fn update_resource(&self, resource: &ScheduledResource) -> Result<(), StoreError>;

    /// Fetch a config object; `Ok(None)` if it does not exist.
    async fn get_config(&self, key: &ResourceKey) -> Result<Option<ConfigObject>, StoreError>;

    /// Replace an existing config object.
    async fn update_config(&self, config: &ConfigObject) -> Result<(), StoreError>;
}
