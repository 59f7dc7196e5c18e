//! In-memory store with failure injection.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use upsched_schedule::{ResourceKey, ScheduledResource};

use super::{ConfigObject, ResourceStore, StoreError};

/// Store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    resources: RwLock<BTreeMap<ResourceKey, ScheduledResource>>,
    configs: RwLock<BTreeMap<ResourceKey, ConfigObject>>,
    fail_reads: AtomicBool,
    fail_resource_writes: AtomicBool,
    fail_config_writes: AtomicBool,
    resource_writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a resource, bypassing failure injection.
    pub async fn insert_resource(&self, resource: ScheduledResource) {
        self.resources.write().await.insert(resource.key(), resource);
    }

    /// Insert or replace a config object, bypassing failure injection.
    pub async fn insert_config(&self, config: ConfigObject) {
        self.configs.write().await.insert(config.key(), config);
    }

    pub async fn remove_resource(&self, key: &ResourceKey) -> Option<ScheduledResource> {
        self.resources.write().await.remove(key)
    }

    /// Current stored copy of a resource.
    pub async fn resource(&self, key: &ResourceKey) -> Option<ScheduledResource> {
        self.resources.read().await.get(key).cloned()
    }

    /// Current stored copy of a config object.
    pub async fn config(&self, key: &ResourceKey) -> Option<ConfigObject> {
        self.configs.read().await.get(key).cloned()
    }

    /// Make every read fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every resource update fail.
    pub fn fail_resource_writes(&self, fail: bool) {
        self.fail_resource_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every config update fail.
    pub fn fail_config_writes(&self, fail: bool) {
        self.fail_config_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful resource updates.
    pub fn resource_writes(&self) -> u64 {
        self.resource_writes.load(Ordering::SeqCst)
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Injected("read".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn list_keys(&self) -> Result<Vec<ResourceKey>, StoreError> {
        self.check_reads()?;
        Ok(self.resources.read().await.keys().cloned().collect())
    }

    async fn list_resources(&self) -> Result<Vec<ScheduledResource>, StoreError> {
        self.check_reads()?;
        Ok(self.resources.read().await.values().cloned().collect())
    }

    async fn get_resource(&self, key: &ResourceKey) -> Result<Option<ScheduledResource>, StoreError> {
        self.check_reads()?;
        Ok(self.resources.read().await.get(key).cloned())
    }

    async fn update_resource(&self, resource: &ScheduledResource) -> Result<(), StoreError> {
        if self.fail_resource_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Injected(format!("update {}", resource.key())));
        }

        let key = resource.key();
        let mut resources = self.resources.write().await;
        let Some(stored) = resources.get_mut(&key) else {
            return Err(StoreError::NotFound { kind: "resource", key });
        };
        *stored = resource.clone();
        self.resource_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_config(&self, key: &ResourceKey) -> Result<Option<ConfigObject>, StoreError> {
        self.check_reads()?;
        Ok(self.configs.read().await.get(key).cloned())
    }

    async fn update_config(&self, config: &ConfigObject) -> Result<(), StoreError> {
        if self.fail_config_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Injected(format!("update config {}", config.key())));
        }

        let key = config.key();
        let mut configs = self.configs.write().await;
        let Some(stored) = configs.get_mut(&key) else {
            return Err(StoreError::NotFound { kind: "config", key });
        };
        *stored = config.clone();
        Ok(())
    }
}
