//! JSON state file store.
//!
//! The file is the shared surface between the scheduler and whoever creates
//! schedules: external actors edit it, the scheduler writes its updates back.
//! It is re-read on every access and written atomically (temp file, rename).
//!
//! Updates are whole-file read-modify-write with no staleness check: an
//! external edit landing between the load and the rename of an update is
//! lost (last writer wins). The lock only orders writers inside this process.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use upsched_schedule::{ResourceKey, ScheduledResource};

use super::{ConfigObject, ResourceStore, StoreError};

/// State file format version.
pub const STATE_VERSION: u32 = 1;

/// On-disk layout of the state file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,

    #[serde(default)]
    pub resources: Vec<ScheduledResource>,

    #[serde(default)]
    pub configs: Vec<ConfigObject>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            resources: Vec::new(),
            configs: Vec::new(),
        }
    }
}

/// Store backed by a JSON state file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,

    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state file; a missing file is an empty state.
    pub async fn load(&self) -> Result<StateFile, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No state file, starting empty");
                return Ok(StateFile::default());
            }
            Err(e) => return Err(e.into()),
        };

        let state: StateFile = serde_json::from_str(&content)?;
        if state.version != STATE_VERSION {
            warn!(
                path = %self.path.display(),
                file_version = state.version,
                expected_version = STATE_VERSION,
                "State file version mismatch"
            );
        }
        Ok(state)
    }

    /// Write the state file atomically.
    pub async fn save(&self, state: &StateFile) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(state)?;
        let temp_path = self.path.with_extension("tmp");

        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        debug!(
            path = %self.path.display(),
            resources = state.resources.len(),
            configs = state.configs.len(),
            "Saved state file"
        );
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for FileStore {
    async fn list_keys(&self) -> Result<Vec<ResourceKey>, StoreError> {
        let state = self.load().await?;
        let mut keys: Vec<_> = state.resources.iter().map(ScheduledResource::key).collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn list_resources(&self) -> Result<Vec<ScheduledResource>, StoreError> {
        let mut resources = self.load().await?.resources;
        resources.sort_by_key(ScheduledResource::key);
        Ok(resources)
    }

    async fn get_resource(&self, key: &ResourceKey) -> Result<Option<ScheduledResource>, StoreError> {
        let state = self.load().await?;
        Ok(state.resources.into_iter().find(|r| &r.key() == key))
    }

    /// Last writer wins against concurrent external edits of the file.
    async fn update_resource(&self, resource: &ScheduledResource) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load().await?;

        let key = resource.key();
        let Some(stored) = state.resources.iter_mut().find(|r| r.key() == key) else {
            return Err(StoreError::NotFound { kind: "resource", key });
        };
        *stored = resource.clone();

        self.save(&state).await
    }

    async fn get_config(&self, key: &ResourceKey) -> Result<Option<ConfigObject>, StoreError> {
        let state = self.load().await?;
        Ok(state.configs.into_iter().find(|c| &c.key() == key))
    }

    async fn update_config(&self, config: &ConfigObject) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load().await?;

        let key = config.key();
        let Some(stored) = state.configs.iter_mut().find(|c| c.key() == key) else {
            return Err(StoreError::NotFound { kind: "config", key });
        };
        *stored = config.clone();

        self.save(&state).await
    }
}
