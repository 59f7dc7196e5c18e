//! Notification sink.

use std::sync::Mutex;

use tracing::{info, warn};
use upsched_schedule::{Notification, ResourceKey, Severity};

/// Receives notifications about scheduled resources.
pub trait EventRecorder: Send + Sync {
    fn record(&self, key: &ResourceKey, notification: &Notification);
}

/// Emits notifications as structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRecorder;

impl EventRecorder for TracingRecorder {
    fn record(&self, key: &ResourceKey, notification: &Notification) {
        match notification.severity {
            Severity::Normal => info!(
                resource = %key,
                reason = notification.reason,
                severity = notification.severity.as_str(),
                message = %notification.message,
                "Resource event"
            ),
            Severity::Warning => warn!(
                resource = %key,
                reason = notification.reason,
                severity = notification.severity.as_str(),
                message = %notification.message,
                "Resource event"
            ),
        }
    }
}

/// A recorded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub key: ResourceKey,
    pub notification: Notification,
}

/// Collects notifications in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.lock().clone()
    }

    pub fn count_for(&self, key: &ResourceKey) -> usize {
        self.lock().iter().filter(|e| &e.key == key).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RecordedEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventRecorder for MemoryRecorder {
    fn record(&self, key: &ResourceKey, notification: &Notification) {
        self.lock().push(RecordedEvent {
            key: key.clone(),
            notification: notification.clone(),
        });
    }
}
