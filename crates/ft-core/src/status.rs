use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::types::Device;

/// Tracker liveness, written by the tracker loop and read by the gateway.
///
/// `last_device` survives session expiry so persisted history stays readable
/// after the remote session is gone.
#[derive(Debug, Default)]
pub struct TrackerStatus {
    active: AtomicBool,
    last_device: RwLock<Option<Device>>,
    last_success: RwLock<Option<DateTime<Utc>>>,
}

impl TrackerStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the tracker loop is currently scheduled.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    /// The device the tracker resolved most recently.
    pub async fn last_device(&self) -> Option<Device> {
        self.last_device.read().await.clone()
    }

    pub async fn set_last_device(&self, device: Device) {
        *self.last_device.write().await = Some(device);
    }

    /// Time of the last tick that persisted an observation.
    pub async fn last_success(&self) -> Option<DateTime<Utc>> {
        *self.last_success.read().await
    }

    pub async fn record_success(&self, at: DateTime<Utc>) {
        *self.last_success.write().await = Some(at);
    }
}
