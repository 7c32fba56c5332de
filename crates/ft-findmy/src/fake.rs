//! Scriptable in-process `FindMyApi` for tests and local runs.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::client::FindMyApi;
use crate::credentials::Credentials;
use crate::error::{RemoteError, Result};
use crate::types::{RemoteDevice, RemoteLocation};

/// Failure a [`FakeFindMy`] call should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFailure {
    /// Session rejected (HTTP 401).
    Unauthorized,
    /// Service unavailable (HTTP 503).
    Unavailable,
    /// Request refused (HTTP 400).
    Rejected,
}

impl FakeFailure {
    fn to_error(self) -> RemoteError {
        match self {
            FakeFailure::Unauthorized => RemoteError::Unauthorized(401),
            FakeFailure::Unavailable => RemoteError::Api {
                status: 503,
                body: "service unavailable".into(),
            },
            FakeFailure::Rejected => RemoteError::Api {
                status: 400,
                body: "request refused".into(),
            },
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    devices: Vec<RemoteDevice>,
    list_failure: Option<FakeFailure>,
    sound_failure: Option<FakeFailure>,
    list_calls: usize,
    sounds: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub struct FakeFindMy {
    state: Mutex<FakeState>,
}

impl FakeFindMy {
    pub fn new(devices: Vec<RemoteDevice>) -> Self {
        Self {
            state: Mutex::new(FakeState {
                devices,
                ..FakeState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_devices(&self, devices: Vec<RemoteDevice>) {
        self.lock().devices = devices;
    }

    /// Move the device with `device_id` to a new fix.
    pub fn move_device(&self, device_id: &str, latitude: f64, longitude: f64) {
        let mut state = self.lock();
        if let Some(dev) = state.devices.iter_mut().find(|d| d.id == device_id) {
            dev.location = Some(location(latitude, longitude));
        }
    }

    pub fn fail_list(&self, failure: Option<FakeFailure>) {
        self.lock().list_failure = failure;
    }

    pub fn fail_sound(&self, failure: Option<FakeFailure>) {
        self.lock().sound_failure = failure;
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    /// `(device_id, subject)` of every accepted `play_sound`.
    pub fn sounds(&self) -> Vec<(String, String)> {
        self.lock().sounds.clone()
    }
}

#[async_trait]
impl FindMyApi for FakeFindMy {
    async fn list_devices(&self, _credentials: &Credentials) -> Result<Vec<RemoteDevice>> {
        let mut state = self.lock();
        state.list_calls += 1;
        match state.list_failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(state.devices.clone()),
        }
    }

    async fn play_sound(
        &self,
        _credentials: &Credentials,
        device_id: &str,
        subject: &str,
    ) -> Result<()> {
        let mut state = self.lock();
        if let Some(failure) = state.sound_failure {
            return Err(failure.to_error());
        }
        state.sounds.push((device_id.to_string(), subject.to_string()));
        Ok(())
    }
}

fn location(latitude: f64, longitude: f64) -> RemoteLocation {
    RemoteLocation {
        latitude,
        longitude,
        horizontal_accuracy: Some(10.0),
        position_type: Some("Wifi".into()),
        is_old: false,
        time_stamp: Some(1_730_000_000_000),
    }
}

/// A located phone at 76% battery.
pub fn phone(id: &str, name: &str, model: &str, latitude: f64, longitude: f64) -> RemoteDevice {
    RemoteDevice {
        id: id.to_string(),
        name: name.to_string(),
        device_display_name: Some(model.to_string()),
        device_class: Some("iPhone".into()),
        battery_level: Some(0.76),
        battery_status: Some("NotCharging".into()),
        device_status: Some("200".into()),
        location_enabled: true,
        location: Some(location(latitude, longitude)),
    }
}

/// Credentials accepted by the fake; never sent anywhere.
pub fn credentials() -> Credentials {
    Credentials {
        apple_id: "someone@example.com".into(),
        dsid: "1234567890".into(),
        service_url: "https://p00-fmipweb.icloud.com".into(),
        cookies: "X-APPLE-WEBAUTH-TOKEN=fake".into(),
        created_at: None,
    }
}
