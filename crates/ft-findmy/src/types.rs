use chrono::{DateTime, Utc};
use ft_core::types::{BatteryStatus, Device, LocationData, Observation};
use serde::{Deserialize, Serialize};

/// Body of `refreshClient`. Only the device list is read.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshClientResponse {
    #[serde(default)]
    pub content: Vec<RemoteDevice>,
}

/// One entry of the account's device list, as the web service reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDevice {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub device_display_name: Option<String>,
    #[serde(default)]
    pub device_class: Option<String>,
    #[serde(default)]
    pub battery_level: Option<f64>,
    #[serde(default)]
    pub battery_status: Option<String>,
    #[serde(default)]
    pub device_status: Option<String>,
    #[serde(default)]
    pub location_enabled: bool,
    #[serde(default)]
    pub location: Option<RemoteLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub horizontal_accuracy: Option<f64>,
    #[serde(default)]
    pub position_type: Option<String>,
    #[serde(default)]
    pub is_old: bool,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub time_stamp: Option<i64>,
}

impl RemoteDevice {
    pub fn model(&self) -> &str {
        self.device_display_name.as_deref().unwrap_or_default()
    }

    pub fn identity(&self) -> Device {
        Device {
            device_id: self.id.clone(),
            name: self.name.clone(),
            model: self.model().to_string(),
            device_class: self.device_class.clone().unwrap_or_default(),
        }
    }

    pub fn battery_status(&self) -> Option<BatteryStatus> {
        self.battery_status
            .as_deref()
            .map(|s| serde_json::from_value(serde_json::Value::String(s.to_string())))
            .and_then(Result::ok)
    }

    pub fn location_data(&self) -> Option<LocationData> {
        self.location.as_ref().map(|loc| LocationData {
            latitude: loc.latitude,
            longitude: loc.longitude,
            accuracy: loc.horizontal_accuracy,
            position_type: loc.position_type.clone(),
            is_old: loc.is_old,
            location_timestamp: loc.time_stamp,
        })
    }

    /// Snapshot this device as an observation taken at `timestamp`.
    pub fn to_observation(&self, timestamp: DateTime<Utc>) -> Observation {
        Observation::new(
            &self.identity(),
            self.battery_level,
            self.battery_status(),
            self.location_data(),
            timestamp,
        )
        .with_device_state(self.device_status.clone(), self.location_enabled)
    }
}
