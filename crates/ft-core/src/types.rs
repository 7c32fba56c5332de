use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// A remote device resolved from the account's device list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub name: String,
    /// Display model, e.g. "iPhone 16 Pro".
    pub model: String,
    /// Device family, e.g. "iPhone".
    pub device_class: String,
}

// ---------------------------------------------------------------------------
// BatteryStatus
// ---------------------------------------------------------------------------

/// Charging state as reported by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatteryStatus {
    Charging,
    NotCharging,
    Charged,
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// Location fix in human (latitude, longitude) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationData {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in meters.
    pub accuracy: Option<f64>,
    pub position_type: Option<String>,
    #[serde(default)]
    pub is_old: bool,
    /// Fix time reported by the remote service, epoch milliseconds.
    pub location_timestamp: Option<i64>,
}

impl LocationData {
    /// Returns `true` when the coordinate pair is a valid WGS84 position.
    pub fn has_valid_coordinates(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeoKind {
    Point,
}

/// GeoJSON point. Coordinates are `[longitude, latitude]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    pub kind: GeoKind,
    pub coordinates: [f64; 2],
}

impl GeoPoint {
    pub fn from_location(location: &LocationData) -> Self {
        Self {
            kind: GeoKind::Point,
            coordinates: [location.longitude, location.latitude],
        }
    }

    pub fn longitude(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn latitude(&self) -> f64 {
        self.coordinates[1]
    }
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// One point-in-time snapshot of a device, persisted as a single document.
///
/// `location` and `location_data` are both derived from the same
/// [`LocationData`] in [`Observation::new`], so the indexed geometry and the
/// human-ordered copy always agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub device_id: String,
    pub name: String,
    pub model: String,
    pub device_class: String,
    pub battery_level: Option<f64>,
    pub battery_status: Option<BatteryStatus>,
    /// Remote service status code for the device, e.g. "200".
    #[serde(default)]
    pub device_status: Option<String>,
    #[serde(default)]
    pub location_enabled: bool,
    pub location: Option<GeoPoint>,
    pub location_data: Option<LocationData>,
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    /// Build an observation for `device`.
    ///
    /// A location with out-of-range coordinates is dropped, a battery level
    /// outside `0.0..=1.0` is clamped and a non-finite one is discarded.
    pub fn new(
        device: &Device,
        battery_level: Option<f64>,
        battery_status: Option<BatteryStatus>,
        location: Option<LocationData>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let location = location.filter(|loc| {
            let valid = loc.has_valid_coordinates();
            if !valid {
                tracing::warn!(
                    device_id = %device.device_id,
                    latitude = loc.latitude,
                    longitude = loc.longitude,
                    "discarding location with invalid coordinates"
                );
            }
            valid
        });

        Self {
            device_id: device.device_id.clone(),
            name: device.name.clone(),
            model: device.model.clone(),
            device_class: device.device_class.clone(),
            battery_level: battery_level
                .filter(|level| level.is_finite())
                .map(|level| level.clamp(0.0, 1.0)),
            battery_status,
            device_status: None,
            location_enabled: false,
            location: location.as_ref().map(GeoPoint::from_location),
            location_data: location,
            timestamp,
        }
    }

    /// Identity of the device this observation describes.
    pub fn device(&self) -> Device {
        Device {
            device_id: self.device_id.clone(),
            name: self.name.clone(),
            model: self.model.clone(),
            device_class: self.device_class.clone(),
        }
    }

    /// Attach the remote device status code and location-services flag.
    pub fn with_device_state(
        mut self,
        device_status: Option<String>,
        location_enabled: bool,
    ) -> Self {
        self.device_status = device_status;
        self.location_enabled = location_enabled;
        self
    }

    /// Returns `true` when the GeoJSON point and `location_data` describe the
    /// same position (or are both absent).
    pub fn coordinates_consistent(&self) -> bool {
        match (&self.location, &self.location_data) {
            (None, None) => true,
            (Some(point), Some(data)) => {
                point.longitude() == data.longitude && point.latitude() == data.latitude
            }
            _ => false,
        }
    }
}

/// An observation as read back from the store, with its store-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObservation {
    pub id: i64,
    #[serde(flatten)]
    pub observation: Observation,
}

/// Battery/status-only projection of an observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    pub device_id: String,
    pub name: String,
    pub model: String,
    pub device_class: String,
    pub battery_level: Option<f64>,
    pub battery_status: Option<BatteryStatus>,
    pub device_status: Option<String>,
    pub location_enabled: bool,
    pub timestamp: DateTime<Utc>,
}

impl From<&Observation> for StatusView {
    fn from(obs: &Observation) -> Self {
        Self {
            device_id: obs.device_id.clone(),
            name: obs.name.clone(),
            model: obs.model.clone(),
            device_class: obs.device_class.clone(),
            battery_level: obs.battery_level,
            battery_status: obs.battery_status,
            device_status: obs.device_status.clone(),
            location_enabled: obs.location_enabled,
            timestamp: obs.timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
