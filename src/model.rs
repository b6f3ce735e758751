//! Canonical data model: devices, positions, device settings.
//!
//! A [`Position`] is created once per decoded frame, immutable afterwards,
//! and handed to the position sink by value. Extended attributes keep their
//! insertion order because downstream consumers serialize them as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Internal device identifier assigned by the backing store.
pub type DeviceId = i64;

/// A known tracker device. Immutable once resolved by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Internal id.
    pub id: DeviceId,
    /// Hardware identifier (usually an IMEI) the device logs in with.
    pub unique_id: String,
}

/// One normalized position record.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    /// Owning device.
    pub device_id: DeviceId,
    /// Fix time, UTC.
    pub time: DateTime<Utc>,
    /// Whether the device reported a valid fix.
    pub valid: bool,
    /// Degrees, signed.
    pub latitude: f64,
    /// Degrees, signed.
    pub longitude: f64,
    /// Meters.
    pub altitude: f64,
    /// Knots.
    pub speed: f64,
    /// Degrees from north.
    pub course: f64,
    /// Protocol-specific extras, in insertion order.
    pub attributes: Vec<(String, serde_json::Value)>,
}

impl Position {
    /// Create a position with empty attributes.
    pub fn new(device_id: DeviceId, time: DateTime<Utc>) -> Self {
        Self {
            device_id,
            time,
            valid: false,
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            speed: 0.0,
            course: 0.0,
            attributes: Vec::new(),
        }
    }

    /// Append an extended attribute, preserving insertion order.
    pub fn set(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.attributes.push((key.to_string(), value.into()));
    }

    /// Look up an extended attribute by key.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

/// Acknowledgement state of a pushed setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckStatus {
    /// Waiting for the device to confirm.
    Pending,
    /// Device confirmed the setting.
    Updated,
}

/// Server-desired configuration for one device.
///
/// Status moves `Pending -> Updated` only on a confirmed device
/// acknowledgement (see the GT06 command-echo handling).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Settings row id.
    pub id: i64,
    /// Owning device.
    pub device_id: DeviceId,
    /// Desired reporting interval, seconds.
    pub refresh_interval: f64,
    /// Device hardware class, e.g. "JI03" / "JI06" / "JI09".
    /// Selects the contact push payload grammar.
    pub device_type: String,
    /// Acknowledgement state.
    pub status: AckStatus,
}

/// One SOS number pending push to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SosNumber {
    pub id: i64,
    pub settings_id: i64,
    pub number: String,
    pub status: AckStatus,
}

/// One contact ("friends and family") entry pending push to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub settings_id: i64,
    pub name: String,
    pub number: String,
    pub status: AckStatus,
}
