//! Wire payloads published by the sensor agent
//!
//! All payloads are JSON objects. Timestamps are milliseconds of device uptime,
//! the only clock a freshly booted device can vouch for; the status payload also
//! carries a wall-clock `reported_at` for consumers that want one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unit label for temperature readings
pub const UNIT_CELSIUS: &str = "°C";

/// Unit label for relative humidity readings
pub const UNIT_PERCENT: &str = "%";

/// One measured quantity, published on its own topic
///
/// # Examples
/// ```
/// use sensor_agent::protocol::ReadingPayload;
///
/// let payload = ReadingPayload::temperature(21.5, 10_000, "DHT11");
/// let json = serde_json::to_string(&payload).unwrap();
/// assert!(json.contains("\"unit\":\"°C\""));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadingPayload {
    pub value: f64,
    pub unit: String,
    /// Uptime in milliseconds when the reading was taken
    pub timestamp: u64,
    /// Sensor identity
    pub sensor: String,
}

impl ReadingPayload {
    pub fn temperature(value: f64, timestamp: u64, sensor: &str) -> Self {
        Self {
            value,
            unit: UNIT_CELSIUS.to_string(),
            timestamp,
            sensor: sensor.to_string(),
        }
    }

    pub fn humidity(value: f64, timestamp: u64, sensor: &str) -> Self {
        Self {
            value,
            unit: UNIT_PERCENT.to_string(),
            timestamp,
            sensor: sensor.to_string(),
        }
    }
}

/// Device availability as seen on the status topic
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatusType {
    Online,
    Offline,
}

/// Retained status announcement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusPayload {
    pub status: DeviceStatusType,
    pub device: String,
    pub version: String,
    /// Uptime in milliseconds
    pub uptime: u64,
    pub total_readings: u64,
    pub failed_readings: u64,
    pub reported_at: DateTime<Utc>,
}

/// Last-will payload, published by the broker when the session dies
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfflinePayload {
    pub status: DeviceStatusType,
    /// Uptime in milliseconds when the session was established
    pub timestamp: u64,
}

impl OfflinePayload {
    pub fn new(timestamp: u64) -> Self {
        Self {
            status: DeviceStatusType::Offline,
            timestamp,
        }
    }
}

/// Periodic liveness signal; never filtered
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeartbeatPayload {
    pub timestamp: u64,
    /// Uptime in milliseconds
    pub uptime: u64,
    pub uptime_minutes: u64,
    /// Always `"alive"`
    pub status: String,
    /// Control loop iterations since boot
    pub ticks: u64,
}

impl HeartbeatPayload {
    pub fn new(uptime_ms: u64, ticks: u64) -> Self {
        Self {
            timestamp: uptime_ms,
            uptime: uptime_ms,
            uptime_minutes: uptime_ms / 60_000,
            status: "alive".to_string(),
            ticks,
        }
    }
}
