//! Linux IIO reader for the kernel `dht11` driver
//!
//! The driver exposes `in_temp_input` (milli-°C) and
//! `in_humidityrelative_input` (milli-%) under its IIO device directory. A
//! failed bus transaction surfaces as an I/O error on read (typically EIO or
//! ETIMEDOUT), which we report as a sensor fault.

use super::{Reading, SensorError, SensorSource};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::time::Instant;

/// DHT11 via `/sys/bus/iio/devices/iio:deviceN`
pub struct IioSensor {
    device_path: PathBuf,
}

impl IioSensor {
    pub fn new(device_path: impl Into<PathBuf>) -> Self {
        Self {
            device_path: device_path.into(),
        }
    }

    fn read_channel(&self, name: &str) -> Result<f64, SensorError> {
        let path = self.device_path.join(name);
        let raw = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::TimedOut => SensorError::Timeout,
            _ => SensorError::ReadFailed(format!("{}: {e}", path.display())),
        })?;
        parse_milli(&raw, &path)
    }
}

fn parse_milli(raw: &str, path: &Path) -> Result<f64, SensorError> {
    raw.trim()
        .parse::<i64>()
        .map(|milli| milli as f64 / 1000.0)
        .map_err(|_| SensorError::InvalidData(format!("{}: {:?}", path.display(), raw.trim())))
}

impl SensorSource for IioSensor {
    fn read(&mut self, now: Instant) -> Result<Reading, SensorError> {
        let humidity = self.read_channel("in_humidityrelative_input")?;
        let temperature = self.read_channel("in_temp_input")?;

        if !(0.0..=100.0).contains(&humidity) {
            return Err(SensorError::InvalidData(format!(
                "humidity out of range: {humidity}"
            )));
        }
        Reading::new(temperature, humidity, now)
    }
}
