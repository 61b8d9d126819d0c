//! Temperature/humidity sources
//!
//! A source either produces a complete [`Reading`] or a [`SensorError`]; a
//! faulted read is never represented as a zero-valued reading.

use thiserror::Error;
use tokio::time::Instant;

pub mod comfort;
pub mod iio;
pub mod simulated;

pub use comfort::heat_index_celsius;
pub use iio::IioSensor;
pub use simulated::SimulatedSensor;

/// One successful sample; immutable once taken
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity, percent
    pub humidity: f64,
    pub taken_at: Instant,
}

impl Reading {
    /// Build a reading, rejecting non-finite values as a sensor fault
    pub fn new(temperature: f64, humidity: f64, taken_at: Instant) -> Result<Self, SensorError> {
        if !temperature.is_finite() || !humidity.is_finite() {
            return Err(SensorError::InvalidData(format!(
                "non-finite sample: temperature={temperature}, humidity={humidity}"
            )));
        }
        Ok(Self {
            temperature,
            humidity,
            taken_at,
        })
    }
}

/// Sensor read failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SensorError {
    #[error("sensor read failed: {0}")]
    ReadFailed(String),
    #[error("sensor returned invalid data: {0}")]
    InvalidData(String),
    #[error("sensor read timed out")]
    Timeout,
}

/// Something that can be sampled once per sampling cycle
pub trait SensorSource: Send {
    fn read(&mut self, now: Instant) -> Result<Reading, SensorError>;
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    fn read(&mut self, now: Instant) -> Result<Reading, SensorError> {
        (**self).read(now)
    }
}
