//! Seeded random-walk sensor for hosts without real hardware

use super::{Reading, SensorError, SensorSource};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;

const TEMPERATURE_STEP: f64 = 0.4;
const HUMIDITY_STEP: f64 = 1.5;
const TEMPERATURE_SPAN: f64 = 10.0;
const HUMIDITY_RANGE: (f64, f64) = (20.0, 90.0);

/// Random walk around a base temperature/humidity with occasional faults
pub struct SimulatedSensor {
    rng: StdRng,
    fault_rate: f64,
    base_temperature: f64,
    temperature: f64,
    humidity: f64,
}

impl SimulatedSensor {
    /// Non-finite inputs fall back to a 21.0 °C / 50 % baseline and no faults
    pub fn new(seed: Option<u64>, fault_rate: f64, temperature: f64, humidity: f64) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let temperature = if temperature.is_finite() { temperature } else { 21.0 };
        let humidity = if humidity.is_finite() {
            humidity.clamp(HUMIDITY_RANGE.0, HUMIDITY_RANGE.1)
        } else {
            50.0
        };
        Self {
            rng,
            fault_rate: if fault_rate.is_nan() { 0.0 } else { fault_rate.clamp(0.0, 1.0) },
            base_temperature: temperature,
            temperature,
            humidity,
        }
    }
}

impl SensorSource for SimulatedSensor {
    fn read(&mut self, now: Instant) -> Result<Reading, SensorError> {
        if self.rng.gen_bool(self.fault_rate) {
            return Err(SensorError::Timeout);
        }

        let low = self.base_temperature - TEMPERATURE_SPAN;
        let high = self.base_temperature + TEMPERATURE_SPAN;
        self.temperature = (self.temperature
            + self.rng.gen_range(-TEMPERATURE_STEP..=TEMPERATURE_STEP))
        .clamp(low, high);
        self.humidity =
            (self.humidity + self.rng.gen_range(-HUMIDITY_STEP..=HUMIDITY_STEP))
                .clamp(HUMIDITY_RANGE.0, HUMIDITY_RANGE.1);

        // DHT11 resolution is one decimal place at best
        let temperature = (self.temperature * 10.0).round() / 10.0;
        let humidity = (self.humidity * 10.0).round() / 10.0;
        Reading::new(temperature, humidity, now)
    }
}
