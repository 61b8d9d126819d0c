//! Publish-on-change gate for sensor readings

use crate::config::ThresholdsSection;
use crate::sensor::Reading;

/// Absorbs binary rounding in decimal differences such as `2.2 - 1.7`
const DELTA_TOLERANCE: f64 = 1e-9;

/// True when `next` differs from `last` by strictly more than either delta
///
/// A difference equal to the threshold in decimal terms never qualifies, even
/// when its binary representation lands a hair above it.
pub fn exceeds_thresholds(next: &Reading, last: &Reading, thresholds: &ThresholdsSection) -> bool {
    let temperature_delta = (next.temperature - last.temperature).abs();
    let humidity_delta = (next.humidity - last.humidity).abs();

    temperature_delta > thresholds.temperature_delta + DELTA_TOLERANCE
        || humidity_delta > thresholds.humidity_delta + DELTA_TOLERANCE
}

/// Decides whether a reading is worth transmitting
///
/// The comparison is always against the last *published* reading, never the
/// last sampled one, so slow drift still crosses the threshold eventually.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    thresholds: ThresholdsSection,
    last_published: Option<Reading>,
}

impl ChangeFilter {
    pub fn new(thresholds: ThresholdsSection) -> Self {
        Self {
            thresholds,
            last_published: None,
        }
    }

    /// The first reading ever seen always qualifies
    pub fn should_publish(&self, reading: &Reading) -> bool {
        match &self.last_published {
            None => true,
            Some(last) => exceeds_thresholds(reading, last, &self.thresholds),
        }
    }

    /// Remember the reading that was handed to the transport
    pub fn record_published(&mut self, reading: Reading) {
        self.last_published = Some(reading);
    }

    pub fn last_published(&self) -> Option<&Reading> {
        self.last_published.as_ref()
    }

    pub fn thresholds(&self) -> &ThresholdsSection {
        &self.thresholds
    }
}
