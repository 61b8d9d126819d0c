//! Visible feedback for connectivity and sampling events
//!
//! Signals are fire-and-forget: an indicator never fails its caller and never
//! blocks the control loop. Blink timings follow the device's LED conventions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Named feedback patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalPattern {
    LinkAttempt,
    LinkUp,
    LinkFailed,
    SessionUp,
    SessionFailed,
    SensorFault,
    Published,
}

impl SignalPattern {
    /// Blink count and the on/off half-period of each blink
    pub fn blinks(self) -> (u32, Duration) {
        match self {
            SignalPattern::LinkAttempt => (1, Duration::from_millis(100)),
            // Solid on for two seconds
            SignalPattern::LinkUp => (1, Duration::from_secs(2)),
            SignalPattern::LinkFailed => (10, Duration::from_millis(100)),
            SignalPattern::SessionUp => (3, Duration::from_millis(200)),
            SignalPattern::SessionFailed => (5, Duration::from_millis(100)),
            SignalPattern::SensorFault => (2, Duration::from_millis(50)),
            SignalPattern::Published => (1, Duration::from_millis(50)),
        }
    }
}

/// Abstract visible/audible feedback
pub trait Indicator: Send + Sync {
    fn signal(&self, pattern: SignalPattern);
}

/// Indicator that only logs, for hosts without an LED
#[derive(Debug, Default, Clone)]
pub struct LogIndicator;

impl Indicator for LogIndicator {
    fn signal(&self, pattern: SignalPattern) {
        debug!(target: "indicator", ?pattern, "Indicator signal");
    }
}

/// sysfs LED driven by a background task
///
/// Each signal spawns a short task on the current runtime; a newer pattern
/// waits for the previous one so blinks never interleave.
pub struct LedIndicator {
    brightness_path: Arc<PathBuf>,
    gate: Arc<Mutex<()>>,
}

impl LedIndicator {
    pub fn new(brightness_path: impl Into<PathBuf>) -> Self {
        let brightness_path = brightness_path.into();
        info!("LED indicator on {}", brightness_path.display());
        Self {
            brightness_path: Arc::new(brightness_path),
            gate: Arc::new(Mutex::new(())),
        }
    }

    async fn blink(path: &PathBuf, count: u32, half_period: Duration) -> std::io::Result<()> {
        for _ in 0..count {
            tokio::fs::write(path, b"1").await?;
            tokio::time::sleep(half_period).await;
            tokio::fs::write(path, b"0").await?;
            tokio::time::sleep(half_period).await;
        }
        Ok(())
    }
}

impl Indicator for LedIndicator {
    fn signal(&self, pattern: SignalPattern) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(target: "indicator", ?pattern, "No runtime, LED signal skipped");
            return;
        };

        let path = self.brightness_path.clone();
        let gate = self.gate.clone();
        let (count, half_period) = pattern.blinks();

        runtime.spawn(async move {
            let _guard = gate.lock().await;
            if let Err(e) = Self::blink(&path, count, half_period).await {
                warn!(target: "indicator", error = %e, "LED write failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blink_patterns() {
        assert_eq!(SignalPattern::LinkFailed.blinks().0, 10);
        assert_eq!(SignalPattern::SessionUp.blinks(), (3, Duration::from_millis(200)));
        assert_eq!(SignalPattern::SessionFailed.blinks(), (5, Duration::from_millis(100)));
        assert_eq!(SignalPattern::SensorFault.blinks(), (2, Duration::from_millis(50)));
        assert_eq!(SignalPattern::LinkUp.blinks().1, Duration::from_secs(2));
    }

    #[test]
    fn test_led_without_runtime_does_not_panic() {
        let led = LedIndicator::new("/nonexistent/brightness");
        led.signal(SignalPattern::Published);
    }

    #[tokio::test]
    async fn test_led_writes_brightness_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brightness");
        let led = LedIndicator::new(&path);

        led.signal(SignalPattern::Published);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0");
    }

    #[tokio::test]
    async fn test_led_write_failure_is_swallowed() {
        let led = LedIndicator::new("/nonexistent/dir/brightness");
        led.signal(SignalPattern::SensorFault);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
