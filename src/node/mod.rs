//! The device control core
//!
//! [`ConnectionSupervisor`] owns link and session liveness, and
//! [`PublicationScheduler`] drives sampling, heartbeat and status publication
//! from a single cooperative loop. All state lives in these owner structs; there
//! are no globals.

use std::time::Duration;
use tokio::time::Instant;

pub mod change_filter;
pub mod scheduler;
pub mod supervisor;
pub mod timers;

pub use change_filter::{exceeds_thresholds, ChangeFilter};
pub use scheduler::{PublicationScheduler, RunOutcome, SchedulerSettings, TickOutcome};
pub use supervisor::{ConnectionState, ConnectionSupervisor, SupervisorSettings, TickReport};
pub use timers::{IntervalTimer, ReadingCounters};

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub fn millis_u64(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Milliseconds elapsed since `boot`
pub fn uptime_ms(boot: Instant, now: Instant) -> u64 {
    millis_u64(now.saturating_duration_since(boot))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uptime_ms() {
        let boot = Instant::now();
        assert_eq!(uptime_ms(boot, boot), 0);
        assert_eq!(uptime_ms(boot, boot + Duration::from_millis(1_500)), 1_500);
        // Clock never runs backwards past boot
        assert_eq!(uptime_ms(boot + Duration::from_secs(1), boot), 0);
    }

    #[test]
    fn test_millis_u64_saturates() {
        assert_eq!(millis_u64(Duration::from_millis(10_000)), 10_000);
        assert_eq!(millis_u64(Duration::MAX), u64::MAX);
    }
}
