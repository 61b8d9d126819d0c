//! Interval timers and reading counters owned by the scheduler

use std::time::Duration;
use tokio::time::Instant;

/// Fixed-period timer that fires at most once per poll
///
/// A timer that elapsed while nobody polled it fires on the next poll and
/// restarts its window from that instant; missed windows are not replayed.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    period: Duration,
    last_fired_at: Instant,
}

impl IntervalTimer {
    /// Start counting from `now`; the first firing is one full period away
    pub fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            last_fired_at: now,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_fired_at) >= self.period
    }

    pub fn fire(&mut self, now: Instant) {
        self.last_fired_at = now;
    }

    /// Fire and return true if due
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.fire(now);
            true
        } else {
            false
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn last_fired_at(&self) -> Instant {
        self.last_fired_at
    }
}

/// Process-wide sampling statistics
///
/// Every sampling attempt counts toward `total`; faulted attempts also count
/// toward `failed`, so `failed <= total` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadingCounters {
    total: u64,
    failed: u64,
}

impl ReadingCounters {
    pub fn record_success(&mut self) {
        self.total += 1;
    }

    pub fn record_fault(&mut self) {
        self.total += 1;
        self.failed += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }
}
