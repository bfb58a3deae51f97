//! Watermark support for event-time processing
//!
//! The watermark trails the maximum observed event time by a fixed
//! allowance. Rows older than the watermark are considered too late for
//! their window and are dropped by the windowed operators.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Tracks event-time progress for a single query pipeline.
#[derive(Debug)]
pub struct Watermark {
    /// Maximum event timestamp seen so far (milliseconds since epoch).
    max_observed: AtomicI64,
    /// How far behind the maximum the watermark trails.
    max_lateness_ms: i64,
}

impl Watermark {
    pub fn new(max_lateness: Duration) -> Self {
        Self {
            max_observed: AtomicI64::new(i64::MIN),
            max_lateness_ms: max_lateness.as_millis() as i64,
        }
    }

    /// Record an observed event timestamp. The maximum never regresses.
    pub fn observe(&self, timestamp_ms: i64) {
        self.max_observed.fetch_max(timestamp_ms, Ordering::Relaxed);
    }

    /// Current watermark: max observed event time minus the allowance.
    /// Before any observation there is no watermark and nothing is late.
    pub fn current(&self) -> Option<i64> {
        let max = self.max_observed.load(Ordering::Relaxed);
        if max == i64::MIN {
            None
        } else {
            Some(max.saturating_sub(self.max_lateness_ms))
        }
    }

    /// Whether an event is too late to be folded into its window.
    pub fn is_late(&self, timestamp_ms: i64) -> bool {
        match self.current() {
            Some(watermark) => timestamp_ms < watermark,
            None => false,
        }
    }
}
