//! Event-time tumbling windows
//!
//! Fixed-size, non-overlapping intervals aligned to the epoch. A timestamp
//! belongs to exactly one window.

use std::time::Duration;

/// Half-open window interval `[start, end)` in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBounds {
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Fixed-size, non-overlapping event-time windows.
#[derive(Debug, Clone, Copy)]
pub struct TumblingWindow {
    size_ms: i64,
}

impl TumblingWindow {
    /// Windows shorter than a millisecond are clamped up to one.
    pub fn new(size: Duration) -> Self {
        Self {
            size_ms: (size.as_millis() as i64).max(1),
        }
    }

    pub fn size(&self) -> Duration {
        Duration::from_millis(self.size_ms as u64)
    }

    /// Start of the window containing `timestamp_ms`.
    pub fn window_start(&self, timestamp_ms: i64) -> i64 {
        timestamp_ms - timestamp_ms.rem_euclid(self.size_ms)
    }

    /// Bounds of the window containing `timestamp_ms`.
    pub fn bounds(&self, timestamp_ms: i64) -> WindowBounds {
        let start_ms = self.window_start(timestamp_ms);
        WindowBounds {
            start_ms,
            end_ms: start_ms + self.size_ms,
        }
    }
}
