//! The three continuous queries of the HVAC monitoring scenario
//!
//! Thresholds mirror the monitoring notebook: temperatures outside
//! 18-60 degrees are critical, humidity outside 45-75 percent needs
//! attention, and averages are computed per room over one-minute windows.

use hvac_core::schema::{COL_HUMIDITY, COL_ROOM_ID, COL_TEMPERATURE, COL_TIMESTAMP};
use hvac_core::{sensor_schema, Result};
use hvac_streaming::{ThresholdCount, ThresholdFilter, TumblingWindow, WindowedMean};
use std::time::Duration;

/// Relation name the simulated stream is registered under.
pub const SENSOR_RELATION: &str = "sensor_table";

pub const CRITICAL_QUERY_NAME: &str = "Critical Temperatures";
pub const AVERAGE_QUERY_NAME: &str = "Average Readings";
pub const ATTENTION_QUERY_NAME: &str = "Attention Needed";

/// Temperatures below/above these bounds are critical.
pub const CRITICAL_TEMPERATURE_LOW: f64 = 18.0;
pub const CRITICAL_TEMPERATURE_HIGH: f64 = 60.0;

/// Humidity below/above these bounds needs attention.
pub const ATTENTION_HUMIDITY_LOW: f64 = 45.0;
pub const ATTENTION_HUMIDITY_HIGH: f64 = 75.0;

/// Tumbling window for per-room averages.
pub const AVERAGE_WINDOW: Duration = Duration::from_secs(60);

/// Rows older than this behind the watermark are dropped by the
/// average-readings pipeline.
const MAX_LATENESS: Duration = Duration::from_secs(600);

/// Critical Temperature Query: append-mode filter emitting each reading
/// whose temperature leaves the 18-60 band, as it arrives.
pub fn critical_temperatures() -> Result<ThresholdFilter> {
    ThresholdFilter::new(
        &sensor_schema(),
        COL_TEMPERATURE,
        CRITICAL_TEMPERATURE_LOW,
        CRITICAL_TEMPERATURE_HIGH,
        &[COL_ROOM_ID, COL_TEMPERATURE, COL_HUMIDITY, COL_TIMESTAMP],
    )
}

/// Average Readings Query: complete-mode per-room mean temperature and
/// humidity over tumbling one-minute event-time windows.
pub fn average_readings() -> WindowedMean {
    WindowedMean::new(
        COL_ROOM_ID,
        COL_TIMESTAMP,
        &[COL_TEMPERATURE, COL_HUMIDITY],
        TumblingWindow::new(AVERAGE_WINDOW),
        MAX_LATENESS,
    )
}

/// Attention Needed Query: complete-mode per-room count of readings whose
/// humidity leaves the 45-75 band.
pub fn attention_needed() -> ThresholdCount {
    ThresholdCount::new(
        COL_ROOM_ID,
        COL_HUMIDITY,
        ATTENTION_HUMIDITY_LOW,
        ATTENTION_HUMIDITY_HIGH,
        "critical_readings",
    )
}
