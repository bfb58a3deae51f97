//! Synthetic sensor row model
//!
//! One entity flows through every pipeline: a sensor reading synthesized
//! from the rate generator's sequence value. Room 0 is pinned to a cold
//! temperature so the critical-temperature query always has matches.

use rand::Rng;

/// Number of distinct simulated rooms.
pub const ROOM_COUNT: i64 = 10;

/// Fixed temperature reported by room 0 on every reading.
pub const COLD_ROOM_TEMPERATURE: f64 = 15.0;

/// Temperature range for all other rooms, uniform in `[MIN, MAX)`.
pub const TEMPERATURE_MIN: f64 = 20.0;
pub const TEMPERATURE_MAX: f64 = 45.0;

/// Humidity range for every room, uniform in `[MIN, MAX)`.
pub const HUMIDITY_MIN: f64 = 40.0;
pub const HUMIDITY_MAX: f64 = 70.0;

/// A single synthesized sensor reading.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// Monotonically increasing sequence value from the rate generator.
    pub value: i64,
    /// Event time in milliseconds since the epoch.
    pub timestamp_ms: i64,
    /// Derived room identifier, `value % 10` stringified.
    pub room_id: String,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Relative humidity percentage.
    pub humidity: f64,
}

impl SensorReading {
    /// Derive a reading from a sequence value and an event timestamp.
    ///
    /// Derivation rules:
    /// - `room_id` is the decimal string of `value % 10`
    /// - room 0 always reads [`COLD_ROOM_TEMPERATURE`]; every other room
    ///   draws uniformly from `[TEMPERATURE_MIN, TEMPERATURE_MAX)`
    /// - humidity draws uniformly from `[HUMIDITY_MIN, HUMIDITY_MAX)`
    pub fn synthesize<R: Rng + ?Sized>(value: i64, timestamp_ms: i64, rng: &mut R) -> Self {
        let room = value.rem_euclid(ROOM_COUNT);
        let temperature = if room == 0 {
            COLD_ROOM_TEMPERATURE
        } else {
            rng.gen_range(TEMPERATURE_MIN..TEMPERATURE_MAX)
        };
        let humidity = rng.gen_range(HUMIDITY_MIN..HUMIDITY_MAX);

        Self {
            value,
            timestamp_ms,
            room_id: room.to_string(),
            temperature,
            humidity,
        }
    }
}
