pub mod error;
pub mod reading;
pub mod schema;

pub use error::{Result, StreamError};
pub use reading::SensorReading;
pub use schema::{readings_from_batch, readings_to_batch, sensor_schema};
