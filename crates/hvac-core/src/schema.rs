//! Arrow schema for the sensor relation and row/batch conversions.

use crate::error::{Result, StreamError};
use crate::reading::SensorReading;
use arrow::array::{Array, Float64Array, Int64Array, StringArray, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

/// Column names of the sensor relation.
pub const COL_VALUE: &str = "value";
pub const COL_TIMESTAMP: &str = "timestamp";
pub const COL_ROOM_ID: &str = "room_id";
pub const COL_TEMPERATURE: &str = "temperature";
pub const COL_HUMIDITY: &str = "humidity";

/// Schema of the simulated sensor stream.
pub fn sensor_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(COL_VALUE, DataType::Int64, false),
        Field::new(
            COL_TIMESTAMP,
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ),
        Field::new(COL_ROOM_ID, DataType::Utf8, false),
        Field::new(COL_TEMPERATURE, DataType::Float64, false),
        Field::new(COL_HUMIDITY, DataType::Float64, false),
    ]))
}

/// Build a record batch from sensor rows.
pub fn readings_to_batch(readings: &[SensorReading]) -> Result<RecordBatch> {
    let values = Int64Array::from_iter_values(readings.iter().map(|r| r.value));
    let timestamps =
        TimestampMillisecondArray::from_iter_values(readings.iter().map(|r| r.timestamp_ms));
    let rooms = StringArray::from_iter_values(readings.iter().map(|r| r.room_id.as_str()));
    let temperatures = Float64Array::from_iter_values(readings.iter().map(|r| r.temperature));
    let humidities = Float64Array::from_iter_values(readings.iter().map(|r| r.humidity));

    let batch = RecordBatch::try_new(
        sensor_schema(),
        vec![
            Arc::new(values),
            Arc::new(timestamps),
            Arc::new(rooms),
            Arc::new(temperatures),
            Arc::new(humidities),
        ],
    )?;
    Ok(batch)
}

/// Decode sensor rows from a batch carrying the sensor schema.
pub fn readings_from_batch(batch: &RecordBatch) -> Result<Vec<SensorReading>> {
    let values = int64_column(batch, COL_VALUE)?;
    let timestamps = timestamp_column(batch, COL_TIMESTAMP)?;
    let rooms = string_column(batch, COL_ROOM_ID)?;
    let temperatures = float64_column(batch, COL_TEMPERATURE)?;
    let humidities = float64_column(batch, COL_HUMIDITY)?;

    let mut readings = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        readings.push(SensorReading {
            value: values.value(row),
            timestamp_ms: timestamps.value(row),
            room_id: rooms.value(row).to_string(),
            temperature: temperatures.value(row),
            humidity: humidities.value(row),
        });
    }
    Ok(readings)
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Arc<dyn Array>> {
    batch
        .column_by_name(name)
        .ok_or_else(|| StreamError::ColumnNotFound(name.to_string()))
}

/// Downcast a named column to `Float64Array`.
pub fn float64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float64Array> {
    column(batch, name)?
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| StreamError::Schema(format!("column '{}' is not Float64", name)))
}

/// Downcast a named column to `Int64Array`.
pub fn int64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    column(batch, name)?
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| StreamError::Schema(format!("column '{}' is not Int64", name)))
}

/// Downcast a named column to `StringArray`.
pub fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    column(batch, name)?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| StreamError::Schema(format!("column '{}' is not Utf8", name)))
}

/// Downcast a named column to `TimestampMillisecondArray`.
pub fn timestamp_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a TimestampMillisecondArray> {
    column(batch, name)?
        .as_any()
        .downcast_ref::<TimestampMillisecondArray>()
        .ok_or_else(|| StreamError::Schema(format!("column '{}' is not Timestamp(ms)", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_batch_round_trip() {
        let mut rng = StdRng::seed_from_u64(11);
        let readings: Vec<SensorReading> = (0..25)
            .map(|seq| SensorReading::synthesize(seq, seq * 200, &mut rng))
            .collect();

        let batch = readings_to_batch(&readings).unwrap();
        assert_eq!(batch.num_rows(), 25);
        assert_eq!(batch.num_columns(), 5);

        let decoded = readings_from_batch(&batch).unwrap();
        assert_eq!(decoded, readings);
    }

    #[test]
    fn test_missing_column_is_reported() {
        let readings = vec![SensorReading::synthesize(1, 0, &mut StdRng::seed_from_u64(0))];
        let batch = readings_to_batch(&readings).unwrap();
        let err = float64_column(&batch, "pressure").unwrap_err();
        assert!(matches!(err, StreamError::ColumnNotFound(_)));
    }

    #[test]
    fn test_empty_batch() {
        let batch = readings_to_batch(&[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert!(readings_from_batch(&batch).unwrap().is_empty());
    }
}
