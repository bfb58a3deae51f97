//! Sink output writers
//!
//! A sink owns one writer. The console writer mirrors the classic streaming
//! console sink: a framed banner with the trigger number, then the batch as
//! a table.

use arrow::array::{Array, Float64Array, Int64Array, StringArray, TimestampMillisecondArray};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use colored::Colorize;
use comfy_table::{Cell, Color, Table as ComfyTable};
use hvac_core::Result;
use std::sync::{Arc, Mutex};

/// Destination for a query's triggered output.
pub trait BatchWriter: Send {
    fn write(&mut self, trigger_id: u64, batch: &RecordBatch) -> Result<()>;
}

/// Periodically refreshed tabular console dump, one per active query.
pub struct ConsoleWriter {
    query_name: String,
}

impl ConsoleWriter {
    pub fn new(query_name: impl Into<String>) -> Self {
        Self {
            query_name: query_name.into(),
        }
    }
}

impl BatchWriter for ConsoleWriter {
    fn write(&mut self, trigger_id: u64, batch: &RecordBatch) -> Result<()> {
        println!("{}", "-------------------------------------------".bright_black());
        println!(
            "{} {}",
            format!("Batch: {}", trigger_id).bright_yellow(),
            format!("({})", self.query_name).bright_cyan()
        );
        println!("{}", "-------------------------------------------".bright_black());
        println!("{}", format_batch(batch));
        Ok(())
    }
}

/// Render a record batch as a table, formatting each column by type.
pub fn format_batch(batch: &RecordBatch) -> ComfyTable {
    let mut table = ComfyTable::new();
    table.set_header(
        batch
            .schema()
            .fields()
            .iter()
            .map(|field| Cell::new(field.name()).fg(Color::Cyan))
            .collect::<Vec<_>>(),
    );

    for row in 0..batch.num_rows() {
        let cells: Vec<String> = batch
            .columns()
            .iter()
            .map(|column| format_value(column.as_ref(), row))
            .collect();
        table.add_row(cells);
    }
    table
}

fn format_value(array: &dyn Array, row: usize) -> String {
    if let Some(values) = array.as_any().downcast_ref::<StringArray>() {
        values.value(row).to_string()
    } else if let Some(values) = array.as_any().downcast_ref::<Float64Array>() {
        format!("{:.2}", values.value(row))
    } else if let Some(values) = array.as_any().downcast_ref::<Int64Array>() {
        values.value(row).to_string()
    } else if let Some(values) = array.as_any().downcast_ref::<TimestampMillisecondArray>() {
        DateTime::from_timestamp_millis(values.value(row))
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| values.value(row).to_string())
    } else {
        "?".to_string()
    }
}

/// Collects triggered batches in memory for assertions in tests.
pub struct MemoryWriter {
    batches: Arc<Mutex<Vec<RecordBatch>>>,
}

impl MemoryWriter {
    /// Returns the writer and a shared handle to everything it receives.
    pub fn new() -> (Self, Arc<Mutex<Vec<RecordBatch>>>) {
        let batches = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                batches: batches.clone(),
            },
            batches,
        )
    }
}

impl BatchWriter for MemoryWriter {
    fn write(&mut self, _trigger_id: u64, batch: &RecordBatch) -> Result<()> {
        self.batches
            .lock()
            .expect("memory writer lock poisoned")
            .push(batch.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hvac_core::{readings_to_batch, SensorReading};

    fn sample_batch() -> RecordBatch {
        readings_to_batch(&[SensorReading {
            value: 3,
            timestamp_ms: 60_000,
            room_id: "3".to_string(),
            temperature: 21.5,
            humidity: 44.25,
        }])
        .unwrap()
    }

    #[test]
    fn test_format_batch_renders_every_column() {
        let rendered = format_batch(&sample_batch()).to_string();
        assert!(rendered.contains("room_id"));
        assert!(rendered.contains("21.50"));
        assert!(rendered.contains("44.25"));
        assert!(rendered.contains("1970-01-01 00:01:00"));
    }

    #[test]
    fn test_memory_writer_collects_batches() {
        let (mut writer, collected) = MemoryWriter::new();
        writer.write(0, &sample_batch()).unwrap();
        writer.write(1, &sample_batch()).unwrap();
        assert_eq!(collected.lock().unwrap().len(), 2);
    }
}
