//! Continuous-query operators
//!
//! A [`ContinuousQuery`] folds source batches into internal state and emits
//! results when its sink triggers. Append-mode operators emit only rows
//! produced since the previous trigger; complete-mode operators re-emit the
//! entire current result set on every trigger.

use crate::watermark::Watermark;
use crate::window::TumblingWindow;
use arrow::array::{Float64Array, Int64Array, StringArray, TimestampMillisecondArray};
use arrow::compute::kernels::cmp::{gt, lt};
use arrow::compute::{concat_batches, filter_record_batch, or};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use hvac_core::schema::{float64_column, string_column, timestamp_column};
use hvac_core::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How a sink publishes a query's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Emit only rows that newly qualified since the last trigger.
    Append,
    /// Emit the full current result set on every trigger.
    Complete,
}

/// A continuously running query over a stream of record batches.
pub trait ContinuousQuery: Send {
    /// Schema of emitted batches.
    fn schema(&self) -> SchemaRef;

    /// Output mode of this query.
    fn output_mode(&self) -> OutputMode;

    /// Fold one source batch into the query state.
    fn process(&mut self, batch: &RecordBatch) -> Result<()>;

    /// Produce output for the current trigger, or `None` when there is
    /// nothing to publish yet.
    fn emit(&mut self) -> Result<Option<RecordBatch>>;
}

/// Stateless filter keeping rows where `column < low OR column > high`,
/// projected to a configured column subset. Append output mode.
pub struct ThresholdFilter {
    column: String,
    low: f64,
    high: f64,
    projection: Vec<usize>,
    schema: SchemaRef,
    pending: Vec<RecordBatch>,
}

impl ThresholdFilter {
    pub fn new(
        input_schema: &SchemaRef,
        column: &str,
        low: f64,
        high: f64,
        projected_columns: &[&str],
    ) -> Result<Self> {
        let projection = projected_columns
            .iter()
            .map(|name| input_schema.index_of(name))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let schema = Arc::new(input_schema.project(&projection)?);

        Ok(Self {
            column: column.to_string(),
            low,
            high,
            projection,
            schema,
            pending: Vec::new(),
        })
    }
}

impl ContinuousQuery for ThresholdFilter {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn output_mode(&self) -> OutputMode {
        OutputMode::Append
    }

    fn process(&mut self, batch: &RecordBatch) -> Result<()> {
        let values = float64_column(batch, &self.column)?;
        let below = lt(values, &Float64Array::new_scalar(self.low))?;
        let above = gt(values, &Float64Array::new_scalar(self.high))?;
        let mask = or(&below, &above)?;

        let filtered = filter_record_batch(batch, &mask)?;
        if filtered.num_rows() > 0 {
            self.pending.push(filtered.project(&self.projection)?);
        }
        Ok(())
    }

    fn emit(&mut self) -> Result<Option<RecordBatch>> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let batch = concat_batches(&self.schema, self.pending.iter())?;
        self.pending.clear();
        Ok(Some(batch))
    }
}

#[derive(Debug, Default)]
struct MeanState {
    sums: Vec<f64>,
    count: u64,
}

/// Per-group means over tumbling event-time windows. Complete output mode.
///
/// Rows older than the watermark allowance are dropped instead of reopening
/// closed windows. Snapshots are ordered by window start, then group.
pub struct WindowedMean {
    group_column: String,
    timestamp_column: String,
    value_columns: Vec<String>,
    window: TumblingWindow,
    watermark: Watermark,
    state: BTreeMap<(i64, String), MeanState>,
    schema: SchemaRef,
    late_rows_dropped: u64,
}

impl WindowedMean {
    pub fn new(
        group_column: &str,
        timestamp_column: &str,
        value_columns: &[&str],
        window: TumblingWindow,
        max_lateness: Duration,
    ) -> Self {
        let mut fields = vec![Field::new(group_column, DataType::Utf8, false)];
        for column in value_columns {
            fields.push(Field::new(format!("avg_{column}"), DataType::Float64, false));
        }
        fields.push(Field::new(
            "window_start",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ));

        Self {
            group_column: group_column.to_string(),
            timestamp_column: timestamp_column.to_string(),
            value_columns: value_columns.iter().map(|c| c.to_string()).collect(),
            window,
            watermark: Watermark::new(max_lateness),
            state: BTreeMap::new(),
            schema: Arc::new(Schema::new(fields)),
            late_rows_dropped: 0,
        }
    }

    /// Rows dropped for arriving behind the watermark.
    pub fn late_rows_dropped(&self) -> u64 {
        self.late_rows_dropped
    }
}

impl ContinuousQuery for WindowedMean {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn output_mode(&self) -> OutputMode {
        OutputMode::Complete
    }

    fn process(&mut self, batch: &RecordBatch) -> Result<()> {
        let groups = string_column(batch, &self.group_column)?;
        let timestamps = timestamp_column(batch, &self.timestamp_column)?;
        let values = self
            .value_columns
            .iter()
            .map(|column| float64_column(batch, column))
            .collect::<Result<Vec<_>>>()?;

        let mut batch_max = i64::MIN;
        for row in 0..batch.num_rows() {
            let timestamp = timestamps.value(row);
            batch_max = batch_max.max(timestamp);

            // Lateness is judged against the watermark as of the previous
            // batch, so a batch cannot expire its own rows.
            if self.watermark.is_late(timestamp) {
                self.late_rows_dropped += 1;
                debug!(
                    timestamp_ms = timestamp,
                    group = groups.value(row),
                    "dropping late row"
                );
                continue;
            }

            let key = (self.window.window_start(timestamp), groups.value(row).to_string());
            let entry = self.state.entry(key).or_insert_with(|| MeanState {
                sums: vec![0.0; values.len()],
                count: 0,
            });
            for (slot, column) in entry.sums.iter_mut().zip(&values) {
                *slot += column.value(row);
            }
            entry.count += 1;
        }

        if batch_max != i64::MIN {
            self.watermark.observe(batch_max);
        }
        Ok(())
    }

    fn emit(&mut self) -> Result<Option<RecordBatch>> {
        if self.state.is_empty() {
            return Ok(None);
        }

        let groups =
            StringArray::from_iter_values(self.state.keys().map(|(_, group)| group.as_str()));
        let window_starts =
            TimestampMillisecondArray::from_iter_values(self.state.keys().map(|(start, _)| *start));

        let mut columns: Vec<arrow::array::ArrayRef> = vec![Arc::new(groups)];
        for index in 0..self.value_columns.len() {
            let averages = Float64Array::from_iter_values(
                self.state
                    .values()
                    .map(|entry| entry.sums[index] / entry.count as f64),
            );
            columns.push(Arc::new(averages));
        }
        columns.push(Arc::new(window_starts));

        let batch = RecordBatch::try_new(self.schema.clone(), columns)?;
        Ok(Some(batch))
    }
}

/// Per-group count of rows where `column < low OR column > high`.
/// Complete output mode; groups with no matching rows are absent.
pub struct ThresholdCount {
    group_column: String,
    column: String,
    low: f64,
    high: f64,
    counts: BTreeMap<String, i64>,
    schema: SchemaRef,
}

impl ThresholdCount {
    pub fn new(group_column: &str, column: &str, low: f64, high: f64, count_alias: &str) -> Self {
        let schema = Arc::new(Schema::new(vec![
            Field::new(group_column, DataType::Utf8, false),
            Field::new(count_alias, DataType::Int64, false),
        ]));

        Self {
            group_column: group_column.to_string(),
            column: column.to_string(),
            low,
            high,
            counts: BTreeMap::new(),
            schema,
        }
    }
}

impl ContinuousQuery for ThresholdCount {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn output_mode(&self) -> OutputMode {
        OutputMode::Complete
    }

    fn process(&mut self, batch: &RecordBatch) -> Result<()> {
        let groups = string_column(batch, &self.group_column)?;
        let values = float64_column(batch, &self.column)?;

        for row in 0..batch.num_rows() {
            let value = values.value(row);
            if value < self.low || value > self.high {
                *self.counts.entry(groups.value(row).to_string()).or_insert(0) += 1;
            }
        }
        Ok(())
    }

    fn emit(&mut self) -> Result<Option<RecordBatch>> {
        if self.counts.is_empty() {
            return Ok(None);
        }

        let groups = StringArray::from_iter_values(self.counts.keys().map(String::as_str));
        let counts = Int64Array::from_iter_values(self.counts.values().copied());
        let batch = RecordBatch::try_new(
            self.schema.clone(),
            vec![Arc::new(groups), Arc::new(counts)],
        )?;
        Ok(Some(batch))
    }
}
