//! Stream source implementations
//!
//! The rate source is the simulator's entry point: it synthesizes sensor
//! rows at a target frequency. Channel and memory sources exist for piping
//! pre-built batches through the same machinery, mostly in tests.

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use hvac_core::{readings_to_batch, Result, SensorReading};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Trait for streaming data sources
#[async_trait]
pub trait StreamSource: Send {
    /// Get the next batch from the stream.
    /// Returns None when the stream is exhausted.
    async fn next_batch(&mut self) -> Option<Result<RecordBatch>>;

    /// Check if the stream has more data
    fn is_exhausted(&self) -> bool;

    /// Get stream metadata
    fn name(&self) -> &str;
}

/// Configuration for the synthetic rate source.
#[derive(Debug, Clone)]
pub struct RateConfig {
    /// Target rows per second, best-effort.
    pub rows_per_second: u64,
    /// How often a batch is cut. One batch per tick.
    pub tick: Duration,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            rows_per_second: 5,
            tick: Duration::from_secs(1),
        }
    }
}

/// Unbounded source producing synthesized sensor readings at a target rate.
///
/// Sequence values increase monotonically across batches; event timestamps
/// are taken at emit time. The rate is approximate: missed ticks are delayed
/// rather than bursted.
pub struct RateStreamSource {
    config: RateConfig,
    ticker: Interval,
    next_value: i64,
    rng: StdRng,
    name: String,
}

impl RateStreamSource {
    pub fn new(config: RateConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic variant for tests.
    pub fn with_seed(config: RateConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: RateConfig, rng: StdRng) -> Self {
        let mut ticker = interval(config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            config,
            ticker,
            next_value: 0,
            rng,
            name: "rate".to_string(),
        }
    }

    fn rows_per_tick(&self) -> usize {
        let rows = self.config.rows_per_second as f64 * self.config.tick.as_secs_f64();
        (rows.round() as usize).max(1)
    }
}

#[async_trait]
impl StreamSource for RateStreamSource {
    async fn next_batch(&mut self) -> Option<Result<RecordBatch>> {
        self.ticker.tick().await;

        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        let rows = self.rows_per_tick();
        let mut readings = Vec::with_capacity(rows);
        for _ in 0..rows {
            readings.push(SensorReading::synthesize(self.next_value, now_ms, &mut self.rng));
            self.next_value += 1;
        }

        Some(readings_to_batch(&readings))
    }

    fn is_exhausted(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Stream source backed by a tokio mpsc channel
pub struct ChannelStreamSource {
    receiver: mpsc::Receiver<RecordBatch>,
    name: String,
    exhausted: bool,
}

impl ChannelStreamSource {
    /// Create a new channel stream source with the given buffer size.
    /// Returns (sender, source) tuple.
    pub fn new(buffer_size: usize) -> (mpsc::Sender<RecordBatch>, Self) {
        let (tx, rx) = mpsc::channel(buffer_size);
        let source = Self {
            receiver: rx,
            name: "channel".to_string(),
            exhausted: false,
        };
        (tx, source)
    }
}

#[async_trait]
impl StreamSource for ChannelStreamSource {
    async fn next_batch(&mut self) -> Option<Result<RecordBatch>> {
        match self.receiver.recv().await {
            Some(batch) => Some(Ok(batch)),
            None => {
                self.exhausted = true;
                None
            }
        }
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// In-memory replay source for testing
pub struct MemoryStreamSource {
    batches: Vec<RecordBatch>,
    position: usize,
    name: String,
}

impl MemoryStreamSource {
    pub fn new(batches: Vec<RecordBatch>) -> Self {
        Self {
            batches,
            position: 0,
            name: "memory".to_string(),
        }
    }
}

#[async_trait]
impl StreamSource for MemoryStreamSource {
    async fn next_batch(&mut self) -> Option<Result<RecordBatch>> {
        if self.position < self.batches.len() {
            let batch = self.batches[self.position].clone();
            self.position += 1;
            Some(Ok(batch))
        } else {
            None
        }
    }

    fn is_exhausted(&self) -> bool {
        self.position >= self.batches.len()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
