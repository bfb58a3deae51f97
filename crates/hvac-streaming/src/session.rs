//! Session and query-pipeline management
//!
//! A session owns the registered stream relations and the background tasks
//! running each continuous query. Registering a stream spawns a pump that
//! fans source batches out on a broadcast channel; starting a query spawns
//! an independent sink task that folds batches and emits on its trigger.
//! Starting is non-blocking; `QueryHandle::await_termination` blocks until
//! the sink stops or fails.

use crate::query::ContinuousQuery;
use crate::sink::BatchWriter;
use crate::source::StreamSource;
use arrow::record_batch::RecordBatch;
use hvac_core::{Result, StreamError};
use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Config flag: emit richer diagnostics when a query worker fails.
pub const WORKER_FAULTHANDLER_FLAG: &str = "engine.worker.faulthandler.enabled";
/// Config flag: emit richer diagnostics when a per-row operator fails.
pub const UDF_FAULTHANDLER_FLAG: &str = "engine.udf.faulthandler.enabled";

/// Fan-out buffer per registered relation. A sink lagging this far behind
/// the pump terminates with `SourceLagged`.
const RELATION_BUFFER: usize = 256;

/// Builder for [`Session`].
#[derive(Debug, Default)]
pub struct SessionBuilder {
    app_name: String,
    config: HashMap<String, String>,
}

impl SessionBuilder {
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn get_or_create(self) -> Session {
        let (shutdown, _) = watch::channel(false);
        info!(app_name = %self.app_name, "session created");
        Session {
            app_name: self.app_name,
            config: self.config,
            streams: HashMap::new(),
            shutdown: Arc::new(shutdown),
            pumps: Vec::new(),
        }
    }
}

/// A long-lived processing context holding relations and running pipelines.
pub struct Session {
    app_name: String,
    config: HashMap<String, String>,
    streams: HashMap<String, broadcast::Sender<RecordBatch>>,
    shutdown: Arc<watch::Sender<bool>>,
    pumps: Vec<JoinHandle<()>>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Engine version, for the startup diagnostic line.
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Look up a session config value.
    pub fn conf(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    fn fault_diagnostics(&self) -> bool {
        [WORKER_FAULTHANDLER_FLAG, UDF_FAULTHANDLER_FLAG]
            .iter()
            .any(|flag| self.conf(flag) == Some("true"))
    }

    /// Handle for stopping the session from another task.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Register a source under a relation name and start pumping it.
    ///
    /// Batches produced before any query subscribes are dropped, as with
    /// any live stream.
    pub fn register_stream<S>(&mut self, name: &str, mut source: S) -> Result<()>
    where
        S: StreamSource + 'static,
    {
        if self.streams.contains_key(name) {
            return Err(StreamError::Execution(format!(
                "relation '{name}' is already registered"
            )));
        }

        let (tx, _) = broadcast::channel(RELATION_BUFFER);
        self.streams.insert(name.to_string(), tx.clone());

        let relation = name.to_string();
        let mut shutdown_rx = self.shutdown.subscribe();
        let pump = tokio::spawn(async move {
            info!(relation = %relation, source = source.name(), "stream pump started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    batch = source.next_batch() => match batch {
                        Some(Ok(batch)) => {
                            debug!(relation = %relation, rows = batch.num_rows(), "pumping batch");
                            // No subscribers yet means the batch has no
                            // audience; that is not an error for a stream.
                            let _ = tx.send(batch);
                        }
                        Some(Err(e)) => {
                            error!(relation = %relation, error = %e, "stream source failed");
                            break;
                        }
                        None => {
                            info!(relation = %relation, "stream source exhausted");
                            break;
                        }
                    }
                }
            }
        });
        self.pumps.push(pump);
        Ok(())
    }

    /// Start a continuous query against a registered relation.
    ///
    /// Returns immediately; the pipeline runs as an independent task that
    /// emits to `writer` every `trigger` interval.
    pub fn start_query(
        &mut self,
        name: &str,
        relation: &str,
        query: Box<dyn ContinuousQuery>,
        writer: Box<dyn BatchWriter>,
        trigger: Duration,
    ) -> Result<QueryHandle> {
        let source_rx = self
            .streams
            .get(relation)
            .ok_or_else(|| StreamError::Execution(format!("unknown relation '{relation}'")))?
            .subscribe();
        let shutdown_rx = self.shutdown.subscribe();
        let fault_diagnostics = self.fault_diagnostics();

        let query_name = name.to_string();
        let task_name = query_name.clone();
        let handle = tokio::spawn(async move {
            info!(query = %task_name, "sink started");
            let result = run_sink(source_rx, shutdown_rx, query, writer, trigger).await;
            match &result {
                Ok(()) => info!(query = %task_name, "sink terminated"),
                Err(e) => {
                    if fault_diagnostics {
                        error!(
                            query = %task_name,
                            error = %e,
                            backtrace = %Backtrace::force_capture(),
                            "sink failed"
                        );
                    } else {
                        error!(query = %task_name, error = %e, "sink failed");
                    }
                }
            }
            result
        });

        Ok(QueryHandle {
            name: query_name,
            handle,
        })
    }

    /// Signal every pump and sink to stop. Idempotent.
    pub fn stop(&self) {
        info!(app_name = %self.app_name, "stopping session");
        let _ = self.shutdown.send(true);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        for pump in self.pumps.drain(..) {
            pump.abort();
        }
    }
}

/// Clonable handle that stops the owning session's pipelines.
#[derive(Clone)]
pub struct StopHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Handle to one running sink.
///
/// State machine: Created -> Running -> (Terminated-Normally |
/// Terminated-WithError). There are no retries.
#[derive(Debug)]
pub struct QueryHandle {
    name: String,
    handle: JoinHandle<Result<()>>,
}

impl QueryHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until the sink terminates. A clean stop returns `Ok`; any
    /// failure, including a panicked task, surfaces as `QueryFailed`.
    pub async fn await_termination(self) -> Result<()> {
        match self.handle.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(StreamError::QueryFailed {
                query: self.name,
                source: Box::new(e),
            }),
            Err(join_error) => Err(StreamError::QueryFailed {
                query: self.name,
                source: Box::new(StreamError::Execution(join_error.to_string())),
            }),
        }
    }
}

async fn run_sink(
    mut source_rx: broadcast::Receiver<RecordBatch>,
    mut shutdown_rx: watch::Receiver<bool>,
    mut query: Box<dyn ContinuousQuery>,
    mut writer: Box<dyn BatchWriter>,
    trigger: Duration,
) -> Result<()> {
    let mut ticker = tokio::time::interval(trigger);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut trigger_id = 0u64;

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            received = source_rx.recv() => match received {
                Ok(batch) => query.process(&batch)?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Err(StreamError::SourceLagged { skipped });
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = ticker.tick() => {
                if let Some(out) = query.emit()? {
                    writer.write(trigger_id, &out)?;
                    trigger_id += 1;
                }
            }
        }
    }

    // Publish whatever accumulated since the last trigger before exiting.
    if let Some(out) = query.emit()? {
        writer.write(trigger_id, &out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{ThresholdCount, ThresholdFilter, WindowedMean};
    use crate::sink::MemoryWriter;
    use crate::source::{ChannelStreamSource, RateConfig, RateStreamSource};
    use crate::window::TumblingWindow;
    use hvac_core::schema::{
        float64_column, sensor_schema, COL_HUMIDITY, COL_ROOM_ID, COL_TEMPERATURE, COL_TIMESTAMP,
    };
    use hvac_core::{readings_to_batch, SensorReading};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const TRIGGER: Duration = Duration::from_millis(100);

    fn test_session() -> Session {
        Session::builder()
            .app_name("session-tests")
            .config(WORKER_FAULTHANDLER_FLAG, "true")
            .get_or_create()
    }

    struct FailingWriter;

    impl BatchWriter for FailingWriter {
        fn write(&mut self, _trigger_id: u64, _batch: &RecordBatch) -> Result<()> {
            Err(StreamError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "console gone",
            )))
        }
    }

    fn synthesized_batch(range: std::ops::Range<i64>, timestamp_ms: i64, seed: u64) -> RecordBatch {
        let mut rng = StdRng::seed_from_u64(seed);
        let readings: Vec<SensorReading> = range
            .map(|seq| SensorReading::synthesize(seq, timestamp_ms, &mut rng))
            .collect();
        readings_to_batch(&readings).unwrap()
    }

    fn critical_filter() -> Box<ThresholdFilter> {
        Box::new(
            ThresholdFilter::new(
                &sensor_schema(),
                COL_TEMPERATURE,
                18.0,
                60.0,
                &[COL_ROOM_ID, COL_TEMPERATURE, COL_HUMIDITY, COL_TIMESTAMP],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_builder_carries_config() {
        let session = test_session();
        assert_eq!(session.app_name(), "session-tests");
        assert_eq!(session.conf(WORKER_FAULTHANDLER_FLAG), Some("true"));
        assert_eq!(session.conf(UDF_FAULTHANDLER_FLAG), None);
        assert!(session.fault_diagnostics());
    }

    #[tokio::test]
    async fn test_unknown_relation_is_rejected() {
        let mut session = test_session();
        let (writer, _) = MemoryWriter::new();
        let err = session
            .start_query("q", "nope", critical_filter(), Box::new(writer), TRIGGER)
            .unwrap_err();
        assert!(matches!(err, StreamError::Execution(_)));
    }

    #[tokio::test]
    async fn test_duplicate_relation_is_rejected() {
        let mut session = test_session();
        let (_tx, source) = ChannelStreamSource::new(4);
        session.register_stream("sensor_table", source).unwrap();

        let (_tx2, source2) = ChannelStreamSource::new(4);
        let err = session.register_stream("sensor_table", source2).unwrap_err();
        assert!(matches!(err, StreamError::Execution(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_three_sinks() {
        let mut session = test_session();
        let (tx, source) = ChannelStreamSource::new(16);
        session.register_stream("sensor_table", source).unwrap();

        let (critical_writer, critical_out) = MemoryWriter::new();
        let critical = session
            .start_query(
                "Critical Temperatures",
                "sensor_table",
                critical_filter(),
                Box::new(critical_writer),
                TRIGGER,
            )
            .unwrap();

        let (average_writer, average_out) = MemoryWriter::new();
        let average = session
            .start_query(
                "Average Readings",
                "sensor_table",
                Box::new(WindowedMean::new(
                    COL_ROOM_ID,
                    COL_TIMESTAMP,
                    &[COL_TEMPERATURE, COL_HUMIDITY],
                    TumblingWindow::new(Duration::from_secs(60)),
                    Duration::from_secs(600),
                )),
                Box::new(average_writer),
                TRIGGER,
            )
            .unwrap();

        let (attention_writer, attention_out) = MemoryWriter::new();
        let attention = session
            .start_query(
                "Attention Needed",
                "sensor_table",
                Box::new(ThresholdCount::new(
                    COL_ROOM_ID,
                    COL_HUMIDITY,
                    45.0,
                    75.0,
                    "critical_readings",
                )),
                Box::new(attention_writer),
                TRIGGER,
            )
            .unwrap();

        // Two seconds of feed at 5 rows/sec with hand-picked values so each
        // sink is guaranteed traffic: room 0 is cold (critical), humidity
        // dips below 45 (attention).
        let temperatures = [15.0, 25.0, 30.0, 35.0, 40.0, 15.0, 22.0, 28.0, 33.0, 44.0];
        let humidities = [50.0, 41.0, 55.0, 60.0, 44.5, 52.0, 65.0, 48.0, 69.0, 42.0];
        for second in 0..2usize {
            let readings: Vec<SensorReading> = (0..5)
                .map(|i| {
                    let seq = (second * 5 + i) as i64;
                    SensorReading {
                        value: seq,
                        timestamp_ms: (second as i64) * 1_000,
                        room_id: (seq % 10).to_string(),
                        temperature: temperatures[seq as usize],
                        humidity: humidities[seq as usize],
                    }
                })
                .collect();
            tx.send(readings_to_batch(&readings).unwrap()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        session.stop();
        critical.await_termination().await.unwrap();
        average.await_termination().await.unwrap();
        attention.await_termination().await.unwrap();

        // Every sink refreshed at least once.
        let critical_batches = critical_out.lock().unwrap();
        let average_batches = average_out.lock().unwrap();
        let attention_batches = attention_out.lock().unwrap();
        assert!(!critical_batches.is_empty());
        assert!(!average_batches.is_empty());
        assert!(!attention_batches.is_empty());

        // Everything routed to the critical sink is out of band.
        for batch in critical_batches.iter() {
            let temps = float64_column(batch, COL_TEMPERATURE).unwrap();
            for row in 0..batch.num_rows() {
                let t = temps.value(row);
                assert!(t < 18.0 || t > 60.0, "in-band temperature {t} leaked");
            }
        }

        // Complete mode: the final snapshot counts every row that left the
        // humidity band, grouped by room. Rows 1 (41.0), 4 (44.5) and
        // 9 (42.0) qualify, in rooms 1, 4 and 9.
        let last = attention_batches.last().unwrap();
        assert_eq!(last.num_rows(), 3);

        // The final average snapshot covers all ten rooms in one window.
        let last_avg = average_batches.last().unwrap();
        assert_eq!(last_avg.num_rows(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_source_feeds_sinks() {
        let mut session = test_session();
        let source = RateStreamSource::with_seed(
            RateConfig {
                rows_per_second: 5,
                tick: Duration::from_secs(1),
            },
            13,
        );
        session.register_stream("sensor_table", source).unwrap();

        let (critical_writer, critical_out) = MemoryWriter::new();
        let critical = session
            .start_query(
                "Critical Temperatures",
                "sensor_table",
                critical_filter(),
                Box::new(critical_writer),
                TRIGGER,
            )
            .unwrap();

        // Four generator ticks cover sequence values 0..20, which include
        // the cold room at 0 and 10.
        tokio::time::sleep(Duration::from_secs(4)).await;
        session.stop();
        critical.await_termination().await.unwrap();

        let batches = critical_out.lock().unwrap();
        assert!(!batches.is_empty());
        for batch in batches.iter() {
            let temps = float64_column(batch, COL_TEMPERATURE).unwrap();
            for row in 0..batch.num_rows() {
                let t = temps.value(row);
                assert!(t < 18.0 || t > 60.0);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_sink_does_not_stop_siblings() {
        let mut session = test_session();
        let (tx, source) = ChannelStreamSource::new(16);
        session.register_stream("sensor_table", source).unwrap();

        let failing = session
            .start_query(
                "Doomed",
                "sensor_table",
                critical_filter(),
                Box::new(FailingWriter),
                TRIGGER,
            )
            .unwrap();

        let (writer, collected) = MemoryWriter::new();
        let healthy = session
            .start_query(
                "Healthy",
                "sensor_table",
                critical_filter(),
                Box::new(writer),
                TRIGGER,
            )
            .unwrap();

        // Cold room 0 row guarantees both sinks have output to write.
        tx.send(synthesized_batch(0..1, 0, 7)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let err = failing.await_termination().await.unwrap_err();
        match err {
            StreamError::QueryFailed { query, .. } => assert_eq!(query, "Doomed"),
            other => panic!("unexpected error: {other}"),
        }

        // The sibling keeps running and can still be stopped cleanly.
        tx.send(synthesized_batch(1..2, 1_000, 7)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        session.stop();
        healthy.await_termination().await.unwrap();
        assert!(!collected.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_terminates_idle_sink() {
        let mut session = test_session();
        let (_tx, source) = ChannelStreamSource::new(4);
        session.register_stream("sensor_table", source).unwrap();

        let (writer, _) = MemoryWriter::new();
        let handle = session
            .start_query("Idle", "sensor_table", critical_filter(), Box::new(writer), TRIGGER)
            .unwrap();

        let stopper = session.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            stopper.stop();
        });

        handle.await_termination().await.unwrap();
    }
}
