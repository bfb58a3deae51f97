//! Continuous-query processing over synthetic sensor streams
//!
//! This crate is the processing engine behind the HVAC monitor: stream
//! sources (including the rate generator), event-time tumbling windows with
//! watermark tracking, continuous-query operators with append/complete
//! output modes, console sinks, and the session that wires independent
//! query pipelines to a shared source relation.
//!
//! # Example
//!
//! ```ignore
//! use hvac_streaming::{RateConfig, RateStreamSource, Session};
//!
//! let mut session = Session::builder().app_name("monitor").get_or_create();
//! session.register_stream("sensor_table", RateStreamSource::new(RateConfig::default()))?;
//! let handle = session.start_query("My Query", "sensor_table", query, writer, trigger)?;
//! handle.await_termination().await?;
//! ```

pub mod query;
pub mod session;
pub mod sink;
pub mod source;
pub mod watermark;
pub mod window;

pub use query::{ContinuousQuery, OutputMode, ThresholdCount, ThresholdFilter, WindowedMean};
pub use session::{QueryHandle, Session, SessionBuilder, StopHandle};
pub use sink::{BatchWriter, ConsoleWriter, MemoryWriter};
pub use source::{ChannelStreamSource, MemoryStreamSource, RateConfig, RateStreamSource, StreamSource};
pub use watermark::Watermark;
pub use window::TumblingWindow;
