//! Sequential wait-and-report over the running sinks
//!
//! Each sink is awaited in turn behind a banner line. A termination error
//! is caught, logged with its cause chain, and recorded; it never prevents
//! the remaining sinks from being waited on.

use colored::Colorize;
use hvac_core::Result;
use hvac_streaming::QueryHandle;
use std::error::Error;
use tracing::{error, info};

/// What happened to one sink between start and termination.
pub struct SinkOutcome {
    pub name: String,
    pub result: Result<()>,
}

/// Print the sink's banner, block until it terminates, and capture the
/// outcome. Failures are reported, not propagated.
pub async fn await_and_report(handle: QueryHandle) -> SinkOutcome {
    let name = handle.name().to_string();
    println!("{}", format!("********{name}********").bright_magenta().bold());

    let result = handle.await_termination().await;
    match &result {
        Ok(()) => info!(sink = %name, "sink wait returned cleanly"),
        Err(e) => {
            error!(sink = %name, error = %e, "error while waiting on sink");
            let mut cause = e.source();
            while let Some(err) = cause {
                println!("Caused by: {err}");
                cause = err.source();
            }
        }
    }

    SinkOutcome { name, result }
}

/// Wait on every handle in order, collecting one outcome per sink.
pub async fn run_all(handles: Vec<QueryHandle>) -> Vec<SinkOutcome> {
    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        outcomes.push(await_and_report(handle).await);
    }
    outcomes
}
