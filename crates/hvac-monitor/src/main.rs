use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use hvac_streaming::session::{UDF_FAULTHANDLER_FLAG, WORKER_FAULTHANDLER_FLAG};
use hvac_streaming::{ConsoleWriter, RateConfig, RateStreamSource, Session};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod native_io;
mod queries;
mod runner;

use queries::{
    ATTENTION_QUERY_NAME, AVERAGE_QUERY_NAME, CRITICAL_QUERY_NAME, SENSOR_RELATION,
};

/// How often each console sink refreshes.
const PROCESSING_TRIGGER: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "hvac-monitor")]
#[command(author, version, about = "Smart Building HVAC Monitoring - streaming console monitor", long_about = None)]
struct Cli {
    /// Synthetic sensor readings generated per second
    #[arg(long, default_value_t = 5)]
    rows_per_second: u64,

    /// Stop all pipelines after this many seconds (runs until interrupted
    /// when unset)
    #[arg(long)]
    duration: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;
    print_banner();

    // Windows-only native IO diagnostics; a missing helper only warns.
    native_io::configure();

    let mut session = Session::builder()
        .app_name("Smart Building HVAC Monitoring")
        .config(WORKER_FAULTHANDLER_FLAG, "true")
        .config(UDF_FAULTHANDLER_FLAG, "true")
        .get_or_create();

    if let Err(e) = print_diagnostics(&session) {
        // A failed probe is informational only.
        error!(error = %e, "version probe failed");
    }

    let source = RateStreamSource::new(RateConfig {
        rows_per_second: cli.rows_per_second,
        ..RateConfig::default()
    });
    session.register_stream(SENSOR_RELATION, source)?;

    let critical = session.start_query(
        CRITICAL_QUERY_NAME,
        SENSOR_RELATION,
        Box::new(queries::critical_temperatures()?),
        Box::new(ConsoleWriter::new(CRITICAL_QUERY_NAME)),
        PROCESSING_TRIGGER,
    )?;
    let average = session.start_query(
        AVERAGE_QUERY_NAME,
        SENSOR_RELATION,
        Box::new(queries::average_readings()),
        Box::new(ConsoleWriter::new(AVERAGE_QUERY_NAME)),
        PROCESSING_TRIGGER,
    )?;
    let attention = session.start_query(
        ATTENTION_QUERY_NAME,
        SENSOR_RELATION,
        Box::new(queries::attention_needed()),
        Box::new(ConsoleWriter::new(ATTENTION_QUERY_NAME)),
        PROCESSING_TRIGGER,
    )?;

    if let Some(seconds) = cli.duration {
        let stopper = session.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            info!(seconds, "run duration elapsed, stopping session");
            stopper.stop();
        });
    }

    let outcomes = runner::run_all(vec![critical, average, attention]).await;
    session.stop();

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!(sinks = outcomes.len(), failed, "all sink waits finished");
    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        "hvac_monitor=debug,hvac_streaming=debug,hvac_core=debug"
    } else {
        "hvac_monitor=info,hvac_streaming=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        "Smart Building HVAC Monitoring".bright_cyan().bold()
    );
    println!(
        "{}",
        "Streaming console monitor for simulated sensor data".bright_black()
    );
}

/// Print version/diagnostic lines at startup. Kept fallible so a future
/// probe of optional components reports instead of aborting.
fn print_diagnostics(session: &Session) -> Result<()> {
    println!("Engine version: {}", Session::version().bright_yellow());
    println!("Application: {}", session.app_name().bright_yellow());
    Ok(())
}
