//! CLI entry point for sdrscan.
//!
//! # Usage
//!
//! List the registered sources:
//! ```bash
//! sdrscan sources
//! ```
//!
//! Measure power on a capture file for ten seconds:
//! ```bash
//! SDRSCAN_SOURCE__PARAMS__PATH=capture.cf32 sdrscan run --source file --seconds 10
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use sdrscan::inspect::PowerMeter;
use sdrscan::{telemetry, Analyzer, ConsumerEvent, ScanConfig, ScanContext};
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const EVENT_POLL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "sdrscan")]
#[command(about = "Streaming sample acquisition for SDR scanning", long_about = None)]
struct Cli {
    /// Configuration file (TOML). Missing files fall back to defaults.
    #[arg(long, default_value = "config/sdrscan.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered sample sources
    Sources,

    /// Read from a source and log its power
    Run {
        /// Registered source name (overrides source.kind)
        #[arg(long)]
        source: Option<String>,

        /// Stop after this many seconds; runs until Ctrl-C when omitted
        #[arg(long)]
        seconds: Option<u64>,

        /// Windows per power report
        #[arg(long, default_value = "64")]
        report_every: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ScanConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    telemetry::init(&config.log)?;

    let ctx = ScanContext::init(&config)?;

    match cli.command {
        Commands::Sources => list_sources(&ctx),
        Commands::Run {
            source,
            seconds,
            report_every,
        } => run(ctx, config, source, seconds, report_every).await,
    }
}

fn list_sources(ctx: &ScanContext) -> Result<()> {
    ctx.registry().walk(|descriptor| {
        println!(
            "{:>3}  {:<8} {:<28} {}",
            descriptor.index(),
            descriptor.name(),
            descriptor.capabilities().to_string(),
            descriptor.description()
        );
        Ok::<(), std::io::Error>(())
    })?;
    Ok(())
}

async fn run(
    ctx: Arc<ScanContext>,
    config: ScanConfig,
    source: Option<String>,
    seconds: Option<u64>,
    report_every: u64,
) -> Result<()> {
    let kind = source.unwrap_or_else(|| config.source.kind.clone());
    let analyzer = Analyzer::new(ctx, &config)?;

    let stream = analyzer
        .open_source(&kind, &config.source.params)
        .with_context(|| format!("opening source '{kind}'"))?;
    let id = analyzer.attach_consumer(stream)?;
    analyzer.push_task(id, PowerMeter::new(report_every).into_task())?;
    info!(source = %kind, consumer = %id, port = ?config.consumer.port, "Scanning");

    let deadline = async {
        match seconds {
            Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);
    let mut poll = tokio::time::interval(EVENT_POLL);

    let outcome = loop {
        tokio::select! {
            _ = &mut interrupted => {
                info!("Interrupted");
                break Ok(());
            }
            () = &mut deadline => {
                info!("Run time elapsed");
                break Ok(());
            }
            _ = poll.tick() => {
                let mut done = None;
                for event in analyzer.poll_events() {
                    match event {
                        ConsumerEvent::EndOfStream { .. } => done = Some(Ok(())),
                        ConsumerEvent::TaskFailed { message, .. }
                        | ConsumerEvent::SourceFailed { message, .. } => {
                            done = Some(Err(anyhow::anyhow!(message)));
                        }
                        ConsumerEvent::Stopped { .. } => {}
                    }
                }
                if let Some(result) = done {
                    break result;
                }
            }
        }
    };

    if let Some(consumer) = analyzer.consumer(id) {
        let stats = consumer.stats();
        info!(
            windows = stats.windows_read,
            samples = stats.samples_read,
            skipped = stats.windows_skipped,
            "Consumer statistics"
        );
    }
    if let Err(e) = analyzer.detach_consumer(id) {
        warn!(error = %e, "Detach failed");
    }
    outcome
}
