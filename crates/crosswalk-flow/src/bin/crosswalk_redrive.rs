//! `crosswalk_redrive` binary entrypoint.
//!
//! Operator tool: moves messages from the DLQ back to the main queue
//! after a fix has been deployed. Prints the redrive report as JSON.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use anyhow::{Context, Result};
use clap::Parser;

use crosswalk_core::observability::{LogFormat, init_logging};
use crosswalk_flow::config::PipelineConfig;
use crosswalk_flow::queue::memory::InMemoryRequestQueue;
use crosswalk_flow::redrive::{RedriveOptions, redrive};

/// Redrive dead-lettered mapping requests onto the main queue.
#[derive(Debug, Parser)]
#[command(name = "crosswalk_redrive")]
struct Args {
    /// Count DLQ messages without moving anything.
    #[arg(long)]
    dry_run: bool,

    /// Maximum messages to move (capped at 1000).
    #[arg(long, default_value_t = 100)]
    max_messages: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(LogFormat::Pretty);
    let args = Args::parse();
    let config = PipelineConfig::from_env().context("loading pipeline config")?;

    // The in-memory queue only exists within one process; this binary is
    // the wiring point for a durable queue backend.
    let queue = InMemoryRequestQueue::new(config.visibility_timeout, config.max_receive_count);

    let report = redrive(
        &queue,
        RedriveOptions {
            dry_run: args.dry_run,
            max_messages: args.max_messages,
        },
    )
    .await
    .context("redrive failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
