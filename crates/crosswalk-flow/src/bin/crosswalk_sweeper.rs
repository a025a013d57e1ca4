//! `crosswalk_sweeper` binary entrypoint.
//!
//! Periodically re-enqueues stale PENDING jobs whose request message was
//! lost between job creation and enqueue.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crosswalk_core::observability::{LogFormat, init_logging};
use crosswalk_core::prelude::*;
use crosswalk_flow::config::PipelineConfig;
use crosswalk_flow::queue::memory::InMemoryRequestQueue;
use crosswalk_flow::sweeper::Sweeper;

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

#[tokio::main]
async fn main() -> Result<()> {
    let debug = env_flag("CROSSWALK_DEBUG");
    init_logging(if debug {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    });

    let config = PipelineConfig::from_env().context("loading pipeline config")?;
    if !debug {
        anyhow::bail!(
            "durable job store and queue backends are not configured; \
             set CROSSWALK_DEBUG=true to run against in-memory backends"
        );
    }
    tracing::warn!("CROSSWALK_DEBUG=true; using in-memory job store and queue (debug only)");

    let jobs: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let queue = Arc::new(InMemoryRequestQueue::new(
        config.visibility_timeout,
        config.max_receive_count,
    ));

    // Stale threshold: twice the visibility timeout, so healthy in-flight
    // jobs are never reissued.
    let sweeper = Sweeper::new(jobs, queue, config.visibility_timeout * 2);
    tracing::info!("sweeper started");
    sweeper.run(Duration::from_secs(60)).await;
    Ok(())
}
