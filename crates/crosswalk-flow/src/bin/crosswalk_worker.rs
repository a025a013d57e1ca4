//! `crosswalk_worker` binary entrypoint.
//!
//! Loads configuration from environment variables, installs the
//! Prometheus recorder, and polls the request queue until terminated.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::sync::Arc;

use anyhow::{Context, Result};

use crosswalk_core::observability::{LogFormat, init_logging};
use crosswalk_core::prelude::*;
use crosswalk_flow::agent::HttpAgentClient;
use crosswalk_flow::config::PipelineConfig;
use crosswalk_flow::queue::memory::InMemoryRequestQueue;
use crosswalk_flow::science::HttpScienceClient;
use crosswalk_flow::worker::Worker;
use crosswalk_flow::workflow::Orchestrator;

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
    let science_url =
        std::env::var("CROSSWALK_SCIENCE_URL").context("CROSSWALK_SCIENCE_URL is required")?;
    let agent_url =
        std::env::var("CROSSWALK_AGENT_URL").context("CROSSWALK_AGENT_URL is required")?;

    if let Ok(listen) = std::env::var("CROSSWALK_METRICS_ADDR") {
        let addr: std::net::SocketAddr = listen
            .parse()
            .with_context(|| format!("invalid CROSSWALK_METRICS_ADDR {listen}"))?;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus recorder")?;
        tracing::info!(%addr, "metrics exporter listening");
    }

    if !debug {
        anyhow::bail!(
            "durable job store and queue backends are not configured; \
             set CROSSWALK_DEBUG=true to run against in-memory backends"
        );
    }
    tracing::warn!("CROSSWALK_DEBUG=true; using in-memory job store and queue (debug only)");

    let jobs: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let catalog: Arc<dyn ControlCatalog> = Arc::new(InMemoryCatalog::new());
    let queue = Arc::new(InMemoryRequestQueue::new(
        config.visibility_timeout,
        config.max_receive_count,
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&jobs),
        catalog,
        Arc::new(InMemoryEnrichmentCache::new()),
        Arc::new(InMemoryEmbeddingCache::new()),
        Arc::new(HttpScienceClient::new(science_url, &config)),
        Arc::new(HttpAgentClient::new(agent_url, &config)),
        config,
    ));

    let worker = Worker::new(queue, jobs, orchestrator);
    tracing::info!("worker started");
    worker.run().await;
    Ok(())
}
