//! `crosswalk-api` binary entrypoint.
//!
//! Loads configuration from environment variables and starts the HTTP
//! server.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::sync::Arc;

use anyhow::Result;

use crosswalk_api::config::ApiConfig;
use crosswalk_api::server::{AppState, serve};
use crosswalk_core::observability::{LogFormat, init_logging};
use crosswalk_core::prelude::*;
use crosswalk_flow::queue::memory::InMemoryRequestQueue;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ApiConfig::from_env()?;
    init_logging(if config.debug {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    });

    if !config.debug {
        anyhow::bail!(
            "durable job store and queue backends are not configured; \
             set CROSSWALK_DEBUG=true to run against in-memory backends"
        );
    }
    tracing::warn!("CROSSWALK_DEBUG=true; using in-memory backends (debug only)");

    let queue = Arc::new(InMemoryRequestQueue::new(
        config.pipeline.visibility_timeout,
        config.pipeline.max_receive_count,
    ));
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::new(InMemoryJobStore::new()),
        Arc::new(InMemoryCatalog::new()),
        queue,
    ));

    serve(state, config.bind_addr).await
}
