//! # crosswalk-flow
//!
//! The durable asynchronous mapping pipeline for crosswalk.
//!
//! This crate implements the processing side of the system:
//!
//! - **Request queue**: At-least-once handoff with visibility timeouts,
//!   a receive cap, and a dead-letter queue
//! - **Workflow orchestrator**: The six-step mapping run
//!   (validate → source text → embed/retrieve/rerank → reason → finalize)
//!   with per-step failure policy
//! - **Worker**: Single-message queue consumer with idempotent restart
//! - **Redrive**: Operator-triggered DLQ recovery
//! - **Sweeper**: Reconciliation of PENDING jobs whose enqueue was lost
//!
//! ## Guarantees
//!
//! - **At-most-one terminal write per job**, across any number of
//!   redeliveries and overlapping workers, through the job store's
//!   conditional transitions
//! - **Graceful degradation**: agent failures never fail a run; the
//!   result is completed with raw text and/or empty rationales instead
//! - **Bounded fan-out**: per-run reasoning concurrency is capped
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use crosswalk_core::prelude::*;
//! use crosswalk_flow::config::PipelineConfig;
//! use crosswalk_flow::queue::memory::InMemoryRequestQueue;
//! use crosswalk_flow::science::HttpScienceClient;
//! use crosswalk_flow::agent::HttpAgentClient;
//! use crosswalk_flow::workflow::Orchestrator;
//! use crosswalk_flow::worker::Worker;
//!
//! # async fn run() {
//! let config = PipelineConfig::from_env().expect("pipeline config");
//! let jobs = Arc::new(InMemoryJobStore::new());
//! let catalog = Arc::new(InMemoryCatalog::new());
//! let queue = Arc::new(InMemoryRequestQueue::new(
//!     config.visibility_timeout,
//!     config.max_receive_count,
//! ));
//!
//! let orchestrator = Arc::new(Orchestrator::new(
//!     jobs.clone(),
//!     catalog,
//!     Arc::new(InMemoryEnrichmentCache::new()),
//!     Arc::new(InMemoryEmbeddingCache::new()),
//!     Arc::new(HttpScienceClient::new("http://science:8000", &config)),
//!     Arc::new(HttpAgentClient::new("http://agent:8100", &config)),
//!     config,
//! ));
//!
//! let worker = Worker::new(queue, jobs, orchestrator)
//!     .with_idle_backoff(Duration::from_secs(1));
//! worker.run().await;
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod agent;
pub mod config;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod redrive;
pub mod science;
pub mod sweeper;
pub mod worker;
pub mod workflow;

pub use error::{Error, Result, WorkflowError};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::agent::{Agent, HttpAgentClient};
    pub use crate::config::PipelineConfig;
    pub use crate::error::{Error, Result, WorkflowError};
    pub use crate::metrics::FlowMetrics;
    pub use crate::queue::memory::InMemoryRequestQueue;
    pub use crate::queue::{Delivery, DeliveryToken, MappingRequest, RequestQueue};
    pub use crate::redrive::{RedriveOptions, RedriveReport, redrive};
    pub use crate::science::{HttpScienceClient, Science};
    pub use crate::sweeper::Sweeper;
    pub use crate::worker::{PollOutcome, Worker};
    pub use crate::workflow::{Orchestrator, RunOutcome, RunReport};
}
