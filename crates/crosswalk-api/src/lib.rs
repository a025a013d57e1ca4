//! # crosswalk-api
//!
//! HTTP surface for the crosswalk control-mapping service.
//!
//! Two client endpoints:
//!
//! - `POST /api/v1/mappings`: validate a mapping request, create the
//!   PENDING job, enqueue the work, answer 202 with the job ID
//! - `GET  /api/v1/mappings/{mapping_id}`: read-only projection of the
//!   job record
//!
//! Plus the deployment-facing `GET /health` and `GET /ready` pair.
//!
//! The API never runs the pipeline itself; the processing side lives in
//! `crosswalk-flow` behind the request queue.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod suggest;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use server::AppState;
