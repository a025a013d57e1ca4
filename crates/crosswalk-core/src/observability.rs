//! Observability infrastructure for crosswalk.
//!
//! Structured logging with consistent spans. This module provides
//! initialization helpers and span constructors for consistent
//! observability across all crosswalk components.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `crosswalk_flow=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for one workflow run with standard fields.
#[must_use]
pub fn workflow_span(operation: &str, job_id: &str) -> Span {
    tracing::info_span!("workflow", op = operation, job_id = job_id)
}

/// Creates a span for intake operations.
#[must_use]
pub fn intake_span(operation: &str, control_key: &str, target_framework_key: &str) -> Span {
    tracing::info_span!(
        "intake",
        op = operation,
        control_key = control_key,
        target_framework_key = target_framework_key,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty);
    }

    #[test]
    fn workflow_span_carries_fields() {
        let span = workflow_span("run", "6f9619ff-8b86-4d01-b42d-00c04fc964ff");
        let _guard = span.enter();
        tracing::info!("message inside workflow span");
    }

    #[test]
    fn intake_span_carries_fields() {
        let span = intake_span("create_mapping", "AWS.EC2#1.0#PR.1", "NIST-SP-800-53#R5");
        let _guard = span.enter();
        tracing::info!("message inside intake span");
    }
}
