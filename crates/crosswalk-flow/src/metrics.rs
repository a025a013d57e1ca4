//! Observability metrics for the mapping pipeline.
//!
//! Metrics are exported through the `metrics` crate facade; the worker
//! binary installs a Prometheus recorder.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `crosswalk_jobs_total` | Counter | `transition` | Job status transitions |
//! | `crosswalk_workflow_duration_seconds` | Histogram | `outcome` | End-to-end run duration |
//! | `crosswalk_embed_cache_total` | Counter | `result` | Embedding cache hits/misses |
//! | `crosswalk_candidates_dropped_total` | Counter | - | Candidates dropped by embed failure |
//! | `crosswalk_reasoning_failures_total` | Counter | - | Reasoning calls that degraded |
//! | `crosswalk_enrichment_degraded_total` | Counter | - | Runs that fell back to raw text |
//! | `crosswalk_queue_depth` | Gauge | `queue` | Visible messages per queue |
//! | `crosswalk_redriven_total` | Counter | - | Messages redriven from the DLQ |

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Job status transitions.
    pub const JOBS_TOTAL: &str = "crosswalk_jobs_total";
    /// Histogram: End-to-end workflow run duration in seconds.
    pub const WORKFLOW_DURATION_SECONDS: &str = "crosswalk_workflow_duration_seconds";
    /// Counter: Embedding cache lookups by result.
    pub const EMBED_CACHE_TOTAL: &str = "crosswalk_embed_cache_total";
    /// Counter: Candidates dropped after persistent embed failure.
    pub const CANDIDATES_DROPPED_TOTAL: &str = "crosswalk_candidates_dropped_total";
    /// Counter: Reasoning calls that degraded to an empty rationale.
    pub const REASONING_FAILURES_TOTAL: &str = "crosswalk_reasoning_failures_total";
    /// Counter: Runs that fell back to the raw source description.
    pub const ENRICHMENT_DEGRADED_TOTAL: &str = "crosswalk_enrichment_degraded_total";
    /// Gauge: Visible messages per queue.
    pub const QUEUE_DEPTH: &str = "crosswalk_queue_depth";
    /// Counter: Messages redriven from the DLQ.
    pub const REDRIVEN_TOTAL: &str = "crosswalk_redriven_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Job transition (e.g. `pending_to_running`).
    pub const TRANSITION: &str = "transition";
    /// Workflow outcome (`completed`, `failed`, `superseded`).
    pub const OUTCOME: &str = "outcome";
    /// Cache lookup result (`hit`, `miss`).
    pub const RESULT: &str = "result";
    /// Queue name (`main`, `dlq`).
    pub const QUEUE: &str = "queue";
}

/// Handle for recording pipeline metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowMetrics;

impl FlowMetrics {
    /// Creates a metrics handle.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Records a job status transition.
    pub fn record_job_transition(&self, transition: &'static str) {
        counter!(names::JOBS_TOTAL, labels::TRANSITION => transition).increment(1);
    }

    /// Records an end-to-end workflow duration.
    pub fn observe_workflow_duration(&self, outcome: &'static str, seconds: f64) {
        histogram!(names::WORKFLOW_DURATION_SECONDS, labels::OUTCOME => outcome).record(seconds);
    }

    /// Records an embedding cache lookup.
    pub fn record_embed_cache(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        counter!(names::EMBED_CACHE_TOTAL, labels::RESULT => result).increment(1);
    }

    /// Records candidates dropped by persistent embedding failure.
    pub fn record_candidates_dropped(&self, count: u64) {
        if count > 0 {
            counter!(names::CANDIDATES_DROPPED_TOTAL).increment(count);
        }
    }

    /// Records a degraded reasoning call.
    pub fn record_reasoning_failure(&self) {
        counter!(names::REASONING_FAILURES_TOTAL).increment(1);
    }

    /// Records an enrichment fallback to raw text.
    pub fn record_enrichment_degraded(&self) {
        counter!(names::ENRICHMENT_DEGRADED_TOTAL).increment(1);
    }

    /// Updates a queue depth gauge.
    pub fn set_queue_depth(&self, queue: &'static str, depth: usize) {
        #[allow(clippy::cast_precision_loss)]
        gauge!(names::QUEUE_DEPTH, labels::QUEUE => queue).set(depth as f64);
    }

    /// Records messages redriven from the DLQ.
    pub fn record_redriven(&self, count: u64) {
        if count > 0 {
            counter!(names::REDRIVEN_TOTAL).increment(count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_a_recorder_is_a_noop() {
        let metrics = FlowMetrics::new();
        metrics.record_job_transition("pending_to_running");
        metrics.observe_workflow_duration("completed", 1.25);
        metrics.record_embed_cache(true);
        metrics.record_embed_cache(false);
        metrics.record_candidates_dropped(2);
        metrics.record_reasoning_failure();
        metrics.record_enrichment_degraded();
        metrics.set_queue_depth("main", 3);
        metrics.record_redriven(2);
    }
}
