//! Queue consumer driving the mapping workflow.
//!
//! Policy: **batch size 1**. Each worker instance handles one in-flight
//! message at a time; concurrency comes from running multiple workers.
//!
//! For each received message the worker:
//!
//! 1. Validates the body. A message that fails schema validation can never
//!    succeed, so it is acknowledged and dropped rather than retried.
//! 2. Transitions the job PENDING → RUNNING under a fresh execution
//!    handle. A job found already terminal means a prior run finished:
//!    acknowledge and move on.
//! 3. Invokes the orchestrator synchronously.
//! 4. Acknowledges only after the orchestrator reports a settled job. On
//!    a local failure before the terminal write the message is left
//!    unacknowledged; the visibility timeout redelivers it, and the
//!    queue's receive cap eventually moves a persistently failing message
//!    to the DLQ.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crosswalk_core::job::JobStatus;
use crosswalk_core::store::{JobStore, TransitionOutcome};

use crate::error::Result;
use crate::metrics::FlowMetrics;
use crate::queue::RequestQueue;
use crate::workflow::{Orchestrator, RunReport};

/// Outcome of one poll cycle.
#[derive(Debug)]
pub enum PollOutcome {
    /// No message was available.
    Idle,
    /// A run settled the job (completed, failed, or absorbed).
    Processed(RunReport),
    /// The job was already terminal; the message was acknowledged.
    AlreadySettled {
        /// The job that was found settled.
        job_id: Uuid,
        /// Its terminal status.
        status: JobStatus,
    },
    /// The message could never succeed and was dropped.
    Dropped {
        /// Why it was dropped.
        reason: String,
    },
    /// The message was left for redelivery.
    Deferred {
        /// The job whose message was deferred, when known.
        job_id: Option<Uuid>,
    },
}

/// A single-message-at-a-time queue consumer.
pub struct Worker {
    queue: Arc<dyn RequestQueue>,
    jobs: Arc<dyn JobStore>,
    orchestrator: Arc<Orchestrator>,
    metrics: FlowMetrics,
    idle_backoff: Duration,
}

impl Worker {
    /// Creates a worker bound to the given queue, job store, and
    /// orchestrator.
    #[must_use]
    pub fn new(
        queue: Arc<dyn RequestQueue>,
        jobs: Arc<dyn JobStore>,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        Self {
            queue,
            jobs,
            orchestrator,
            metrics: FlowMetrics::new(),
            idle_backoff: Duration::from_secs(1),
        }
    }

    /// Overrides the sleep between polls of an empty queue.
    #[must_use]
    pub const fn with_idle_backoff(mut self, idle_backoff: Duration) -> Self {
        self.idle_backoff = idle_backoff;
        self
    }

    /// Receives and processes at most one message.
    ///
    /// # Errors
    ///
    /// Returns an error when the queue itself fails; message-level
    /// failures are reported through [`PollOutcome`].
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        let mut deliveries = self.queue.receive(1).await?;
        let Some(delivery) = deliveries.pop() else {
            return Ok(PollOutcome::Idle);
        };

        let request = match delivery.request() {
            Ok(request) => request,
            Err(e) => {
                // Malformed messages are poison: retrying cannot fix them.
                tracing::error!(error = %e, "dropping malformed queue message");
                self.queue.ack(&delivery.token).await?;
                return Ok(PollOutcome::Dropped {
                    reason: e.to_string(),
                });
            }
        };
        let job_id = request.job_id;

        // Fresh handle per attempt: overlapping deliveries of the same
        // message are detectable and made idempotent in the store.
        let execution_handle = Uuid::new_v4().to_string();
        match self.jobs.mark_running(job_id, &execution_handle).await {
            Ok(TransitionOutcome::Applied) => {
                self.metrics.record_job_transition("pending_to_running");
            }
            Ok(TransitionOutcome::AlreadyApplied) => {}
            Ok(TransitionOutcome::Superseded { status }) => {
                // A prior run finished; all that is left is the ack.
                self.queue.ack(&delivery.token).await?;
                return Ok(PollOutcome::AlreadySettled { job_id, status });
            }
            Err(e) if e.is_conflict() => {
                // Another worker holds the run; let the visibility timeout
                // redeliver once it has settled.
                tracing::debug!(%job_id, "job already running elsewhere, deferring");
                return Ok(PollOutcome::Deferred {
                    job_id: Some(job_id),
                });
            }
            Err(e) if e.is_not_found() => {
                tracing::error!(%job_id, "queue message references unknown job, dropping");
                self.queue.ack(&delivery.token).await?;
                return Ok(PollOutcome::Dropped {
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        match self.orchestrator.run(&request).await {
            Ok(report) => {
                self.queue.ack(&delivery.token).await?;
                Ok(PollOutcome::Processed(report))
            }
            Err(e) => {
                // No terminal write happened; leave the message for
                // redelivery rather than losing the job.
                tracing::error!(%job_id, error = %e, "workflow run aborted before terminal write");
                Ok(PollOutcome::Deferred {
                    job_id: Some(job_id),
                })
            }
        }
    }

    /// Polls forever, sleeping between empty polls. Queue-level errors are
    /// logged and retried after the idle backoff.
    pub async fn run(&self) {
        loop {
            match self.poll_once().await {
                Ok(PollOutcome::Idle) => tokio::time::sleep(self.idle_backoff).await,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "poll failed");
                    tokio::time::sleep(self.idle_backoff).await;
                }
            }
            if let Ok(depth) = self.queue.depth().await {
                self.metrics.set_queue_depth("main", depth);
            }
            if let Ok(depth) = self.queue.dlq_depth().await {
                self.metrics.set_queue_depth("dlq", depth);
            }
        }
    }
}
