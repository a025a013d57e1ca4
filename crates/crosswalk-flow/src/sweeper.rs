//! Pending-job sweeper.
//!
//! Intake creates the job record before enqueueing its request message.
//! If the enqueue fails, the job is left PENDING with no message to drive
//! it. The sweeper reconciles that gap: it periodically re-enqueues the
//! request for any PENDING job that has sat unchanged for longer than the
//! stale threshold.
//!
//! Re-enqueueing a job whose message is still in flight only produces a
//! duplicate delivery, which the job store's conditional writes absorb.

use std::sync::Arc;
use std::time::Duration;

use crosswalk_core::job::JobStatus;
use crosswalk_core::store::JobStore;

use crate::error::Result;
use crate::queue::{MappingRequest, RequestQueue};

/// Default number of jobs examined per sweep.
const DEFAULT_SWEEP_BATCH: usize = 100;

/// Re-enqueues stale PENDING jobs.
pub struct Sweeper {
    jobs: Arc<dyn JobStore>,
    queue: Arc<dyn RequestQueue>,
    stale_after: Duration,
    batch: usize,
}

impl Sweeper {
    /// Creates a sweeper. `stale_after` should comfortably exceed the
    /// queue visibility timeout so healthy in-flight jobs are not swept.
    #[must_use]
    pub fn new(
        jobs: Arc<dyn JobStore>,
        queue: Arc<dyn RequestQueue>,
        stale_after: Duration,
    ) -> Self {
        Self {
            jobs,
            queue,
            stale_after,
            batch: DEFAULT_SWEEP_BATCH,
        }
    }

    /// Overrides the per-sweep batch size.
    #[must_use]
    pub const fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch;
        self
    }

    /// Runs one sweep and returns how many jobs were re-enqueued.
    ///
    /// # Errors
    ///
    /// Returns an error when the job store cannot be read; per-job enqueue
    /// failures are logged and skipped.
    pub async fn sweep_once(&self) -> Result<usize> {
        let stale = chrono::Duration::from_std(self.stale_after)
            .unwrap_or_else(|_| chrono::Duration::seconds(720));
        let cutoff = chrono::Utc::now() - stale;

        let pending = self.jobs.list_by_status(JobStatus::Pending, self.batch).await?;
        let mut reissued = 0_usize;
        for job in pending {
            if job.updated_at > cutoff {
                continue;
            }
            let request = MappingRequest::new(
                job.job_id,
                job.source_control_key.clone(),
                job.target_framework_key.clone(),
                job.target_control_ids.clone(),
            );
            match self.queue.enqueue(&request).await {
                Ok(_) => {
                    tracing::info!(job_id = %job.job_id, "re-enqueued stale pending job");
                    reissued += 1;
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.job_id, error = %e, "sweeper enqueue failed");
                }
            }
        }
        Ok(reissued)
    }

    /// Sweeps forever on the given interval.
    pub async fn run(&self, interval: Duration) {
        loop {
            match self.sweep_once().await {
                Ok(0) => {}
                Ok(reissued) => tracing::info!(reissued, "sweep reissued stale jobs"),
                Err(e) => tracing::error!(error = %e, "sweep failed"),
            }
            tokio::time::sleep(interval).await;
        }
    }
}
