//! In-memory store implementations for testing and development.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No durability, no cross-process
//!   coordination
//! - **Single-process only**: State is not shared across process boundaries
//! - **No persistence**: All state is lost when the process exits
//!
//! The conditional-write semantics are faithful to the trait contracts, so
//! concurrency tests against these stores exercise the same absorption
//! paths as the production KV backend.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{
    EmbeddingCache, EmbeddingEntry, EnrichmentCache, EnrichmentEntry, JobStore, TransitionOutcome,
};
use crate::catalog::{Control, ControlCatalog, Framework};
use crate::error::{Error, Result};
use crate::job::{Candidate, Job, JobStatus};
use crate::keys::{ControlKey, FrameworkKey};

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

/// In-memory job store with faithful conditional-write semantics.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl InMemoryJobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of jobs currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn job_count(&self) -> Result<usize> {
        let count = {
            let jobs = self.jobs.read().map_err(poison_err)?;
            jobs.len()
        };
        Ok(count)
    }
}

fn touch(job: &mut Job) {
    let now = Utc::now();
    // updated_at is monotone non-decreasing even under clock skew.
    if now > job.updated_at {
        job.updated_at = now;
    }
}

fn settle(job: &mut Job, status: JobStatus) {
    job.status = status;
    touch(job);
    job.terminal_at = Some(job.updated_at);
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: Job) -> Result<()> {
        let mut jobs = self.jobs.write().map_err(poison_err)?;
        if jobs.contains_key(&job.job_id) {
            let job_id = job.job_id;
            drop(jobs);
            return Err(Error::DuplicateJob { job_id });
        }
        jobs.insert(job.job_id, job);
        drop(jobs);
        Ok(())
    }

    async fn mark_running(
        &self,
        job_id: Uuid,
        execution_handle: &str,
    ) -> Result<TransitionOutcome> {
        let mut jobs = self.jobs.write().map_err(poison_err)?;
        let Some(job) = jobs.get_mut(&job_id) else {
            drop(jobs);
            return Err(Error::not_found("job", job_id.to_string()));
        };

        let outcome = match job.status {
            JobStatus::Pending => {
                job.status = JobStatus::Running;
                job.execution_handle = Some(execution_handle.to_string());
                touch(job);
                Ok(TransitionOutcome::Applied)
            }
            JobStatus::Running => {
                if job.execution_handle.as_deref() == Some(execution_handle) {
                    Ok(TransitionOutcome::AlreadyApplied)
                } else {
                    Err(Error::conflict(format!(
                        "job {job_id} is running under a different execution handle"
                    )))
                }
            }
            status @ (JobStatus::Completed | JobStatus::Failed) => {
                Ok(TransitionOutcome::Superseded { status })
            }
        };
        drop(jobs);
        outcome
    }

    async fn mark_completed(
        &self,
        job_id: Uuid,
        mappings: Vec<Candidate>,
    ) -> Result<TransitionOutcome> {
        let mut jobs = self.jobs.write().map_err(poison_err)?;
        let Some(job) = jobs.get_mut(&job_id) else {
            drop(jobs);
            return Err(Error::not_found("job", job_id.to_string()));
        };

        let outcome = match job.status {
            JobStatus::Pending | JobStatus::Running => {
                job.mappings = Some(mappings);
                job.error_message = None;
                settle(job, JobStatus::Completed);
                Ok(TransitionOutcome::Applied)
            }
            JobStatus::Completed => {
                if job.mappings.as_deref() == Some(mappings.as_slice()) {
                    Ok(TransitionOutcome::AlreadyApplied)
                } else {
                    Err(Error::conflict(format!(
                        "job {job_id} already completed with different mappings"
                    )))
                }
            }
            JobStatus::Failed => Err(Error::conflict(format!(
                "job {job_id} already failed; cannot complete"
            ))),
        };
        drop(jobs);
        outcome
    }

    async fn mark_failed(&self, job_id: Uuid, error_message: &str) -> Result<TransitionOutcome> {
        let mut jobs = self.jobs.write().map_err(poison_err)?;
        let Some(job) = jobs.get_mut(&job_id) else {
            drop(jobs);
            return Err(Error::not_found("job", job_id.to_string()));
        };

        let outcome = match job.status {
            JobStatus::Pending | JobStatus::Running => {
                job.error_message = Some(error_message.to_string());
                job.mappings = None;
                settle(job, JobStatus::Failed);
                Ok(TransitionOutcome::Applied)
            }
            JobStatus::Failed => {
                if job.error_message.as_deref() == Some(error_message) {
                    Ok(TransitionOutcome::AlreadyApplied)
                } else {
                    Err(Error::conflict(format!(
                        "job {job_id} already failed with a different message"
                    )))
                }
            }
            // A late failure never overwrites success.
            JobStatus::Completed => Ok(TransitionOutcome::Superseded {
                status: JobStatus::Completed,
            }),
        };
        drop(jobs);
        outcome
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let result = {
            let jobs = self.jobs.read().map_err(poison_err)?;
            jobs.get(&job_id).cloned()
        };
        Ok(result)
    }

    async fn list_by_status(&self, status: JobStatus, limit: usize) -> Result<Vec<Job>> {
        let mut matching = {
            let jobs = self.jobs.read().map_err(poison_err)?;
            jobs.values()
                .filter(|job| job.status == status)
                .cloned()
                .collect::<Vec<_>>()
        };
        matching.sort_by_key(|job| job.updated_at);
        matching.truncate(limit);
        Ok(matching)
    }
}

/// In-memory control/framework catalog for testing.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    controls: RwLock<HashMap<ControlKey, Control>>,
    frameworks: RwLock<HashMap<FrameworkKey, Framework>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a framework record.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert_framework(&self, framework: Framework) -> Result<()> {
        let mut frameworks = self.frameworks.write().map_err(poison_err)?;
        frameworks.insert(framework.framework_key.clone(), framework);
        drop(frameworks);
        Ok(())
    }

    /// Inserts a control record.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert_control(&self, control: Control) -> Result<()> {
        let mut controls = self.controls.write().map_err(poison_err)?;
        controls.insert(control.control_key.clone(), control);
        drop(controls);
        Ok(())
    }
}

#[async_trait]
impl ControlCatalog for InMemoryCatalog {
    async fn get_control(&self, key: &ControlKey) -> Result<Option<Control>> {
        let result = {
            let controls = self.controls.read().map_err(poison_err)?;
            controls.get(key).cloned()
        };
        Ok(result)
    }

    async fn get_framework(&self, key: &FrameworkKey) -> Result<Option<Framework>> {
        let result = {
            let frameworks = self.frameworks.read().map_err(poison_err)?;
            frameworks.get(key).cloned()
        };
        Ok(result)
    }

    async fn list_framework_controls(&self, key: &FrameworkKey) -> Result<Vec<Control>> {
        let mut matching = {
            let controls = self.controls.read().map_err(poison_err)?;
            controls
                .values()
                .filter(|control| &control.framework_key == key)
                .cloned()
                .collect::<Vec<_>>()
        };
        matching.sort_by(|a, b| a.control_key.cmp(&b.control_key));
        Ok(matching)
    }

    async fn list_framework_keys(&self) -> Result<Vec<FrameworkKey>> {
        let mut keys = {
            let frameworks = self.frameworks.read().map_err(poison_err)?;
            frameworks.keys().cloned().collect::<Vec<_>>()
        };
        keys.sort();
        Ok(keys)
    }
}

/// In-memory enrichment cache for testing.
#[derive(Debug, Default)]
pub struct InMemoryEnrichmentCache {
    entries: RwLock<HashMap<ControlKey, EnrichmentEntry>>,
}

impl InMemoryEnrichmentCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EnrichmentCache for InMemoryEnrichmentCache {
    async fn get(&self, key: &ControlKey) -> Result<Option<EnrichmentEntry>> {
        let result = {
            let entries = self.entries.read().map_err(poison_err)?;
            entries.get(key).cloned()
        };
        Ok(result)
    }

    async fn put(&self, key: &ControlKey, entry: EnrichmentEntry) -> Result<()> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        entries.insert(key.clone(), entry);
        drop(entries);
        Ok(())
    }
}

/// In-memory embedding cache for testing.
#[derive(Debug, Default)]
pub struct InMemoryEmbeddingCache {
    entries: RwLock<HashMap<(ControlKey, String), EmbeddingEntry>>,
}

impl InMemoryEmbeddingCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of cached vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn entry_count(&self) -> Result<usize> {
        let count = {
            let entries = self.entries.read().map_err(poison_err)?;
            entries.len()
        };
        Ok(count)
    }
}

#[async_trait]
impl EmbeddingCache for InMemoryEmbeddingCache {
    async fn get(&self, key: &ControlKey, model_version: &str) -> Result<Option<EmbeddingEntry>> {
        let result = {
            let entries = self.entries.read().map_err(poison_err)?;
            entries
                .get(&(key.clone(), model_version.to_string()))
                .cloned()
        };
        Ok(result)
    }

    async fn put(
        &self,
        key: &ControlKey,
        model_version: &str,
        entry: EmbeddingEntry,
    ) -> Result<()> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        entries.insert((key.clone(), model_version.to_string()), entry);
        drop(entries);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> Job {
        Job::new(
            ControlKey::parse("AWS.EC2#1.0#PR.1").unwrap(),
            FrameworkKey::parse("NIST-SP-800-53#R5").unwrap(),
            None,
            604_800,
        )
    }

    fn sample_candidate(id: &str, rerank: f64) -> Candidate {
        let key = ControlKey::parse(&format!("NIST-SP-800-53#R5#{id}")).unwrap();
        Candidate {
            target_control_id: key.control_id().to_string(),
            target_control_key: key,
            similarity_score: 0.8,
            rerank_score: rerank,
            reasoning: "aligned".to_string(),
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_job_id() {
        let store = InMemoryJobStore::new();
        let job = sample_job();
        store.create(job.clone()).await.unwrap();

        let err = store.create(job).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateJob { .. }));
        assert_eq!(store.job_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn mark_running_is_conditional_on_pending() {
        let store = InMemoryJobStore::new();
        let job = sample_job();
        let job_id = job.job_id;
        store.create(job).await.unwrap();

        let first = store.mark_running(job_id, "attempt-1").await.unwrap();
        assert_eq!(first, TransitionOutcome::Applied);

        // Same handle retries idempotently.
        let retry = store.mark_running(job_id, "attempt-1").await.unwrap();
        assert_eq!(retry, TransitionOutcome::AlreadyApplied);

        // A different worker's handle conflicts.
        let err = store.mark_running(job_id, "attempt-2").await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn mark_running_after_terminal_reports_superseded() {
        let store = InMemoryJobStore::new();
        let job = sample_job();
        let job_id = job.job_id;
        store.create(job).await.unwrap();
        store.mark_running(job_id, "attempt-1").await.unwrap();
        store.mark_completed(job_id, vec![]).await.unwrap();

        let outcome = store.mark_running(job_id, "attempt-2").await.unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::Superseded {
                status: JobStatus::Completed
            }
        );
    }

    #[tokio::test]
    async fn completed_retry_with_identical_content_is_noop() {
        let store = InMemoryJobStore::new();
        let job = sample_job();
        let job_id = job.job_id;
        store.create(job).await.unwrap();
        store.mark_running(job_id, "attempt-1").await.unwrap();

        let mappings = vec![sample_candidate("AC-1", 0.92)];
        assert_eq!(
            store
                .mark_completed(job_id, mappings.clone())
                .await
                .unwrap(),
            TransitionOutcome::Applied
        );
        let first = store.get(job_id).await.unwrap().unwrap();

        assert_eq!(
            store
                .mark_completed(job_id, mappings.clone())
                .await
                .unwrap(),
            TransitionOutcome::AlreadyApplied
        );
        let second = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(first.mappings, second.mappings);
        assert_eq!(first.terminal_at, second.terminal_at);

        // Different content conflicts.
        let err = store
            .mark_completed(job_id, vec![sample_candidate("AC-2", 0.7)])
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn late_failure_never_overwrites_success() {
        let store = InMemoryJobStore::new();
        let job = sample_job();
        let job_id = job.job_id;
        store.create(job).await.unwrap();
        store.mark_running(job_id, "attempt-1").await.unwrap();
        store.mark_completed(job_id, vec![]).await.unwrap();

        let outcome = store.mark_failed(job_id, "WorkflowTimeout").await.unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::Superseded {
                status: JobStatus::Completed
            }
        );

        let job = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error_message.is_none());
    }

    #[tokio::test]
    async fn failed_terminal_has_message_and_timestamp() {
        let store = InMemoryJobStore::new();
        let job = sample_job();
        let job_id = job.job_id;
        store.create(job).await.unwrap();
        store.mark_running(job_id, "attempt-1").await.unwrap();

        store
            .mark_failed(job_id, "ScienceUnavailable")
            .await
            .unwrap();
        let job = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("ScienceUnavailable"));
        assert!(job.terminal_at.is_some());
        assert!(job.updated_at >= job.created_at);

        // Same message retries are absorbed; different messages conflict.
        assert_eq!(
            store
                .mark_failed(job_id, "ScienceUnavailable")
                .await
                .unwrap(),
            TransitionOutcome::AlreadyApplied
        );
        assert!(
            store
                .mark_failed(job_id, "WorkflowTimeout")
                .await
                .unwrap_err()
                .is_conflict()
        );
    }

    #[tokio::test]
    async fn terminal_write_from_pending_is_allowed() {
        // A redelivered message can settle a job whose first worker died
        // before the running transition.
        let store = InMemoryJobStore::new();
        let job = sample_job();
        let job_id = job.job_id;
        store.create(job).await.unwrap();

        let outcome = store.mark_failed(job_id, "InternalError").await.unwrap();
        assert_eq!(outcome, TransitionOutcome::Applied);
    }

    #[tokio::test]
    async fn list_by_status_filters_and_orders() {
        let store = InMemoryJobStore::new();
        let a = sample_job();
        let b = sample_job();
        let c = sample_job();
        store.create(a.clone()).await.unwrap();
        store.create(b.clone()).await.unwrap();
        store.create(c.clone()).await.unwrap();
        store.mark_running(b.job_id, "h").await.unwrap();

        let pending = store.list_by_status(JobStatus::Pending, 10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|j| j.status == JobStatus::Pending));

        let limited = store.list_by_status(JobStatus::Pending, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn catalog_lists_controls_per_framework() {
        let catalog = InMemoryCatalog::new();
        let nist = FrameworkKey::parse("NIST-SP-800-53#R5").unwrap();
        catalog
            .insert_framework(Framework::new(nist.clone(), "NIST SP 800-53 Rev. 5"))
            .unwrap();
        for id in ["AC-1", "AC-2", "AC-3"] {
            let key = ControlKey::build(&nist, id).unwrap();
            catalog
                .insert_control(Control::new(key, id, format!("{id} description")))
                .unwrap();
        }
        let other = ControlKey::parse("SOC2#2017#CC6.1").unwrap();
        catalog
            .insert_control(Control::new(other, "CC6.1", "logical access"))
            .unwrap();

        let controls = catalog.list_framework_controls(&nist).await.unwrap();
        let ids: Vec<&str> = controls.iter().map(|c| c.control_id.as_str()).collect();
        assert_eq!(ids, ["AC-1", "AC-2", "AC-3"]);

        assert!(
            catalog
                .get_framework(&FrameworkKey::parse("PCI-DSS#4.0").unwrap())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn enrichment_cache_get_after_put_observes_value() {
        let cache = InMemoryEnrichmentCache::new();
        let key = ControlKey::parse("AWS.EC2#1.0#PR.1").unwrap();
        assert!(cache.get(&key).await.unwrap().is_none());

        cache
            .put(&key, EnrichmentEntry::new("expanded text", "v1"))
            .await
            .unwrap();
        let entry = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(entry.enriched_text, "expanded text");

        // Last writer wins.
        cache
            .put(&key, EnrichmentEntry::new("newer text", "v1"))
            .await
            .unwrap();
        assert_eq!(cache.get(&key).await.unwrap().unwrap().enriched_text, "newer text");
    }

    #[tokio::test]
    async fn embedding_cache_is_keyed_by_model_version() {
        let cache = InMemoryEmbeddingCache::new();
        let key = ControlKey::parse("AWS.EC2#1.0#PR.1").unwrap();

        cache
            .put(&key, "v1", EmbeddingEntry::new(vec![1.0, 0.0]))
            .await
            .unwrap();
        assert!(cache.get(&key, "v1").await.unwrap().is_some());
        assert!(cache.get(&key, "v2").await.unwrap().is_none());

        cache
            .put(&key, "v2", EmbeddingEntry::new(vec![0.0, 1.0]))
            .await
            .unwrap();
        assert_eq!(cache.entry_count().unwrap(), 2);
    }
}
