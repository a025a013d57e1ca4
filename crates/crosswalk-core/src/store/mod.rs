//! Pluggable storage for jobs and derived-artifact caches.
//!
//! ## Design Principles
//!
//! - **Conditional writes**: Every job mutation is a single-record
//!   compare-and-set; there are no cross-record transactions
//! - **At-most-one terminal write**: Redelivered queue messages and
//!   overlapping workers are absorbed, not serialized by locks
//! - **Testability**: In-memory implementations back all tests; the
//!   production KV backend is a deployment concern behind the same traits
//!
//! The caches are deliberately not on the consistency path: a miss only
//! induces recomputation and a stale hit within the same version domain is
//! accepted.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::job::{Candidate, Job, JobStatus};
use crate::keys::ControlKey;

/// Result of a conditional job transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The transition was applied by this call.
    Applied,
    /// An equivalent transition was already applied; the call was a no-op.
    AlreadyApplied,
    /// The job had already settled in a terminal state that this call must
    /// not disturb (e.g. a late failure arriving after completion).
    Superseded {
        /// The terminal status that was found.
        status: JobStatus,
    },
}

impl TransitionOutcome {
    /// Returns true if this call performed the write.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Returns true if the intended state holds, whether written by this
    /// call or a previous equivalent one.
    #[must_use]
    pub const fn is_effective(&self) -> bool {
        matches!(self, Self::Applied | Self::AlreadyApplied)
    }
}

/// Durable record of each mapping job's lifecycle state.
///
/// ## Conditional Semantics
///
/// These five methods are the only write paths to a job. All writes bump
/// `updated_at`; terminal writes set `terminal_at`. Implementations must
/// provide single-record atomicity so that concurrent writers observe a
/// total order per job ID.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a PENDING job record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DuplicateJob`] when the ID already exists.
    async fn create(&self, job: Job) -> Result<()>;

    /// Conditionally transitions PENDING → RUNNING and records the
    /// execution handle of the attempt.
    ///
    /// - PENDING: applies the transition.
    /// - RUNNING with the same handle: `AlreadyApplied` (retried attempt).
    /// - RUNNING with a different handle: [`crate::Error::Conflict`]
    ///   (another worker holds the run).
    /// - Terminal: `Superseded` so the caller can acknowledge the message.
    async fn mark_running(&self, job_id: Uuid, execution_handle: &str)
        -> Result<TransitionOutcome>;

    /// Conditionally writes the COMPLETED terminal state with its mappings.
    ///
    /// - PENDING or RUNNING: applies the transition.
    /// - COMPLETED with identical mappings: `AlreadyApplied`.
    /// - COMPLETED with different mappings, or FAILED:
    ///   [`crate::Error::Conflict`].
    async fn mark_completed(&self, job_id: Uuid, mappings: Vec<Candidate>)
        -> Result<TransitionOutcome>;

    /// Conditionally writes the FAILED terminal state.
    ///
    /// - PENDING or RUNNING: applies the transition.
    /// - FAILED with the same message: `AlreadyApplied`.
    /// - COMPLETED: `Superseded`; a late failure never overwrites success.
    /// - FAILED with a different message: [`crate::Error::Conflict`].
    async fn mark_failed(&self, job_id: Uuid, error_message: &str) -> Result<TransitionOutcome>;

    /// Gets a job by ID. Returns `None` when absent.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Lists jobs in a given status, oldest `updated_at` first.
    ///
    /// Backed by the status secondary lookup; used by the pending-job
    /// sweeper and operational introspection.
    async fn list_by_status(&self, status: JobStatus, limit: usize) -> Result<Vec<Job>>;
}

/// A cached LLM-expanded description of a control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentEntry {
    /// The enriched text.
    pub enriched_text: String,
    /// Enrichment prompt/model version that produced the text.
    pub version: String,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl EnrichmentEntry {
    /// Creates an entry stamped now.
    #[must_use]
    pub fn new(enriched_text: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            enriched_text: enriched_text.into(),
            version: version.into(),
            created_at: Utc::now(),
        }
    }
}

/// Content-addressed store of enriched control text.
///
/// Writes are last-writer-wins per control key; readers tolerate
/// concurrent upsert. There is no deletion API.
#[async_trait]
pub trait EnrichmentCache: Send + Sync {
    /// Gets the cached enrichment for a control. `None` is a legitimate
    /// state, not an error.
    async fn get(&self, key: &ControlKey) -> Result<Option<EnrichmentEntry>>;

    /// Upserts the enrichment for a control.
    async fn put(&self, key: &ControlKey, entry: EnrichmentEntry) -> Result<()>;
}

/// A cached embedding vector for one control under one model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingEntry {
    /// Fixed-dimension unit-norm vector.
    pub vector: Vec<f32>,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl EmbeddingEntry {
    /// Creates an entry stamped now.
    #[must_use]
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            created_at: Utc::now(),
        }
    }
}

/// KV store of `(controlKey, modelVersion) → vector`.
///
/// Different model versions yield distinct records; changing the configured
/// model version invalidates the cache without any migration.
#[async_trait]
pub trait EmbeddingCache: Send + Sync {
    /// Gets the cached vector for a control under a model version.
    async fn get(&self, key: &ControlKey, model_version: &str) -> Result<Option<EmbeddingEntry>>;

    /// Upserts the vector for a control under a model version.
    async fn put(
        &self,
        key: &ControlKey,
        model_version: &str,
        entry: EmbeddingEntry,
    ) -> Result<()>;
}
