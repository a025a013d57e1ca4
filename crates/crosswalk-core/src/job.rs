//! Mapping job model and status state machine.
//!
//! A job is the client-visible record of one asynchronous mapping request.
//! Its status moves along a single forward path:
//!
//! ```text
//! ┌─────────┐  worker picks up  ┌─────────┐  terminal write  ┌───────────┐
//! │ PENDING │──────────────────►│ RUNNING │─────────────────►│ COMPLETED │
//! └─────────┘                   └─────────┘                  └───────────┘
//!                                    │                       ┌───────────┐
//!                                    └──────────────────────►│  FAILED   │
//!                                                            └───────────┘
//! ```
//!
//! Terminal states never change. A completed job carries its ranked
//! candidate mappings; a failed job carries a short error message drawn
//! from a fixed set.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::keys::{ControlKey, FrameworkKey};

/// The status of a mapping job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Job is created and queued but no worker has picked it up.
    Pending,

    /// A worker is executing the mapping workflow.
    Running,

    /// The workflow finished and the job carries ranked mappings.
    Completed,

    /// The workflow failed and the job carries an error message.
    Failed,
}

impl JobStatus {
    /// Returns true if this status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if `next` is a legal forward transition from `self`.
    ///
    /// Legal transitions: `PENDING → RUNNING`, `PENDING → COMPLETED`,
    /// `PENDING → FAILED`, `RUNNING → COMPLETED`, `RUNNING → FAILED`.
    /// (A terminal write from PENDING covers workers that crash between
    /// receive and the running transition of a redelivered message.)
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending | Self::Running, Self::Completed | Self::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// A scored target control in a completed job's result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Full key of the target control.
    pub target_control_key: ControlKey,
    /// Control ID portion of the target key.
    pub target_control_id: String,
    /// Embedding cosine similarity, clamped to `[0, 1]`.
    pub similarity_score: f64,
    /// Cross-encoder rerank score in `[0, 1]`.
    pub rerank_score: f64,
    /// Human-readable rationale; empty when reasoning was unavailable.
    pub reasoning: String,
}

impl Candidate {
    /// Result ordering: rerank score descending, then similarity
    /// descending, then target control key ascending.
    #[must_use]
    pub fn result_order(&self, other: &Self) -> Ordering {
        other
            .rerank_score
            .partial_cmp(&self.rerank_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                other
                    .similarity_score
                    .partial_cmp(&self.similarity_score)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| self.target_control_key.cmp(&other.target_control_key))
    }
}

/// Sorts candidates into result order (see [`Candidate::result_order`]).
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(Candidate::result_order);
}

/// The client-visible record of one asynchronous mapping request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Primary identifier, returned to the client as `mappingId`.
    pub job_id: Uuid,

    /// Current status.
    pub status: JobStatus,

    /// Validated source control key.
    pub source_control_key: ControlKey,

    /// Validated target framework key.
    pub target_framework_key: FrameworkKey,

    /// Optional restriction of candidates to these control IDs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_control_ids: Option<Vec<String>>,

    /// When the job was created.
    pub created_at: DateTime<Utc>,

    /// When the job was last written. Monotone non-decreasing.
    pub updated_at: DateTime<Utc>,

    /// When the job reached a terminal status, if it has.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_at: Option<DateTime<Utc>>,

    /// Workflow-run identifier of the attempt that holds the running
    /// transition. Enables idempotent restarts across redeliveries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_handle: Option<String>,

    /// Ranked mappings. Present iff status is COMPLETED.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mappings: Option<Vec<Candidate>>,

    /// Short error message. Present iff status is FAILED.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Expiry in epoch seconds; records past this point may be deleted.
    pub ttl: i64,
}

impl Job {
    /// Creates a new PENDING job.
    ///
    /// `target_control_ids` is normalized: an explicit empty list means
    /// "no filter" and is stored as `None`.
    #[must_use]
    pub fn new(
        source_control_key: ControlKey,
        target_framework_key: FrameworkKey,
        target_control_ids: Option<Vec<String>>,
        ttl_secs: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            status: JobStatus::Pending,
            source_control_key,
            target_framework_key,
            target_control_ids: target_control_ids.filter(|ids| !ids.is_empty()),
            created_at: now,
            updated_at: now,
            terminal_at: None,
            execution_handle: None,
            mappings: None,
            error_message: None,
            ttl: (now + Duration::seconds(ttl_secs)).timestamp(),
        }
    }

    /// Replaces the generated job ID. Used by intake's duplicate-ID retry.
    #[must_use]
    pub fn with_job_id(mut self, job_id: Uuid) -> Self {
        self.job_id = job_id;
        self
    }

    /// Returns true if the job is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(key: &str, similarity: f64, rerank: f64) -> Candidate {
        let target_control_key = ControlKey::parse(key).unwrap();
        let target_control_id = target_control_key.control_id().to_string();
        Candidate {
            target_control_key,
            target_control_id,
            similarity_score: similarity,
            rerank_score: rerank,
            reasoning: String::new(),
        }
    }

    #[test]
    fn status_transitions_are_forward_only() {
        use JobStatus::{Completed, Failed, Pending, Running};

        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));

        assert!(!Running.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Pending));
    }

    #[test]
    fn terminal_predicate() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn status_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Pending).unwrap(),
            "\"PENDING\""
        );
        assert_eq!(
            serde_json::from_str::<JobStatus>("\"COMPLETED\"").unwrap(),
            JobStatus::Completed
        );
    }

    #[test]
    fn candidates_sort_by_rerank_then_similarity_then_key() {
        let mut candidates = vec![
            candidate("NIST-SP-800-53#R5#AC-3", 0.70, 0.55),
            candidate("NIST-SP-800-53#R5#AC-1", 0.90, 0.92),
            candidate("NIST-SP-800-53#R5#AC-9", 0.40, 0.55),
            candidate("NIST-SP-800-53#R5#AC-2", 0.40, 0.55),
        ];
        sort_candidates(&mut candidates);

        let ids: Vec<&str> = candidates
            .iter()
            .map(|c| c.target_control_id.as_str())
            .collect();
        // AC-3 beats the 0.55/0.40 pair on similarity; the pair ties and
        // falls back to key order.
        assert_eq!(ids, ["AC-1", "AC-3", "AC-2", "AC-9"]);
    }

    #[test]
    fn new_job_is_pending_with_ttl() {
        let job = Job::new(
            ControlKey::parse("AWS.EC2#1.0#PR.1").unwrap(),
            FrameworkKey::parse("NIST-SP-800-53#R5").unwrap(),
            None,
            604_800,
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.terminal_at.is_none());
        assert!(job.mappings.is_none());
        assert!(job.error_message.is_none());
        assert_eq!(job.ttl, (job.created_at + Duration::seconds(604_800)).timestamp());
    }

    #[test]
    fn explicit_empty_target_ids_normalize_to_none() {
        let job = Job::new(
            ControlKey::parse("AWS.EC2#1.0#PR.1").unwrap(),
            FrameworkKey::parse("NIST-SP-800-53#R5").unwrap(),
            Some(vec![]),
            604_800,
        );
        assert!(job.target_control_ids.is_none());
    }

    #[test]
    fn job_serializes_camel_case() {
        let job = Job::new(
            ControlKey::parse("AWS.EC2#1.0#PR.1").unwrap(),
            FrameworkKey::parse("NIST-SP-800-53#R5").unwrap(),
            None,
            60,
        );
        let value = serde_json::to_value(&job).unwrap();
        assert!(value.get("jobId").is_some());
        assert!(value.get("sourceControlKey").is_some());
        assert_eq!(value["status"], "PENDING");
        // Absent optionals are omitted, not null.
        assert!(value.get("mappings").is_none());
        assert!(value.get("errorMessage").is_none());
    }
}
