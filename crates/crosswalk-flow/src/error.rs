//! Error types for the mapping pipeline.
//!
//! Two layers:
//!
//! - [`Error`]: what queue operations, RPC clients, and stores raise.
//!   Transient RPC failures are retried inside the clients and surface
//!   here only after retries are exhausted.
//! - [`WorkflowError`]: the fixed terminal classification written to a
//!   FAILED job. Every internal failure maps deterministically onto one of
//!   these before the terminal write; clients never see anything else.

use crosswalk_core::keys::ControlKey;

/// The result type used throughout crosswalk-flow.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source control does not exist in the catalog.
    #[error("source control missing: {key}")]
    SourceMissing {
        /// The control key that was looked up.
        key: ControlKey,
    },

    /// The inference service is unavailable (exhausted retries, invalid
    /// response, or too many per-candidate failures).
    #[error("science service unavailable: {message}")]
    Science {
        /// Description of the failure.
        message: String,
    },

    /// The agent service is unavailable after retries.
    ///
    /// Always degraded, never fatal: enrichment falls back to raw text and
    /// reasoning falls back to an empty string.
    #[error("agent service unavailable: {message}")]
    Agent {
        /// Description of the failure.
        message: String,
    },

    /// A queue operation failed.
    #[error("queue error: {message}")]
    Queue {
        /// Description of the failure.
        message: String,
    },

    /// The workflow exceeded its overall soft budget.
    #[error("workflow exceeded its {budget_secs}s budget")]
    Budget {
        /// The configured budget in seconds.
        budget_secs: u64,
    },

    /// An error from crosswalk-core (stores, keys).
    #[error("core error: {0}")]
    Core(#[from] crosswalk_core::Error),
}

impl Error {
    /// Creates a new science-unavailable error.
    #[must_use]
    pub fn science(message: impl Into<String>) -> Self {
        Self::Science {
            message: message.into(),
        }
    }

    /// Creates a new agent-unavailable error.
    #[must_use]
    pub fn agent(message: impl Into<String>) -> Self {
        Self::Agent {
            message: message.into(),
        }
    }

    /// Creates a new queue error.
    #[must_use]
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
        }
    }
}

/// Terminal failure classification for a workflow run.
///
/// The client-visible message set is fixed; no stack traces, no internal
/// identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowError {
    /// The source control was not found during validation.
    SourceMissing,
    /// The inference service could not serve the run.
    ScienceUnavailable,
    /// The run exceeded the overall workflow budget.
    WorkflowTimeout,
    /// Any other failure.
    Internal,
}

impl WorkflowError {
    /// Classifies an internal error into the terminal taxonomy.
    #[must_use]
    pub fn classify(error: &Error) -> Self {
        match error {
            Error::SourceMissing { .. } => Self::SourceMissing,
            Error::Science { .. } => Self::ScienceUnavailable,
            Error::Budget { .. } => Self::WorkflowTimeout,
            Error::Agent { .. } | Error::Queue { .. } | Error::Core(_) => Self::Internal,
        }
    }

    /// Returns the client-visible error message.
    #[must_use]
    pub const fn client_message(self) -> &'static str {
        match self {
            Self::SourceMissing => "SourceMissing",
            Self::ScienceUnavailable => "ScienceUnavailable",
            Self::WorkflowTimeout => "WorkflowTimeout",
            Self::Internal => "InternalError",
        }
    }
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.client_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_deterministic() {
        let key = ControlKey::parse("AWS.EC2#1.0#PR.1").unwrap();
        assert_eq!(
            WorkflowError::classify(&Error::SourceMissing { key }),
            WorkflowError::SourceMissing
        );
        assert_eq!(
            WorkflowError::classify(&Error::science("503 after 3 retries")),
            WorkflowError::ScienceUnavailable
        );
        assert_eq!(
            WorkflowError::classify(&Error::Budget { budget_secs: 540 }),
            WorkflowError::WorkflowTimeout
        );
        assert_eq!(
            WorkflowError::classify(&Error::queue("send failed")),
            WorkflowError::Internal
        );
        assert_eq!(
            WorkflowError::classify(&Error::Core(crosswalk_core::Error::storage("io"))),
            WorkflowError::Internal
        );
    }

    #[test]
    fn client_messages_are_the_fixed_set() {
        assert_eq!(WorkflowError::SourceMissing.client_message(), "SourceMissing");
        assert_eq!(
            WorkflowError::ScienceUnavailable.client_message(),
            "ScienceUnavailable"
        );
        assert_eq!(WorkflowError::WorkflowTimeout.client_message(), "WorkflowTimeout");
        assert_eq!(WorkflowError::Internal.client_message(), "InternalError");
        for e in [
            WorkflowError::SourceMissing,
            WorkflowError::ScienceUnavailable,
            WorkflowError::WorkflowTimeout,
            WorkflowError::Internal,
        ] {
            assert!(e.client_message().len() <= 200);
        }
    }
}
