//! Error types for the crosswalk domain.

use uuid::Uuid;

/// The result type used throughout crosswalk crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in domain and store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A composite key failed format validation.
    #[error("malformed key: {message}")]
    MalformedKey {
        /// Description of the format violation.
        message: String,
    },

    /// An entity was not found.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// The kind of entity (e.g. `"job"`, `"control"`).
        entity: &'static str,
        /// The key that was looked up.
        key: String,
    },

    /// A job record with this ID already exists.
    #[error("duplicate job: {job_id}")]
    DuplicateJob {
        /// The ID that collided.
        job_id: Uuid,
    },

    /// A conditional write lost to a conflicting writer.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflicting state.
        message: String,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A serialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },
}

impl Error {
    /// Creates a new malformed-key error.
    #[must_use]
    pub fn malformed_key(message: impl Into<String>) -> Self {
        Self::MalformedKey {
            message: message.into(),
        }
    }

    /// Creates a new not-found error.
    #[must_use]
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Creates a new conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns true if this error is a conditional-write conflict.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns true if this error is a not-found lookup.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn malformed_key_display() {
        let err = Error::malformed_key("missing '#' separator");
        assert!(err.to_string().contains("malformed key"));
        assert!(err.to_string().contains("separator"));
    }

    #[test]
    fn not_found_display_names_entity() {
        let err = Error::not_found("control", "AWS.EC2#1.0#PR.1");
        assert_eq!(err.to_string(), "control not found: AWS.EC2#1.0#PR.1");
        assert!(err.is_not_found());
    }

    #[test]
    fn conflict_predicate() {
        assert!(Error::conflict("terminal state differs").is_conflict());
        assert!(!Error::storage("io").is_conflict());
    }

    #[test]
    fn storage_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err = Error::storage_with_source("failed to load record", source);
        assert!(err.to_string().contains("storage error"));
        assert!(StdError::source(&err).is_some());
    }
}
