//! API error types and HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// API result type.
pub type ApiResult<T> = Result<T, ApiError>;

/// Standard JSON error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message (safe for clients).
    pub error: String,
    /// Near-miss suggestions for not-found lookups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}

/// HTTP API error with stable machine-readable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    suggestions: Option<Vec<String>>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            suggestions: None,
        }
    }

    /// Returns an error response for invalid input.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Returns an error response for missing resources.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// Returns an internal error response.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message)
    }

    /// Attaches near-miss suggestions (rendered only when non-empty).
    #[must_use]
    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        if !suggestions.is_empty() {
            self.suggestions = Some(suggestions);
        }
        self
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the human-readable error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<crosswalk_core::Error> for ApiError {
    fn from(error: crosswalk_core::Error) -> Self {
        match &error {
            crosswalk_core::Error::MalformedKey { message } => Self::bad_request(message.clone()),
            crosswalk_core::Error::NotFound { entity, key } => {
                Self::not_found(format!("{entity} '{key}' not found"))
            }
            _ => {
                tracing::error!(%error, "internal error surfaced to API");
                Self::internal("internal error")
            }
        }
    }
}

impl From<crosswalk_flow::Error> for ApiError {
    fn from(error: crosswalk_flow::Error) -> Self {
        match error {
            crosswalk_flow::Error::Core(core) => core.into(),
            other => {
                tracing::error!(error = %other, "internal error surfaced to API");
                Self::internal("internal error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            code: self.code.to_string(),
            error: self.message,
            suggestions: self.suggestions,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_maps_to_400() {
        let err = ApiError::bad_request("control_key must match frameworkName#version#controlId");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.message().contains("control_key"));
    }

    #[test]
    fn suggestions_are_omitted_when_empty() {
        let err = ApiError::not_found("control missing").with_suggestions(vec![]);
        assert!(err.suggestions.is_none());

        let err = ApiError::not_found("control missing")
            .with_suggestions(vec!["AWS.EC2#1.0#PR.1".to_string()]);
        assert_eq!(err.suggestions.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn core_errors_map_to_statuses() {
        let malformed = crosswalk_core::Error::malformed_key("bad");
        assert_eq!(ApiError::from(malformed).status(), StatusCode::BAD_REQUEST);

        let missing = crosswalk_core::Error::not_found("job", "abc");
        assert_eq!(ApiError::from(missing).status(), StatusCode::NOT_FOUND);

        let storage = crosswalk_core::Error::storage("io");
        assert_eq!(
            ApiError::from(storage).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
