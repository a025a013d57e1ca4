//! Mapping intake and status endpoints.
//!
//! ## Routes
//!
//! - `POST /mappings` - Accept an asynchronous mapping request (202)
//! - `GET  /mappings/{mapping_id}` - Poll a mapping job
//!
//! Intake guarantees the job record is visible to the status endpoint
//! before the 202 response is returned: the job is created first, the
//! queue message second. A failed enqueue leaves the job PENDING for the
//! sweeper and returns 500.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crosswalk_core::job::{Candidate, Job, JobStatus};
use crosswalk_core::keys::{ControlKey, FrameworkKey};
use crosswalk_core::observability::intake_span;
use crosswalk_flow::queue::MappingRequest;

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;
use crate::suggest::rank_suggestions;

/// Upper bound on explicit target control IDs per request.
const MAX_TARGET_CONTROL_IDS: usize = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to start a mapping job.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateMappingRequest {
    /// Full source control key (`frameworkName#version#controlId`).
    pub control_key: String,
    /// Target framework key (`frameworkName#version`).
    pub target_framework_key: String,
    /// Optional restriction of candidates to these control IDs.
    #[serde(default)]
    pub target_control_ids: Option<Vec<String>>,
}

/// 202 response body for an accepted mapping request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateMappingResponse {
    /// Job identifier to poll.
    pub mapping_id: Uuid,
    /// Always `"ACCEPTED"`.
    pub status: String,
    /// Relative URL of the status endpoint for this job.
    pub status_url: String,
    /// Echo of the validated source control key.
    pub control_key: String,
    /// Echo of the validated target framework key.
    pub target_framework_key: String,
}

/// Completed-result section of a status response.
#[derive(Debug, Serialize, Deserialize)]
pub struct MappingResultBody {
    /// Ranked mappings.
    pub mappings: Vec<Candidate>,
}

/// Failed-error section of a status response.
#[derive(Debug, Serialize, Deserialize)]
pub struct MappingErrorBody {
    /// Short human-readable message from the fixed set.
    pub message: String,
}

/// Status projection of one mapping job.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingStatusResponse {
    /// Job identifier.
    pub mapping_id: Uuid,
    /// Current status.
    pub status: JobStatus,
    /// Source control key.
    pub control_key: ControlKey,
    /// Target framework key.
    pub target_framework_key: FrameworkKey,
    /// Explicit candidate restriction, when one was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_control_ids: Option<Vec<String>>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last written.
    pub updated_at: DateTime<Utc>,
    /// When the job reached a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_at: Option<DateTime<Utc>>,
    /// Present iff status is COMPLETED.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<MappingResultBody>,
    /// Present iff status is FAILED.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<MappingErrorBody>,
}

impl From<Job> for MappingStatusResponse {
    fn from(job: Job) -> Self {
        let result = job.mappings.map(|mappings| MappingResultBody { mappings });
        let error = job
            .error_message
            .map(|message| MappingErrorBody { message });
        Self {
            mapping_id: job.job_id,
            status: job.status,
            control_key: job.source_control_key,
            target_framework_key: job.target_framework_key,
            target_control_ids: job.target_control_ids,
            created_at: job.created_at,
            updated_at: job.updated_at,
            terminal_at: job.terminal_at,
            result,
            error,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Registers the mapping routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/mappings", post(create_mapping))
        .route("/mappings/{mapping_id}", get(get_mapping))
}

fn validate_target_control_ids(ids: &[String]) -> ApiResult<()> {
    if ids.len() > MAX_TARGET_CONTROL_IDS {
        return Err(ApiError::bad_request(format!(
            "target_control_ids exceeds maximum count of {MAX_TARGET_CONTROL_IDS}"
        )));
    }
    for (i, id) in ids.iter().enumerate() {
        if id.is_empty() {
            return Err(ApiError::bad_request(format!(
                "target_control_ids[{i}] cannot be empty"
            )));
        }
    }
    Ok(())
}

async fn suggest_controls(state: &AppState, source_key: &ControlKey) -> Vec<String> {
    // Near misses from the claimed framework first, all frameworks as a
    // fallback for a typo'd framework segment.
    let framework = source_key.framework_key();
    let mut candidates: Vec<String> = state
        .catalog
        .list_framework_controls(&framework)
        .await
        .map(|controls| {
            controls
                .into_iter()
                .map(|control| control.control_key.to_string())
                .collect()
        })
        .unwrap_or_default();
    if candidates.is_empty() {
        candidates = state
            .catalog
            .list_framework_keys()
            .await
            .map(|keys| keys.into_iter().map(|key| key.to_string()).collect())
            .unwrap_or_default();
    }
    rank_suggestions(source_key.as_str(), candidates)
}

async fn suggest_frameworks(state: &AppState, framework_key: &FrameworkKey) -> Vec<String> {
    let candidates = state
        .catalog
        .list_framework_keys()
        .await
        .map(|keys| keys.into_iter().map(|key| key.to_string()).collect())
        .unwrap_or_default();
    rank_suggestions(framework_key.as_str(), candidates)
}

async fn create_mapping(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateMappingRequest>,
) -> ApiResult<(StatusCode, Json<CreateMappingResponse>)> {
    let span = intake_span("create_mapping", &body.control_key, &body.target_framework_key);
    create_mapping_inner(state, body).instrument(span).await
}

async fn create_mapping_inner(
    state: Arc<AppState>,
    body: CreateMappingRequest,
) -> ApiResult<(StatusCode, Json<CreateMappingResponse>)> {
    // Format validation: reject before any side effect.
    let source_key = ControlKey::parse(&body.control_key)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let target_framework = FrameworkKey::parse(&body.target_framework_key)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    if let Some(ids) = body.target_control_ids.as_deref() {
        validate_target_control_ids(ids)?;
    }

    // Existence validation against the catalog.
    if state.catalog.get_control(&source_key).await?.is_none() {
        let suggestions = suggest_controls(&state, &source_key).await;
        return Err(ApiError::not_found(format!(
            "control '{source_key}' not found"
        ))
        .with_suggestions(suggestions));
    }
    if state.catalog.get_framework(&target_framework).await?.is_none() {
        let suggestions = suggest_frameworks(&state, &target_framework).await;
        return Err(ApiError::not_found(format!(
            "framework '{target_framework}' not found"
        ))
        .with_suggestions(suggestions));
    }

    // Create the PENDING record. UUID collisions should never happen; one
    // fresh-ID retry keeps the path total anyway.
    let ttl_secs = i64::try_from(state.config.pipeline.job_ttl.as_secs()).unwrap_or(604_800);
    let mut job = Job::new(
        source_key.clone(),
        target_framework.clone(),
        body.target_control_ids,
        ttl_secs,
    );
    if let Err(e) = state.jobs.create(job.clone()).await {
        if !matches!(e, crosswalk_core::Error::DuplicateJob { .. }) {
            return Err(e.into());
        }
        tracing::warn!(job_id = %job.job_id, "job id collision, retrying with a fresh id");
        job = job.with_job_id(Uuid::new_v4());
        state.jobs.create(job.clone()).await?;
    }

    // Enqueue after the record is visible to the status endpoint. On
    // failure the job stays PENDING and the sweeper reissues it.
    let request = MappingRequest::new(
        job.job_id,
        job.source_control_key.clone(),
        job.target_framework_key.clone(),
        job.target_control_ids.clone(),
    );
    if let Err(e) = state.queue.enqueue(&request).await {
        tracing::error!(job_id = %job.job_id, error = %e, "enqueue failed after job create");
        return Err(ApiError::internal("failed to queue mapping request"));
    }

    tracing::info!(job_id = %job.job_id, "accepted mapping request");
    Ok((
        StatusCode::ACCEPTED,
        Json(CreateMappingResponse {
            mapping_id: job.job_id,
            status: "ACCEPTED".to_string(),
            status_url: format!("/api/v1/mappings/{}", job.job_id),
            control_key: source_key.to_string(),
            target_framework_key: target_framework.to_string(),
        }),
    ))
}

async fn get_mapping(
    State(state): State<Arc<AppState>>,
    Path(mapping_id): Path<String>,
) -> ApiResult<Json<MappingStatusResponse>> {
    // An unparseable ID cannot name a job.
    let Ok(job_id) = mapping_id.parse::<Uuid>() else {
        return Err(ApiError::not_found(format!(
            "mapping job '{mapping_id}' not found"
        )));
    };
    let Some(job) = state.jobs.get(job_id).await? else {
        return Err(ApiError::not_found(format!(
            "mapping job '{job_id}' not found"
        )));
    };
    Ok(Json(job.into()))
}
