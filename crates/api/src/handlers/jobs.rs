//! Handlers for job submission and lifecycle queries.
//!
//! Submission is the admission path: one request decides "run now" vs
//! "queue" and answers with the job's admitted state. Everything else here
//! is read-side (snapshots for the reconciliation poll, the active-job
//! guard query) plus user-initiated cancellation.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;
use muse_core::error::CoreError;
use muse_core::job_events::JobUpdate;
use muse_core::types::DbId;
use muse_core::{JobKind, QueueError};
use muse_db::models::job::JobListQuery;
use muse_db::repositories::{JobRepo, SessionRepo};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Request body for POST /jobs.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitJobRequest {
    pub kind: JobKind,
    /// Client session identifier, used for abandoned-session cleanup.
    #[validate(length(min = 8, max = 128))]
    pub session_id: String,
    /// Ordered references to the uploaded input assets.
    pub input_refs: serde_json::Value,
    /// Kind-specific generation parameters.
    #[serde(default = "empty_params")]
    pub params: serde_json::Value,
}

fn empty_params() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// Response for POST /jobs.
#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: DbId,
    pub kind: JobKind,
    /// `running` when a slot was free, `queued` otherwise (or `failed` if
    /// the immediate dispatch was refused by the worker).
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_queued: Option<i64>,
    pub credit_cost: i32,
}

/// Response for GET /jobs/active.
#[derive(Debug, Serialize)]
pub struct ActiveJobResponse {
    pub job_id: DbId,
    pub kind: String,
    pub status: String,
    pub age_seconds: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
}

// ---------------------------------------------------------------------------
// Submission (admission path)
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Admit a new job: runs immediately if a global slot is free, queues
/// otherwise. Admission errors (active job, insufficient credits) reject
/// without creating anything.
pub async fn submit_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<SubmitJobRequest>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::Core(CoreError::Validation(e.to_string())))?;

    if !input.input_refs.is_array() {
        return Err(AppError::Core(CoreError::Validation(
            "input_refs must be an array".into(),
        )));
    }

    // The submitting session is alive by definition; make sure the reaper
    // knows before the job row exists.
    SessionRepo::touch(&state.pool, &input.session_id, auth.user_id).await?;

    let outcome = state
        .queue
        .submit(
            auth.user_id,
            &input.session_id,
            input.kind,
            input.input_refs,
            input.params,
        )
        .await?;

    let resp = SubmitJobResponse {
        job_id: outcome.job.id,
        kind: input.kind,
        status: outcome.job.status_name().to_string(),
        position: outcome.job.position,
        total_queued: outcome.total_queued,
        credit_cost: outcome.job.credit_cost,
    };

    Ok((StatusCode::CREATED, Json(DataResponse { data: resp })))
}

// ---------------------------------------------------------------------------
// Read side
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/active
///
/// The caller's single queued-or-running job, if any. This is the explicit
/// guard query the lifecycle controller runs before submitting.
pub async fn get_active_job(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let active = JobRepo::active_for_user_pool(&state.pool, auth.user_id).await?;

    let resp = active.map(|job| ActiveJobResponse {
        job_id: job.id,
        kind: job.kind.clone(),
        status: job.status_name().to_string(),
        age_seconds: (chrono::Utc::now() - job.created_at).num_seconds(),
        position: job.position,
    });

    Ok(Json(DataResponse { data: resp }))
}

/// GET /api/v1/jobs/{id}
///
/// Current snapshot of one job, in push-payload shape. This is the
/// reconciliation poll endpoint.
pub async fn get_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Json<DataResponse<JobUpdate>>> {
    let job = JobRepo::find_by_id(&state.pool, job_id)
        .await?
        .filter(|j| j.user_id == auth.user_id)
        .ok_or(QueueError::JobNotFound { id: job_id })?;

    Ok(Json(DataResponse {
        data: job.to_update(),
    }))
}

/// GET /api/v1/jobs
///
/// The caller's job history, newest first.
pub async fn list_jobs(
    auth: AuthUser,
    State(state): State<AppState>,
    axum::extract::Query(params): axum::extract::Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = JobRepo::list_by_user(&state.pool, auth.user_id, &params).await?;
    Ok(Json(DataResponse { data: jobs }))
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/cancel
///
/// Cancel the caller's queued job. Running jobs cannot be cancelled.
pub async fn cancel_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Json<DataResponse<JobUpdate>>> {
    let job = state.queue.cancel(job_id, auth.user_id).await?;
    Ok(Json(DataResponse {
        data: job.to_update(),
    }))
}
