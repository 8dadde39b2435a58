//! Client-session liveness and teardown.
//!
//! Sessions exist so a queued job abandoned by a closed tab does not hold
//! a queue slot forever: the client heartbeats while open, tears down
//! explicitly when it can, and the background reaper covers the rest.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;
use muse_core::error::CoreError;
use muse_db::repositories::{JobRepo, SessionRepo};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for POST /sessions/heartbeat.
#[derive(Debug, Deserialize, Validate)]
pub struct HeartbeatRequest {
    #[validate(length(min = 8, max = 128))]
    pub session_id: String,
}

/// Response for DELETE /sessions/{id}.
#[derive(Debug, Serialize)]
pub struct TeardownResponse {
    pub cancelled_jobs: usize,
}

/// POST /api/v1/sessions/heartbeat
///
/// Record that the client session is still alive.
pub async fn heartbeat(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<HeartbeatRequest>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::Core(CoreError::Validation(e.to_string())))?;

    SessionRepo::touch(&state.pool, &input.session_id, auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/sessions/{id}
///
/// Explicit teardown: cancel the session's queued jobs so they stop
/// occupying queue slots. The client fires this on page close and does not
/// wait for the answer.
pub async fn teardown(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let queued: Vec<_> = JobRepo::queued_for_session(&state.pool, &session_id)
        .await?
        .into_iter()
        .filter(|j| j.user_id == auth.user_id)
        .collect();

    let cancelled_jobs = state.queue.cancel_abandoned(&queued).await?;
    SessionRepo::delete(&state.pool, &session_id).await?;

    tracing::info!(
        session_id = %session_id,
        user_id = auth.user_id,
        cancelled_jobs,
        "Session torn down",
    );

    Ok(Json(DataResponse {
        data: TeardownResponse { cancelled_jobs },
    }))
}
