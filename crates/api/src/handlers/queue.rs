//! Handlers for queue visibility.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/queue
///
/// Global queue snapshot: running count, cap, free slots, queued total and
/// per-kind breakdown. For UI/debugging only -- admission never reads it.
pub async fn get_queue_status(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> crate::error::AppResult<impl IntoResponse> {
    let status = state.queue.status().await?;
    Ok(Json(DataResponse { data: status }))
}

/// GET /api/v1/queue/admission
///
/// Side-effect-free admission check: whether a submission right now would
/// run immediately.
pub async fn check_admission(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> crate::error::AppResult<impl IntoResponse> {
    let snapshot = state.queue.check_admission().await?;
    Ok(Json(DataResponse { data: snapshot }))
}
