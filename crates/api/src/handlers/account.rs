//! Account snapshot for the lifecycle controller's pre-submit guard.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use muse_core::error::CoreError;
use muse_core::types::DbId;
use muse_db::repositories::UserRepo;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Response for GET /account.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub user_id: DbId,
    pub display_name: String,
    pub credit_balance: i64,
}

/// GET /api/v1/account
///
/// The caller's credit balance. The client checks this before uploading
/// inputs; the authoritative check is still the conditional decrement at
/// admission.
pub async fn get_account(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let user = UserRepo::find_by_id(&state.pool, auth.user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "User",
            id: auth.user_id,
        }))?;

    Ok(Json(DataResponse {
        data: AccountResponse {
            user_id: user.id,
            display_name: user.display_name,
            credit_balance: user.credit_balance,
        },
    }))
}
