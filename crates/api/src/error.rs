use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use muse_core::error::{CoreError, QueueError};

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for generic domain errors and [`QueueError`] for
/// admission/scheduling errors with their stable wire codes. Implements
/// [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A generic domain-level error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An admission or scheduling error.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                    None,
                ),
                CoreError::Validation(msg) => (
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    msg.clone(),
                    None,
                ),
                CoreError::Conflict(msg) => {
                    (StatusCode::CONFLICT, "CONFLICT", msg.clone(), None)
                }
                CoreError::Unauthorized(msg) => (
                    StatusCode::UNAUTHORIZED,
                    "NOT_AUTHENTICATED",
                    msg.clone(),
                    None,
                ),
                CoreError::Forbidden(msg) => {
                    (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone(), None)
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                        None,
                    )
                }
            },

            // --- Queue/admission errors ---
            AppError::Queue(queue) => {
                let (status, details) = match queue {
                    QueueError::ActiveJobExists {
                        kind,
                        status,
                        age_seconds,
                    } => (
                        StatusCode::CONFLICT,
                        Some(json!({
                            "kind": kind,
                            "status": status,
                            "age_seconds": age_seconds,
                        })),
                    ),
                    QueueError::InsufficientCredits { required, balance } => (
                        StatusCode::PAYMENT_REQUIRED,
                        Some(json!({ "required": required, "balance": balance })),
                    ),
                    QueueError::DispatchFailed(_) => (StatusCode::BAD_GATEWAY, None),
                    QueueError::WorkerRejected(_) => (StatusCode::UNPROCESSABLE_ENTITY, None),
                    QueueError::JobNotFound { .. } => (StatusCode::NOT_FOUND, None),
                };
                (status, queue.code(), queue.to_string(), details)
            }

            // --- Database errors ---
            AppError::Database(err) => classify_sqlx_error(err),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None)
            }
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some(details) = details {
            body["details"] = details;
        }

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(
    err: &sqlx::Error,
) -> (StatusCode, &'static str, String, Option<serde_json::Value>) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
            None,
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                        None,
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            )
        }
        other => {
            tracing::error!(error = %other, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            )
        }
    }
}
