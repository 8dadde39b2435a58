//! Domain error types shared across crates.

use crate::job::JobKind;
use crate::types::DbId;

/// Domain-level error used by repositories and services.
///
/// HTTP-specific concerns (status codes, response bodies) live in the API
/// crate's `AppError`, which wraps this type.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An entity lookup failed.
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// Input failed domain validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The request conflicts with current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller is authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// An unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Admission and scheduling errors with stable wire codes.
///
/// These are returned synchronously from the admission path or recorded on
/// a job after dispatch. [`QueueError::code`] is the string the HTTP layer
/// puts in the response `code` field and the lifecycle controller matches
/// on; it never changes once shipped.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    /// The user already has a queued or running job.
    #[error("an active {kind} job ({status}) already exists")]
    ActiveJobExists {
        kind: JobKind,
        /// Status name of the blocking job (`"queued"` or `"running"`).
        status: String,
        /// Age of the blocking job in seconds, for the UI message.
        age_seconds: i64,
    },

    /// The user's balance does not cover the tool's cost.
    #[error("insufficient credits: need {required}, have {balance}")]
    InsufficientCredits { required: i32, balance: i64 },

    /// The external worker could not accept the dispatch (transient).
    #[error("worker dispatch failed: {0}")]
    DispatchFailed(String),

    /// The external worker rejected the job outright (bad input).
    #[error("worker rejected job: {0}")]
    WorkerRejected(String),

    /// No job with the given id exists.
    #[error("job {id} not found")]
    JobNotFound { id: DbId },
}

impl QueueError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            QueueError::ActiveJobExists { .. } => "ACTIVE_JOB_EXISTS",
            QueueError::InsufficientCredits { .. } => "INSUFFICIENT_CREDITS",
            QueueError::DispatchFailed(_) => "WORKER_DISPATCH_FAILED",
            QueueError::WorkerRejected(_) => "WORKER_REJECTED",
            QueueError::JobNotFound { .. } => "JOB_NOT_FOUND",
        }
    }
}
