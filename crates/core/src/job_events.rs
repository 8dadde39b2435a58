//! Push-message types for job lifecycle updates.
//!
//! The WebSocket push channel and the reconciliation poll both deliver the
//! same [`JobUpdate`] shape, so the lifecycle controller can apply either
//! source through one idempotent transition function.

use serde::{Deserialize, Serialize};

use crate::job::JobKind;
use crate::types::DbId;

/// Job entered the queue.
pub const MSG_TYPE_JOB_QUEUED: &str = "job_queued";

/// Job was dispatched to a worker and is running.
pub const MSG_TYPE_JOB_STARTED: &str = "job_started";

/// Job completed successfully.
pub const MSG_TYPE_JOB_COMPLETED: &str = "job_completed";

/// Job failed with an error.
pub const MSG_TYPE_JOB_FAILED: &str = "job_failed";

/// Job was cancelled (by user or session cleanup).
pub const MSG_TYPE_JOB_CANCELLED: &str = "job_cancelled";

/// A job status observation, as carried on the push channel and returned
/// by the job snapshot endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobUpdate {
    pub job_id: DbId,
    pub kind: JobKind,
    /// Status name: `queued`, `running`, `completed`, `failed`, `cancelled`.
    pub status: String,
    /// Global queue position, only meaningful while `queued`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
    /// Result location, present only when `completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    /// Stable error code, present only when `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Human-readable error, present only when `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
