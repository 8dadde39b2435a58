//! Job entity models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use muse_core::job_events::JobUpdate;
use muse_core::types::{DbId, Timestamp};
use muse_core::JobKind;

use super::status::{JobStatus, StatusId};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    /// Tool kind discriminant (see [`JobKind`]); stored as text.
    pub kind: String,
    pub user_id: DbId,
    /// Client session that submitted the job, for abandoned-session cleanup.
    pub session_id: String,
    pub status_id: StatusId,
    /// Global queue position; only meaningful while queued.
    pub position: Option<i32>,
    /// Kind-specific references to uploaded input assets.
    pub input_refs: serde_json::Value,
    /// Kind-specific generation parameters, forwarded to the worker.
    pub params: serde_json::Value,
    pub output_url: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Credits charged at admission; immutable thereafter.
    pub credit_cost: i32,
    /// Opaque handle assigned by the external worker once dispatched.
    pub worker_task_handle: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    /// Time spent queued before dispatch, recorded at claim time.
    pub queue_wait_seconds: Option<i32>,
}

impl Job {
    /// Parsed tool kind. Rows are only ever written from [`JobKind::as_str`],
    /// so a parse failure indicates store corruption.
    pub fn job_kind(&self) -> Option<JobKind> {
        self.kind.parse().ok()
    }

    /// Status enum for this row.
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_id(self.status_id)
    }

    /// Wire-level status name.
    pub fn status_name(&self) -> &'static str {
        self.status().map(JobStatus::name).unwrap_or("unknown")
    }

    /// Build the push/poll payload for this row's current state.
    pub fn to_update(&self) -> JobUpdate {
        JobUpdate {
            job_id: self.id,
            kind: self.job_kind().unwrap_or(JobKind::Upscale),
            status: self.status_name().to_string(),
            position: if self.status() == Some(JobStatus::Queued) {
                self.position
            } else {
                None
            },
            output_url: self.output_url.clone(),
            error_code: self.error_code.clone(),
            error_message: self.error_message.clone(),
        }
    }
}

/// Fields needed to create a new job row at admission time.
#[derive(Debug, Clone)]
pub struct NewJob<'a> {
    pub kind: JobKind,
    pub user_id: DbId,
    pub session_id: &'a str,
    pub input_refs: &'a serde_json::Value,
    pub params: &'a serde_json::Value,
    pub credit_cost: i32,
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    /// Filter by status ID.
    pub status_id: Option<StatusId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// Per-kind queued count for the queue status snapshot.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct KindQueueDepth {
    pub kind: String,
    pub queued: i64,
}
