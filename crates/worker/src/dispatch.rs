//! Dispatch seam between the queue manager and the external worker API.

use async_trait::async_trait;
use muse_core::types::DbId;
use muse_core::JobKind;

/// Everything the adapter needs to submit one job to the external worker.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub job_id: DbId,
    pub kind: JobKind,
    /// Opaque references to the uploaded input assets, in kind-defined order.
    pub input_refs: serde_json::Value,
    /// Kind-specific generation parameters.
    pub params: serde_json::Value,
    /// Absolute URL the worker must POST its completion callback to.
    pub callback_url: String,
}

/// Successful submission: the worker's opaque task handle.
#[derive(Debug, Clone)]
pub struct DispatchReceipt {
    pub task_handle: String,
}

/// Errors from submitting work to the external API.
///
/// The transient/rejected split matters downstream: both mark the job
/// failed (it never re-enters the queue), but they surface different codes
/// to the submitter.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The worker could not accept the job right now (network failure,
    /// overload, upstream memory/limit errors).
    #[error("worker unavailable: {0}")]
    Transient(String),

    /// The worker rejected the job outright (bad input, unsupported
    /// parameters). Retrying the same payload would fail again.
    #[error("worker rejected job: {0}")]
    Rejected(String),
}

/// Submits jobs to the external generation service.
#[async_trait]
pub trait WorkerDispatch: Send + Sync {
    /// Submit one job. Returns the worker-assigned task handle used to
    /// correlate the completion webhook.
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReceipt, WorkerError>;
}
