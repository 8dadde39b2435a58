//! Inbound completion callbacks from the external generation worker.
//!
//! The worker POSTs to the per-job callback URL registered at dispatch
//! time, signing the raw body with HMAC-SHA256. Terminal transitions are
//! idempotent: webhook delivery retries, so a duplicate callback for an
//! already-terminal job is a no-op that triggers no further scheduling.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use muse_core::error::CoreError;
use muse_core::types::DbId;
use muse_core::QueueError;
use muse_db::repositories::JobRepo;

use crate::engine::notify;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Signature header set by the worker on every callback.
const SIGNATURE_HEADER: &str = "x-worker-signature";

/// Fallback error code when the worker reports a failure without one.
const DEFAULT_FAILURE_CODE: &str = "WORKER_FAILED";

/// Callback body posted by the worker.
#[derive(Debug, Deserialize)]
pub struct WorkerCallback {
    pub status: CallbackStatus,
    /// The task handle issued at dispatch; must match the stored one.
    pub task_handle: String,
    pub output_url: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// Terminal outcome reported by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus {
    Success,
    Failure,
}

/// Response body: whether this delivery changed anything.
#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub applied: bool,
}

/// POST /api/v1/webhooks/jobs/{id}
///
/// Apply a worker completion/failure to the job, then advance the queue
/// exactly once to fill the freed slot. Duplicate deliveries return
/// `applied: false` and advance nothing.
pub async fn worker_callback(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    verify_signature(&headers, &body, &state.config.worker_webhook_secret)?;

    let callback: WorkerCallback = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid callback body: {e}")))?;

    let job = JobRepo::find_by_id(&state.pool, job_id)
        .await?
        .ok_or(QueueError::JobNotFound { id: job_id })?;

    match &job.worker_task_handle {
        Some(stored) if *stored != callback.task_handle => {
            return Err(AppError::Core(CoreError::Conflict(format!(
                "task handle mismatch for job {job_id}"
            ))));
        }
        Some(_) => {}
        None => {
            // The callback won the race against our own dispatch response;
            // the job id in the URL is authoritative, so adopt the handle.
            JobRepo::set_task_handle(&state.pool, job_id, &callback.task_handle).await?;
        }
    }

    let applied = match callback.status {
        CallbackStatus::Success => {
            let output_url = callback.output_url.as_deref().ok_or_else(|| {
                AppError::BadRequest("success callback without output_url".into())
            })?;
            let (_, applied) =
                notify::complete_job(&state.pool, &state.event_bus, job_id, output_url).await?;
            applied
        }
        CallbackStatus::Failure => {
            let code = callback.error_code.as_deref().unwrap_or(DEFAULT_FAILURE_CODE);
            let message = callback
                .error_message
                .as_deref()
                .unwrap_or("worker reported failure");
            let (_, applied) =
                notify::fail_job(&state.pool, &state.event_bus, job_id, code, message).await?;
            applied
        }
    };

    // One freed slot, one advance chain. The settled loop only continues
    // past dispatch *failures*, so this never double-fills.
    if applied {
        state.queue.advance_until_settled().await?;
    } else {
        tracing::debug!(job_id, "Duplicate webhook delivery ignored");
    }

    Ok(Json(DataResponse {
        data: CallbackResponse { applied },
    }))
}

/// Verify the HMAC-SHA256 signature over the raw request body.
fn verify_signature(headers: &HeaderMap, body: &[u8], secret: &str) -> Result<(), AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized("missing webhook signature".into()))
        })?;

    let signature = decode_hex(signature).ok_or_else(|| {
        AppError::Core(CoreError::Unauthorized("malformed webhook signature".into()))
    })?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&signature).map_err(|_| {
        AppError::Core(CoreError::Unauthorized("invalid webhook signature".into()))
    })
}

/// Decode a lowercase/uppercase hex string. Returns `None` on odd length
/// or non-hex characters.
fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::decode_hex;

    #[test]
    fn decodes_valid_hex() {
        assert_eq!(decode_hex("00ff10"), Some(vec![0x00, 0xff, 0x10]));
        assert_eq!(decode_hex("DEADbeef"), Some(vec![0xde, 0xad, 0xbe, 0xef]));
    }

    #[test]
    fn rejects_odd_length_and_garbage() {
        assert_eq!(decode_hex("abc"), None);
        assert_eq!(decode_hex("zz"), None);
    }
}
