//! Job transition helpers that pair the store update with event-bus
//! publication, so every observer (push channel, persistence) sees the
//! same transition exactly when it lands.

use muse_core::types::DbId;
use muse_db::models::job::Job;
use muse_db::repositories::JobRepo;
use muse_db::DbPool;
use muse_events::{EventBus, PlatformEvent};

use crate::error::{AppError, AppResult};

pub const JOB_QUEUED: &str = "job.queued";
pub const JOB_STARTED: &str = "job.started";
pub const JOB_COMPLETED: &str = "job.completed";
pub const JOB_FAILED: &str = "job.failed";
pub const JOB_CANCELLED: &str = "job.cancelled";

/// Publish a job lifecycle event carrying the job's current wire snapshot.
pub fn publish(events: &EventBus, job: &Job, event_type: &str) {
    let payload = serde_json::to_value(job.to_update()).unwrap_or_default();
    events.publish(
        PlatformEvent::new(event_type)
            .with_source("job", job.id)
            .with_actor(job.user_id)
            .with_payload(payload),
    );
}

/// Apply the terminal `completed` transition.
///
/// Returns the job row and whether the transition was applied; `false`
/// means the job was already terminal (e.g. a duplicate webhook) and
/// nothing was published.
pub async fn complete_job(
    pool: &DbPool,
    events: &EventBus,
    job_id: DbId,
    output_url: &str,
) -> AppResult<(Job, bool)> {
    let applied = JobRepo::complete(pool, job_id, output_url).await?;
    let job = fetch(pool, job_id).await?;
    if applied {
        publish(events, &job, JOB_COMPLETED);
        tracing::info!(job_id, "Job completed");
    }
    Ok((job, applied))
}

/// Apply the terminal `failed` transition. Same contract as
/// [`complete_job`].
pub async fn fail_job(
    pool: &DbPool,
    events: &EventBus,
    job_id: DbId,
    error_code: &str,
    error_message: &str,
) -> AppResult<(Job, bool)> {
    let applied = JobRepo::fail(pool, job_id, error_code, error_message).await?;
    let job = fetch(pool, job_id).await?;
    if applied {
        publish(events, &job, JOB_FAILED);
        tracing::info!(job_id, error_code, "Job failed");
    }
    Ok((job, applied))
}

async fn fetch(pool: &DbPool, job_id: DbId) -> AppResult<Job> {
    JobRepo::find_by_id(pool, job_id)
        .await?
        .ok_or(AppError::Queue(muse_core::QueueError::JobNotFound {
            id: job_id,
        }))
}
