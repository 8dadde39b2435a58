//! Global job admission and scheduling.
//!
//! [`QueueManager`] is stateless between calls: every decision re-derives
//! the running count and queue order from the job store, inside a
//! transaction holding the queue advisory lock. Correctness therefore
//! survives process restarts -- on boot, one `fill_available_slots` call
//! re-establishes steady state from whatever the store says.
//!
//! Dispatch to the external worker happens *after* the claiming
//! transaction commits, so the lock is never held across a network call.
//! A dispatch failure marks the job failed (it does not re-enter the
//! queue) and the advance loop continues so the freed slot is never
//! leaked.

use std::sync::Arc;

use serde::Serialize;
use muse_core::error::QueueError;
use muse_core::types::DbId;
use muse_core::JobKind;
use muse_db::models::job::{Job, KindQueueDepth, NewJob};
use muse_db::models::status::JobStatus;
use muse_db::repositories::{CreditRepo, JobRepo};
use muse_db::DbPool;
use muse_events::EventBus;
use muse_worker::{DispatchRequest, WorkerDispatch, WorkerError};

use crate::engine::notify;
use crate::error::{AppError, AppResult};

/// Read-only admission snapshot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AdmissionSnapshot {
    /// Whether a slot is free right now.
    pub available: bool,
    /// Jobs currently running, all kinds combined.
    pub running: i64,
    /// Free slots under the global cap.
    pub slots_available: i64,
}

/// Global queue snapshot for UI/debugging; never used for admission.
#[derive(Debug, Serialize)]
pub struct QueueStatus {
    pub running: i64,
    pub cap: i64,
    pub slots_available: i64,
    pub total_queued: i64,
    pub queued_by_kind: Vec<KindQueueDepth>,
}

/// Result of a submission: the job row as admitted, plus queue context.
#[derive(Debug)]
pub struct SubmitOutcome {
    pub job: Job,
    /// Total queued jobs (any kind) at admission time, if the job queued.
    pub total_queued: Option<i64>,
}

/// Result of one advance attempt.
#[derive(Debug)]
pub enum AdvanceOutcome {
    /// Nothing to do: cap reached or queue empty.
    Idle,
    /// A job was claimed and dispatched to the worker.
    Dispatched(Job),
    /// A job was claimed but the worker submission failed; the job is now
    /// failed and the freed slot is still open.
    DispatchFailed(Job),
}

/// Coordinates admission, the global FIFO queue, and worker dispatch.
pub struct QueueManager {
    pool: DbPool,
    worker: Arc<dyn WorkerDispatch>,
    events: Arc<EventBus>,
    /// Global concurrency cap across all kinds.
    max_running: i64,
    /// Base URL used to build per-job webhook callback URLs.
    public_base_url: String,
}

impl QueueManager {
    pub fn new(
        pool: DbPool,
        worker: Arc<dyn WorkerDispatch>,
        events: Arc<EventBus>,
        max_running: i64,
        public_base_url: String,
    ) -> Self {
        Self {
            pool,
            worker,
            events,
            max_running,
            public_base_url,
        }
    }

    /// Read-only admission check: counts running jobs across all kinds.
    pub async fn check_admission(&self) -> AppResult<AdmissionSnapshot> {
        let running = JobRepo::running_count_pool(&self.pool).await?;
        let slots_available = (self.max_running - running).max(0);
        Ok(AdmissionSnapshot {
            available: slots_available > 0,
            running,
            slots_available,
        })
    }

    /// Admit a new job: enforce the single-active-job rule, charge
    /// credits, create the row, and either dispatch immediately (slot
    /// free) or leave it queued with its global position.
    ///
    /// The guards, the charge, the insert, and the claim all run in one
    /// transaction under the queue advisory lock; admission errors roll
    /// the whole thing back, so a rejected submission never creates a row
    /// or consumes credits.
    pub async fn submit(
        &self,
        user_id: DbId,
        session_id: &str,
        kind: JobKind,
        input_refs: serde_json::Value,
        params: serde_json::Value,
    ) -> AppResult<SubmitOutcome> {
        let mut tx = self.pool.begin().await?;
        JobRepo::lock_queue(&mut tx).await?;

        // One queued-or-running job per user, across all kinds.
        if let Some(active) = JobRepo::active_for_user(&mut tx, user_id).await? {
            let age_seconds = (chrono::Utc::now() - active.created_at).num_seconds();
            return Err(QueueError::ActiveJobExists {
                kind: active.job_kind().unwrap_or(kind),
                status: active.status_name().to_string(),
                age_seconds,
            }
            .into());
        }

        // Charge before the row exists; the conditional decrement is the
        // only balance check.
        let cost = kind.credit_cost();
        let description = format!("{} job", kind.label());
        if CreditRepo::consume(&mut tx, user_id, cost, &description)
            .await?
            .is_none()
        {
            let balance = CreditRepo::balance_tx(&mut tx, user_id).await?.unwrap_or(0);
            return Err(QueueError::InsufficientCredits {
                required: cost,
                balance,
            }
            .into());
        }

        let job = JobRepo::create(
            &mut tx,
            &NewJob {
                kind,
                user_id,
                session_id,
                input_refs: &input_refs,
                params: &params,
                credit_cost: cost,
            },
        )
        .await?;

        // If a slot is free, claim the oldest queued job -- normally the
        // one just created, but strict FIFO means an older stray entry
        // would win, which is exactly right.
        let running = JobRepo::running_count(&mut tx).await?;
        let claimed = if running < self.max_running {
            JobRepo::claim_oldest_queued(&mut tx).await?
        } else {
            None
        };

        JobRepo::recompute_positions(&mut tx).await?;
        let total_queued = JobRepo::queued_count_tx(&mut tx).await?;
        tx.commit().await?;

        if let Some(claimed_job) = claimed {
            // A dispatch failure reopens the slot; keep advancing so it is
            // filled (or the queue drains) before we answer the submitter.
            if matches!(
                self.dispatch(claimed_job).await?,
                AdvanceOutcome::DispatchFailed(_)
            ) {
                self.advance_until_settled().await?;
            }
        }

        // Re-read: the job may have been claimed and dispatched (running),
        // claimed and failed at dispatch, or left queued with a position.
        let job = JobRepo::find_by_id(&self.pool, job.id)
            .await?
            .ok_or(QueueError::JobNotFound { id: job.id })?;

        let queued = job.status() == Some(JobStatus::Queued);
        if queued {
            notify::publish(&self.events, &job, notify::JOB_QUEUED);
        }

        tracing::info!(
            job_id = job.id,
            user_id,
            kind = %kind,
            status = job.status_name(),
            position = job.position,
            credit_cost = cost,
            "Job admitted",
        );

        Ok(SubmitOutcome {
            total_queued: queued.then_some(total_queued),
            job,
        })
    }

    /// One advance attempt: if a slot is free, claim the single oldest
    /// queued job (any kind) and dispatch it.
    ///
    /// Callers reacting to a freed slot should use
    /// [`advance_until_settled`](Self::advance_until_settled) so a dispatch
    /// failure does not leak the slot.
    pub async fn advance(&self) -> AppResult<AdvanceOutcome> {
        let mut tx = self.pool.begin().await?;
        JobRepo::lock_queue(&mut tx).await?;

        let running = JobRepo::running_count(&mut tx).await?;
        if running >= self.max_running {
            return Ok(AdvanceOutcome::Idle);
        }

        let Some(job) = JobRepo::claim_oldest_queued(&mut tx).await? else {
            return Ok(AdvanceOutcome::Idle);
        };

        JobRepo::recompute_positions(&mut tx).await?;
        tx.commit().await?;

        tracing::info!(
            job_id = job.id,
            kind = %job.kind,
            queue_wait_seconds = job.queue_wait_seconds,
            "Job claimed from queue",
        );

        self.dispatch(job).await
    }

    /// Advance after a slot frees up, retrying past dispatch failures.
    ///
    /// Each failed dispatch consumes one queued job (it goes terminal), so
    /// the loop always terminates: either a job is running in the freed
    /// slot, or the queue is empty.
    pub async fn advance_until_settled(&self) -> AppResult<AdvanceOutcome> {
        loop {
            match self.advance().await? {
                AdvanceOutcome::DispatchFailed(job) => {
                    tracing::warn!(
                        job_id = job.id,
                        "Dispatch failed, advancing to next queued job",
                    );
                }
                settled => return Ok(settled),
            }
        }
    }

    /// Fill every free slot from the queue. Used at startup to recover
    /// whatever state the store was left in.
    pub async fn fill_available_slots(&self) -> AppResult<usize> {
        let mut dispatched = 0;
        loop {
            match self.advance().await? {
                AdvanceOutcome::Idle => return Ok(dispatched),
                AdvanceOutcome::Dispatched(_) => dispatched += 1,
                AdvanceOutcome::DispatchFailed(_) => {}
            }
        }
    }

    /// Global queue snapshot (running/cap/queued, per-kind breakdown).
    pub async fn status(&self) -> AppResult<QueueStatus> {
        let running = JobRepo::running_count_pool(&self.pool).await?;
        let total_queued = JobRepo::queued_count(&self.pool).await?;
        let queued_by_kind = JobRepo::queued_depth_by_kind(&self.pool).await?;
        Ok(QueueStatus {
            running,
            cap: self.max_running,
            slots_available: (self.max_running - running).max(0),
            total_queued,
            queued_by_kind,
        })
    }

    /// Cancel a queued job on behalf of its owner.
    ///
    /// Only `queued` jobs are cancellable; a running job has already
    /// committed an external worker call.
    pub async fn cancel(&self, job_id: DbId, user_id: DbId) -> AppResult<Job> {
        let job = JobRepo::find_by_id(&self.pool, job_id)
            .await?
            .filter(|j| j.user_id == user_id)
            .ok_or(QueueError::JobNotFound { id: job_id })?;

        if !JobRepo::cancel_queued(&self.pool, job_id).await? {
            return Err(AppError::Core(muse_core::CoreError::Conflict(format!(
                "job {job_id} is {} and can no longer be cancelled",
                job.status_name()
            ))));
        }

        self.refresh_positions().await?;

        let job = JobRepo::find_by_id(&self.pool, job_id)
            .await?
            .ok_or(QueueError::JobNotFound { id: job_id })?;
        notify::publish(&self.events, &job, notify::JOB_CANCELLED);

        tracing::info!(job_id, user_id, "Queued job cancelled by user");
        Ok(job)
    }

    /// Cancel a batch of abandoned queued jobs (explicit session teardown
    /// or the background reaper), then recompute positions once.
    ///
    /// Returns how many jobs were actually cancelled; entries that were
    /// claimed or finished in the meantime are skipped by the conditional
    /// update.
    pub async fn cancel_abandoned(&self, jobs: &[Job]) -> AppResult<usize> {
        let mut cancelled = 0;
        for job in jobs {
            if JobRepo::cancel_queued(&self.pool, job.id).await? {
                if let Some(row) = JobRepo::find_by_id(&self.pool, job.id).await? {
                    notify::publish(&self.events, &row, notify::JOB_CANCELLED);
                }
                tracing::info!(
                    job_id = job.id,
                    session_id = %job.session_id,
                    "Abandoned queued job cancelled",
                );
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            self.refresh_positions().await?;
        }
        Ok(cancelled)
    }

    /// Recompute queue positions under the advisory lock. Used after
    /// cancellations, which remove a queued entry without freeing a slot.
    pub async fn refresh_positions(&self) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        JobRepo::lock_queue(&mut tx).await?;
        JobRepo::recompute_positions(&mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Submit a claimed job to the external worker and record the result.
    async fn dispatch(&self, job: Job) -> AppResult<AdvanceOutcome> {
        let kind = match job.job_kind() {
            Some(kind) => kind,
            None => {
                // Store corruption; fail the job rather than wedging the slot.
                let (job, _) = notify::fail_job(
                    &self.pool,
                    &self.events,
                    job.id,
                    "WORKER_REJECTED",
                    &format!("unknown job kind: {}", job.kind),
                )
                .await?;
                return Ok(AdvanceOutcome::DispatchFailed(job));
            }
        };

        let request = DispatchRequest {
            job_id: job.id,
            kind,
            input_refs: job.input_refs.clone(),
            params: job.params.clone(),
            callback_url: format!("{}/api/v1/webhooks/jobs/{}", self.public_base_url, job.id),
        };

        match self.worker.dispatch(&request).await {
            Ok(receipt) => {
                JobRepo::set_task_handle(&self.pool, job.id, &receipt.task_handle).await?;
                let job = JobRepo::find_by_id(&self.pool, job.id)
                    .await?
                    .ok_or(QueueError::JobNotFound { id: job.id })?;
                notify::publish(&self.events, &job, notify::JOB_STARTED);
                Ok(AdvanceOutcome::Dispatched(job))
            }
            Err(err) => {
                let code = match &err {
                    WorkerError::Transient(_) => "WORKER_DISPATCH_FAILED",
                    WorkerError::Rejected(_) => "WORKER_REJECTED",
                };
                tracing::error!(
                    job_id = job.id,
                    kind = %kind,
                    error = %err,
                    "Failed to submit job to worker",
                );
                let (job, _) =
                    notify::fail_job(&self.pool, &self.events, job.id, code, &err.to_string())
                        .await?;
                Ok(AdvanceOutcome::DispatchFailed(job))
            }
        }
    }
}
