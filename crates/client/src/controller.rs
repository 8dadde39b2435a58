//! The per-submission lifecycle controller.
//!
//! `idle -> uploading -> processing | waiting -> {completed | error}`, with
//! `cancelled` reachable from `waiting` only. One controller instance
//! drives one submission at a time; the reentrancy guard is an in-memory
//! flag that debounces double-clicks and is not a substitute for the
//! server-side single-active-job check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use muse_core::job_events::JobUpdate;
use muse_core::types::DbId;
use muse_core::JobKind;

use crate::api::{ApiError, JobApi, SubmitRequest};
use crate::error::ControllerError;
use crate::progress;
use crate::transition::{apply_remote, Phase};

/// One raw input asset to upload before submission.
#[derive(Debug, Clone)]
pub struct InputAsset {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Everything needed to run one tool invocation.
#[derive(Debug, Clone)]
pub struct Submission {
    pub kind: JobKind,
    /// Raw assets, in the order the tool expects them.
    pub inputs: Vec<InputAsset>,
    /// Kind-specific generation parameters.
    pub params: serde_json::Value,
}

/// Persists raw input assets and returns opaque storage references.
///
/// Storage mechanics (signed URLs, multipart, ...) live behind this seam;
/// the controller only needs the resulting references in order.
#[async_trait]
pub trait InputUploader: Send + Sync {
    async fn upload(&self, assets: &[InputAsset]) -> Result<serde_json::Value, ControllerError>;
}

/// Timing knobs for the controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Hard wall-clock budget from submission to terminal state.
    pub timeout: Duration,
    /// Reconciliation poll cadence while busy.
    pub poll_interval: Duration,
    /// Session heartbeat cadence while busy.
    pub heartbeat_interval: Duration,
    /// Rotating status-message cadence.
    pub message_interval: Duration,
    /// Simulated progress cadence while processing.
    pub progress_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(15),
            heartbeat_interval: Duration::from_secs(30),
            message_interval: Duration::from_secs(3),
            progress_interval: Duration::from_secs(1),
        }
    }
}

/// Observable controller state for the UI.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub phase: Phase,
    pub job_id: Option<DbId>,
    /// Global queue position while waiting.
    pub position: Option<i32>,
    /// Simulated progress while processing; capped below 100 until a
    /// genuine completion arrives.
    pub progress_percent: f32,
    pub status_message: &'static str,
    pub output_url: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Refreshed after a successful completion.
    pub credit_balance: Option<i64>,
}

impl Snapshot {
    fn initial() -> Self {
        Self {
            phase: Phase::Idle,
            job_id: None,
            position: None,
            progress_percent: 0.0,
            status_message: progress::message_at(0),
            output_url: None,
            error_code: None,
            error_message: None,
            credit_balance: None,
        }
    }
}

/// Drives one submission from upload to a terminal state.
pub struct LifecycleController<A: JobApi> {
    api: Arc<A>,
    uploader: Arc<dyn InputUploader>,
    config: ControllerConfig,
    /// Client session identifier, shared by every submission from this tab.
    session_id: String,
    snapshot: watch::Sender<Snapshot>,
    /// Reentrancy guard: one submission in flight per controller instance.
    busy: AtomicBool,
    cancel: CancellationToken,
}

/// Releases the reentrancy flag when a submission finishes, however it
/// finishes.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<A: JobApi + 'static> LifecycleController<A> {
    pub fn new(api: Arc<A>, uploader: Arc<dyn InputUploader>, config: ControllerConfig) -> Self {
        let (snapshot, _) = watch::channel(Snapshot::initial());
        Self {
            api,
            uploader,
            config,
            session_id: uuid::Uuid::new_v4().to_string(),
            snapshot,
            busy: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to state snapshots for UI rendering.
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    /// This controller's client session identifier.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Request cancellation. Only honored while the job is queued
    /// server-side; a running job has already committed a worker call.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Best-effort teardown on page close: if a job is still queued,
    /// cancel it server-side so it stops occupying a queue slot. Never
    /// blocks the caller.
    pub fn close(&self) {
        let snap = self.snapshot.borrow().clone();
        let api = Arc::clone(&self.api);
        let session_id = self.session_id.clone();
        tokio::spawn(async move {
            if snap.phase == Phase::Waiting {
                if let Some(job_id) = snap.job_id {
                    let _ = api.cancel(job_id).await;
                }
            }
            let _ = api.teardown_session(&session_id).await;
        });
    }

    /// Run one submission to a terminal state.
    ///
    /// Returns the final observed job snapshot on completion or
    /// cancellation; admission-guard failures and post-dispatch errors
    /// come back as [`ControllerError`].
    pub async fn run(&self, submission: Submission) -> Result<JobUpdate, ControllerError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ControllerError::Busy);
        }
        let _guard = BusyGuard(&self.busy);

        let result = self.drive(submission).await;

        if let Err(err) = &result {
            match err {
                // Admission-guard aborts: nothing was created, back to idle.
                ControllerError::NotLogged
                | ControllerError::ActiveJob { .. }
                | ControllerError::InsufficientCredits { .. } => {
                    self.set(|s| s.phase = Phase::Idle);
                }
                _ => {
                    self.set(|s| s.phase = Phase::Error);
                }
            }
        }

        result
    }

    async fn drive(&self, submission: Submission) -> Result<JobUpdate, ControllerError> {
        // --- Admission guards (nothing is created server-side) ---
        let account = self.api.account().await.map_err(auth_aware)?;

        if let Some(active) = self.api.active_job().await.map_err(auth_aware)? {
            return Err(ControllerError::ActiveJob {
                kind: active.kind,
                status: active.status,
                age_seconds: active.age_seconds,
            });
        }

        let cost = submission.kind.credit_cost();
        if account.credit_balance < cost as i64 {
            return Err(ControllerError::InsufficientCredits {
                required: cost,
                balance: account.credit_balance,
            });
        }

        // --- Upload ---
        self.set(|s| {
            *s = Snapshot::initial();
            s.phase = Phase::Uploading;
            s.credit_balance = Some(account.credit_balance);
        });

        let input_refs = self.uploader.upload(&submission.inputs).await?;

        // --- Admission (single request decides run-now vs queue) ---
        let response = self
            .api
            .submit(&SubmitRequest {
                kind: submission.kind,
                session_id: self.session_id.clone(),
                input_refs,
                params: submission.params,
            })
            .await
            .map_err(auth_aware)?;

        let job_id = response.job_id;
        tracing::info!(
            job_id,
            kind = %response.kind,
            status = %response.status,
            position = response.position,
            "Job submitted",
        );

        match response.status.as_str() {
            "running" => self.set(|s| {
                s.phase = Phase::Processing;
                s.job_id = Some(job_id);
            }),
            "queued" => self.set(|s| {
                s.phase = Phase::Waiting;
                s.job_id = Some(job_id);
                s.position = response.position;
            }),
            _ => {
                // Immediate dispatch failure: the job is already terminal.
                let update = self.api.job(job_id).await.map_err(auth_aware)?;
                self.set(|s| {
                    s.phase = Phase::Error;
                    s.job_id = Some(job_id);
                    s.error_code = update.error_code.clone();
                    s.error_message = update.error_message.clone();
                });
                return Err(ControllerError::Api {
                    code: update.error_code.unwrap_or_else(|| "WORKER_FAILED".into()),
                    message: update.error_message.unwrap_or_else(|| "job failed".into()),
                });
            }
        }

        // --- Push subscription (best-effort; the poll is the backstop) ---
        let push_rx = match self.api.subscribe(job_id).await {
            Ok(rx) => Some(rx),
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Push subscription failed, relying on poll");
                None
            }
        };

        self.wait_for_terminal(job_id, push_rx).await
    }

    /// Multiplex push, poll, timers, and cancellation until terminal.
    async fn wait_for_terminal(
        &self,
        job_id: DbId,
        mut push_rx: Option<mpsc::UnboundedReceiver<JobUpdate>>,
    ) -> Result<JobUpdate, ControllerError> {
        let deadline = tokio::time::sleep(self.config.timeout);
        tokio::pin!(deadline);

        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        poll.reset(); // skip the immediate first tick; we just submitted

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        heartbeat.reset();

        let mut message_tick = tokio::time::interval(self.config.message_interval);
        message_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut message_index = 0usize;

        let mut progress_tick = tokio::time::interval(self.config.progress_interval);
        progress_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut last_update: Option<JobUpdate> = None;
        let mut cancel_requested = false;

        loop {
            let phase = self.snapshot.borrow().phase;
            if phase.is_terminal() {
                break;
            }

            tokio::select! {
                // Hard wall-clock budget, independent of queue wait. Fires
                // locally and leaves the server-side job untouched.
                _ = &mut deadline => {
                    tracing::warn!(job_id, "Local timeout elapsed before terminal state");
                    self.set(|s| {
                        s.phase = Phase::Error;
                        s.error_code = Some("TIMEOUT".into());
                        s.error_message = Some("timed out waiting for result".into());
                    });
                    return Err(ControllerError::Timeout);
                }

                // User-initiated cancel: meaningful only while queued.
                _ = self.cancel.cancelled(), if !cancel_requested => {
                    cancel_requested = true;
                    if self.snapshot.borrow().phase == Phase::Waiting {
                        match self.api.cancel(job_id).await {
                            Ok(update) => {
                                self.set(|s| s.phase = Phase::Cancelled);
                                // Cancel resets the controller to idle.
                                let final_update = update.clone();
                                self.set(|s| *s = Snapshot::initial());
                                return Ok(final_update);
                            }
                            Err(e) => {
                                // Likely already running; keep going.
                                tracing::warn!(job_id, error = %e, "Cancel rejected");
                            }
                        }
                    } else {
                        tracing::debug!(job_id, "Cancel ignored: job is no longer queued");
                    }
                }

                // Push channel: low-latency updates.
                update = recv_or_pending(&mut push_rx) => {
                    match update {
                        Some(update) => self.apply(&update, &mut last_update),
                        None => {
                            // Socket closed; the poll keeps us correct.
                            push_rx = None;
                        }
                    }
                }

                // Reconciliation poll: the correctness backstop. Strictly
                // idempotent with push via the shared transition function.
                _ = poll.tick() => {
                    match self.api.job(job_id).await {
                        Ok(update) => self.apply(&update, &mut last_update),
                        Err(e) => tracing::debug!(job_id, error = %e, "Reconciliation poll failed"),
                    }
                }

                // Keep the session alive so the reaper leaves our queued
                // job alone.
                _ = heartbeat.tick() => {
                    if let Err(e) = self.api.heartbeat(&self.session_id).await {
                        tracing::debug!(error = %e, "Session heartbeat failed");
                    }
                }

                // Cosmetic status-message rotation.
                _ = message_tick.tick() => {
                    message_index += 1;
                    self.set(|s| s.status_message = progress::message_at(message_index));
                }

                // Simulated progress while a worker is actually running.
                _ = progress_tick.tick() => {
                    if self.snapshot.borrow().phase == Phase::Processing {
                        self.set(|s| s.progress_percent = progress::next_progress(s.progress_percent));
                    }
                }
            }
        }

        let phase = self.snapshot.borrow().phase;
        match phase {
            Phase::Completed => {
                // Success side effect: refresh the credit balance.
                if let Ok(account) = self.api.account().await {
                    self.set(|s| s.credit_balance = Some(account.credit_balance));
                }
                self.set(|s| s.progress_percent = 100.0);
                Ok(last_update.expect("completed phase implies an applied update"))
            }
            Phase::Cancelled => {
                let update = last_update.expect("cancelled phase implies an applied update");
                self.set(|s| *s = Snapshot::initial());
                Ok(update)
            }
            _ => {
                let (code, message) = last_update
                    .as_ref()
                    .map(|u| {
                        (
                            u.error_code.clone().unwrap_or_else(|| "WORKER_FAILED".into()),
                            u.error_message.clone().unwrap_or_else(|| "job failed".into()),
                        )
                    })
                    .unwrap_or_else(|| ("WORKER_FAILED".into(), "job failed".into()));
                Err(ControllerError::Api { code, message })
            }
        }
    }

    /// Apply one observed remote status through the shared idempotent
    /// transition function. No-ops never touch the snapshot's phase.
    fn apply(&self, update: &JobUpdate, last_update: &mut Option<JobUpdate>) {
        let phase = self.snapshot.borrow().phase;

        // Position refreshes while waiting, even when the phase holds.
        if phase == Phase::Waiting && update.status == "queued" {
            self.set(|s| s.position = update.position);
        }

        let Some(next) = apply_remote(phase, update) else {
            return;
        };

        tracing::info!(
            job_id = update.job_id,
            status = %update.status,
            ?next,
            "Job update applied",
        );

        *last_update = Some(update.clone());
        self.set(|s| {
            s.phase = next;
            s.position = None;
            s.output_url = update.output_url.clone();
            s.error_code = update.error_code.clone();
            s.error_message = update.error_message.clone();
        });
    }

    fn set(&self, f: impl FnOnce(&mut Snapshot)) {
        self.snapshot.send_modify(f);
    }
}

/// Receive from an optional channel without busy-looping once it is gone.
async fn recv_or_pending(
    rx: &mut Option<mpsc::UnboundedReceiver<JobUpdate>>,
) -> Option<JobUpdate> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Map a server `NOT_AUTHENTICATED` rejection to the dedicated guard
/// error; everything else stays an API/network error.
fn auth_aware(err: ApiError) -> ControllerError {
    match err {
        ApiError::Server { code, message } => {
            if code == "NOT_AUTHENTICATED" {
                ControllerError::NotLogged
            } else {
                ControllerError::Api { code, message }
            }
        }
        ApiError::Transport(message) => ControllerError::Network(message),
    }
}
