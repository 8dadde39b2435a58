//! Background cleanup of queued jobs from abandoned sessions.
//!
//! The explicit teardown endpoint is fire-and-forget from a closing tab,
//! so it is allowed to be lost. This task is the backstop: any queued job
//! whose session stopped heartbeating past the TTL is cancelled so it
//! does not occupy a queue slot for a user who is no longer waiting.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use muse_db::repositories::{JobRepo, SessionRepo};
use muse_db::DbPool;

use crate::engine::QueueManager;

/// Periodic reaper for stale sessions and their queued jobs.
pub struct SessionReaper {
    pool: DbPool,
    queue: Arc<QueueManager>,
    /// Sessions silent for longer than this are considered gone.
    session_ttl: Duration,
    /// Sweep interval.
    interval: Duration,
}

impl SessionReaper {
    pub fn new(
        pool: DbPool,
        queue: Arc<QueueManager>,
        session_ttl: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            pool,
            queue,
            session_ttl,
            interval,
        }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            session_ttl_secs = self.session_ttl.as_secs(),
            "Session reaper started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Session reaper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        tracing::error!(error = %e, "Session reap sweep failed");
                    }
                }
            }
        }
    }

    /// One sweep: cancel queued jobs with stale-or-missing sessions, then
    /// drop the stale session rows themselves.
    async fn sweep(&self) -> Result<(), crate::error::AppError> {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(self.session_ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(120));

        let orphaned = JobRepo::orphaned_queued(&self.pool, cutoff).await?;
        if !orphaned.is_empty() {
            let cancelled = self.queue.cancel_abandoned(&orphaned).await?;
            tracing::info!(cancelled, "Reaped orphaned queued jobs");
        }

        let removed = SessionRepo::delete_stale(&self.pool, cutoff).await?;
        if removed > 0 {
            tracing::debug!(removed, "Removed stale session rows");
        }

        Ok(())
    }
}
