//! Repository for the `jobs` table.
//!
//! All scheduling decisions re-derive state from this table; the only
//! in-process serialization is the queue advisory lock taken by callers
//! around multi-statement admission/claim transactions. Status transitions
//! are conditional updates so concurrent writers cannot double-apply them.

use sqlx::{PgConnection, PgPool};
use muse_core::types::{DbId, Timestamp};

use crate::models::job::{Job, JobListQuery, KindQueueDepth, NewJob};
use crate::models::status::{JobStatus, StatusId};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, kind, user_id, session_id, status_id, position, \
    input_refs, params, output_url, error_code, error_message, \
    credit_cost, worker_task_handle, \
    created_at, started_at, completed_at, queue_wait_seconds";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Advisory lock key serializing admission and advance transactions.
const QUEUE_LOCK_KEY: i64 = 0x6d75_7365_6a6f_6271;

/// Terminal statuses: completed, failed, cancelled.
const TERMINAL_STATUSES: [StatusId; 3] = [
    JobStatus::Completed as StatusId,
    JobStatus::Failed as StatusId,
    JobStatus::Cancelled as StatusId,
];

/// Provides CRUD and scheduling operations for jobs.
pub struct JobRepo;

impl JobRepo {
    /// Take the queue advisory lock for the current transaction.
    ///
    /// Released automatically at commit/rollback. Serializes admission and
    /// advance decisions without any in-process state.
    pub async fn lock_queue(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(QUEUE_LOCK_KEY)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Insert a new job in `queued` status.
    ///
    /// `created_at` is assigned by the database at insert time and is the
    /// sole global FIFO ordering key from then on.
    pub async fn create(conn: &mut PgConnection, input: &NewJob<'_>) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (kind, user_id, session_id, status_id, input_refs, params, credit_cost) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(input.kind.as_str())
            .bind(input.user_id)
            .bind(input.session_id)
            .bind(JobStatus::Queued.id())
            .bind(input.input_refs)
            .bind(input.params)
            .bind(input.credit_cost)
            .fetch_one(conn)
            .await
    }

    /// Number of jobs currently `running`, across all kinds.
    pub async fn running_count(conn: &mut PgConnection) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status_id = $1")
            .bind(JobStatus::Running.id())
            .fetch_one(conn)
            .await
    }

    /// Pool-based variant of [`running_count`](Self::running_count) for
    /// read-only snapshots.
    pub async fn running_count_pool(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status_id = $1")
            .bind(JobStatus::Running.id())
            .fetch_one(pool)
            .await
    }

    /// Transaction-scoped variant of [`queued_count`](Self::queued_count).
    pub async fn queued_count_tx(conn: &mut PgConnection) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status_id = $1")
            .bind(JobStatus::Queued.id())
            .fetch_one(conn)
            .await
    }

    /// Number of jobs currently `queued`, across all kinds.
    pub async fn queued_count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status_id = $1")
            .bind(JobStatus::Queued.id())
            .fetch_one(pool)
            .await
    }

    /// Queued counts broken down by kind (UI/debugging only; never used
    /// for admission decisions).
    pub async fn queued_depth_by_kind(pool: &PgPool) -> Result<Vec<KindQueueDepth>, sqlx::Error> {
        sqlx::query_as::<_, KindQueueDepth>(
            "SELECT kind, COUNT(*) AS queued FROM jobs \
             WHERE status_id = $1 \
             GROUP BY kind \
             ORDER BY kind",
        )
        .bind(JobStatus::Queued.id())
        .fetch_all(pool)
        .await
    }

    /// Atomically claim the single oldest `queued` job across all kinds.
    ///
    /// True FIFO by `created_at` (tie-broken by id), not round-robin. The
    /// `status_id = queued` guard makes the claim a compare-and-set:
    /// a concurrent claimer that got there first leaves nothing to match.
    /// Sets `started_at`, records `queue_wait_seconds`, and clears
    /// `position` in the same statement.
    pub async fn claim_oldest_queued(conn: &mut PgConnection) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $1, started_at = NOW(), position = NULL, \
                 queue_wait_seconds = EXTRACT(EPOCH FROM NOW() - created_at)::INTEGER \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE status_id = $2 \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) AND status_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Running.id())
            .bind(JobStatus::Queued.id())
            .fetch_optional(conn)
            .await
    }

    /// Recompute `position` for every `queued` job as a contiguous 1..K
    /// ranking by `created_at`. Returns the number of rows updated.
    pub async fn recompute_positions(conn: &mut PgConnection) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET position = ranked.pos \
             FROM ( \
                 SELECT id, ROW_NUMBER() OVER (ORDER BY created_at ASC, id ASC)::INTEGER AS pos \
                 FROM jobs WHERE status_id = $1 \
             ) ranked \
             WHERE jobs.id = ranked.id",
        )
        .bind(JobStatus::Queued.id())
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Store the worker task handle assigned at dispatch.
    ///
    /// The handle is set at most once; a second call is a no-op.
    pub async fn set_task_handle(
        pool: &PgPool,
        job_id: DbId,
        handle: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET worker_task_handle = $2 \
             WHERE id = $1 AND worker_task_handle IS NULL",
        )
        .bind(job_id)
        .bind(handle)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a job completed with its output location.
    ///
    /// Conditional on the job not already being terminal, so duplicate
    /// webhook deliveries are no-ops. Returns `true` if the transition
    /// was applied.
    pub async fn complete(
        pool: &PgPool,
        job_id: DbId,
        output_url: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, output_url = $3, completed_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($4, $5, $6)",
        )
        .bind(job_id)
        .bind(JobStatus::Completed.id())
        .bind(output_url)
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a job failed with an error code and message.
    ///
    /// Same idempotence contract as [`complete`](Self::complete).
    pub async fn fail(
        pool: &PgPool,
        job_id: DbId,
        error_code: &str,
        error_message: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, error_code = $3, error_message = $4, completed_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($5, $6, $7)",
        )
        .bind(job_id)
        .bind(JobStatus::Failed.id())
        .bind(error_code)
        .bind(error_message)
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Cancel a job, allowed only while it is still `queued`.
    ///
    /// A running job has already committed an external worker call and
    /// cannot be reliably aborted. Returns `true` if cancelled.
    pub async fn cancel_queued(pool: &PgPool, job_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, position = NULL, completed_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(job_id)
        .bind(JobStatus::Cancelled.id())
        .bind(JobStatus::Queued.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The user's single active (queued or running) job, if any.
    ///
    /// The admission guard relies on this: a user may hold at most one
    /// non-terminal job across all kinds.
    pub async fn active_for_user(
        conn: &mut PgConnection,
        user_id: DbId,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE user_id = $1 AND status_id IN ($2, $3) \
             ORDER BY created_at DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(user_id)
            .bind(JobStatus::Queued.id())
            .bind(JobStatus::Running.id())
            .fetch_optional(conn)
            .await
    }

    /// Pool-based variant of [`active_for_user`](Self::active_for_user).
    pub async fn active_for_user_pool(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<Job>, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::active_for_user(&mut conn, user_id).await
    }

    /// Queued jobs whose session has gone stale (no heartbeat since
    /// `cutoff`) or disappeared entirely. Candidates for reaping.
    pub async fn orphaned_queued(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM jobs j \
             LEFT JOIN client_sessions s ON j.session_id = s.id \
             WHERE j.status_id = $1 AND (s.id IS NULL OR s.last_seen_at < $2)",
            COLUMNS
                .split(", ")
                .map(|c| format!("j.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Queued.id())
            .bind(cutoff)
            .fetch_all(pool)
            .await
    }

    /// Queued jobs belonging to a specific session (explicit teardown path).
    pub async fn queued_for_session(
        pool: &PgPool,
        session_id: &str,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs WHERE session_id = $1 AND status_id = $2"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(session_id)
            .bind(JobStatus::Queued.id())
            .fetch_all(pool)
            .await
    }

    /// List a user's jobs, newest first, with optional status filter.
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: DbId,
        params: &JobListQuery,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);

        let (filter, query) = match params.status_id {
            Some(_) => (
                true,
                format!(
                    "SELECT {COLUMNS} FROM jobs \
                     WHERE user_id = $1 AND status_id = $2 \
                     ORDER BY created_at DESC LIMIT $3 OFFSET $4"
                ),
            ),
            None => (
                false,
                format!(
                    "SELECT {COLUMNS} FROM jobs \
                     WHERE user_id = $1 \
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3"
                ),
            ),
        };

        let mut q = sqlx::query_as::<_, Job>(&query).bind(user_id);
        if filter {
            q = q.bind(params.status_id.unwrap());
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }
}
