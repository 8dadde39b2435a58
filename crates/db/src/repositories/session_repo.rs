//! Repository for the `client_sessions` table.

use sqlx::PgPool;
use muse_core::types::DbId;

/// Provides client-session heartbeat bookkeeping.
pub struct SessionRepo;

impl SessionRepo {
    /// Record a heartbeat, creating the session row if needed.
    pub async fn touch(
        pool: &PgPool,
        session_id: &str,
        user_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO client_sessions (id, user_id, last_seen_at) \
             VALUES ($1, $2, NOW()) \
             ON CONFLICT (id) DO UPDATE SET last_seen_at = NOW()",
        )
        .bind(session_id)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Remove a session row on explicit teardown. Returns `true` if a row
    /// was deleted.
    pub async fn delete(pool: &PgPool, session_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM client_sessions WHERE id = $1")
            .bind(session_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete session rows with no heartbeat since `cutoff`. Returns the
    /// number of rows removed.
    pub async fn delete_stale(
        pool: &PgPool,
        cutoff: muse_core::types::Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM client_sessions WHERE last_seen_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
