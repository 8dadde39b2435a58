//! Credit ledger operations.
//!
//! Consumption is a single conditional decrement -- never an optimistic
//! one. The admission path calls [`CreditRepo::consume`] inside its
//! transaction, after the active-job guard and before the job row exists,
//! so a failed admission never charges.

use sqlx::{PgConnection, PgPool};
use muse_core::types::DbId;

use crate::models::user::CreditTransaction;

/// Provides atomic credit consumption and balance reads.
pub struct CreditRepo;

impl CreditRepo {
    /// Atomically consume `amount` credits from a user's balance.
    ///
    /// Succeeds only if the balance covers the amount; returns the new
    /// balance on success or `None` when insufficient. A ledger row is
    /// written in the same transaction.
    pub async fn consume(
        conn: &mut PgConnection,
        user_id: DbId,
        amount: i32,
        description: &str,
    ) -> Result<Option<i64>, sqlx::Error> {
        let new_balance: Option<i64> = sqlx::query_scalar(
            "UPDATE users SET credit_balance = credit_balance - $2 \
             WHERE id = $1 AND credit_balance >= $2 \
             RETURNING credit_balance",
        )
        .bind(user_id)
        .bind(amount as i64)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(balance) = new_balance else {
            return Ok(None);
        };

        sqlx::query(
            "INSERT INTO credit_transactions (user_id, amount, balance_after, description) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(-(amount as i64))
        .bind(balance)
        .bind(description)
        .execute(conn)
        .await?;

        Ok(Some(balance))
    }

    /// Ledger entries for a user, newest first.
    pub async fn history(
        pool: &PgPool,
        user_id: DbId,
        limit: i64,
    ) -> Result<Vec<CreditTransaction>, sqlx::Error> {
        sqlx::query_as::<_, CreditTransaction>(
            "SELECT id, user_id, amount, balance_after, description, created_at \
             FROM credit_transactions \
             WHERE user_id = $1 \
             ORDER BY id DESC \
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Transaction-scoped balance read, used to report the shortfall in
    /// admission errors.
    pub async fn balance_tx(
        conn: &mut PgConnection,
        user_id: DbId,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar("SELECT credit_balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(conn)
            .await
    }
}
