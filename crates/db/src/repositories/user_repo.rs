//! Repository for the `users` table.

use sqlx::PgPool;
use muse_core::types::DbId;

use crate::models::user::User;

const COLUMNS: &str = "id, email, display_name, credit_balance, created_at";

/// Provides user account lookups.
pub struct UserRepo;

impl UserRepo {
    /// Find a user by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Create a user with an initial credit balance.
    pub async fn create(
        pool: &PgPool,
        email: &str,
        display_name: &str,
        credit_balance: i64,
    ) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (email, display_name, credit_balance) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .bind(display_name)
            .bind(credit_balance)
            .fetch_one(pool)
            .await
    }
}
