//! User account model (credit balance only -- profile data lives in the
//! platform's CRUD layer, not here).

use serde::Serialize;
use sqlx::FromRow;
use muse_core::types::{DbId, Timestamp};

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub email: String,
    pub display_name: String,
    pub credit_balance: i64,
    pub created_at: Timestamp,
}

/// A row from the `credit_transactions` ledger.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CreditTransaction {
    pub id: DbId,
    pub user_id: DbId,
    /// Signed amount; admission charges are negative.
    pub amount: i64,
    pub balance_after: i64,
    pub description: String,
    pub created_at: Timestamp,
}
