//! Client session model, used to tie submissions to a browser session so
//! orphaned queued jobs can be reaped.

use serde::Serialize;
use sqlx::FromRow;
use muse_core::types::{DbId, Timestamp};

/// A row from the `client_sessions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ClientSession {
    /// Client-generated opaque session identifier.
    pub id: String,
    pub user_id: DbId,
    pub last_seen_at: Timestamp,
}
