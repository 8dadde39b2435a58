//! Repository for the `events` table.

use sqlx::PgPool;
use muse_core::types::DbId;

use crate::models::event::EventRow;

const COLUMNS: &str =
    "id, event_type, source_entity_type, source_entity_id, actor_user_id, payload, created_at";

/// Provides durable event persistence.
pub struct EventRepo;

impl EventRepo {
    /// Insert an event row, returning its ID.
    pub async fn insert(
        pool: &PgPool,
        event_type: &str,
        source_entity_type: Option<&str>,
        source_entity_id: Option<DbId>,
        actor_user_id: Option<DbId>,
        payload: &serde_json::Value,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO events \
                 (event_type, source_entity_type, source_entity_id, actor_user_id, payload) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id",
        )
        .bind(event_type)
        .bind(source_entity_type)
        .bind(source_entity_id)
        .bind(actor_user_id)
        .bind(payload)
        .fetch_one(pool)
        .await
    }

    /// Most recent events, newest first.
    pub async fn list_recent(pool: &PgPool, limit: i64) -> Result<Vec<EventRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM events ORDER BY id DESC LIMIT $1");
        sqlx::query_as::<_, EventRow>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
