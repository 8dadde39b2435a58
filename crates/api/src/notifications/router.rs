//! Routes job lifecycle events from the event bus to the submitting
//! user's WebSocket connections.
//!
//! Push delivery is best-effort by design: a user with no open connection
//! simply misses the frame, and the lifecycle controller's reconciliation
//! poll picks the transition up instead.

use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::broadcast;
use muse_core::job_events::{
    MSG_TYPE_JOB_CANCELLED, MSG_TYPE_JOB_COMPLETED, MSG_TYPE_JOB_FAILED, MSG_TYPE_JOB_QUEUED,
    MSG_TYPE_JOB_STARTED,
};
use muse_events::PlatformEvent;

use crate::engine::notify;
use crate::ws::WsManager;

/// Routes platform events to user-scoped WebSocket pushes.
pub struct NotificationRouter {
    ws_manager: Arc<WsManager>,
}

impl NotificationRouter {
    /// Create a new router over the given WebSocket manager.
    pub fn new(ws_manager: Arc<WsManager>) -> Self {
        Self { ws_manager }
    }

    /// Run the main routing loop.
    ///
    /// Subscribes to the event bus via `receiver` and processes each event.
    /// The loop exits when the channel is closed (i.e. the
    /// [`EventBus`](muse_events::EventBus) is dropped).
    pub async fn run(self, mut receiver: broadcast::Receiver<PlatformEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.route_event(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notification router lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, notification router shutting down");
                    break;
                }
            }
        }
    }

    /// Push a single event to the submitting user, if it is a job event.
    async fn route_event(&self, event: &PlatformEvent) {
        let Some(msg_type) = message_type_for(&event.event_type) else {
            return;
        };
        let Some(user_id) = event.actor_user_id else {
            return;
        };

        let msg = serde_json::json!({
            "type": msg_type,
            "job": event.payload,
            "timestamp": event.timestamp,
        });

        let sent = self
            .ws_manager
            .send_to_user(user_id, Message::Text(msg.to_string().into()))
            .await;

        tracing::debug!(
            event_type = %event.event_type,
            user_id,
            connections = sent,
            "Job event routed",
        );
    }
}

/// Map a bus event type to its WebSocket message type.
fn message_type_for(event_type: &str) -> Option<&'static str> {
    match event_type {
        notify::JOB_QUEUED => Some(MSG_TYPE_JOB_QUEUED),
        notify::JOB_STARTED => Some(MSG_TYPE_JOB_STARTED),
        notify::JOB_COMPLETED => Some(MSG_TYPE_JOB_COMPLETED),
        notify::JOB_FAILED => Some(MSG_TYPE_JOB_FAILED),
        notify::JOB_CANCELLED => Some(MSG_TYPE_JOB_CANCELLED),
        _ => None,
    }
}
