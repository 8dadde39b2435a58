use std::sync::Arc;

use crate::config::ServerConfig;
use crate::engine::QueueManager;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: muse_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
    /// Centralized event bus for publishing platform events.
    pub event_bus: Arc<muse_events::EventBus>,
    /// Job admission and scheduling coordinator.
    pub queue: Arc<QueueManager>,
}
