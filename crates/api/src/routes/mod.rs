pub mod health;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                          job-update push channel (token query param)
///
/// /jobs                        submit (POST), history (GET)
/// /jobs/active                 the caller's queued-or-running job (GET)
/// /jobs/{id}                   job snapshot, reconciliation poll (GET)
/// /jobs/{id}/cancel            cancel a queued job (POST)
///
/// /queue                       global queue snapshot (GET)
/// /queue/admission             side-effect-free admission check (GET)
///
/// /account                     credit balance snapshot (GET)
///
/// /sessions/heartbeat          session liveness (POST)
/// /sessions/{id}               explicit teardown (DELETE)
///
/// /webhooks/jobs/{id}          worker completion callback (POST, signed)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route(
            "/jobs",
            post(handlers::jobs::submit_job).get(handlers::jobs::list_jobs),
        )
        .route("/jobs/active", get(handlers::jobs::get_active_job))
        .route("/jobs/{id}", get(handlers::jobs::get_job))
        .route("/jobs/{id}/cancel", post(handlers::jobs::cancel_job))
        .route("/queue", get(handlers::queue::get_queue_status))
        .route("/queue/admission", get(handlers::queue::check_admission))
        .route("/account", get(handlers::account::get_account))
        .route("/sessions/heartbeat", post(handlers::sessions::heartbeat))
        .route("/sessions/{id}", delete(handlers::sessions::teardown))
        .route(
            "/webhooks/jobs/{id}",
            post(handlers::webhooks::worker_callback),
        )
}
