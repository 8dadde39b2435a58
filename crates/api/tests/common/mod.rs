//! Shared helpers for API integration tests.
//!
//! Builds the full application router with the same middleware stack as
//! `main.rs`, but swaps the HTTP worker gateway for a scriptable stub so
//! dispatch outcomes are deterministic and offline.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, Response, StatusCode};
use axum::Router;
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use sha2::Sha256;
use sqlx::PgPool;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use muse_api::auth::jwt::{generate_access_token, JwtConfig};
use muse_api::config::ServerConfig;
use muse_api::engine::QueueManager;
use muse_api::routes;
use muse_api::state::AppState;
use muse_api::ws::WsManager;
use muse_core::types::DbId;
use muse_db::models::user::User;
use muse_db::repositories::UserRepo;
use muse_worker::{DispatchReceipt, DispatchRequest, WorkerDispatch, WorkerError};

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const JWT_SECRET: &str = "test-jwt-secret";
pub const MAX_RUNNING: i64 = 3;

// ---------------------------------------------------------------------------
// Worker stub
// ---------------------------------------------------------------------------

/// Scriptable dispatch outcome for the worker stub.
pub enum Scripted {
    Ok,
    Transient(&'static str),
    Rejected(&'static str),
}

/// In-memory [`WorkerDispatch`] double.
///
/// Unscripted dispatches succeed with a deterministic `task-{job_id}`
/// handle; scripted outcomes are consumed in dispatch order.
pub struct StubWorker {
    script: Mutex<VecDeque<Scripted>>,
    dispatched: Mutex<Vec<DbId>>,
}

impl StubWorker {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            dispatched: Mutex::new(Vec::new()),
        }
    }

    /// Queue an outcome for the next unscripted dispatch.
    pub fn script(&self, outcome: Scripted) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// Job ids dispatched so far, in order.
    pub fn dispatched(&self) -> Vec<DbId> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl WorkerDispatch for StubWorker {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReceipt, WorkerError> {
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Scripted::Ok);
        match outcome {
            Scripted::Ok => {
                self.dispatched.lock().unwrap().push(request.job_id);
                Ok(DispatchReceipt {
                    task_handle: format!("task-{}", request.job_id),
                })
            }
            Scripted::Transient(msg) => Err(WorkerError::Transient(msg.to_string())),
            Scripted::Rejected(msg) => Err(WorkerError::Rejected(msg.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// Everything a test needs to drive the app.
pub struct TestApp {
    pub router: Router,
    pub pool: PgPool,
    pub worker: Arc<StubWorker>,
    pub event_bus: Arc<muse_events::EventBus>,
    pub config: ServerConfig,
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        max_running_jobs: MAX_RUNNING,
        worker_api_url: "http://worker.invalid".to_string(),
        worker_api_key: "unused".to_string(),
        worker_webhook_secret: WEBHOOK_SECRET.to_string(),
        public_base_url: "http://localhost:3000".to_string(),
        session_ttl_secs: 120,
        session_reap_interval_secs: 60,
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
            access_token_expiry_mins: 60,
        },
    }
}

/// Build the full application router with all middleware layers, using the
/// given database pool and a stub worker.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack (CORS, request ID, timeout, tracing,
/// panic recovery) that production uses.
pub fn build_test_app(pool: PgPool) -> TestApp {
    let config = test_config();
    let ws_manager = Arc::new(WsManager::new());
    let event_bus = Arc::new(muse_events::EventBus::default());
    let worker = Arc::new(StubWorker::new());

    let queue = Arc::new(QueueManager::new(
        pool.clone(),
        Arc::clone(&worker) as Arc<dyn WorkerDispatch>,
        Arc::clone(&event_bus),
        config.max_running_jobs,
        config.public_base_url.clone(),
    ));

    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        ws_manager,
        event_bus: Arc::clone(&event_bus),
        queue,
    };

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    let router = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    TestApp {
        router,
        pool,
        worker,
        event_bus,
        config,
    }
}

// ---------------------------------------------------------------------------
// Users and tokens
// ---------------------------------------------------------------------------

/// Create a user with the given credit balance and mint a bearer token.
pub async fn user_with_credits(app: &TestApp, email: &str, credits: i64) -> (User, String) {
    let user = UserRepo::create(&app.pool, email, "tester", credits)
        .await
        .expect("create user");
    let token = generate_access_token(user.id, &app.config.jwt).expect("mint token");
    (user, token)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// Perform a GET request with optional bearer auth.
pub async fn get(app: &TestApp, path: &str, token: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(path);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    app.router
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Perform a POST request with a JSON body and optional bearer auth.
pub async fn post_json(
    app: &TestApp,
    path: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    app.router
        .clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

/// Perform a DELETE request with bearer auth.
pub async fn delete(app: &TestApp, path: &str, token: &str) -> Response<Body> {
    app.router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri(path)
                .header(AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
}

// ---------------------------------------------------------------------------
// Domain helpers
// ---------------------------------------------------------------------------

/// Submit a job and return `(status, body)`.
pub async fn submit_job(
    app: &TestApp,
    token: &str,
    kind: &str,
    session_id: &str,
) -> (StatusCode, serde_json::Value) {
    let response = post_json(
        app,
        "/api/v1/jobs",
        Some(token),
        serde_json::json!({
            "kind": kind,
            "session_id": session_id,
            "input_refs": ["assets/input-1.png"],
            "params": {},
        }),
    )
    .await;
    let status = response.status();
    (status, body_json(response).await)
}

/// Hex-encode an HMAC-SHA256 signature over the body.
pub fn sign(body: &str, secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body.as_bytes());
    mac.finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Deliver a signed worker webhook for a job. Returns `(status, body)`.
pub async fn deliver_webhook(
    app: &TestApp,
    job_id: DbId,
    payload: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let body = payload.to_string();
    let signature = sign(&body, WEBHOOK_SECRET);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(format!("/api/v1/webhooks/jobs/{job_id}"))
                .header(CONTENT_TYPE, "application/json")
                .header("x-worker-signature", signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    (status, body_json(response).await)
}

/// Success-callback payload for a job dispatched through the stub worker.
pub fn success_payload(job_id: DbId) -> serde_json::Value {
    serde_json::json!({
        "status": "success",
        "task_handle": format!("task-{job_id}"),
        "output_url": format!("https://cdn.example.com/outputs/{job_id}.png"),
    })
}

/// Failure-callback payload for a job dispatched through the stub worker.
pub fn failure_payload(job_id: DbId) -> serde_json::Value {
    serde_json::json!({
        "status": "failure",
        "task_handle": format!("task-{job_id}"),
        "error_code": "WORKER_FAILED",
        "error_message": "generation crashed",
    })
}

/// Fetch a job snapshot as its owner.
pub async fn job_snapshot(app: &TestApp, token: &str, job_id: DbId) -> serde_json::Value {
    let response = get(app, &format!("/api/v1/jobs/{job_id}"), Some(token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["data"].clone()
}

/// Fetch the global queue snapshot.
pub async fn queue_status(app: &TestApp, token: &str) -> serde_json::Value {
    let response = get(app, "/api/v1/queue", Some(token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["data"].clone()
}
