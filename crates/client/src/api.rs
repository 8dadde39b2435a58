//! Client-side view of the admission/poll/cancel API surface.
//!
//! [`JobApi`] is a seam: production uses [`HttpJobApi`] over reqwest,
//! controller tests substitute an in-memory fake. Every method maps 1:1
//! to a server endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use muse_core::job_events::JobUpdate;
use muse_core::types::DbId;
use muse_core::JobKind;

use crate::push;

/// Error from an API call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server answered with a wire error code.
    #[error("{code}: {message}")]
    Server { code: String, message: String },

    /// The request never produced a server answer.
    #[error("transport error: {0}")]
    Transport(String),
}

/// GET /account response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountSnapshot {
    pub user_id: DbId,
    pub display_name: String,
    pub credit_balance: i64,
}

/// GET /jobs/active response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ActiveJob {
    pub job_id: DbId,
    pub kind: String,
    pub status: String,
    pub age_seconds: i64,
    pub position: Option<i32>,
}

/// POST /jobs request body.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    pub kind: JobKind,
    pub session_id: String,
    pub input_refs: serde_json::Value,
    pub params: serde_json::Value,
}

/// POST /jobs response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub job_id: DbId,
    pub kind: JobKind,
    pub status: String,
    pub position: Option<i32>,
    pub total_queued: Option<i64>,
    pub credit_cost: i32,
}

/// The server surface the lifecycle controller drives.
#[async_trait]
pub trait JobApi: Send + Sync {
    async fn account(&self) -> Result<AccountSnapshot, ApiError>;

    async fn active_job(&self) -> Result<Option<ActiveJob>, ApiError>;

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, ApiError>;

    /// Current job snapshot; the reconciliation poll endpoint.
    async fn job(&self, job_id: DbId) -> Result<JobUpdate, ApiError>;

    async fn cancel(&self, job_id: DbId) -> Result<JobUpdate, ApiError>;

    /// Subscribe to push updates scoped to one job.
    ///
    /// Delivery is best-effort; the receiver closing early is not an
    /// error (the poll covers the gap).
    async fn subscribe(&self, job_id: DbId)
        -> Result<mpsc::UnboundedReceiver<JobUpdate>, ApiError>;

    /// Record session liveness so the server-side reaper leaves this
    /// session's queued jobs alone.
    async fn heartbeat(&self, session_id: &str) -> Result<(), ApiError>;

    /// Fire-and-forget session teardown (page close).
    async fn teardown_session(&self, session_id: &str) -> Result<(), ApiError>;
}

/// Production [`JobApi`] over HTTP + WebSocket.
pub struct HttpJobApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpJobApi {
    /// * `base_url` - e.g. `https://api.example.com`, no trailing slash.
    /// * `token`    - bearer access token for the platform API.
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    /// Unwrap the `{ "data": ... }` envelope or surface the wire error.
    async fn read_data<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if status.is_success() {
            serde_json::from_value(body["data"].clone())
                .map_err(|e| ApiError::Transport(format!("unexpected response shape: {e}")))
        } else {
            Err(ApiError::Server {
                code: body["code"].as_str().unwrap_or("UNKNOWN").to_string(),
                message: body["error"].as_str().unwrap_or("unknown error").to_string(),
            })
        }
    }
}

#[async_trait]
impl JobApi for HttpJobApi {
    async fn account(&self) -> Result<AccountSnapshot, ApiError> {
        let response = self
            .client
            .get(self.url("/account"))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Self::read_data(response).await
    }

    async fn active_job(&self) -> Result<Option<ActiveJob>, ApiError> {
        let response = self
            .client
            .get(self.url("/jobs/active"))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Self::read_data(response).await
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, ApiError> {
        let response = self
            .client
            .post(self.url("/jobs"))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Self::read_data(response).await
    }

    async fn job(&self, job_id: DbId) -> Result<JobUpdate, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/jobs/{job_id}")))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Self::read_data(response).await
    }

    async fn cancel(&self, job_id: DbId) -> Result<JobUpdate, ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/jobs/{job_id}/cancel")))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Self::read_data(response).await
    }

    async fn subscribe(
        &self,
        job_id: DbId,
    ) -> Result<mpsc::UnboundedReceiver<JobUpdate>, ApiError> {
        push::subscribe(&self.base_url, &self.token, job_id)
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))
    }

    async fn heartbeat(&self, session_id: &str) -> Result<(), ApiError> {
        self.client
            .post(self.url("/sessions/heartbeat"))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "session_id": session_id }))
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn teardown_session(&self, session_id: &str) -> Result<(), ApiError> {
        self.client
            .delete(self.url(&format!("/sessions/{session_id}")))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(())
    }
}
