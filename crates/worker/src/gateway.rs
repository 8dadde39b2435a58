//! HTTP client for the external generation API.

use std::time::Duration;

use serde::Deserialize;

use crate::dispatch::{DispatchReceipt, DispatchRequest, WorkerDispatch, WorkerError};
use crate::tools;

/// HTTP request timeout for a submission attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response returned by the worker API after accepting a task.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    /// Server-assigned identifier for the accepted task.
    task_id: String,
}

/// Production [`WorkerDispatch`] implementation over HTTP.
pub struct HttpWorkerGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpWorkerGateway {
    /// Create a gateway targeting the worker API.
    ///
    /// * `base_url` - e.g. `https://worker.example.com`, no trailing slash.
    /// * `api_key`  - bearer credential for the worker API.
    pub fn new(base_url: String, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl WorkerDispatch for HttpWorkerGateway {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReceipt, WorkerError> {
        let url = format!("{}{}", self.base_url, tools::endpoint_path(request.kind));
        let body = tools::build_payload(request);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| WorkerError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let parsed: SubmitResponse = response
                .json()
                .await
                .map_err(|e| WorkerError::Transient(format!("invalid submit response: {e}")))?;

            tracing::info!(
                job_id = request.job_id,
                kind = %request.kind,
                task_handle = %parsed.task_id,
                "Task submitted to worker",
            );

            return Ok(DispatchReceipt {
                task_handle: parsed.task_id,
            });
        }

        let text = response.text().await.unwrap_or_default();

        // 5xx and 429 are capacity problems on the worker side; anything
        // else in the 4xx range means the payload itself was refused.
        if status.is_server_error() || status.as_u16() == 429 {
            Err(WorkerError::Transient(format!("HTTP {status}: {text}")))
        } else {
            Err(WorkerError::Rejected(format!("HTTP {status}: {text}")))
        }
    }
}
