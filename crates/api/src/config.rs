use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Global concurrency cap: max jobs running at once, all kinds combined.
    pub max_running_jobs: i64,
    /// Base URL of the external generation worker API.
    pub worker_api_url: String,
    /// Bearer credential for the worker API.
    pub worker_api_key: String,
    /// Shared secret for verifying inbound worker webhook signatures.
    pub worker_webhook_secret: String,
    /// Public base URL of this server, used to build webhook callback URLs.
    pub public_base_url: String,
    /// A client session with no heartbeat for this long is considered gone.
    pub session_ttl_secs: u64,
    /// How often the session reaper sweeps for orphaned queued jobs.
    pub session_reap_interval_secs: u64,
    /// JWT token configuration.
    pub jwt: JwtConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                  |
    /// |-----------------------------|--------------------------|
    /// | `HOST`                      | `0.0.0.0`                |
    /// | `PORT`                      | `3000`                   |
    /// | `CORS_ORIGINS`              | `http://localhost:5173`  |
    /// | `REQUEST_TIMEOUT_SECS`      | `30`                     |
    /// | `QUEUE_MAX_RUNNING`         | `3`                      |
    /// | `WORKER_API_URL`            | `http://localhost:8700`  |
    /// | `WORKER_API_KEY`            | `dev-worker-key`         |
    /// | `WORKER_WEBHOOK_SECRET`     | `dev-webhook-secret`     |
    /// | `PUBLIC_BASE_URL`           | `http://localhost:3000`  |
    /// | `SESSION_TTL_SECS`          | `120`                    |
    /// | `SESSION_REAP_INTERVAL_SECS`| `60`                     |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let max_running_jobs: i64 = std::env::var("QUEUE_MAX_RUNNING")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("QUEUE_MAX_RUNNING must be a valid i64");

        let worker_api_url =
            std::env::var("WORKER_API_URL").unwrap_or_else(|_| "http://localhost:8700".into());

        let worker_api_key =
            std::env::var("WORKER_API_KEY").unwrap_or_else(|_| "dev-worker-key".into());

        let worker_webhook_secret = std::env::var("WORKER_WEBHOOK_SECRET")
            .unwrap_or_else(|_| "dev-webhook-secret".into());

        let public_base_url =
            std::env::var("PUBLIC_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".into());

        let session_ttl_secs: u64 = std::env::var("SESSION_TTL_SECS")
            .unwrap_or_else(|_| "120".into())
            .parse()
            .expect("SESSION_TTL_SECS must be a valid u64");

        let session_reap_interval_secs: u64 = std::env::var("SESSION_REAP_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("SESSION_REAP_INTERVAL_SECS must be a valid u64");

        let jwt = JwtConfig::from_env();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            max_running_jobs,
            worker_api_url,
            worker_api_key,
            worker_webhook_secret,
            public_base_url,
            session_ttl_secs,
            session_reap_interval_secs,
            jwt,
        }
    }
}
