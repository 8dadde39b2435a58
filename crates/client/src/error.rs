//! Controller-side error taxonomy.

/// Errors surfaced by the lifecycle controller.
///
/// The admission guards (`NotLogged`, `ActiveJob`, `InsufficientCredits`)
/// fire before anything is created server-side and each carries what the
/// UI needs for a specific call to action. `Timeout` is synthesized
/// locally and does not reflect (or change) server state.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// The caller has no valid credentials.
    #[error("not logged in")]
    NotLogged,

    /// Another submission from this controller instance is in flight.
    #[error("a submission is already in progress")]
    Busy,

    /// The user already has a queued or running job.
    #[error("an active {kind} job ({status}, {age_seconds}s old) already exists")]
    ActiveJob {
        kind: String,
        status: String,
        age_seconds: i64,
    },

    /// The credit balance does not cover this tool's cost.
    #[error("insufficient credits: need {required}, have {balance}")]
    InsufficientCredits { required: i32, balance: i64 },

    /// Input assets could not be persisted to storage.
    #[error("upload failed: {0}")]
    Upload(String),

    /// The server rejected a request with a wire error code.
    #[error("server error {code}: {message}")]
    Api { code: String, message: String },

    /// A request could not reach the server.
    #[error("network error: {0}")]
    Network(String),

    /// The local wall-clock budget elapsed before a terminal state was
    /// observed. The server-side job is left untouched.
    #[error("job timed out")]
    Timeout,
}
