use serde_json::Value;
use thiserror::Error;

/// Terminal outcome classification for one logical request.
///
/// The transient causes (`ServerError`, `NetworkError`, `Timeout`) are only
/// surfaced after the retry budget is exhausted; everything else settles on
/// first observation.
#[derive(Debug, Error)]
pub enum RequestError {
    /// 4xx-equivalent: caused by the caller, never retried. `detail` carries
    /// the server-provided JSON error payload when the body had one.
    #[error("client error {status}")]
    ClientError { status: u16, detail: Option<Value> },

    /// 5xx-equivalent on the final attempt.
    #[error("server error {status} after {attempts} attempts")]
    ServerError { status: u16, attempts: u32 },

    /// Transport-level failure on the final attempt.
    #[error("network error after {attempts} attempts: {source}")]
    NetworkError {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// No response within the per-attempt budget, retries exhausted.
    #[error("timed out after {attempts} attempts")]
    Timeout { attempts: u32 },

    /// Superseded by a newer request under the same key, or explicitly
    /// cancelled. Treat as "no answer", not "bad answer".
    #[error("request cancelled")]
    Cancelled,

    /// The descriptor path did not join onto the base URL.
    #[error("invalid request target {path:?}")]
    InvalidTarget { path: String },

    /// The request body was not JSON-serializable.
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    /// 2xx response whose body was not decodable JSON.
    #[error("failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),
}

impl RequestError {
    /// True for the causes the executor would have retried had budget
    /// remained. Useful for callers deciding whether to offer a manual retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RequestError::ServerError { .. }
                | RequestError::NetworkError { .. }
                | RequestError::Timeout { .. }
        )
    }

    /// True when the operation was superseded or cancelled rather than failed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RequestError::Cancelled)
    }
}
