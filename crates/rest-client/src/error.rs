use thiserror::Error;

/// Errors from the generic REST layer.
#[derive(Debug, Error)]
pub enum RestError {
    /// Failed to construct the HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// Transport-level failure (DNS, TLS, timeout, connection reset).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status; `body` is the raw response text so callers
    /// can lift service-specific error payloads out of it.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Request was rate limited (HTTP 429).
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Response body did not parse as the expected type.
    #[error("parse error: {0}")]
    Parse(String),
}

impl RestError {
    /// Whether the request is worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::RateLimited { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
