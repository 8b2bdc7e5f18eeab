//! Stock API error types.

use thiserror::Error;

/// Errors from the stock REST API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Base URL or request parameters were invalid.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request never produced a response (DNS, connect, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// Server rejected the access token.
    #[error("authentication failed")]
    Unauthorized,

    /// Resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Server returned any other non-success status.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error detail from the response body.
        message: String,
    },

    /// Response body did not match the expected shape.
    #[error("JSON parsing error: {0}")]
    JsonParse(String),
}

impl ApiError {
    /// Whether retrying the same request might succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => matches!(*status, 408 | 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonParse(err.to_string())
    }
}
