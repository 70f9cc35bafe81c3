//! Remote API error types.

use thiserror::Error;

/// Result type for remote API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors that can occur talking to the remote server.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connectivity, timeout, TLS).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Missing or rejected auth token.
    #[error("unauthorized: missing or invalid token")]
    Unauthorized,

    /// Response or event payload could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Server returned an error status.
    #[error("server error: {status} {message}")]
    Api { status: u16, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::Api {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "server error: 503 unavailable");
    }
}
