//! Upstream API error classification.

use reqwest::StatusCode;
use thiserror::Error;

use crate::domain::errors::DomainError;

/// Errors from the upstream Onstaq REST surface.
///
/// Classification drives retry behavior: transient errors (429, 5xx,
/// network) are retried with backoff, permanent errors are not.
#[derive(Debug, Clone, Error)]
pub enum OnstaqApiError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("server error {0}: {1}")]
    ServerError(StatusCode, String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl OnstaqApiError {
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::AuthFailed(body),
            StatusCode::NOT_FOUND => Self::NotFound(body),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Self::BadRequest(body),
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimitExceeded,
            s if s.is_server_error() => Self::ServerError(s, body),
            s => Self::UnexpectedResponse(format!("{s}: {body}")),
        }
    }

    /// Retry on rate limits, server errors, and network failures.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded | Self::ServerError(_, _) | Self::NetworkError(_)
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthFailed(_))
    }
}

impl From<reqwest::Error> for OnstaqApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::NetworkError(err.to_string())
    }
}

impl From<OnstaqApiError> for DomainError {
    fn from(err: OnstaqApiError) -> Self {
        match err {
            OnstaqApiError::AuthFailed(msg) => DomainError::UpstreamAuthFailed(msg),
            OnstaqApiError::NotFound(msg) => DomainError::ItemNotFound(msg),
            other => DomainError::UpstreamError(other.to_string()),
        }
    }
}
