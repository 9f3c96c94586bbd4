//! Classified remote-API failures.

use thiserror::Error;

use crate::http::HttpError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// No API key is configured.
    #[error("No API key configured")]
    KeyMissing,

    /// 401: the key was rejected. Nothing else may run until the user
    /// supplies a new key.
    #[error("API key rejected by server")]
    CredentialRejected,

    /// 429: the limiter has been paused.
    #[error("Rate limited by server")]
    RateLimited,

    /// 422 on a mutation: the server refuses this payload for good.
    #[error("Server rejected payload: {message}")]
    PayloadRejected { message: String },

    /// Network failure, timeout, 5xx or any other unexpected status.
    #[error("Transient API failure: {message}")]
    Transient { message: String },

    /// A 2xx body that does not carry the expected envelope.
    #[error("Malformed API response: {message}")]
    MalformedEnvelope { message: String },
}

impl ApiError {
    #[inline]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            message: message.into(),
        }
    }

    #[inline]
    pub fn payload_rejected(message: impl Into<String>) -> Self {
        Self::PayloadRejected {
            message: message.into(),
        }
    }

    /// Whether another attempt of the same call could succeed.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Transient { .. })
    }

    /// Whether this failure should raise the sticky "API in error" flag.
    #[inline]
    pub fn marks_api_error(&self) -> bool {
        matches!(
            self,
            Self::CredentialRejected | Self::Transient { .. } | Self::MalformedEnvelope { .. }
        )
    }
}

impl From<HttpError> for ApiError {
    fn from(e: HttpError) -> Self {
        Self::transient(e.to_string())
    }
}

/// Result type for API calls.
pub type Result<T> = std::result::Result<T, ApiError>;
