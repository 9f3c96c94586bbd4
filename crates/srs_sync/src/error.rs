//! Crate-level error type.

use sea_orm::DbErr;
use thiserror::Error;

use crate::api::ApiError;
use crate::entity::task_kind::TaskKind;
use crate::srs::SrsError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Srs(#[from] SrsError),

    /// A stored payload could not be decoded for its kind.
    #[error("Invalid {kind} payload: {message}")]
    InvalidPayload { kind: TaskKind, message: String },

    /// A stored record carries a tag this build does not know.
    #[error("Unknown task kind: {0}")]
    UnknownTaskKind(String),
}

impl SyncError {
    pub fn invalid_payload(kind: TaskKind, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            kind,
            message: message.into(),
        }
    }

    /// Whether running the same task again could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api(e) => !matches!(e, ApiError::PayloadRejected { .. }),
            Self::Database(_) => true,
            Self::Json(_) | Self::Srs(_) | Self::InvalidPayload { .. } | Self::UnknownTaskKind(_) => {
                false
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
