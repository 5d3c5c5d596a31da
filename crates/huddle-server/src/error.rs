use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use huddle_shared::error::{SessionError, TransitionError};
use huddle_store::StoreError;

use crate::media_store::MediaError;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// The entity's state forbids the operation.
    #[error("{0}")]
    Conflict(String),

    /// The caller lacks the role for the action.
    #[error("{0}")]
    Authorization(String),

    /// Missing, invalid or expired credential.
    #[error("{0}")]
    Authentication(String),

    /// Media, storage or signing failure.
    #[error("{0}")]
    Upstream(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Validation(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::Authorization(_) => StatusCode::FORBIDDEN,
            ServerError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ServerError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(column) => {
                ServerError::Conflict(format!("User with same {column} already exists"))
            }
            other => {
                tracing::error!(error = %other, "store failure");
                ServerError::Upstream("Storage error".to_string())
            }
        }
    }
}

impl From<MediaError> for ServerError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Empty | MediaError::TooLarge { .. } | MediaError::UnsupportedType => {
                ServerError::Validation(err.to_string())
            }
            MediaError::NotFound(_) => ServerError::NotFound(err.to_string()),
            MediaError::Io(_) => {
                tracing::error!(error = %err, "media store failure");
                ServerError::Upstream("Image upload failed".to_string())
            }
        }
    }
}

impl From<TransitionError> for ServerError {
    fn from(err: TransitionError) -> Self {
        ServerError::Conflict(err.to_string())
    }
}

impl From<SessionError> for ServerError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::ExpiryOutOfRange => {
                tracing::error!(error = %err, "session issuance failed");
                ServerError::Upstream("Session could not be issued".to_string())
            }
            other => ServerError::Authentication(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": {
                "status": status.as_u16(),
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
