//! Mapping of request outcomes to HTTP responses.

use axum::extract::rejection::{BytesRejection, FailedToBufferBody};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::engine::EngineError;
use crate::metrics::Outcome;
use crate::validate::InvalidInput;

/// JSON error body.  `error` is stable for clients to match on; `message`
/// carries diagnostic detail when there is any.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    InvalidInput(#[from] InvalidInput),
    #[error("invalid JSON body: {0}")]
    InvalidJson(String),
    #[error("request too large: {0}")]
    TooLarge(String),
    #[error("request body unreadable: {0}")]
    Body(String),
    #[error("server is shutting down")]
    Draining,
    #[error("analysis failed: {0}")]
    Analysis(#[from] EngineError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) | ApiError::InvalidJson(_) | ApiError::Body(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Draining => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Analysis(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let (error, message) = match self {
            ApiError::InvalidInput(invalid) => (invalid.to_string(), None),
            ApiError::InvalidJson(detail) => ("Invalid JSON body".to_string(), Some(detail.clone())),
            ApiError::TooLarge(detail) => ("Request too large".to_string(), Some(detail.clone())),
            ApiError::Body(detail) => ("Invalid request body".to_string(), Some(detail.clone())),
            ApiError::Draining => (
                "Service Unavailable".to_string(),
                Some("Server is shutting down".to_string()),
            ),
            ApiError::Analysis(err) => (
                "Analysis failed".to_string(),
                Some(err.message().to_string()),
            ),
        };
        ErrorBody { error, message }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            ApiError::Draining => Outcome::Unavailable,
            ApiError::Analysis(_) => Outcome::EngineFailure,
            _ => Outcome::InvalidInput,
        }
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        match rejection {
            BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(err)) => {
                tracing::warn!(error = %err, "request body exceeded configured limit");
                ApiError::TooLarge(err.to_string())
            }
            other => ApiError::Body(other.body_text()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
