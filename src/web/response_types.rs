//! # Web API Error Types
//!
//! Errors returned by the HTTP handlers and their response mapping. Every error
//! body has the shape `{"error": {"code": ..., "message": ...}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::error::{AdmissionError, OrchestratorError};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found: {message}")]
    NotFound { message: String },

    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Quota exceeded: {message}")]
    QuotaExceeded { message: String },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("JSON serialization/deserialization error: {message}")]
    JsonError { message: String },

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest { .. } | Self::JsonError { .. } => StatusCode::BAD_REQUEST,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::Conflict { .. } => "DUPLICATE_SESSION",
            Self::QuotaExceeded { .. } => "INSUFFICIENT_QUOTA",
            Self::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::JsonError { .. } => "JSON_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::NotFound { message }
            | Self::BadRequest { message }
            | Self::Conflict { message }
            | Self::QuotaExceeded { message }
            | Self::ServiceUnavailable { message }
            | Self::JsonError { message } => message.clone(),
            Self::Internal => "Internal server error".to_string(),
        };

        let error_response = json!({
            "error": {
                "code": self.code(),
                "message": message
            }
        });

        (self.status_code(), Json(error_response)).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Validation(message) => Self::BadRequest { message },
            OrchestratorError::NotFound(id) => Self::not_found(format!("job {id}")),
            OrchestratorError::DuplicateSession(id) => Self::Conflict {
                message: format!("session {id} already exists"),
            },
            OrchestratorError::Admission(admission @ AdmissionError::InsufficientQuota { .. }) => {
                Self::QuotaExceeded {
                    message: admission.to_string(),
                }
            }
            OrchestratorError::Admission(admission) => Self::ServiceUnavailable {
                message: admission.to_string(),
            },
            OrchestratorError::Parse(message) => Self::JsonError { message },
            other => {
                error!(error = %other, "Request failed");
                Self::Internal
            }
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError {
            message: err.to_string(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orchestrator_errors_map_to_status_codes() {
        let cases = [
            (OrchestratorError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (OrchestratorError::NotFound("s".into()), StatusCode::NOT_FOUND),
            (OrchestratorError::DuplicateSession("s".into()), StatusCode::CONFLICT),
            (
                AdmissionError::InsufficientQuota { requested: 5 }.into(),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (AdmissionError::NoWorkers.into(), StatusCode::SERVICE_UNAVAILABLE),
            (AdmissionError::NoCredentials.into(), StatusCode::SERVICE_UNAVAILABLE),
            (
                OrchestratorError::Transport("refused".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }
}
