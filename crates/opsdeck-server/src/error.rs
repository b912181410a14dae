//! Error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use opsdeck_core::{Error, GatewayError};
use serde::Serialize;
use thiserror::Error;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Unknown id.
    #[error("{0}")]
    NotFound(String),
    /// Operation not allowed in the current state.
    #[error("{0}")]
    Conflict(String),
    /// Request understood but rejected.
    #[error("{0}")]
    Unprocessable(String),
    /// The backing store rejected the work.
    #[error("{0}")]
    BadGateway(String),
    /// The backing store is unreachable or too slow, or the server is
    /// shutting down.
    #[error("{0}")]
    Unavailable(String),
    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

/// Error response body.
#[derive(Serialize)]
pub struct ErrorResponse {
    /// Error flag.
    pub error: bool,
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Unprocessable(_) => (StatusCode::UNPROCESSABLE_ENTITY, "UNPROCESSABLE"),
            AppError::BadGateway(_) => (StatusCode::BAD_GATEWAY, "BACKING_STORE_ERROR"),
            AppError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            error: true,
            code: code.to_string(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::NotFound { .. } => AppError::NotFound(message),
            Error::InvalidState { .. } | Error::Dependency { .. } => AppError::Conflict(message),
            Error::Validation(_) => AppError::Unprocessable(message),
            Error::Gateway(GatewayError::Timeout(_) | GatewayError::Connection(_))
            | Error::Cancelled => AppError::Unavailable(message),
            Error::Gateway(GatewayError::Execution(_) | GatewayError::Task(_)) => {
                AppError::BadGateway(message)
            }
            Error::Storage(_) | Error::Serialization(_) => AppError::Internal(message),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("operation task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn status_of(err: Error) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_core_error_mapping() {
        assert_eq!(
            status_of(Error::NotFound {
                kind: "migration",
                id: "mig_x".into()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(Error::Dependency {
                migration_id: "a".into(),
                dependency_id: "b".into(),
                status: "pending".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(Error::Validation("empty".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(GatewayError::Execution("syntax".into()).into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(GatewayError::Timeout(Duration::from_secs(1)).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
