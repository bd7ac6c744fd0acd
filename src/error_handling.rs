use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::chain_client::ChainError;
use crate::platform_store::{OutcomeKind, StoreOutcome};

/// Errors surfaced by the HTTP layer. Store operations never land here;
/// the façade folds those into `StoreOutcome` instead.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Chain(#[from] ChainError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// JSON error body. `success` is always false so clients can branch on the
/// same field for every response in the API.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            success: false,
            error: message.to_string(),
            code: code.to_string(),
        }
    }
}

impl ApiError {
    pub fn to_status_code(&self) -> StatusCode {
        match self {
            ApiError::Chain(ChainError::InvalidAddress(_)) => StatusCode::BAD_REQUEST,
            ApiError::Chain(_) => StatusCode::BAD_GATEWAY,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &str {
        match self {
            ApiError::Chain(ChainError::InvalidAddress(_)) => "invalid_address",
            ApiError::Chain(_) => "chain_unavailable",
            ApiError::Validation(_) => "validation_error",
            ApiError::NotFound(_) => "not_found",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.to_status_code();
        let body = ErrorResponse::new(self.error_code(), &self.to_string());
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub fn validation_error(message: impl Into<String>) -> ApiError {
    ApiError::Validation(message.into())
}

pub fn not_found(resource: impl Into<String>) -> ApiError {
    ApiError::NotFound(resource.into())
}

pub fn internal_error(message: impl Into<String>) -> ApiError {
    ApiError::Internal(message.into())
}

/// HTTP status for a façade outcome. Offline successes are still 200;
/// `success: false` is never served with a 2xx status.
pub fn outcome_status(kind: OutcomeKind) -> StatusCode {
    match kind {
        OutcomeKind::Success => StatusCode::OK,
        OutcomeKind::InvalidInput => StatusCode::BAD_REQUEST,
        OutcomeKind::NotFound => StatusCode::NOT_FOUND,
        OutcomeKind::Offline => StatusCode::SERVICE_UNAVAILABLE,
        OutcomeKind::StoreFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Serializes a façade outcome as-is with the matching status code.
pub fn outcome_response<T: Serialize>(outcome: StoreOutcome<T>) -> Response {
    let status = outcome_status(outcome.kind);
    (status, Json(outcome)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_to_status_code() {
        assert_eq!(
            ApiError::Validation("test".to_string()).to_status_code(),
            StatusCode::BAD_REQUEST
        );

        assert_eq!(
            ApiError::NotFound("User".to_string()).to_status_code(),
            StatusCode::NOT_FOUND
        );

        assert_eq!(
            ApiError::Chain(ChainError::NetworkError("down".to_string())).to_status_code(),
            StatusCode::BAD_GATEWAY
        );

        assert_eq!(
            ApiError::Chain(ChainError::InvalidAddress("0x12".to_string())).to_status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_error_code() {
        assert_eq!(
            ApiError::Validation("test".to_string()).error_code(),
            "validation_error"
        );
        assert_eq!(
            ApiError::Chain(ChainError::RpcError("boom".to_string())).error_code(),
            "chain_unavailable"
        );
    }

    #[test]
    fn test_outcome_status_mapping() {
        assert_eq!(outcome_status(OutcomeKind::Success), StatusCode::OK);
        assert_eq!(outcome_status(OutcomeKind::InvalidInput), StatusCode::BAD_REQUEST);
        assert_eq!(outcome_status(OutcomeKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            outcome_status(OutcomeKind::Offline),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            outcome_status(OutcomeKind::StoreFailure),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_offline_failure_response_is_503() {
        let response = outcome_response(StoreOutcome::<u32>::offline_failure());
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = outcome_response(StoreOutcome::ok(7));
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_helper_functions() {
        let err = validation_error("Invalid input");
        assert!(matches!(err, ApiError::Validation(_)));

        let err = not_found("User");
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(err.to_string(), "User not found");

        let err = internal_error("state poisoned");
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
