use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported payment method: {0}")]
    UnsupportedPaymentMethod(String),

    #[error("Gateway is inactive: {0}")]
    GatewayInactive(String),

    #[error("Gateway is misconfigured: {0}")]
    GatewayMisconfigured(String),

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Gateway call failed: {0}")]
    GatewayCallFailed(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedPaymentMethod(_) => StatusCode::BAD_REQUEST,
            AppError::GatewayInactive(_) => StatusCode::BAD_REQUEST,
            AppError::GatewayMisconfigured(_) => StatusCode::BAD_REQUEST,
            AppError::InsufficientFunds => StatusCode::BAD_REQUEST,
            AppError::GatewayCallFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<crate::validation::ValidationError> for AppError {
    fn from(err: crate::validation::ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_status_code() {
        let error = AppError::Validation("amount must be greater than zero".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_insufficient_funds_status_code() {
        assert_eq!(
            AppError::InsufficientFunds.status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_gateway_inactive_status_code() {
        let error = AppError::GatewayInactive("voltpay".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unsupported_method_status_code() {
        let error = AppError::UnsupportedPaymentMethod("card".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_gateway_call_failed_status_code() {
        let error = AppError::GatewayCallFailed("connection refused".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_invalid_signature_status_code() {
        assert_eq!(
            AppError::InvalidSignature.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_not_found_status_code() {
        let error = AppError::NotFound("transaction not found".to_string());
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_database_error_status_code() {
        let error = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_insufficient_funds_response() {
        let response = AppError::InsufficientFunds.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_signature_response() {
        let response = AppError::InvalidSignature.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
