use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::api::ErrorResponse;
use crate::services::{OptionsError, PortfolioError, RuleError, ValidationError};

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error(transparent)]
    Portfolio(#[from] PortfolioError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    /// HTTP status and stable error code.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Options(OptionsError::InvalidInput(_)) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            AppError::Options(OptionsError::IvConvergenceFailed(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "IV_CONVERGENCE_FAILED")
            }
            AppError::Portfolio(PortfolioError::DuplicatePosition(_)) => {
                (StatusCode::CONFLICT, "DUPLICATE_POSITION")
            }
            AppError::Portfolio(PortfolioError::PositionNotFound(_)) => {
                (StatusCode::NOT_FOUND, "POSITION_NOT_FOUND")
            }
            AppError::Portfolio(PortfolioError::InvalidInput(_)) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            AppError::Portfolio(PortfolioError::Pricing(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "PRICING_FAILED")
            }
            AppError::Rule(RuleError::RuleNotFound(_)) => (StatusCode::NOT_FOUND, "RULE_NOT_FOUND"),
            AppError::Rule(RuleError::Configuration(_)) => (StatusCode::BAD_REQUEST, "INVALID_RULE"),
            AppError::Validation(ValidationError::InvalidInput(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT")
            }
            AppError::Anyhow(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = AppError::from(PortfolioError::PositionNotFound("p1".to_string()));
        assert_eq!(err.status_and_code(), (StatusCode::NOT_FOUND, "POSITION_NOT_FOUND"));

        let err = AppError::from(OptionsError::InvalidInput("strike".to_string()));
        assert_eq!(err.status_and_code(), (StatusCode::BAD_REQUEST, "INVALID_INPUT"));
        assert_eq!(err.to_string(), "Invalid input: strike");

        let err = AppError::from(RuleError::RuleNotFound("x".to_string()));
        assert_eq!(err.status_and_code().0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_response_status() {
        let response = AppError::BadRequest("missing symbol".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
