pub mod health;
pub mod options;
pub mod portfolio;
pub mod risk;

use crate::AppState;
use axum::Router;
use serde::Serialize;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/options", options::router())
        .nest("/api/portfolio", portfolio::router())
        .nest("/api/risk", risk::router())
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}
