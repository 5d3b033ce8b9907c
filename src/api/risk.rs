//! Risk API
//!
//! Account:
//! - GET /api/risk/snapshot - Current account risk snapshot
//! - POST /api/risk/evaluate - Run the rule engine and log fired alerts
//!
//! Alerts:
//! - GET /api/risk/alerts - List alerts (optional ?limit, newest first)
//! - POST /api/risk/alerts/:id/ack - Acknowledge an alert
//! - DELETE /api/risk/alerts - Clear the log
//!
//! Rules:
//! - GET /api/risk/rules - List rules
//! - PUT /api/risk/rules/:id - Enable or disable a rule
//!
//! Validation:
//! - POST /api/risk/validate - Validate a single order
//! - POST /api/risk/validate-strategy - Validate a multi-leg strategy
//! - POST /api/risk/optimal-size - Size for risk-per-trade

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::ApiResponse;
use crate::error::{AppError, Result};
use crate::types::{
    AccountRiskSnapshot, Alert, OrderCheck, RuleSummary, StrategyOrder, StrategyValidation,
    ValidationResult,
};
use crate::AppState;

/// Create risk router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/snapshot", get(get_snapshot))
        .route("/evaluate", post(evaluate))
        .route("/alerts", get(list_alerts).delete(clear_alerts))
        .route("/alerts/:id/ack", post(acknowledge_alert))
        .route("/rules", get(list_rules))
        .route("/rules/:id", put(update_rule))
        .route("/validate", post(validate_order))
        .route("/validate-strategy", post(validate_strategy))
        .route("/optimal-size", post(optimal_size))
}

// =============================================================================
// Account
// =============================================================================

/// GET /api/risk/snapshot
async fn get_snapshot(State(state): State<AppState>) -> Json<ApiResponse<AccountRiskSnapshot>> {
    Json(ApiResponse::new(state.risk.snapshot()))
}

/// POST /api/risk/evaluate
async fn evaluate(State(state): State<AppState>) -> Json<ApiResponse<Vec<Alert>>> {
    Json(ApiResponse::new(state.risk.evaluate()))
}

// =============================================================================
// Alerts
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    pub limit: Option<usize>,
}

/// GET /api/risk/alerts
async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> Json<ApiResponse<Vec<Alert>>> {
    let alerts = match query.limit {
        Some(limit) => state.risk.alerts().recent(limit),
        None => state.risk.alerts().alerts(),
    };
    Json(ApiResponse::new(alerts))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeResponse {
    pub id: String,
    pub acknowledged: bool,
}

/// POST /api/risk/alerts/:id/ack
async fn acknowledge_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AcknowledgeResponse>>> {
    if !state.risk.alerts().acknowledge(&id) {
        return Err(AppError::NotFound(format!("alert {}", id)));
    }
    Ok(Json(ApiResponse::new(AcknowledgeResponse { id, acknowledged: true })))
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: usize,
}

/// DELETE /api/risk/alerts
async fn clear_alerts(State(state): State<AppState>) -> Json<ApiResponse<ClearResponse>> {
    let cleared = state.risk.alerts().len();
    state.risk.alerts().clear();
    Json(ApiResponse::new(ClearResponse { cleared }))
}

// =============================================================================
// Rules
// =============================================================================

/// GET /api/risk/rules
async fn list_rules(State(state): State<AppState>) -> Json<ApiResponse<Vec<RuleSummary>>> {
    Json(ApiResponse::new(state.risk.rules().rules()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRuleRequest {
    pub enabled: bool,
}

/// PUT /api/risk/rules/:id
async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateRuleRequest>,
) -> Result<Json<ApiResponse<RuleSummary>>> {
    let summary = state.risk.rules().set_enabled(&id, request.enabled)?;
    Ok(Json(ApiResponse::new(summary)))
}

// =============================================================================
// Validation
// =============================================================================

/// POST /api/risk/validate
async fn validate_order(
    State(state): State<AppState>,
    Json(order): Json<OrderCheck>,
) -> Result<Json<ApiResponse<ValidationResult>>> {
    let result = state.validator.validate_order(&order, state.portfolio.balance())?;
    Ok(Json(ApiResponse::new(result)))
}

/// POST /api/risk/validate-strategy
async fn validate_strategy(
    State(state): State<AppState>,
    Json(strategy): Json<StrategyOrder>,
) -> Result<Json<ApiResponse<StrategyValidation>>> {
    let result = state.validator.validate_strategy(&strategy, state.portfolio.balance())?;
    Ok(Json(ApiResponse::new(result)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimalSizeRequest {
    pub entry_price: f64,
    pub stop_loss: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimalSizeResponse {
    pub size: f64,
    pub balance: f64,
    pub risk_per_trade: f64,
}

/// POST /api/risk/optimal-size
async fn optimal_size(
    State(state): State<AppState>,
    Json(request): Json<OptimalSizeRequest>,
) -> Result<Json<ApiResponse<OptimalSizeResponse>>> {
    let balance = state.portfolio.balance();
    let size = state
        .validator
        .optimal_size(balance, request.entry_price, request.stop_loss)?;
    Ok(Json(ApiResponse::new(OptimalSizeResponse {
        size,
        balance,
        risk_per_trade: state.validator.limits().risk_per_trade,
    })))
}
