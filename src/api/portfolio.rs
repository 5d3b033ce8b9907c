//! Portfolio API
//!
//! Positions:
//! - GET /api/portfolio/positions - List open positions
//! - POST /api/portfolio/positions - Open a position (pre-trade validated)
//! - DELETE /api/portfolio/positions/:id - Close a position
//!
//! Aggregates:
//! - GET /api/portfolio/greeks - Portfolio Greeks
//! - GET /api/portfolio/risk - Exposure and Greek-based risk

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::ApiResponse;
use crate::error::{AppError, Result};
use crate::services::ClosedPosition;
use crate::types::{
    years_to_expiration, OptionContract, OptionPosition, OptionType, OrderCheck, PortfolioGreeks,
    PortfolioRisk, PositionSide, ValidationResult,
};
use crate::AppState;

/// Create portfolio router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/positions", get(list_positions).post(open_position))
        .route("/positions/:id", delete(close_position))
        .route("/greeks", get(get_greeks))
        .route("/risk", get(get_risk))
}

// =============================================================================
// Positions
// =============================================================================

/// GET /api/portfolio/positions
async fn list_positions(State(state): State<AppState>) -> Json<ApiResponse<Vec<OptionPosition>>> {
    Json(ApiResponse::new(state.portfolio.positions()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPositionRequest {
    pub underlying_symbol: String,
    pub option_type: OptionType,
    pub strike: f64,
    pub expiration: NaiveDate,
    pub side: PositionSide,
    pub quantity: u32,
    /// Fill premium; defaults to the theoretical price
    pub entry_price: Option<f64>,
    /// Defaults to the simulated quote
    pub underlying_price: Option<f64>,
    /// Defaults to the smile-adjusted base IV
    pub implied_volatility: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPositionResponse {
    /// Present only when the order passed validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<OptionPosition>,
    pub validation: ValidationResult,
}

/// POST /api/portfolio/positions
///
/// Prices the contract, runs the pre-trade validator against the current
/// balance, and opens the position only if approved.
async fn open_position(
    State(state): State<AppState>,
    Json(request): Json<OpenPositionRequest>,
) -> Result<Json<ApiResponse<OpenPositionResponse>>> {
    if request.quantity == 0 {
        return Err(AppError::BadRequest("quantity must be positive".to_string()));
    }
    let symbol = request.underlying_symbol.trim().to_uppercase();
    let underlying_price = request
        .underlying_price
        .or_else(|| state.market.price(&symbol))
        .ok_or_else(|| AppError::NotFound(format!("no quote for {}", symbol)))?;

    let as_of = Utc::now();
    let iv = request.implied_volatility.unwrap_or_else(|| {
        state
            .chains
            .implied_volatility_for(underlying_price, request.strike, state.chains.config().base_iv)
    });
    let time_years = years_to_expiration(request.expiration, as_of);
    let analysis = state
        .options
        .analyze(underlying_price, request.strike, time_years, iv, request.option_type)?;

    let contract = OptionContract::new(symbol, request.option_type, request.strike, request.expiration)
        .with_analysis(analysis, iv);
    let entry_price = request.entry_price.unwrap_or(analysis.theoretical_price);

    let mut position = OptionPosition::new(&contract, request.side, request.quantity, entry_price);
    position.underlying_price = underlying_price;

    let order = OrderCheck::new(&position.contract_symbol, position.units(), entry_price);
    let validation = state.validator.validate_order(&order, state.portfolio.balance())?;
    if !validation.valid {
        return Ok(Json(ApiResponse::new(OpenPositionResponse {
            position: None,
            validation,
        })));
    }

    state.portfolio.add_position(position.clone())?;
    info!(
        "Opened position {} {} x{}",
        position.id, position.contract_symbol, position.quantity
    );

    Ok(Json(ApiResponse::new(OpenPositionResponse {
        position: Some(position),
        validation,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ClosePositionQuery {
    pub price: Option<f64>,
}

/// DELETE /api/portfolio/positions/:id?price=
async fn close_position(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ClosePositionQuery>,
) -> Result<Json<ApiResponse<ClosedPosition>>> {
    let closed = state.portfolio.close_position(&id, query.price)?;
    Ok(Json(ApiResponse::new(closed)))
}

// =============================================================================
// Aggregates
// =============================================================================

/// GET /api/portfolio/greeks
async fn get_greeks(State(state): State<AppState>) -> Json<ApiResponse<PortfolioGreeks>> {
    Json(ApiResponse::new(state.portfolio.portfolio_greeks()))
}

/// GET /api/portfolio/risk
async fn get_risk(State(state): State<AppState>) -> Json<ApiResponse<PortfolioRisk>> {
    Json(ApiResponse::new(state.portfolio.current_risk()))
}
