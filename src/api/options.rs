//! Options API
//!
//! - GET /api/options/chain - Generate a simulated chain
//! - POST /api/options/price - Price and Greeks for one contract
//! - POST /api/options/iv - Implied volatility from a market premium

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::api::ApiResponse;
use crate::error::{AppError, Result};
use crate::types::{years_to_expiration, OptionAnalysis, OptionType, OptionsChain};
use crate::AppState;

/// Days to expiration used when a chain request names none.
const DEFAULT_EXPIRATION_DAYS: u64 = 30;

/// Create options router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chain", get(get_chain))
        .route("/price", post(price_option))
        .route("/iv", post(implied_volatility))
}

/// Time to expiration from either an explicit year fraction or a date.
fn resolve_time(time_years: Option<f64>, expiration: Option<NaiveDate>, as_of: DateTime<Utc>) -> Result<f64> {
    match (time_years, expiration) {
        (Some(t), _) => Ok(t),
        (None, Some(date)) => Ok(years_to_expiration(date, as_of)),
        (None, None) => Err(AppError::BadRequest(
            "either timeYears or expiration is required".to_string(),
        )),
    }
}

// =============================================================================
// Chain
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ChainQuery {
    pub symbol: String,
    /// Underlying price; defaults to the simulated quote
    pub price: Option<f64>,
    pub expiration: Option<NaiveDate>,
    /// ATM implied volatility override
    pub iv: Option<f64>,
}

/// GET /api/options/chain?symbol=AAPL&price=192.85&expiration=2025-01-17
async fn get_chain(
    State(state): State<AppState>,
    Query(query): Query<ChainQuery>,
) -> Result<Json<ApiResponse<OptionsChain>>> {
    let price = query
        .price
        .or_else(|| state.market.price(&query.symbol))
        .ok_or_else(|| AppError::NotFound(format!("no quote for {}", query.symbol)))?;

    let as_of = Utc::now();
    let expiration = match query.expiration {
        Some(date) => date,
        None => as_of
            .date_naive()
            .checked_add_days(Days::new(DEFAULT_EXPIRATION_DAYS))
            .ok_or_else(|| AppError::BadRequest("expiration out of range".to_string()))?,
    };
    let base_iv = query.iv.unwrap_or(state.chains.config().base_iv);

    let chain = state.chains.generate_with_iv(
        &query.symbol,
        price,
        expiration,
        base_iv,
        as_of,
        &mut rand::thread_rng(),
    )?;

    Ok(Json(ApiResponse::new(chain)))
}

// =============================================================================
// Pricing
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRequest {
    pub underlying_price: f64,
    pub strike: f64,
    pub volatility: f64,
    pub option_type: OptionType,
    pub time_years: Option<f64>,
    pub expiration: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceResponse {
    #[serde(flatten)]
    pub analysis: OptionAnalysis,
    pub time_years: f64,
}

/// POST /api/options/price
async fn price_option(
    State(state): State<AppState>,
    Json(request): Json<PriceRequest>,
) -> Result<Json<ApiResponse<PriceResponse>>> {
    let time_years = resolve_time(request.time_years, request.expiration, Utc::now())?;
    let analysis = state.options.analyze(
        request.underlying_price,
        request.strike,
        time_years,
        request.volatility,
        request.option_type,
    )?;

    Ok(Json(ApiResponse::new(PriceResponse { analysis, time_years })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpliedVolatilityRequest {
    pub market_price: f64,
    pub underlying_price: f64,
    pub strike: f64,
    pub option_type: OptionType,
    pub time_years: Option<f64>,
    pub expiration: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpliedVolatilityResponse {
    pub implied_volatility: f64,
    pub time_years: f64,
}

/// POST /api/options/iv
async fn implied_volatility(
    State(state): State<AppState>,
    Json(request): Json<ImpliedVolatilityRequest>,
) -> Result<Json<ApiResponse<ImpliedVolatilityResponse>>> {
    let time_years = resolve_time(request.time_years, request.expiration, Utc::now())?;
    let implied_volatility = state.options.implied_volatility(
        request.market_price,
        request.underlying_price,
        request.strike,
        time_years,
        request.option_type,
    )?;

    Ok(Json(ApiResponse::new(ImpliedVolatilityResponse {
        implied_volatility,
        time_years,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_resolve_time_prefers_explicit_years() {
        let as_of = Utc.with_ymd_and_hms(2025, 1, 16, 23, 59, 59).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 1, 17);
        assert_eq!(resolve_time(Some(0.5), date, as_of).unwrap(), 0.5);
        assert!((resolve_time(None, date, as_of).unwrap() - 1.0 / 365.0).abs() < 1e-9);
        assert!(resolve_time(None, None, as_of).is_err());
    }

    #[test]
    fn test_price_request_deserialization() {
        let request: PriceRequest = serde_json::from_str(
            r#"{"underlyingPrice":100,"strike":100,"volatility":0.2,"optionType":"put","timeYears":1}"#,
        )
        .unwrap();
        assert_eq!(request.option_type, OptionType::Put);
        assert_eq!(request.expiration, None);
    }
}
