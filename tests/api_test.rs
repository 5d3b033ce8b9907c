//! Integration tests for API endpoints
//!
//! Requests are driven through the full router with `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use riskdesk::api;
use riskdesk::config::Config;
use riskdesk::AppState;
use serde_json::{json, Value};
use std::collections::HashMap;
use tower::ServiceExt;

fn app_with(pairs: &[(&str, &str)]) -> Router {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let state = AppState::new(Config::from_lookup(|key| vars.get(key).cloned())).unwrap();
    api::router().with_state(state)
}

fn app() -> Router {
    app_with(&[("SIM_SEED", "7")])
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let (status, body) = send(&app(), Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
    assert_eq!(body["openPositions"], 0);
}

// =============================================================================
// Options
// =============================================================================

#[tokio::test]
async fn test_chain_endpoint() {
    let (status, body) = send(
        &app(),
        Method::GET,
        "/api/options/chain?symbol=AAPL&price=192.85&expiration=2030-01-18",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let chain = &body["data"];
    assert_eq!(chain["underlyingSymbol"], "AAPL");
    assert_eq!(chain["centerStrike"], 195.0);
    assert_eq!(chain["calls"].as_array().unwrap().len(), 21);
    assert_eq!(chain["puts"].as_array().unwrap().len(), 21);
}

#[tokio::test]
async fn test_chain_uses_simulated_quote() {
    let (status, body) = send(&app(), Method::GET, "/api/options/chain?symbol=MSFT", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["underlyingPrice"], 415.5);
    assert_eq!(body["data"]["centerStrike"], 415.0);
}

#[tokio::test]
async fn test_chain_unknown_symbol() {
    let (status, body) = send(&app(), Method::GET, "/api/options/chain?symbol=ZZZZ", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_price_endpoint() {
    let request = json!({
        "underlyingPrice": 100.0,
        "strike": 100.0,
        "volatility": 0.2,
        "optionType": "call",
        "timeYears": 1.0
    });
    let (status, body) = send(&app(), Method::POST, "/api/options/price", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    let price = body["data"]["theoreticalPrice"].as_f64().unwrap();
    assert!((price - 10.4506).abs() < 1e-3, "price {}", price);
    assert!(body["data"]["greeks"]["delta"].as_f64().unwrap() > 0.5);
}

#[tokio::test]
async fn test_price_invalid_input() {
    let request = json!({
        "underlyingPrice": -1.0,
        "strike": 100.0,
        "volatility": 0.2,
        "optionType": "put",
        "timeYears": 1.0
    });
    let (status, body) = send(&app(), Method::POST, "/api/options/price", Some(request)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_implied_volatility_round_trip() {
    let app = app();
    let price_request = json!({
        "underlyingPrice": 100.0,
        "strike": 105.0,
        "volatility": 0.35,
        "optionType": "put",
        "timeYears": 0.5
    });
    let (_, priced) = send(&app, Method::POST, "/api/options/price", Some(price_request)).await;
    let premium = priced["data"]["theoreticalPrice"].as_f64().unwrap();

    let iv_request = json!({
        "marketPrice": premium,
        "underlyingPrice": 100.0,
        "strike": 105.0,
        "optionType": "put",
        "timeYears": 0.5
    });
    let (status, body) = send(&app, Method::POST, "/api/options/iv", Some(iv_request)).await;
    assert_eq!(status, StatusCode::OK);
    let iv = body["data"]["impliedVolatility"].as_f64().unwrap();
    assert!((iv - 0.35).abs() < 1e-4, "iv {}", iv);
}

// =============================================================================
// Risk
// =============================================================================

#[tokio::test]
async fn test_validate_endpoint() {
    let app = app_with(&[("ACCOUNT_BALANCE", "10000")]);

    let oversized = json!({ "symbol": "AAPL", "size": 15.0, "entryPrice": 100.0 });
    let (status, body) = send(&app, Method::POST, "/api/risk/validate", Some(oversized)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid"], false);
    assert_eq!(body["data"]["suggestedSize"], 10.0);

    let small = json!({ "symbol": "AAPL", "size": 5.0, "entryPrice": 100.0 });
    let (_, body) = send(&app, Method::POST, "/api/risk/validate", Some(small)).await;
    assert_eq!(body["data"]["valid"], true);
    assert!(body["data"].get("suggestedSize").is_none());
}

#[tokio::test]
async fn test_optimal_size_endpoint() {
    let app = app_with(&[("ACCOUNT_BALANCE", "10000")]);
    let request = json!({ "entryPrice": 100.0, "stopLoss": 95.0 });
    let (status, body) = send(&app, Method::POST, "/api/risk/optimal-size", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["size"], 40.0);
    assert_eq!(body["data"]["riskPerTrade"], 2.0);
}

#[tokio::test]
async fn test_rules_listing_and_toggle() {
    let app = app();
    let (_, body) = send(&app, Method::GET, "/api/risk/rules", None).await;
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec![
            "daily_loss_limit",
            "max_drawdown",
            "position_size_limit",
            "correlation_risk",
            "margin_warning",
            "max_positions"
        ]
    );

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/risk/rules/margin_warning",
        Some(json!({ "enabled": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["enabled"], false);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/risk/rules/no_such_rule",
        Some(json!({ "enabled": false })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "RULE_NOT_FOUND");
}

#[tokio::test]
async fn test_alert_lifecycle() {
    let app = app();
    let (status, _) = send(&app, Method::POST, "/api/risk/alerts/missing/ack", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A healthy account fires nothing
    let (status, body) = send(&app, Method::POST, "/api/risk/evaluate", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());

    let (_, body) = send(&app, Method::DELETE, "/api/risk/alerts", None).await;
    assert_eq!(body["data"]["cleared"], 0);
}

#[tokio::test]
async fn test_snapshot_endpoint() {
    let (status, body) = send(&app(), Method::GET, "/api/risk/snapshot", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["equity"], 100_000.0);
    assert_eq!(body["data"]["openPositions"], 0);
    assert_eq!(body["data"]["riskScore"], 0.0);
}

// =============================================================================
// Portfolio
// =============================================================================

#[tokio::test]
async fn test_open_and_close_position() {
    let app = app();
    let request = json!({
        "underlyingSymbol": "aapl",
        "optionType": "call",
        "strike": 195.0,
        "expiration": "2030-01-18",
        "side": "buy",
        "quantity": 2,
        "entryPrice": 5.0
    });
    let (status, body) = send(&app, Method::POST, "/api/portfolio/positions", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["validation"]["valid"], true);
    let position = &body["data"]["position"];
    assert_eq!(position["underlyingSymbol"], "AAPL");
    let id = position["id"].as_str().unwrap().to_string();

    let (_, body) = send(&app, Method::GET, "/api/portfolio/positions", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = send(&app, Method::GET, "/api/portfolio/greeks", None).await;
    assert_eq!(body["data"]["positionCount"], 1);
    assert!(body["data"]["delta"].as_f64().unwrap() > 0.0);

    let uri = format!("/api/portfolio/positions/{}?price=6.0", id);
    let (status, body) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["realizedPnl"], 200.0);
    assert_eq!(body["data"]["balance"], 100_200.0);

    let (status, body) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "POSITION_NOT_FOUND");
}

#[tokio::test]
async fn test_oversized_position_is_not_opened() {
    let app = app_with(&[("ACCOUNT_BALANCE", "10000")]);
    let request = json!({
        "underlyingSymbol": "AAPL",
        "optionType": "put",
        "strike": 190.0,
        "expiration": "2030-01-18",
        "side": "buy",
        "quantity": 3,
        "entryPrice": 5.0
    });
    let (status, body) = send(&app, Method::POST, "/api/portfolio/positions", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["validation"]["valid"], false);
    assert!(body["data"].get("position").is_none());

    let (_, body) = send(&app, Method::GET, "/api/portfolio/positions", None).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}
