use riskdesk::api;
use riskdesk::config::Config;
use riskdesk::services::AlertDebouncer;
use riskdesk::types::{AlertEvent, AlertType};
use riskdesk::AppState;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "riskdesk=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    info!("Starting Riskdesk server on {}:{}", config.host, config.port);
    info!(
        "Account balance {:.2}, simulating {} underlyings",
        config.account_balance,
        config.sim_symbols.len()
    );

    let state = AppState::new(config)?;

    // Log alerts as they are raised
    let _alert_logger = state.risk.alerts().subscribe(
        |event| {
            if let AlertEvent::Raised(alert) = event {
                match alert.alert_type {
                    AlertType::Critical => warn!("[critical] {}", alert.message),
                    AlertType::Warning => warn!("[warning] {}", alert.message),
                    AlertType::Info => info!("[info] {}", alert.message),
                }
            }
        },
        false,
    );

    // Roll the daily starting balance at local midnight
    let daily_reset = state.risk.start_daily_reset();

    // Re-mark positions and re-evaluate rules on each simulated quote tick
    let refresh = {
        let state = state.clone();
        let period = Duration::from_millis(state.config.quote_refresh_ms.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let mut debouncer = AlertDebouncer::new();
            loop {
                ticker.tick().await;
                let now = chrono::Utc::now();
                let mut repriced = 0;
                for quote in state.market.tick() {
                    repriced += state
                        .portfolio
                        .reprice(&quote.symbol, quote.price, &state.options, now)
                        .updated;
                }
                let (snapshot, alerts) = state.risk.check();
                let fresh = debouncer.filter(alerts);
                debug!(
                    "Repriced {} positions, risk score {:.1}, {} new alerts",
                    repriced,
                    snapshot.risk_score,
                    fresh.len()
                );
                state.risk.alerts().extend(fresh);
            }
        })
    };

    // Build router
    let app = api::router()
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(state.config.bind_address()).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    daily_reset.cancel();
    refresh.abort();
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
