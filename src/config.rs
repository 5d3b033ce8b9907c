use crate::services::market::MAX_TICK_VOLATILITY;
use crate::types::RiskLimits;
use std::env;
use std::str::FromStr;

/// A simulated underlying and its opening price.
#[derive(Debug, Clone, PartialEq)]
pub struct SimSymbol {
    pub symbol: String,
    pub price: f64,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Annual risk-free rate used for pricing (decimal).
    pub risk_free_rate: f64,
    /// ATM implied volatility for generated chains (decimal).
    pub base_iv: f64,
    /// Opening account balance.
    pub account_balance: f64,
    /// Number of alerts retained in the log.
    pub alert_capacity: usize,
    /// Quote refresh / re-marking interval (ms).
    pub quote_refresh_ms: u64,
    /// Underlyings driven by the market simulator.
    pub sim_symbols: Vec<SimSymbol>,
    /// Fixed seed for the simulator; random when unset.
    pub sim_seed: Option<u64>,
    /// Maximum per-tick move of a simulated underlying (decimal).
    pub sim_tick_volatility: f64,
    /// Account risk limits.
    pub risk_limits: RiskLimits,
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

const DEFAULT_TICK_VOLATILITY: f64 = 0.002;

/// Finite per-tick volatility in [0, `MAX_TICK_VOLATILITY`].
fn tick_volatility(value: f64) -> f64 {
    if value.is_finite() {
        value.abs().min(MAX_TICK_VOLATILITY)
    } else {
        DEFAULT_TICK_VOLATILITY
    }
}

/// Parse "AAPL:192.85,MSFT:410" into symbols. Malformed entries are skipped.
pub fn parse_sim_symbols(raw: &str) -> Vec<SimSymbol> {
    raw.split(',')
        .filter_map(|entry| {
            let (symbol, price) = entry.split_once(':')?;
            let symbol = symbol.trim().to_uppercase();
            let price: f64 = price.trim().parse().ok()?;
            if symbol.is_empty() || !(price > 0.0) {
                return None;
            }
            Some(SimSymbol { symbol, price })
        })
        .collect()
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup (environment, map, ...).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = RiskLimits::default();
        let risk_limits = RiskLimits {
            max_position_size: parse_or(&lookup, "RISK_MAX_POSITION_SIZE_PCT", defaults.max_position_size),
            max_daily_loss: parse_or(&lookup, "RISK_MAX_DAILY_LOSS_PCT", defaults.max_daily_loss),
            max_drawdown: parse_or(&lookup, "RISK_MAX_DRAWDOWN_PCT", defaults.max_drawdown),
            risk_per_trade: parse_or(&lookup, "RISK_PER_TRADE_PCT", defaults.risk_per_trade),
            max_open_positions: parse_or(&lookup, "RISK_MAX_OPEN_POSITIONS", defaults.max_open_positions),
            correlation_limit: parse_or(&lookup, "RISK_CORRELATION_LIMIT", defaults.correlation_limit),
            max_portfolio_risk: parse_or(&lookup, "RISK_MAX_PORTFOLIO_RISK_PCT", defaults.max_portfolio_risk),
        };

        let sim_symbols = lookup("SIM_SYMBOLS")
            .map(|s| parse_sim_symbols(&s))
            .unwrap_or_else(|| parse_sim_symbols("AAPL:192.85,MSFT:415.50,SPY:585.00"));

        Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 3001),
            risk_free_rate: parse_or(&lookup, "RISK_FREE_RATE", 0.05),
            base_iv: parse_or(&lookup, "BASE_IV", 0.30),
            account_balance: parse_or(&lookup, "ACCOUNT_BALANCE", 100_000.0),
            alert_capacity: parse_or(&lookup, "ALERT_CAPACITY", 100),
            quote_refresh_ms: parse_or(&lookup, "QUOTE_REFRESH_MS", 5_000),
            sim_symbols,
            sim_seed: lookup("SIM_SEED").and_then(|s| s.trim().parse().ok()),
            sim_tick_volatility: tick_volatility(parse_or(&lookup, "SIM_TICK_VOLATILITY", DEFAULT_TICK_VOLATILITY)),
            risk_limits,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
