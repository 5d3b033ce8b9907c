//! Riskdesk - options analytics and risk-control server

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod types;

use config::Config;
use services::{
    AlertLog, ChainConfig, ChainGenerator, MarketSimulator, OptionsService, OrderValidator,
    PortfolioAggregator, RiskManager, RuleError,
};
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub options: Arc<OptionsService>,
    pub chains: Arc<ChainGenerator>,
    pub portfolio: Arc<PortfolioAggregator>,
    pub risk: Arc<RiskManager>,
    pub validator: Arc<OrderValidator>,
    pub market: Arc<MarketSimulator>,
}

impl AppState {
    /// Wire every service from configuration.
    pub fn new(config: Config) -> Result<Self, RuleError> {
        let options = Arc::new(OptionsService::new(config.risk_free_rate));
        let chains = Arc::new(ChainGenerator::new(
            options.clone(),
            ChainConfig {
                base_iv: config.base_iv,
                ..ChainConfig::default()
            },
        ));
        let portfolio = Arc::new(PortfolioAggregator::new(config.account_balance));
        let alerts = Arc::new(AlertLog::new(config.alert_capacity));
        let risk = Arc::new(RiskManager::new(config.risk_limits, portfolio.clone(), alerts)?);
        let validator = Arc::new(OrderValidator::new(config.risk_limits));

        let market = Arc::new(MarketSimulator::new(config.sim_seed, config.sim_tick_volatility));
        for sim in &config.sim_symbols {
            market.set_price(&sim.symbol, sim.price);
        }

        Ok(Self {
            config: Arc::new(config),
            options,
            chains,
            portfolio,
            risk,
            validator,
            market,
        })
    }
}

pub use types::*;
