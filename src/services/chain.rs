//! Option Chain Generator
//!
//! Builds simulated option chains for paper trading: a ladder of strikes
//! centered on the underlying price, one call and one put per strike, priced
//! with the Black-Scholes engine. Bid/ask are the theoretical price ∓ a fixed
//! half-spread; volume and open interest are drawn from the supplied RNG, so a
//! seeded `StdRng` reproduces a chain exactly.

use crate::services::options::{OptionsError, OptionsService};
use crate::types::{years_to_expiration, OptionContract, OptionType, OptionsChain};
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use std::sync::Arc;
use tracing::debug;

/// Chain generation settings.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Spacing between strikes
    pub strike_increment: f64,
    /// Strikes generated on each side of the center strike
    pub strikes_each_side: u32,
    /// Distance from theoretical price to bid and ask
    pub half_spread: f64,
    /// Lowest quoted bid
    pub min_bid: f64,
    /// ATM implied volatility
    pub base_iv: f64,
    /// Curvature of the volatility smile in moneyness
    pub smile: f64,
    /// Half-open volume range
    pub volume_range: (u64, u64),
    /// Half-open open interest range
    pub open_interest_range: (u64, u64),
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            strike_increment: 5.0,
            strikes_each_side: 10,
            half_spread: 0.05,
            min_bid: 0.01,
            base_iv: 0.30,
            smile: 2.0,
            volume_range: (100, 10_000),
            open_interest_range: (500, 50_000),
        }
    }
}

/// Generates simulated option chains.
pub struct ChainGenerator {
    options: Arc<OptionsService>,
    config: ChainConfig,
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl ChainGenerator {
    pub fn new(options: Arc<OptionsService>, config: ChainConfig) -> Self {
        Self { options, config }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Underlying price rounded to the nearest strike increment.
    pub fn center_strike(&self, underlying_price: f64) -> f64 {
        let step = self.config.strike_increment;
        (underlying_price / step).round() * step
    }

    /// Smile-adjusted IV for a strike: base · (1 + smile · (K/S − 1)²).
    pub fn implied_volatility_for(&self, underlying_price: f64, strike: f64, base_iv: f64) -> f64 {
        let moneyness = strike / underlying_price - 1.0;
        base_iv * (1.0 + self.config.smile * moneyness * moneyness)
    }

    /// Generate a chain using the configured base IV.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        symbol: &str,
        underlying_price: f64,
        expiration: NaiveDate,
        as_of: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<OptionsChain, OptionsError> {
        self.generate_with_iv(symbol, underlying_price, expiration, self.config.base_iv, as_of, rng)
    }

    /// Generate a chain around an explicit ATM implied volatility.
    pub fn generate_with_iv<R: Rng + ?Sized>(
        &self,
        symbol: &str,
        underlying_price: f64,
        expiration: NaiveDate,
        base_iv: f64,
        as_of: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<OptionsChain, OptionsError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(OptionsError::InvalidInput("symbol must not be empty".to_string()));
        }
        if !(underlying_price.is_finite() && underlying_price > 0.0) {
            return Err(OptionsError::InvalidInput(format!(
                "underlying price must be positive, got {}",
                underlying_price
            )));
        }
        if !(base_iv.is_finite() && base_iv > 0.0) {
            return Err(OptionsError::InvalidInput(format!("volatility must be positive, got {}", base_iv)));
        }

        let time_years = years_to_expiration(expiration, as_of);
        let center = self.center_strike(underlying_price);
        let side = self.config.strikes_each_side as i64;

        let mut calls = Vec::with_capacity((2 * side + 1) as usize);
        let mut puts = Vec::with_capacity((2 * side + 1) as usize);

        for offset in -side..=side {
            let strike = center + offset as f64 * self.config.strike_increment;
            if strike <= 0.0 {
                continue;
            }
            let iv = self.implied_volatility_for(underlying_price, strike, base_iv);
            for option_type in [OptionType::Call, OptionType::Put] {
                let contract = self.build_contract(&symbol, option_type, strike, expiration, underlying_price, time_years, iv, rng)?;
                match option_type {
                    OptionType::Call => calls.push(contract),
                    OptionType::Put => puts.push(contract),
                }
            }
        }

        debug!(
            "Generated {} chain for {} @ {:.2}: {} strikes around {}",
            expiration,
            symbol,
            underlying_price,
            calls.len(),
            center
        );

        Ok(OptionsChain {
            underlying_symbol: symbol,
            underlying_price,
            center_strike: center,
            expiration,
            calls,
            puts,
            timestamp: as_of.timestamp_millis(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn build_contract<R: Rng + ?Sized>(
        &self,
        symbol: &str,
        option_type: OptionType,
        strike: f64,
        expiration: NaiveDate,
        underlying_price: f64,
        time_years: f64,
        iv: f64,
        rng: &mut R,
    ) -> Result<OptionContract, OptionsError> {
        let analysis = self.options.analyze(underlying_price, strike, time_years, iv, option_type)?;
        let theo = analysis.theoretical_price;

        let mut contract = OptionContract::new(symbol.to_string(), option_type, strike, expiration)
            .with_analysis(analysis, iv);
        contract.bid = round_cents((theo - self.config.half_spread).max(self.config.min_bid));
        contract.ask = round_cents((theo + self.config.half_spread).max(contract.bid + self.config.min_bid));
        contract.last = round_cents(theo);
        let (vol_lo, vol_hi) = self.config.volume_range;
        let (oi_lo, oi_hi) = self.config.open_interest_range;
        contract.volume = rng.gen_range(vol_lo..vol_hi);
        contract.open_interest = rng.gen_range(oi_lo..oi_hi);

        Ok(contract)
    }
}
