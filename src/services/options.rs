//! Options Service
//!
//! Handles options pricing and Greeks calculations:
//! - Black-Scholes pricing for European options
//! - Greeks calculation (Delta, Gamma, Theta, Vega, Rho)
//! - Implied volatility calculation
//! - Re-marking open positions on quote refresh
//!
//! Expired contracts (zero time to expiration) price at intrinsic value with
//! zero gamma/theta/vega/rho and a settled delta: 1 (call) or -1 (put) when in
//! the money at expiry, 0 otherwise.

use crate::services::math::{norm_cdf, norm_pdf};
use crate::types::{years_to_expiration, Greeks, OptionAnalysis, OptionPosition, OptionType};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

/// Floor for σ·√T so d1/d2 stay finite.
const MIN_VOL_SQRT_T: f64 = 1e-10;

/// Options service errors.
#[derive(Debug, Error, PartialEq)]
pub enum OptionsError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("IV convergence failed after {0} iterations")]
    IvConvergenceFailed(u32),
}

/// Options pricing and Greeks calculator.
#[derive(Debug, Clone)]
pub struct OptionsService {
    /// Risk-free interest rate (annual, as decimal)
    risk_free_rate: f64,
}

impl Default for OptionsService {
    /// 5% risk-free rate.
    fn default() -> Self {
        Self::new(0.05)
    }
}

impl OptionsService {
    /// Create a new options service with the given risk-free rate.
    pub fn new(risk_free_rate: f64) -> Self {
        Self { risk_free_rate }
    }

    pub fn risk_free_rate(&self) -> f64 {
        self.risk_free_rate
    }

    fn validate(spot: f64, strike: f64, time_years: f64, volatility: f64) -> Result<(), OptionsError> {
        if !(spot.is_finite() && spot > 0.0) {
            return Err(OptionsError::InvalidInput(format!("underlying price must be positive, got {}", spot)));
        }
        if !(strike.is_finite() && strike > 0.0) {
            return Err(OptionsError::InvalidInput(format!("strike must be positive, got {}", strike)));
        }
        if !(time_years.is_finite() && time_years >= 0.0) {
            return Err(OptionsError::InvalidInput(format!(
                "time to expiration must be non-negative, got {}",
                time_years
            )));
        }
        if !(volatility.is_finite() && volatility > 0.0) {
            return Err(OptionsError::InvalidInput(format!("volatility must be positive, got {}", volatility)));
        }
        Ok(())
    }

    // ========== Black-Scholes Pricing ==========

    /// Returns (d1, d2, σ√T) with σ√T clamped away from zero.
    fn d1_d2(&self, spot: f64, strike: f64, time: f64, volatility: f64) -> (f64, f64, f64) {
        let vol_sqrt_t = (volatility * time.sqrt()).max(MIN_VOL_SQRT_T);
        let r = self.risk_free_rate;
        let d1 = ((spot / strike).ln() + (r + 0.5 * volatility * volatility) * time) / vol_sqrt_t;
        (d1, d1 - vol_sqrt_t, vol_sqrt_t)
    }

    /// Calculate Black-Scholes price for a European option.
    pub fn black_scholes_price(
        &self,
        spot: f64,
        strike: f64,
        time_years: f64,
        volatility: f64,
        option_type: OptionType,
    ) -> Result<f64, OptionsError> {
        Self::validate(spot, strike, time_years, volatility)?;

        if time_years == 0.0 {
            return Ok(option_type.intrinsic_value(spot, strike));
        }

        let (d1, d2, _) = self.d1_d2(spot, strike, time_years, volatility);
        let discount = (-self.risk_free_rate * time_years).exp();

        let price = match option_type {
            OptionType::Call => spot * norm_cdf(d1) - strike * discount * norm_cdf(d2),
            OptionType::Put => strike * discount * norm_cdf(-d2) - spot * norm_cdf(-d1),
        };

        Ok(price.max(0.0))
    }

    /// Calculate all Greeks for an option.
    pub fn calculate_greeks(
        &self,
        spot: f64,
        strike: f64,
        time_years: f64,
        volatility: f64,
        option_type: OptionType,
    ) -> Result<Greeks, OptionsError> {
        Self::validate(spot, strike, time_years, volatility)?;

        if time_years == 0.0 {
            return Ok(Self::expired_greeks(spot, strike, option_type));
        }

        let (d1, d2, vol_sqrt_t) = self.d1_d2(spot, strike, time_years, volatility);
        let r = self.risk_free_rate;
        let discount = (-r * time_years).exp();
        let sqrt_t = time_years.sqrt();
        let pdf_d1 = norm_pdf(d1);

        let delta = match option_type {
            OptionType::Call => norm_cdf(d1),
            OptionType::Put => norm_cdf(d1) - 1.0,
        };

        // Same for calls and puts
        let gamma = pdf_d1 / (spot * vol_sqrt_t);

        // Per calendar day
        let decay = -(spot * pdf_d1 * volatility) / (2.0 * sqrt_t);
        let theta = match option_type {
            OptionType::Call => (decay - r * strike * discount * norm_cdf(d2)) / 365.0,
            OptionType::Put => (decay + r * strike * discount * norm_cdf(-d2)) / 365.0,
        };

        // Per 1 vol point
        let vega = spot * sqrt_t * pdf_d1 / 100.0;

        // Per 1% rate change
        let rho = match option_type {
            OptionType::Call => strike * time_years * discount * norm_cdf(d2) / 100.0,
            OptionType::Put => -strike * time_years * discount * norm_cdf(-d2) / 100.0,
        };

        Ok(Greeks::new(delta, gamma, theta, vega, rho))
    }

    fn expired_greeks(spot: f64, strike: f64, option_type: OptionType) -> Greeks {
        let delta = match option_type {
            OptionType::Call if spot > strike => 1.0,
            OptionType::Put if spot < strike => -1.0,
            _ => 0.0,
        };
        Greeks::new(delta, 0.0, 0.0, 0.0, 0.0)
    }

    /// Price, intrinsic/time value and Greeks in one pass.
    ///
    /// The theoretical price is floored at intrinsic value so time value is
    /// never negative (deep ITM European puts can price below intrinsic).
    pub fn analyze(
        &self,
        spot: f64,
        strike: f64,
        time_years: f64,
        volatility: f64,
        option_type: OptionType,
    ) -> Result<OptionAnalysis, OptionsError> {
        let price = self.black_scholes_price(spot, strike, time_years, volatility, option_type)?;
        let greeks = self.calculate_greeks(spot, strike, time_years, volatility, option_type)?;
        let intrinsic_value = option_type.intrinsic_value(spot, strike);
        let time_value = (price - intrinsic_value).max(0.0);

        Ok(OptionAnalysis {
            theoretical_price: intrinsic_value + time_value,
            intrinsic_value,
            time_value,
            greeks,
        })
    }

    // ========== Implied Volatility ==========

    /// Calculate implied volatility using Newton-Raphson method.
    pub fn implied_volatility(
        &self,
        market_price: f64,
        spot: f64,
        strike: f64,
        time_years: f64,
        option_type: OptionType,
    ) -> Result<f64, OptionsError> {
        if !(market_price > 0.0) || !(time_years > 0.0) {
            return Err(OptionsError::InvalidInput(
                "market price and time to expiration must be positive".to_string(),
            ));
        }
        Self::validate(spot, strike, time_years, 0.2)?;

        let max_iterations = 100;
        let tolerance = 1e-6;
        let mut vol: f64 = 0.2; // Initial guess: 20%

        for i in 0..max_iterations {
            let price = self.black_scholes_price(spot, strike, time_years, vol, option_type)?;
            let diff = price - market_price;

            if diff.abs() < tolerance {
                debug!("IV converged after {} iterations: {:.4}%", i + 1, vol * 100.0);
                return Ok(vol);
            }

            // Raw vega (per unit vol) for the Newton step
            let (d1, _, _) = self.d1_d2(spot, strike, time_years, vol);
            let vega = spot * time_years.sqrt() * norm_pdf(d1);

            if vega.abs() < 1e-10 {
                // Vega too small, use bisection fallback
                break;
            }

            vol -= diff / vega;

            // Keep volatility in reasonable bounds
            vol = vol.clamp(0.001, 5.0);
        }

        self.implied_volatility_bisection(market_price, spot, strike, time_years, option_type)
    }

    /// Calculate implied volatility using bisection method (fallback).
    fn implied_volatility_bisection(
        &self,
        market_price: f64,
        spot: f64,
        strike: f64,
        time_years: f64,
        option_type: OptionType,
    ) -> Result<f64, OptionsError> {
        let max_iterations = 200;
        let tolerance = 1e-6;
        let mut low = 0.001;
        let mut high = 5.0;

        for _ in 0..max_iterations {
            let mid = (low + high) / 2.0;
            let price = self.black_scholes_price(spot, strike, time_years, mid, option_type)?;
            let diff = price - market_price;

            if diff.abs() < tolerance {
                return Ok(mid);
            }

            if diff > 0.0 {
                high = mid;
            } else {
                low = mid;
            }
        }

        Err(OptionsError::IvConvergenceFailed(max_iterations))
    }

    // ========== Positions ==========

    /// Re-mark an option position with current market data.
    ///
    /// A market premium, when given, is taken as the mark and the position's
    /// IV is re-solved from it (the previous IV is kept if solving fails).
    /// Otherwise the theoretical premium at the position's IV is used.
    pub fn update_position(
        &self,
        position: &mut OptionPosition,
        underlying_price: f64,
        market_premium: Option<f64>,
        as_of: DateTime<Utc>,
    ) -> Result<(), OptionsError> {
        let time_years = years_to_expiration(position.expiration, as_of);
        let mut iv = position.implied_volatility;

        if time_years <= 0.0 {
            let greeks = self.calculate_greeks(underlying_price, position.strike, 0.0, iv.max(MIN_VOL_SQRT_T), position.option_type)?;
            let settled = position.option_type.intrinsic_value(underlying_price, position.strike);
            position.mark(settled, underlying_price, greeks, iv);
            return Ok(());
        }

        let premium = match market_premium {
            Some(mp) => {
                if let Ok(solved) =
                    self.implied_volatility(mp, underlying_price, position.strike, time_years, position.option_type)
                {
                    iv = solved;
                }
                mp
            }
            None => {
                self.analyze(underlying_price, position.strike, time_years, iv, position.option_type)?
                    .theoretical_price
            }
        };

        let greeks = self.calculate_greeks(underlying_price, position.strike, time_years, iv, position.option_type)?;
        position.mark(premium, underlying_price, greeks, iv);

        Ok(())
    }
}
