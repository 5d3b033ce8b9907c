//! Order Validator
//!
//! Pre-trade gate for single orders and multi-leg strategies. A limit breach
//! is reported as a rejected [`ValidationResult`] with a suggested size that
//! passes every check, or none when not even 0.01 fits. Only malformed input
//! is an error.

use crate::types::{
    LimitBreach, OrderCheck, RiskLimits, StrategyOrder, StrategyValidation, ValidationResult,
};
use thiserror::Error;
use tracing::debug;

/// Slack on limit comparisons so floored suggestions always pass.
const LIMIT_EPSILON: f64 = 1e-9;

/// Stop distance assumed when an order has no stop loss (2% below entry).
const DEFAULT_STOP_RATIO: f64 = 0.98;

/// Validator errors.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Round down to `decimals` places.
fn floor_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    ((value * scale) + LIMIT_EPSILON).floor() / scale
}

fn require_positive(name: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidInput(format!("{} must be positive, got {}", name, value)))
    }
}

/// Checks orders against [`RiskLimits`].
#[derive(Debug, Clone)]
pub struct OrderValidator {
    limits: RiskLimits,
}

impl OrderValidator {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Order notional as % of balance.
    pub fn position_risk_percent(order: &OrderCheck, balance: f64) -> f64 {
        order.entry_price * order.size / balance * 100.0
    }

    /// Loss to stop as % of balance. The stop defaults to 2% below entry.
    pub fn trade_risk_percent(order: &OrderCheck, balance: f64) -> f64 {
        Self::stop_distance(order) * order.size / balance * 100.0
    }

    fn stop_distance(order: &OrderCheck) -> f64 {
        let stop = order.stop_loss.unwrap_or(order.entry_price * DEFAULT_STOP_RATIO);
        (order.entry_price - stop).abs()
    }

    fn check_input(order: &OrderCheck, balance: f64) -> Result<(), ValidationError> {
        require_positive("size", order.size)?;
        require_positive("entry price", order.entry_price)?;
        require_positive("balance", balance)?;
        if let Some(stop) = order.stop_loss {
            if !(stop.is_finite() && stop >= 0.0) {
                return Err(ValidationError::InvalidInput(format!(
                    "stop loss must be non-negative, got {}",
                    stop
                )));
            }
        }
        Ok(())
    }

    /// Validate a single order against position size, then risk per trade.
    pub fn validate_order(&self, order: &OrderCheck, balance: f64) -> Result<ValidationResult, ValidationError> {
        Self::check_input(order, balance)?;

        let distance = Self::stop_distance(order);
        let mut suggested = floor_to(self.limits.max_position_size / 100.0 * balance / order.entry_price, 2);
        if distance > 0.0 {
            suggested = suggested.min(floor_to(self.limits.risk_per_trade / 100.0 * balance / distance, 2));
        }
        // No safe size when the floor rounds down to nothing
        let suggested = Some(suggested).filter(|size| *size > 0.0);

        let position_risk = Self::position_risk_percent(order, balance);
        if position_risk > self.limits.max_position_size + LIMIT_EPSILON {
            debug!(
                "Rejected {} x{}: position risk {:.2}% > {}%",
                order.symbol, order.size, position_risk, self.limits.max_position_size
            );
            return Ok(ValidationResult::rejected(
                LimitBreach::PositionSize,
                format!(
                    "Position size {:.2}% exceeds max {}%",
                    position_risk, self.limits.max_position_size
                ),
                suggested,
            ));
        }

        let trade_risk = Self::trade_risk_percent(order, balance);
        if trade_risk > self.limits.risk_per_trade + LIMIT_EPSILON {
            debug!(
                "Rejected {} x{}: trade risk {:.2}% > {}%",
                order.symbol, order.size, trade_risk, self.limits.risk_per_trade
            );
            return Ok(ValidationResult::rejected(
                LimitBreach::RiskPerTrade,
                format!(
                    "Risk per trade {:.2}% exceeds max {}%",
                    trade_risk, self.limits.risk_per_trade
                ),
                suggested,
            ));
        }

        Ok(ValidationResult::approved())
    }

    /// Validate every leg, then the combined position risk.
    pub fn validate_strategy(
        &self,
        strategy: &StrategyOrder,
        balance: f64,
    ) -> Result<StrategyValidation, ValidationError> {
        if strategy.legs.is_empty() {
            return Err(ValidationError::InvalidInput("strategy has no legs".to_string()));
        }

        let mut legs = Vec::with_capacity(strategy.legs.len());
        let mut combined_risk = 0.0;
        for leg in &strategy.legs {
            let check = leg.order_check();
            legs.push(self.validate_order(&check, balance)?);
            combined_risk += Self::position_risk_percent(&check, balance);
        }

        let limit = self.limits.max_portfolio_risk;
        let combined_ok = combined_risk <= limit + LIMIT_EPSILON;
        let failed_leg = legs.iter().enumerate().find(|(_, v)| !v.valid);

        let reason = match failed_leg {
            Some((i, verdict)) => Some(format!(
                "Leg {} ({}): {}",
                i + 1,
                strategy.legs[i].symbol,
                verdict.reason.as_deref().unwrap_or("rejected")
            )),
            None if !combined_ok => Some(format!(
                "Combined risk {:.2}% exceeds max portfolio risk {}%",
                combined_risk, limit
            )),
            None => None,
        };

        let suggested_scale = if combined_ok {
            None
        } else {
            Some(floor_to(limit / combined_risk, 4)).filter(|scale| *scale > 0.0)
        };

        debug!(
            "Validated {} strategy with {} legs: combined risk {:.2}%",
            strategy.strategy_type,
            legs.len(),
            combined_risk
        );

        Ok(StrategyValidation {
            valid: reason.is_none(),
            reason,
            legs,
            combined_risk,
            suggested_scale,
        })
    }

    /// Size that risks exactly `risk_per_trade`% of balance between entry and stop.
    pub fn optimal_size(&self, balance: f64, entry_price: f64, stop_loss: f64) -> Result<f64, ValidationError> {
        require_positive("balance", balance)?;
        require_positive("entry price", entry_price)?;
        require_positive("stop loss", stop_loss)?;
        let distance = (entry_price - stop_loss).abs();
        if distance == 0.0 {
            return Err(ValidationError::InvalidInput(
                "stop loss must differ from entry price".to_string(),
            ));
        }
        Ok(self.limits.risk_per_trade / 100.0 * balance / distance)
    }
}
