//! Portfolio Aggregator
//!
//! Owns the open option positions and the account cash balance:
//! - Position lifecycle (add, re-mark, close)
//! - Portfolio Greeks as the signed sum over open positions
//! - Exposure and Greek-based risk figures
//!
//! Positions and balance live behind a single `RwLock` so a Greeks read never
//! observes a half-applied close.

use crate::services::options::{OptionsError, OptionsService};
use crate::types::{Greeks, OptionPosition, PortfolioGreeks, PortfolioRisk, RiskPosition};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Delta weight in the Greek-based risk figure.
const DELTA_RISK_WEIGHT: f64 = 10.0;
/// Gamma weight in the Greek-based risk figure.
const GAMMA_RISK_WEIGHT: f64 = 100.0;

/// Portfolio errors.
#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("Position already exists: {0}")]
    DuplicatePosition(String),

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Pricing failed: {0}")]
    Pricing(#[from] OptionsError),
}

/// Result of closing a position.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedPosition {
    pub position: OptionPosition,
    pub exit_price: f64,
    pub realized_pnl: f64,
    /// Account balance after crediting the realized P&L
    pub balance: f64,
}

/// Outcome of a re-pricing pass over one underlying.
#[derive(Debug, Default)]
pub struct RepriceReport {
    pub updated: usize,
    /// Positions left at their previous mark, with the pricing error
    pub failed: Vec<(String, OptionsError)>,
}

struct PortfolioState {
    positions: BTreeMap<String, OptionPosition>,
    balance: f64,
}

/// Open option positions plus the account balance they settle into.
pub struct PortfolioAggregator {
    state: RwLock<PortfolioState>,
}

impl PortfolioAggregator {
    pub fn new(balance: f64) -> Self {
        Self {
            state: RwLock::new(PortfolioState {
                positions: BTreeMap::new(),
                balance,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, PortfolioState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, PortfolioState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    // ========== Position Lifecycle ==========

    /// Track a new position.
    pub fn add_position(&self, position: OptionPosition) -> Result<(), PortfolioError> {
        if position.quantity == 0 {
            return Err(PortfolioError::InvalidInput("quantity must be positive".to_string()));
        }
        if !(position.entry_price.is_finite() && position.entry_price >= 0.0) {
            return Err(PortfolioError::InvalidInput(format!(
                "entry price must be non-negative, got {}",
                position.entry_price
            )));
        }
        if !(position.implied_volatility.is_finite() && position.implied_volatility > 0.0) {
            return Err(PortfolioError::InvalidInput(format!(
                "implied volatility must be positive, got {}",
                position.implied_volatility
            )));
        }

        let mut state = self.write();
        if state.positions.contains_key(&position.id) {
            return Err(PortfolioError::DuplicatePosition(position.id));
        }
        debug!(
            "Opened {} {} x{} @ {:.2} ({})",
            position.side, position.contract_symbol, position.quantity, position.entry_price, position.id
        );
        state.positions.insert(position.id.clone(), position);
        Ok(())
    }

    /// Close a position at `exit_price` (or its current mark) and credit the
    /// realized P&L to the balance.
    pub fn close_position(&self, id: &str, exit_price: Option<f64>) -> Result<ClosedPosition, PortfolioError> {
        if let Some(price) = exit_price {
            if !(price.is_finite() && price >= 0.0) {
                return Err(PortfolioError::InvalidInput(format!(
                    "exit price must be non-negative, got {}",
                    price
                )));
            }
        }

        let mut state = self.write();
        let position = state
            .positions
            .remove(id)
            .ok_or_else(|| PortfolioError::PositionNotFound(id.to_string()))?;

        let exit_price = exit_price.unwrap_or(position.current_price);
        let realized_pnl = position.realized_pnl_at(exit_price);
        state.balance += realized_pnl;

        info!(
            "Closed {} {} @ {:.2}: realized {:.2}, balance {:.2}",
            position.side, position.contract_symbol, exit_price, realized_pnl, state.balance
        );

        Ok(ClosedPosition {
            position,
            exit_price,
            realized_pnl,
            balance: state.balance,
        })
    }

    /// Apply a fresh mark to one position.
    pub fn mark_position(&self, id: &str, current_price: f64, greeks: Greeks) -> Result<(), PortfolioError> {
        let mut state = self.write();
        let position = state
            .positions
            .get_mut(id)
            .ok_or_else(|| PortfolioError::PositionNotFound(id.to_string()))?;
        let underlying = position.underlying_price;
        let iv = position.implied_volatility;
        position.mark(current_price, underlying, greeks, iv);
        Ok(())
    }

    /// Re-price every position on `underlying_symbol` at a new underlying
    /// price. A position that fails to price keeps its previous mark and is
    /// reported without stopping the pass.
    pub fn reprice(
        &self,
        underlying_symbol: &str,
        underlying_price: f64,
        pricer: &OptionsService,
        as_of: DateTime<Utc>,
    ) -> RepriceReport {
        let mut state = self.write();
        let mut report = RepriceReport::default();
        for position in state
            .positions
            .values_mut()
            .filter(|p| p.underlying_symbol == underlying_symbol)
        {
            match pricer.update_position(position, underlying_price, None, as_of) {
                Ok(()) => report.updated += 1,
                Err(e) => {
                    warn!("Failed to reprice {} ({}): {}", position.contract_symbol, position.id, e);
                    report.failed.push((position.id.clone(), e));
                }
            }
        }
        if report.updated > 0 {
            debug!(
                "Repriced {} {} positions @ {:.2}",
                report.updated, underlying_symbol, underlying_price
            );
        }
        report
    }

    // ========== Reads ==========

    pub fn get_position(&self, id: &str) -> Option<OptionPosition> {
        self.read().positions.get(id).cloned()
    }

    /// Snapshot of all open positions, ordered by ID.
    pub fn positions(&self) -> Vec<OptionPosition> {
        self.read().positions.values().cloned().collect()
    }

    /// Open positions in the rule engine's view.
    pub fn risk_positions(&self) -> Vec<RiskPosition> {
        self.read().positions.values().map(RiskPosition::from).collect()
    }

    /// Balance and the rule engine's position view, read under one guard.
    pub fn account_view(&self) -> (f64, Vec<RiskPosition>) {
        let state = self.read();
        let positions = state.positions.values().map(RiskPosition::from).collect();
        (state.balance, positions)
    }

    /// Balance plus unrealized P&L, read under one guard.
    pub fn equity(&self) -> f64 {
        let state = self.read();
        state.balance + state.positions.values().map(|p| p.unrealized_pnl()).sum::<f64>()
    }

    pub fn position_count(&self) -> usize {
        self.read().positions.len()
    }

    /// Distinct underlyings with open positions.
    pub fn underlyings(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .read()
            .positions
            .values()
            .map(|p| p.underlying_symbol.clone())
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    pub fn balance(&self) -> f64 {
        self.read().balance
    }

    /// Overwrite the balance from the account-of-record collaborator.
    pub fn sync_balance(&self, balance: f64) {
        self.write().balance = balance;
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.read().positions.values().map(|p| p.unrealized_pnl()).sum()
    }

    // ========== Aggregation ==========

    /// Signed sum of position Greeks.
    pub fn portfolio_greeks(&self) -> PortfolioGreeks {
        let state = self.read();
        aggregate_greeks(state.positions.values())
    }

    /// Exposure and Greek-based risk measured against `balance`.
    pub fn portfolio_risk(&self, balance: f64) -> PortfolioRisk {
        let state = self.read();
        let greeks = aggregate_greeks(state.positions.values());

        let total_unrealized_pnl = state.positions.values().map(|p| p.unrealized_pnl()).sum();
        let total_exposure = state.positions.values().map(|p| p.notional_value().abs()).sum();
        let max_risk = greeks.delta.abs() * DELTA_RISK_WEIGHT + greeks.gamma.abs() * GAMMA_RISK_WEIGHT;

        let risk_percentage = if balance > 0.0 {
            max_risk / balance * 100.0
        } else if max_risk > 0.0 {
            100.0
        } else {
            0.0
        };

        PortfolioRisk {
            total_unrealized_pnl,
            total_exposure,
            max_risk,
            risk_percentage,
        }
    }

    /// `portfolio_risk` against the tracked balance.
    pub fn current_risk(&self) -> PortfolioRisk {
        let balance = self.balance();
        self.portfolio_risk(balance)
    }
}

/// Reduce positions into portfolio Greeks.
pub fn aggregate_greeks<'a>(positions: impl IntoIterator<Item = &'a OptionPosition>) -> PortfolioGreeks {
    let mut total = PortfolioGreeks::default();
    for position in positions {
        total.accumulate(&position.position_greeks());
    }
    total
}
