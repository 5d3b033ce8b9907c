//! Options Types
//!
//! Contracts, chains, Greeks and option positions.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds in a 365-day year, the day count used for time to expiration.
pub const MS_PER_YEAR: f64 = 365.0 * 24.0 * 60.0 * 60.0 * 1000.0;

/// Standard equity option contract multiplier.
pub const DEFAULT_MULTIPLIER: u32 = 100;

// =============================================================================
// Enums
// =============================================================================

/// Option type (Call or Put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    /// Right to buy at strike price
    Call,
    /// Right to sell at strike price
    Put,
}

impl OptionType {
    /// Single-letter code used in OCC contract symbols.
    pub fn code(&self) -> char {
        match self {
            OptionType::Call => 'C',
            OptionType::Put => 'P',
        }
    }

    /// Intrinsic value of one unit at the given underlying price.
    pub fn intrinsic_value(&self, underlying_price: f64, strike: f64) -> f64 {
        match self {
            OptionType::Call => (underlying_price - strike).max(0.0),
            OptionType::Put => (strike - underlying_price).max(0.0),
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionType::Call => write!(f, "call"),
            OptionType::Put => write!(f, "put"),
        }
    }
}

/// Side of a position (long or written).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    /// Long
    Buy,
    /// Short / written
    Sell,
}

impl PositionSide {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            PositionSide::Buy => 1.0,
            PositionSide::Sell => -1.0,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Buy => write!(f, "buy"),
            PositionSide::Sell => write!(f, "sell"),
        }
    }
}

// =============================================================================
// Greeks
// =============================================================================

/// Per-contract Greeks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Greeks {
    /// Price sensitivity to underlying price change (dV/dS)
    pub delta: f64,
    /// Rate of change of delta (d²V/dS²)
    pub gamma: f64,
    /// Time decay per day (dV/dt)
    pub theta: f64,
    /// Sensitivity to a 1 vol point change (dV/dσ)
    pub vega: f64,
    /// Sensitivity to a 1% rate change (dV/dr)
    pub rho: f64,
}

impl Greeks {
    /// Create new Greeks.
    pub fn new(delta: f64, gamma: f64, theta: f64, vega: f64, rho: f64) -> Self {
        Self { delta, gamma, theta, vega, rho }
    }

    /// Scale every Greek by a signed factor.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            delta: self.delta * factor,
            gamma: self.gamma * factor,
            theta: self.theta * factor,
            vega: self.vega * factor,
            rho: self.rho * factor,
        }
    }
}

/// Portfolio-level Greeks, the signed sum over all open positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioGreeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
    /// Number of positions included
    pub position_count: usize,
}

impl PortfolioGreeks {
    /// Add one position's scaled Greeks.
    pub fn accumulate(&mut self, greeks: &Greeks) {
        self.delta += greeks.delta;
        self.gamma += greeks.gamma;
        self.theta += greeks.theta;
        self.vega += greeks.vega;
        self.rho += greeks.rho;
        self.position_count += 1;
    }
}

/// Full pricing result for a single contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionAnalysis {
    /// Theoretical price, never below intrinsic value
    pub theoretical_price: f64,
    pub intrinsic_value: f64,
    pub time_value: f64,
    pub greeks: Greeks,
}

// =============================================================================
// Contracts & Chains
// =============================================================================

/// Years remaining until the close of the expiration date (23:59:59 UTC).
pub fn years_to_expiration(expiration: NaiveDate, as_of: DateTime<Utc>) -> f64 {
    let Some(close) = expiration.and_hms_opt(23, 59, 59) else {
        return 0.0;
    };
    let remaining_ms = Utc.from_utc_datetime(&close).timestamp_millis() - as_of.timestamp_millis();
    remaining_ms.max(0) as f64 / MS_PER_YEAR
}

/// Build an OCC-style contract symbol (e.g., "AAPL250117C00195000").
pub fn contract_symbol(
    underlying_symbol: &str,
    expiration: NaiveDate,
    option_type: OptionType,
    strike: f64,
) -> String {
    format!(
        "{}{}{}{:08}",
        underlying_symbol,
        expiration.format("%y%m%d"),
        option_type.code(),
        (strike * 1000.0).round() as u64
    )
}

/// An option contract with its simulated market state and derived analytics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionContract {
    /// Contract symbol (e.g., "AAPL250117C00195000")
    pub contract_symbol: String,
    /// Underlying symbol (e.g., "AAPL")
    pub underlying_symbol: String,
    pub option_type: OptionType,
    pub strike: f64,
    /// Expiration date
    pub expiration: NaiveDate,
    pub bid: f64,
    pub ask: f64,
    /// Last trade price
    pub last: f64,
    pub volume: u64,
    pub open_interest: u64,
    /// Implied volatility (as decimal, e.g., 0.25 = 25%)
    pub implied_volatility: f64,
    /// Theoretical price for the quote snapshot
    pub theoretical_price: f64,
    pub intrinsic_value: f64,
    pub time_value: f64,
    pub greeks: Greeks,
    /// Contract multiplier (100 for equity options)
    pub multiplier: u32,
}

impl OptionContract {
    /// Create a new contract with empty market state.
    pub fn new(
        underlying_symbol: String,
        option_type: OptionType,
        strike: f64,
        expiration: NaiveDate,
    ) -> Self {
        Self {
            contract_symbol: contract_symbol(&underlying_symbol, expiration, option_type, strike),
            underlying_symbol,
            option_type,
            strike,
            expiration,
            bid: 0.0,
            ask: 0.0,
            last: 0.0,
            volume: 0,
            open_interest: 0,
            implied_volatility: 0.0,
            theoretical_price: 0.0,
            intrinsic_value: 0.0,
            time_value: 0.0,
            greeks: Greeks::default(),
            multiplier: DEFAULT_MULTIPLIER,
        }
    }

    /// Apply a pricing result to this contract.
    pub fn with_analysis(mut self, analysis: OptionAnalysis, implied_volatility: f64) -> Self {
        self.theoretical_price = analysis.theoretical_price;
        self.intrinsic_value = analysis.intrinsic_value;
        self.time_value = analysis.time_value;
        self.greeks = analysis.greeks;
        self.implied_volatility = implied_volatility;
        self
    }

    /// Mid price (average of bid and ask).
    pub fn mid_price(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

/// A generated options chain for one underlying and expiration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsChain {
    pub underlying_symbol: String,
    pub underlying_price: f64,
    /// Center of the strike ladder
    pub center_strike: f64,
    pub expiration: NaiveDate,
    /// Call contracts sorted by strike
    pub calls: Vec<OptionContract>,
    /// Put contracts sorted by strike
    pub puts: Vec<OptionContract>,
    /// Generation timestamp (ms)
    pub timestamp: i64,
}

impl OptionsChain {
    /// All strikes in ascending order.
    pub fn strikes(&self) -> Vec<f64> {
        self.calls.iter().map(|c| c.strike).collect()
    }

    /// All contracts, calls first.
    pub fn contracts(&self) -> impl Iterator<Item = &OptionContract> {
        self.calls.iter().chain(self.puts.iter())
    }

    /// Total number of contracts.
    pub fn len(&self) -> usize {
        self.calls.len() + self.puts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.puts.is_empty()
    }

    /// Get call contract at a specific strike.
    pub fn get_call(&self, strike: f64) -> Option<&OptionContract> {
        self.calls.iter().find(|c| (c.strike - strike).abs() < 0.01)
    }

    /// Get put contract at a specific strike.
    pub fn get_put(&self, strike: f64) -> Option<&OptionContract> {
        self.puts.iter().find(|p| (p.strike - strike).abs() < 0.01)
    }
}

// =============================================================================
// Positions
// =============================================================================

/// An open option position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionPosition {
    /// Unique position ID
    pub id: String,
    pub contract_symbol: String,
    pub underlying_symbol: String,
    pub option_type: OptionType,
    pub strike: f64,
    pub expiration: NaiveDate,
    pub side: PositionSide,
    /// Number of contracts held
    pub quantity: u32,
    pub multiplier: u32,
    /// Entry premium per unit
    pub entry_price: f64,
    /// Current premium per unit
    pub current_price: f64,
    /// Last underlying price used for marking
    pub underlying_price: f64,
    pub implied_volatility: f64,
    /// Per-contract Greeks at the last mark
    pub greeks: Greeks,
    /// When position was opened (ms)
    pub opened_at: i64,
    /// When position was last marked (ms)
    pub updated_at: i64,
}

impl OptionPosition {
    /// Open a position on a contract at the given entry premium.
    pub fn new(contract: &OptionContract, side: PositionSide, quantity: u32, entry_price: f64) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            contract_symbol: contract.contract_symbol.clone(),
            underlying_symbol: contract.underlying_symbol.clone(),
            option_type: contract.option_type,
            strike: contract.strike,
            expiration: contract.expiration,
            side,
            quantity,
            multiplier: contract.multiplier,
            entry_price,
            current_price: entry_price,
            underlying_price: 0.0,
            implied_volatility: contract.implied_volatility,
            greeks: contract.greeks,
            opened_at: now,
            updated_at: now,
        }
    }

    /// Replace the generated ID with a caller-supplied one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Contracts times multiplier.
    pub fn units(&self) -> f64 {
        self.quantity as f64 * self.multiplier as f64
    }

    /// Absolute market value of the position.
    pub fn notional_value(&self) -> f64 {
        self.current_price * self.units()
    }

    /// Unrealized P&L at the current mark.
    pub fn unrealized_pnl(&self) -> f64 {
        (self.current_price - self.entry_price) * self.units() * self.side.sign()
    }

    /// P&L realized by closing at the given premium.
    pub fn realized_pnl_at(&self, exit_price: f64) -> f64 {
        let per_unit = match self.side {
            PositionSide::Buy => exit_price - self.entry_price,
            PositionSide::Sell => self.entry_price - exit_price,
        };
        per_unit * self.units()
    }

    /// Greeks scaled by quantity, multiplier and side.
    pub fn position_greeks(&self) -> Greeks {
        self.greeks.scaled(self.units() * self.side.sign())
    }

    /// Re-mark the position with fresh market data.
    pub fn mark(&mut self, current_price: f64, underlying_price: f64, greeks: Greeks, iv: f64) {
        self.current_price = current_price;
        self.underlying_price = underlying_price;
        self.greeks = greeks;
        self.implied_volatility = iv;
        self.updated_at = Utc::now().timestamp_millis();
    }
}
