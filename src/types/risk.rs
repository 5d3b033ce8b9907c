//! Risk Types
//!
//! Limits, account snapshots, rule metadata and order-validation verdicts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::options::{OptionPosition, OptionType, PositionSide};

// =============================================================================
// Limits
// =============================================================================

/// Risk limits for an account. All percentages are in percent units (10.0 = 10%).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskLimits {
    /// Maximum single position size as % of balance
    #[serde(default = "default_max_position_size")]
    pub max_position_size: f64,
    /// Maximum daily loss as % of the daily starting balance
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: f64,
    /// Maximum drawdown from peak equity in %
    #[serde(default = "default_max_drawdown")]
    pub max_drawdown: f64,
    /// Maximum loss to stop per trade as % of balance
    #[serde(default = "default_risk_per_trade")]
    pub risk_per_trade: f64,
    /// Maximum number of concurrent open positions
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: u32,
    /// Maximum share (0.0-1.0) of gross exposure concentrated in one underlying
    #[serde(default = "default_correlation_limit")]
    pub correlation_limit: f64,
    /// Maximum combined risk of a multi-leg strategy as % of balance
    #[serde(default = "default_max_portfolio_risk")]
    pub max_portfolio_risk: f64,
}

fn default_max_position_size() -> f64 { 10.0 }
fn default_max_daily_loss() -> f64 { 5.0 }
fn default_max_drawdown() -> f64 { 15.0 }
fn default_risk_per_trade() -> f64 { 2.0 }
fn default_max_open_positions() -> u32 { 10 }
fn default_correlation_limit() -> f64 { 0.7 }
fn default_max_portfolio_risk() -> f64 { 20.0 }

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_size: default_max_position_size(),
            max_daily_loss: default_max_daily_loss(),
            max_drawdown: default_max_drawdown(),
            risk_per_trade: default_risk_per_trade(),
            max_open_positions: default_max_open_positions(),
            correlation_limit: default_correlation_limit(),
            max_portfolio_risk: default_max_portfolio_risk(),
        }
    }
}

// =============================================================================
// Positions as seen by the rule engine
// =============================================================================

/// A position as evaluated by risk rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskPosition {
    /// Instrument symbol (contract symbol for options)
    pub symbol: String,
    /// Underlying used for concentration grouping
    pub underlying: String,
    pub side: PositionSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub current_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    /// Units per quantity (100 for equity options, 1 for shares)
    #[serde(default = "default_unit_multiplier")]
    pub multiplier: f64,
}

fn default_unit_multiplier() -> f64 { 1.0 }

impl RiskPosition {
    /// A plain (non-option) position.
    pub fn new(symbol: &str, side: PositionSide, quantity: f64, entry_price: f64, current_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            underlying: symbol.to_string(),
            side,
            quantity,
            entry_price,
            current_price,
            stop_loss: None,
            multiplier: 1.0,
        }
    }

    /// Notional exposure at the current price.
    pub fn exposure(&self) -> f64 {
        (self.current_price * self.quantity * self.multiplier).abs()
    }

    pub fn unrealized_pnl(&self) -> f64 {
        (self.current_price - self.entry_price) * self.quantity * self.multiplier * self.side.sign()
    }

    /// Exposure as a percentage of equity. Any exposure against non-positive
    /// equity counts as 100%.
    pub fn risk_percent(&self, equity: f64) -> f64 {
        if equity > 0.0 {
            self.exposure() / equity * 100.0
        } else if self.exposure() > 0.0 {
            100.0
        } else {
            0.0
        }
    }

    /// Share of `total_exposure` held in this position's underlying, counted
    /// only when the underlying carries more than one position.
    pub fn correlation_proxy(&self, positions: &[RiskPosition]) -> f64 {
        let peers: Vec<&RiskPosition> = positions
            .iter()
            .filter(|p| p.underlying == self.underlying)
            .collect();
        if peers.len() < 2 {
            return 0.0;
        }
        let total: f64 = positions.iter().map(|p| p.exposure()).sum();
        if total <= 0.0 {
            return 0.0;
        }
        peers.iter().map(|p| p.exposure()).sum::<f64>() / total
    }
}

impl From<&OptionPosition> for RiskPosition {
    fn from(position: &OptionPosition) -> Self {
        Self {
            symbol: position.contract_symbol.clone(),
            underlying: position.underlying_symbol.clone(),
            side: position.side,
            quantity: position.quantity as f64,
            entry_price: position.entry_price,
            current_price: position.current_price,
            stop_loss: None,
            multiplier: position.multiplier as f64,
        }
    }
}

// =============================================================================
// Snapshots
// =============================================================================

/// Breakdown of the bounded risk score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskScoreBreakdown {
    /// 0-30
    pub position_size: f64,
    /// 0-25
    pub daily_loss: f64,
    /// 0-25
    pub drawdown: f64,
    /// 0-20
    pub position_count: f64,
}

impl RiskScoreBreakdown {
    pub const POSITION_SIZE_WEIGHT: f64 = 30.0;
    pub const DAILY_LOSS_WEIGHT: f64 = 25.0;
    pub const DRAWDOWN_WEIGHT: f64 = 25.0;
    pub const POSITION_COUNT_WEIGHT: f64 = 20.0;

    pub fn total(&self) -> f64 {
        self.position_size + self.daily_loss + self.drawdown + self.position_count
    }
}

/// Account-level risk derived from balances and the open position list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRiskSnapshot {
    pub balance: f64,
    /// Balance plus unrealized P&L
    pub equity: f64,
    pub daily_start_balance: f64,
    /// Sum of per-position risk as % of equity
    pub total_risk: f64,
    pub daily_pnl: f64,
    pub daily_pnl_percentage: f64,
    /// Drawdown from peak equity in %
    pub current_drawdown: f64,
    pub margin_used: f64,
    pub margin_available: f64,
    pub open_positions: usize,
    /// Bounded score in [0, 100]
    pub risk_score: f64,
    pub score_breakdown: RiskScoreBreakdown,
    /// Snapshot time (ms)
    pub timestamp: i64,
}

impl AccountRiskSnapshot {
    /// Fraction of total margin in use, 0 when nothing is allocated.
    pub fn margin_utilization(&self) -> f64 {
        let total = self.margin_used + self.margin_available;
        if total > 0.0 {
            self.margin_used / total
        } else {
            0.0
        }
    }
}

/// Portfolio-level exposure summary for option positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioRisk {
    pub total_unrealized_pnl: f64,
    /// Sum of absolute position market values
    pub total_exposure: f64,
    /// |delta| * 10 + |gamma| * 100
    pub max_risk: f64,
    /// max_risk / balance * 100
    pub risk_percentage: f64,
}

// =============================================================================
// Rules
// =============================================================================

/// Configured severity of a risk rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RuleSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleSeverity::Low => write!(f, "low"),
            RuleSeverity::Medium => write!(f, "medium"),
            RuleSeverity::High => write!(f, "high"),
            RuleSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Action a rule recommends when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Alert,
    ReducePositions,
    StopTrading,
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleAction::Alert => write!(f, "alert"),
            RuleAction::ReducePositions => write!(f, "reduce_positions"),
            RuleAction::StopTrading => write!(f, "stop_trading"),
        }
    }
}

/// Serializable view of a registered rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub severity: RuleSeverity,
    pub action: RuleAction,
    pub enabled: bool,
}

// =============================================================================
// Order Validation
// =============================================================================

/// A candidate order to check before execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCheck {
    pub symbol: String,
    pub size: f64,
    pub entry_price: f64,
    #[serde(default)]
    pub stop_loss: Option<f64>,
}

impl OrderCheck {
    pub fn new(symbol: &str, size: f64, entry_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            size,
            entry_price,
            stop_loss: None,
        }
    }

    pub fn with_stop_loss(mut self, stop_loss: f64) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }
}

/// Which limit a rejected order breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitBreach {
    PositionSize,
    RiskPerTrade,
    PortfolioRisk,
}

/// Pre-trade verdict. A rejection is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breach: Option<LimitBreach>,
}

impl ValidationResult {
    pub fn approved() -> Self {
        Self {
            valid: true,
            reason: None,
            suggested_size: None,
            breach: None,
        }
    }

    pub fn rejected(breach: LimitBreach, reason: String, suggested_size: Option<f64>) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            suggested_size,
            breach: Some(breach),
        }
    }
}

/// Multi-leg option strategy type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionStrategyType {
    /// Single call or put
    Single,
    /// Buy call, sell higher strike call
    BullCallSpread,
    /// Buy put, sell lower strike put
    BearPutSpread,
    /// Sell call, buy higher strike call (credit)
    BearCallSpread,
    /// Sell put, buy lower strike put (credit)
    BullPutSpread,
    /// Long call + long put at same strike
    Straddle,
    /// Long call + long put at different strikes
    Strangle,
    /// Short call spread + short put spread
    IronCondor,
    /// Short straddle + long wings
    IronButterfly,
    /// Custom multi-leg
    Custom,
}

impl Default for OptionStrategyType {
    fn default() -> Self {
        OptionStrategyType::Custom
    }
}

impl std::fmt::Display for OptionStrategyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionStrategyType::Single => write!(f, "single"),
            OptionStrategyType::BullCallSpread => write!(f, "bull_call_spread"),
            OptionStrategyType::BearPutSpread => write!(f, "bear_put_spread"),
            OptionStrategyType::BearCallSpread => write!(f, "bear_call_spread"),
            OptionStrategyType::BullPutSpread => write!(f, "bull_put_spread"),
            OptionStrategyType::Straddle => write!(f, "straddle"),
            OptionStrategyType::Strangle => write!(f, "strangle"),
            OptionStrategyType::IronCondor => write!(f, "iron_condor"),
            OptionStrategyType::IronButterfly => write!(f, "iron_butterfly"),
            OptionStrategyType::Custom => write!(f, "custom"),
        }
    }
}

/// One leg of a strategy order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyLeg {
    pub symbol: String,
    pub side: PositionSide,
    /// Size in units priced by `entry_price`
    pub size: f64,
    pub entry_price: f64,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_type: Option<OptionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strike: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<NaiveDate>,
}

impl StrategyLeg {
    pub fn new(symbol: &str, side: PositionSide, size: f64, entry_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            size,
            entry_price,
            stop_loss: None,
            option_type: None,
            strike: None,
            expiration: None,
        }
    }

    /// The single-order check for this leg.
    pub fn order_check(&self) -> OrderCheck {
        OrderCheck {
            symbol: self.symbol.clone(),
            size: self.size,
            entry_price: self.entry_price,
            stop_loss: self.stop_loss,
        }
    }
}

/// A multi-leg strategy submitted for validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyOrder {
    #[serde(default)]
    pub strategy_type: OptionStrategyType,
    pub legs: Vec<StrategyLeg>,
}

/// Verdict for a multi-leg strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Per-leg verdicts in submission order
    pub legs: Vec<ValidationResult>,
    /// Sum of per-leg position risk in %
    pub combined_risk: f64,
    /// Uniform factor to apply to every leg size so the combined check passes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_scale: Option<f64>,
}

/// Exposure grouped by underlying, used for reporting concentration.
pub fn exposure_by_underlying(positions: &[RiskPosition]) -> HashMap<String, f64> {
    let mut grouped: HashMap<String, f64> = HashMap::new();
    for position in positions {
        *grouped.entry(position.underlying.clone()).or_default() += position.exposure();
    }
    grouped
}
