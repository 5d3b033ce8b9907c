//! Risk Manager
//!
//! Account-level risk control on top of the portfolio:
//! - Builds `AccountRiskSnapshot`s (equity, daily P&L, drawdown, margin, score)
//! - Evaluates the rule engine and appends fired alerts to the alert log
//! - Resets the daily starting balance at local midnight

use crate::services::alerts::AlertLog;
use crate::services::portfolio::PortfolioAggregator;
use crate::services::rules::{RiskRuleEngine, RuleError};
use crate::services::scheduler::{duration_until_next_midnight, ScheduledTask, DAILY};
use crate::types::{
    AccountRiskSnapshot, Alert, AlertType, RiskLimits, RiskPosition, RiskScoreBreakdown,
};
use chrono::{Local, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Clamp `value / limit` into [0, 1]. A non-positive limit saturates.
fn capped_ratio(value: f64, limit: f64) -> f64 {
    if !(value > 0.0) {
        0.0
    } else if !(limit > 0.0) {
        1.0
    } else {
        (value / limit).min(1.0)
    }
}

/// Weighted risk score, each component capped at its weight.
pub fn risk_score(
    total_risk: f64,
    daily_loss_pct: f64,
    drawdown: f64,
    open_positions: usize,
    limits: &RiskLimits,
) -> RiskScoreBreakdown {
    RiskScoreBreakdown {
        position_size: capped_ratio(total_risk, limits.max_portfolio_risk)
            * RiskScoreBreakdown::POSITION_SIZE_WEIGHT,
        daily_loss: capped_ratio(daily_loss_pct, limits.max_daily_loss) * RiskScoreBreakdown::DAILY_LOSS_WEIGHT,
        drawdown: capped_ratio(drawdown, limits.max_drawdown) * RiskScoreBreakdown::DRAWDOWN_WEIGHT,
        position_count: capped_ratio(open_positions as f64, limits.max_open_positions as f64)
            * RiskScoreBreakdown::POSITION_COUNT_WEIGHT,
    }
}

/// Inputs for a snapshot, separate from where they are tracked.
#[derive(Debug, Clone, Copy)]
pub struct AccountState {
    pub balance: f64,
    pub daily_start_balance: f64,
    /// Highest equity seen so far
    pub peak_equity: f64,
}

/// Build a snapshot from account state and positions.
pub fn build_snapshot(
    account: &AccountState,
    positions: &[RiskPosition],
    limits: &RiskLimits,
    timestamp: i64,
) -> AccountRiskSnapshot {
    let unrealized: f64 = positions.iter().map(|p| p.unrealized_pnl()).sum();
    let equity = account.balance + unrealized;

    let total_risk: f64 = positions.iter().map(|p| p.risk_percent(equity)).sum();

    let daily_pnl = equity - account.daily_start_balance;
    let daily_pnl_percentage = if account.daily_start_balance > 0.0 {
        daily_pnl / account.daily_start_balance * 100.0
    } else {
        0.0
    };

    let peak = account.peak_equity.max(equity);
    let current_drawdown = if peak > 0.0 {
        ((peak - equity) / peak * 100.0).max(0.0)
    } else {
        0.0
    };

    let margin_used: f64 = positions.iter().map(|p| p.exposure()).sum();
    let margin_available = (equity - margin_used).max(0.0);

    let score_breakdown = risk_score(
        total_risk,
        -daily_pnl_percentage,
        current_drawdown,
        positions.len(),
        limits,
    );

    AccountRiskSnapshot {
        balance: account.balance,
        equity,
        daily_start_balance: account.daily_start_balance,
        total_risk,
        daily_pnl,
        daily_pnl_percentage,
        current_drawdown,
        margin_used,
        margin_available,
        open_positions: positions.len(),
        risk_score: score_breakdown.total(),
        score_breakdown,
        timestamp,
    }
}

struct DailyState {
    daily_start_balance: f64,
    peak_equity: f64,
}

/// Owns daily account state, the rule engine and the alert log.
pub struct RiskManager {
    limits: RiskLimits,
    portfolio: Arc<PortfolioAggregator>,
    rules: RiskRuleEngine,
    alerts: Arc<AlertLog>,
    daily: Mutex<DailyState>,
}

impl RiskManager {
    /// Manager with the built-in rule set.
    pub fn new(
        limits: RiskLimits,
        portfolio: Arc<PortfolioAggregator>,
        alerts: Arc<AlertLog>,
    ) -> Result<Self, RuleError> {
        let rules = RiskRuleEngine::with_builtin_rules(&limits)?;
        Ok(Self::with_rules(limits, portfolio, rules, alerts))
    }

    pub fn with_rules(
        limits: RiskLimits,
        portfolio: Arc<PortfolioAggregator>,
        rules: RiskRuleEngine,
        alerts: Arc<AlertLog>,
    ) -> Self {
        let equity = portfolio.equity();
        Self {
            limits,
            portfolio,
            rules,
            alerts,
            daily: Mutex::new(DailyState {
                daily_start_balance: equity,
                peak_equity: equity,
            }),
        }
    }

    fn daily(&self) -> MutexGuard<'_, DailyState> {
        self.daily.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn rules(&self) -> &RiskRuleEngine {
        &self.rules
    }

    pub fn alerts(&self) -> &Arc<AlertLog> {
        &self.alerts
    }

    pub fn portfolio(&self) -> &Arc<PortfolioAggregator> {
        &self.portfolio
    }

    pub fn daily_start_balance(&self) -> f64 {
        self.daily().daily_start_balance
    }

    /// Current snapshot. Raises the tracked equity peak as a side effect.
    pub fn snapshot(&self) -> AccountRiskSnapshot {
        let (balance, positions) = self.portfolio.account_view();
        self.snapshot_with(balance, &positions)
    }

    fn snapshot_with(&self, balance: f64, positions: &[RiskPosition]) -> AccountRiskSnapshot {
        let mut daily = self.daily();
        let account = AccountState {
            balance,
            daily_start_balance: daily.daily_start_balance,
            peak_equity: daily.peak_equity,
        };
        let snapshot = build_snapshot(&account, positions, &self.limits, Utc::now().timestamp_millis());
        daily.peak_equity = daily.peak_equity.max(snapshot.equity);
        snapshot
    }

    /// Evaluate rules without touching the alert log.
    pub fn check(&self) -> (AccountRiskSnapshot, Vec<Alert>) {
        let (balance, positions) = self.portfolio.account_view();
        let snapshot = self.snapshot_with(balance, &positions);
        let alerts = self.rules.evaluate(&snapshot, &positions);
        (snapshot, alerts)
    }

    /// Evaluate rules and append every fired alert to the log.
    pub fn evaluate(&self) -> Vec<Alert> {
        let (snapshot, alerts) = self.check();
        debug!(
            "Risk score {:.1} ({} positions), {} alerts",
            snapshot.risk_score,
            snapshot.open_positions,
            alerts.len()
        );
        self.alerts.extend(alerts.iter().cloned());
        alerts
    }

    /// Roll the daily starting balance to current equity, so losses still
    /// open at the reset do not count against the new day.
    pub fn daily_reset(&self) -> Alert {
        let equity = self.portfolio.equity();
        self.daily().daily_start_balance = equity;
        info!("Daily risk reset: starting balance {:.2}", equity);

        let alert = Alert::new(
            AlertType::Info,
            format!("Daily risk counters reset. Starting balance: {:.2}", equity),
        );
        self.alerts.push(alert.clone());
        alert
    }

    /// Schedule `daily_reset` at the next local midnight and every 24h after.
    pub fn start_daily_reset(self: &Arc<Self>) -> ScheduledTask {
        let first_delay = duration_until_next_midnight(&Local::now());
        let manager = Arc::downgrade(self);
        ScheduledTask::spawn("daily_risk_reset", first_delay, DAILY, move || {
            if let Some(manager) = manager.upgrade() {
                manager.daily_reset();
            }
        })
    }
}

/// Passes only rule alerts that were not firing on the previous check.
///
/// Alerts without a rule ID always pass.
#[derive(Debug, Default)]
pub struct AlertDebouncer {
    active: HashSet<String>,
}

impl AlertDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&mut self, alerts: Vec<Alert>) -> Vec<Alert> {
        let current: HashSet<String> = alerts.iter().filter_map(|a| a.rule_id.clone()).collect();
        let fresh = alerts
            .into_iter()
            .filter(|a| match &a.rule_id {
                Some(id) => !self.active.contains(id),
                None => true,
            })
            .collect();
        self.active = current;
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OptionContract, OptionPosition, OptionType, PositionSide};
    use chrono::NaiveDate;

    fn account(balance: f64) -> AccountState {
        AccountState {
            balance,
            daily_start_balance: 10_000.0,
            peak_equity: 10_000.0,
        }
    }

    #[test]
    fn test_empty_snapshot() {
        let s = build_snapshot(&account(10_000.0), &[], &RiskLimits::default(), 0);
        assert_eq!(s.equity, 10_000.0);
        assert_eq!(s.risk_score, 0.0);
        assert_eq!(s.margin_available, 10_000.0);
        assert_eq!(s.daily_pnl_percentage, 0.0);
    }

    #[test]
    fn test_snapshot_with_losses() {
        let positions = vec![RiskPosition::new("AAPL", PositionSide::Buy, 10.0, 100.0, 80.0)];
        let s = build_snapshot(&account(10_000.0), &positions, &RiskLimits::default(), 0);

        assert_eq!(s.equity, 9_800.0);
        assert!((s.daily_pnl + 200.0).abs() < 1e-9);
        assert!((s.daily_pnl_percentage + 2.0).abs() < 1e-9);
        assert!((s.current_drawdown - 2.0).abs() < 1e-9);
        assert!((s.total_risk - 800.0 / 9_800.0 * 100.0).abs() < 1e-9);
        assert_eq!(s.margin_used, 800.0);
        assert_eq!(s.margin_available, 9_000.0);
        // 8.16/20*30 + 2/5*25 + 2/15*25 + 1/10*20
        let b = s.score_breakdown;
        assert!((b.daily_loss - 10.0).abs() < 1e-9);
        assert!((b.position_count - 2.0).abs() < 1e-9);
        assert!((s.risk_score - b.total()).abs() < 1e-12);
    }

    #[test]
    fn test_risk_score_is_bounded() {
        let limits = RiskLimits::default();
        let maxed = risk_score(1e9, 1e9, 1e9, 1_000, &limits);
        assert_eq!(maxed.total(), 100.0);

        let zero_limits = RiskLimits {
            max_portfolio_risk: 0.0,
            max_daily_loss: 0.0,
            max_drawdown: 0.0,
            max_open_positions: 0,
            ..limits
        };
        assert_eq!(risk_score(1.0, 1.0, 1.0, 1, &zero_limits).total(), 100.0);
        assert_eq!(risk_score(-5.0, f64::NAN, 0.0, 0, &limits).total(), 0.0);
    }

    #[test]
    fn test_gains_do_not_add_daily_loss_score() {
        let positions = vec![RiskPosition::new("AAPL", PositionSide::Buy, 1.0, 100.0, 600.0)];
        let s = build_snapshot(&account(10_000.0), &positions, &RiskLimits::default(), 0);
        assert!(s.daily_pnl_percentage > 0.0);
        assert_eq!(s.score_breakdown.daily_loss, 0.0);
        assert_eq!(s.current_drawdown, 0.0);
    }

    fn manager(balance: f64) -> (Arc<PortfolioAggregator>, RiskManager) {
        let portfolio = Arc::new(PortfolioAggregator::new(balance));
        let manager = RiskManager::new(RiskLimits::default(), portfolio.clone(), Arc::new(AlertLog::default())).unwrap();
        (portfolio, manager)
    }

    #[test]
    fn test_evaluate_appends_and_check_does_not() {
        let (portfolio, manager) = manager(10_000.0);
        portfolio.sync_balance(9_400.0);

        let (snapshot, alerts) = manager.check();
        assert!((snapshot.daily_pnl_percentage + 6.0).abs() < 1e-9);
        assert_eq!(alerts.len(), 1);
        assert!(manager.alerts().is_empty());

        let alerts = manager.evaluate();
        assert_eq!(alerts.len(), 1);
        assert_eq!(manager.alerts().len(), 1);
    }

    #[test]
    fn test_peak_tracks_equity() {
        let (portfolio, manager) = manager(10_000.0);
        portfolio.sync_balance(12_000.0);
        manager.snapshot();
        portfolio.sync_balance(10_200.0);
        let s = manager.snapshot();
        assert!((s.current_drawdown - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_daily_reset() {
        let (portfolio, manager) = manager(10_000.0);
        portfolio.sync_balance(9_400.0);

        let alert = manager.daily_reset();
        assert_eq!(alert.alert_type, AlertType::Info);
        assert_eq!(manager.daily_start_balance(), 9_400.0);
        assert_eq!(manager.alerts().len(), 1);

        let (snapshot, alerts) = manager.check();
        assert_eq!(snapshot.daily_pnl, 0.0);
        assert!(alerts.is_empty());
    }

    fn option_position(id: &str, entry: f64, mark: f64) -> OptionPosition {
        let mut contract = OptionContract::new(
            "AAPL".to_string(),
            OptionType::Call,
            195.0,
            NaiveDate::from_ymd_opt(2025, 1, 17).unwrap(),
        );
        contract.implied_volatility = 0.3;
        let mut position = OptionPosition::new(&contract, PositionSide::Buy, 1, entry).with_id(id);
        position.current_price = mark;
        position
    }

    #[test]
    fn test_daily_reset_absorbs_open_losses() {
        let (portfolio, manager) = manager(10_000.0);
        // -600 unrealized on 10,000
        portfolio.add_position(option_position("p1", 10.0, 4.0)).unwrap();
        assert_eq!(manager.check().1.len(), 1);

        manager.daily_reset();
        assert_eq!(manager.daily_start_balance(), 9_400.0);

        let (snapshot, alerts) = manager.check();
        assert!(snapshot.daily_pnl.abs() < 1e-9);
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_snapshot_never_sees_half_applied_close() {
        let (portfolio, manager) = manager(10_000.0);
        let writer = {
            let portfolio = portfolio.clone();
            std::thread::spawn(move || {
                for i in 0..2_000 {
                    // +600 then -600: equity is 10,000 or 10,600 between calls
                    let (entry, mark) = if i % 2 == 0 { (4.0, 10.0) } else { (10.0, 4.0) };
                    let id = format!("p{}", i);
                    portfolio.add_position(option_position(&id, entry, mark)).unwrap();
                    portfolio.close_position(&id, None).unwrap();
                }
            })
        };

        while !writer.is_finished() {
            let equity = manager.snapshot().equity;
            assert!(
                (equity - 10_000.0).abs() < 1e-6 || (equity - 10_600.0).abs() < 1e-6,
                "torn equity {}",
                equity
            );
        }
        writer.join().unwrap();
        assert!((manager.snapshot().equity - 10_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_debouncer_emits_on_transition() {
        let mut debouncer = AlertDebouncer::new();
        let fired = || vec![Alert::new(AlertType::Critical, "x").with_rule("daily_loss_limit")];

        assert_eq!(debouncer.filter(fired()).len(), 1);
        assert!(debouncer.filter(fired()).is_empty());
        assert!(debouncer.filter(vec![]).is_empty());
        assert_eq!(debouncer.filter(fired()).len(), 1);

        let unruled = vec![Alert::new(AlertType::Info, "reset")];
        assert_eq!(debouncer.filter(unruled.clone()).len(), 1);
        assert_eq!(debouncer.filter(unruled).len(), 1);
    }
}
