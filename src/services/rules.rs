//! Risk Rule Engine
//!
//! Named rules (predicate + severity + action + enabled flag) evaluated in
//! registration order against an account snapshot and the open positions.
//! The engine keeps no fired state: every evaluation reports every rule whose
//! predicate currently holds.

use crate::types::{
    AccountRiskSnapshot, Alert, AlertType, RiskLimits, RiskPosition, RuleAction, RuleSeverity,
    RuleSummary,
};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info};

/// Margin utilization above which the margin warning fires.
pub const MARGIN_WARNING_UTILIZATION: f64 = 0.8;

/// Pure condition over a snapshot and the open positions.
pub type RulePredicate = Arc<dyn Fn(&AccountRiskSnapshot, &[RiskPosition]) -> bool + Send + Sync>;

/// Picks the symbol a fired alert is about, if any.
pub type RuleSubject = Arc<dyn Fn(&AccountRiskSnapshot, &[RiskPosition]) -> Option<String> + Send + Sync>;

/// Rule engine errors.
#[derive(Debug, Error, PartialEq)]
pub enum RuleError {
    #[error("Invalid rule configuration: {0}")]
    Configuration(String),

    #[error("Rule not found: {0}")]
    RuleNotFound(String),
}

/// A registered risk rule.
#[derive(Clone)]
pub struct RiskRule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub severity: RuleSeverity,
    pub action: RuleAction,
    pub enabled: bool,
    predicate: RulePredicate,
    subject: Option<RuleSubject>,
}

impl std::fmt::Debug for RiskRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskRule")
            .field("id", &self.id)
            .field("severity", &self.severity)
            .field("action", &self.action)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl RiskRule {
    pub fn builder(id: impl Into<String>) -> RiskRuleBuilder {
        RiskRuleBuilder {
            id: id.into(),
            name: None,
            description: String::new(),
            severity: RuleSeverity::Low,
            action: RuleAction::Alert,
            enabled: true,
            predicate: None,
            subject: None,
        }
    }

    /// Whether the predicate holds. Ignores the enabled flag.
    pub fn matches(&self, snapshot: &AccountRiskSnapshot, positions: &[RiskPosition]) -> bool {
        (self.predicate)(snapshot, positions)
    }

    /// The alert this rule emits when it fires.
    pub fn alert(&self, snapshot: &AccountRiskSnapshot, positions: &[RiskPosition]) -> Alert {
        let alert = Alert::new(
            AlertType::from(self.severity),
            format!("{}: {}", self.name, self.description),
        )
        .with_action(self.action)
        .with_rule(self.id.clone());
        match self.subject.as_ref().and_then(|subject| subject(snapshot, positions)) {
            Some(symbol) => alert.with_symbol(symbol),
            None => alert,
        }
    }

    pub fn summary(&self) -> RuleSummary {
        RuleSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            severity: self.severity,
            action: self.action,
            enabled: self.enabled,
        }
    }
}

/// Builder for [`RiskRule`]. `build` fails on an empty id or a missing
/// predicate.
pub struct RiskRuleBuilder {
    id: String,
    name: Option<String>,
    description: String,
    severity: RuleSeverity,
    action: RuleAction,
    enabled: bool,
    predicate: Option<RulePredicate>,
    subject: Option<RuleSubject>,
}

impl RiskRuleBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn severity(mut self, severity: RuleSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn action(mut self, action: RuleAction) -> Self {
        self.action = action;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&AccountRiskSnapshot, &[RiskPosition]) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Attach the offending symbol to fired alerts.
    pub fn subject<F>(mut self, subject: F) -> Self
    where
        F: Fn(&AccountRiskSnapshot, &[RiskPosition]) -> Option<String> + Send + Sync + 'static,
    {
        self.subject = Some(Arc::new(subject));
        self
    }

    pub fn build(self) -> Result<RiskRule, RuleError> {
        let id = self.id.trim().to_string();
        if id.is_empty() {
            return Err(RuleError::Configuration("rule id must not be empty".to_string()));
        }
        let predicate = self
            .predicate
            .ok_or_else(|| RuleError::Configuration(format!("rule {} has no predicate", id)))?;

        Ok(RiskRule {
            name: self.name.unwrap_or_else(|| id.clone()),
            id,
            description: self.description,
            severity: self.severity,
            action: self.action,
            enabled: self.enabled,
            predicate,
            subject: self.subject,
        })
    }
}

/// Ordered rule registry.
#[derive(Default)]
pub struct RiskRuleEngine {
    rules: RwLock<Vec<RiskRule>>,
}

impl RiskRuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine pre-loaded with the standard rule set for `limits`.
    pub fn with_builtin_rules(limits: &RiskLimits) -> Result<Self, RuleError> {
        let engine = Self::new();
        for rule in builtin_rules(limits)? {
            engine.register(rule)?;
        }
        Ok(engine)
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<RiskRule>> {
        self.rules.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<RiskRule>> {
        self.rules.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a rule. Duplicate IDs are a configuration error.
    pub fn register(&self, rule: RiskRule) -> Result<(), RuleError> {
        let mut rules = self.write();
        if rules.iter().any(|r| r.id == rule.id) {
            return Err(RuleError::Configuration(format!("duplicate rule id: {}", rule.id)));
        }
        debug!("Registered rule {} ({}, {})", rule.id, rule.severity, rule.action);
        rules.push(rule);
        Ok(())
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<RuleSummary, RuleError> {
        let mut rules = self.write();
        let rule = rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RuleError::RuleNotFound(id.to_string()))?;
        if rule.enabled != enabled {
            info!("Rule {} {}", id, if enabled { "enabled" } else { "disabled" });
        }
        rule.enabled = enabled;
        Ok(rule.summary())
    }

    /// One alert per enabled rule whose predicate holds, in registration order.
    pub fn evaluate(&self, snapshot: &AccountRiskSnapshot, positions: &[RiskPosition]) -> Vec<Alert> {
        let rules = self.read();
        let alerts: Vec<Alert> = rules
            .iter()
            .filter(|rule| rule.enabled && rule.matches(snapshot, positions))
            .map(|rule| rule.alert(snapshot, positions))
            .collect();
        debug!(
            "Evaluated {} rules against {} positions: {} fired",
            rules.len(),
            positions.len(),
            alerts.len()
        );
        alerts
    }

    pub fn rules(&self) -> Vec<RuleSummary> {
        self.read().iter().map(RiskRule::summary).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// The standard rule set, in evaluation order.
pub fn builtin_rules(limits: &RiskLimits) -> Result<Vec<RiskRule>, RuleError> {
    let l = *limits;
    Ok(vec![
        RiskRule::builder("daily_loss_limit")
            .name("Daily Loss Limit")
            .description(format!("Daily P&L exceeds {}% of the starting balance", l.max_daily_loss))
            .severity(RuleSeverity::Critical)
            .action(RuleAction::StopTrading)
            .predicate(move |s, _| s.daily_pnl_percentage.abs() > l.max_daily_loss)
            .build()?,
        RiskRule::builder("max_drawdown")
            .name("Max Drawdown")
            .description(format!("Drawdown from peak equity exceeds {}%", l.max_drawdown))
            .severity(RuleSeverity::Critical)
            .action(RuleAction::ReducePositions)
            .predicate(move |s, _| s.current_drawdown > l.max_drawdown)
            .build()?,
        RiskRule::builder("position_size_limit")
            .name("Position Size Limit")
            .description(format!("A position exceeds {}% of equity", l.max_position_size))
            .severity(RuleSeverity::High)
            .action(RuleAction::ReducePositions)
            .predicate(move |s, positions| {
                positions.iter().any(|p| p.risk_percent(s.equity) > l.max_position_size)
            })
            .subject(move |s, positions| {
                positions
                    .iter()
                    .find(|p| p.risk_percent(s.equity) > l.max_position_size)
                    .map(|p| p.symbol.clone())
            })
            .build()?,
        RiskRule::builder("correlation_risk")
            .name("Correlation Risk")
            .description(format!(
                "More than {:.0}% of exposure is concentrated in one underlying",
                l.correlation_limit * 100.0
            ))
            .severity(RuleSeverity::Medium)
            .action(RuleAction::Alert)
            .predicate(move |_, positions| {
                positions.iter().any(|p| p.correlation_proxy(positions) > l.correlation_limit)
            })
            .subject(move |_, positions| {
                positions
                    .iter()
                    .find(|p| p.correlation_proxy(positions) > l.correlation_limit)
                    .map(|p| p.underlying.clone())
            })
            .build()?,
        RiskRule::builder("margin_warning")
            .name("Margin Warning")
            .description(format!(
                "Margin utilization above {:.0}%",
                MARGIN_WARNING_UTILIZATION * 100.0
            ))
            .severity(RuleSeverity::Medium)
            .action(RuleAction::Alert)
            .predicate(|s, _| s.margin_utilization() > MARGIN_WARNING_UTILIZATION)
            .build()?,
        RiskRule::builder("max_positions")
            .name("Max Positions")
            .description(format!("More than {} open positions", l.max_open_positions))
            .severity(RuleSeverity::Medium)
            .action(RuleAction::Alert)
            .predicate(move |s, _| s.open_positions > l.max_open_positions as usize)
            .build()?,
    ])
}
