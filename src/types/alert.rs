//! Alert types for the risk alert log.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::risk::{RuleAction, RuleSeverity};

/// Alert categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Info,
    Warning,
    Critical,
}

impl AlertType {
    pub fn as_str(&self) -> &str {
        match self {
            AlertType::Info => "info",
            AlertType::Warning => "warning",
            AlertType::Critical => "critical",
        }
    }
}

impl From<RuleSeverity> for AlertType {
    fn from(severity: RuleSeverity) -> Self {
        match severity {
            RuleSeverity::Critical | RuleSeverity::High => AlertType::Critical,
            RuleSeverity::Medium => AlertType::Warning,
            RuleSeverity::Low => AlertType::Info,
        }
    }
}

/// A risk alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Time-prefixed unique ID
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<RuleAction>,
    /// Rule that produced the alert, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Timestamp in milliseconds
    pub timestamp: i64,
    pub acknowledged: bool,
}

impl Alert {
    pub fn new(alert_type: AlertType, message: impl Into<String>) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis();
        Self {
            id: alert_id(timestamp),
            alert_type,
            message: message.into(),
            symbol: None,
            action: None,
            rule_id: None,
            timestamp,
            acknowledged: false,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn is_critical(&self) -> bool {
        self.alert_type == AlertType::Critical
    }
}

/// "{timestamp}-{9 random base36 chars}".
fn alert_id(timestamp: i64) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}-{}", timestamp, suffix)
}

/// Change notification delivered to alert observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum AlertEvent {
    /// Current log contents, delivered on subscribe when replay is requested
    Snapshot(Vec<Alert>),
    Raised(Alert),
    Acknowledged(String),
    Cleared,
}
