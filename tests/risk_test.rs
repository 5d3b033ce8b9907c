//! Tests for the risk rule engine, validator and alert fan-out
//!
//! Tests cover:
//! - Order and strategy validation scenarios
//! - Rule firing through the risk manager
//! - Alert log observers
//! - Risk score bounds

use riskdesk::services::risk::{build_snapshot, risk_score, AccountState};
use riskdesk::services::{
    AlertLog, OrderValidator, PortfolioAggregator, RiskManager, RiskRule, RiskRuleEngine,
};
use riskdesk::types::*;
use std::sync::{Arc, Mutex};

// =============================================================================
// Validator Tests
// =============================================================================

mod validator_tests {
    use super::*;

    fn validator() -> OrderValidator {
        OrderValidator::new(RiskLimits::default())
    }

    #[test]
    fn test_oversized_order_scenario() {
        let result = validator()
            .validate_order(&OrderCheck::new("AAPL", 15.0, 100.0), 10_000.0)
            .unwrap();
        assert!(!result.valid);
        assert_eq!(result.suggested_size, Some(10.0));
        assert!(result.reason.unwrap().contains("exceeds"));
    }

    #[test]
    fn test_small_order_scenario() {
        let result = validator()
            .validate_order(&OrderCheck::new("AAPL", 5.0, 100.0), 10_000.0)
            .unwrap();
        assert!(result.valid);
        assert!(result.reason.is_none());
    }

    #[test]
    fn test_rejection_is_monotonic_in_size() {
        let v = validator();
        let mut rejected = false;
        for tenth in 1..=300 {
            let size = tenth as f64 / 10.0;
            let result = v.validate_order(&OrderCheck::new("AAPL", size, 100.0), 10_000.0).unwrap();
            if rejected {
                assert!(!result.valid, "size {} approved after a smaller size was rejected", size);
            }
            rejected |= !result.valid;
        }
        assert!(rejected);
    }

    #[test]
    fn test_suggestions_pass_validation() {
        let v = validator();
        for (size, entry, stop) in [
            (15.0, 100.0, None),
            (40.0, 37.5, Some(30.0)),
            (3.0, 250.0, Some(100.0)),
            (1_000.0, 3.17, None),
        ] {
            let mut order = OrderCheck::new("X", size, entry);
            order.stop_loss = stop;
            let result = v.validate_order(&order, 10_000.0).unwrap();
            assert!(!result.valid);

            let mut retry = order.clone();
            retry.size = result.suggested_size.unwrap();
            assert!(
                v.validate_order(&retry, 10_000.0).unwrap().valid,
                "suggested {} for {:?} was rejected",
                retry.size,
                order
            );
        }
    }

    #[test]
    fn test_iron_condor_combined_risk() {
        let leg = |symbol: &str, side| StrategyLeg::new(symbol, side, 600.0, 1.5);
        let strategy = StrategyOrder {
            strategy_type: OptionStrategyType::IronCondor,
            legs: vec![
                leg("SPY250117P00560000", PositionSide::Buy),
                leg("SPY250117P00570000", PositionSide::Sell),
                leg("SPY250117C00600000", PositionSide::Sell),
                leg("SPY250117C00610000", PositionSide::Buy),
            ],
        };
        // 4 legs x 9% each
        let verdict = validator().validate_strategy(&strategy, 10_000.0).unwrap();
        assert!((verdict.combined_risk - 36.0).abs() < 1e-9);
        assert!(!verdict.valid);
        assert!(verdict.reason.unwrap().contains("Combined risk"));

        let scale = verdict.suggested_scale.unwrap();
        let scaled = StrategyOrder {
            strategy_type: strategy.strategy_type,
            legs: strategy
                .legs
                .iter()
                .map(|l| StrategyLeg { size: l.size * scale, ..l.clone() })
                .collect(),
        };
        assert!(validator().validate_strategy(&scaled, 10_000.0).unwrap().valid);
    }
}

// =============================================================================
// Rule Engine Tests
// =============================================================================

mod rule_tests {
    use super::*;

    fn manager(balance: f64) -> (Arc<PortfolioAggregator>, RiskManager) {
        let portfolio = Arc::new(PortfolioAggregator::new(balance));
        let manager =
            RiskManager::new(RiskLimits::default(), portfolio.clone(), Arc::new(AlertLog::default())).unwrap();
        (portfolio, manager)
    }

    #[test]
    fn test_daily_loss_scenario() {
        let (portfolio, manager) = manager(10_000.0);
        // Losing long call: entry 10.00, marked at 4.00 -> -600 unrealized
        let contract = OptionContract::new(
            "AAPL".to_string(),
            OptionType::Call,
            195.0,
            chrono::NaiveDate::from_ymd_opt(2025, 1, 17).unwrap(),
        );
        let contract = contract.with_analysis(
            OptionAnalysis {
                theoretical_price: 10.0,
                intrinsic_value: 0.0,
                time_value: 10.0,
                greeks: Greeks::default(),
            },
            0.3,
        );
        let position = OptionPosition::new(&contract, PositionSide::Buy, 1, 10.0).with_id("p1");
        portfolio.add_position(position).unwrap();
        portfolio.mark_position("p1", 4.0, Greeks::default()).unwrap();

        let alerts = manager.evaluate();
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.alert_type, AlertType::Critical);
        assert_eq!(alert.action, Some(RuleAction::StopTrading));
        assert_eq!(alert.rule_id.as_deref(), Some("daily_loss_limit"));
        assert_eq!(manager.alerts().alerts(), alerts);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let (portfolio, manager) = manager(10_000.0);
        portfolio.sync_balance(8_000.0);

        let first: Vec<Option<String>> = manager.check().1.into_iter().map(|a| a.rule_id).collect();
        let second: Vec<Option<String>> = manager.check().1.into_iter().map(|a| a.rule_id).collect();
        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![Some("daily_loss_limit".to_string()), Some("max_drawdown".to_string())]
        );
    }

    #[test]
    fn test_custom_engine() {
        let engine = RiskRuleEngine::new();
        engine
            .register(
                RiskRule::builder("low_equity")
                    .name("Low Equity")
                    .description("Equity below 5,000")
                    .severity(RuleSeverity::High)
                    .action(RuleAction::StopTrading)
                    .predicate(|s, _| s.equity < 5_000.0)
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let portfolio = Arc::new(PortfolioAggregator::new(4_000.0));
        let manager = RiskManager::with_rules(
            RiskLimits::default(),
            portfolio,
            engine,
            Arc::new(AlertLog::default()),
        );
        let alerts = manager.evaluate();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, "Low Equity: Equity below 5,000");
        assert!(alerts[0].is_critical());
    }
}

// =============================================================================
// Alert Fan-out Tests
// =============================================================================

mod alert_tests {
    use super::*;

    #[test]
    fn test_observers_see_rule_alerts_in_order() {
        let portfolio = Arc::new(PortfolioAggregator::new(10_000.0));
        let alerts = Arc::new(AlertLog::default());
        let manager = RiskManager::new(RiskLimits::default(), portfolio.clone(), alerts.clone()).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = alerts.subscribe(
            move |event| {
                if let AlertEvent::Raised(alert) = event {
                    sink.lock().unwrap().push(alert.rule_id.clone());
                }
            },
            true,
        );

        portfolio.sync_balance(8_000.0);
        manager.evaluate();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some("daily_loss_limit".to_string()), Some("max_drawdown".to_string())]
        );
    }

    #[test]
    fn test_acknowledge_then_clear() {
        let log = AlertLog::new(10);
        let alert = Alert::new(AlertType::Warning, "Margin Warning: high utilization");
        let id = alert.id.clone();
        log.push(alert);

        assert!(log.acknowledge(&id));
        assert!(log.alerts()[0].acknowledged);
        log.clear();
        assert!(log.is_empty());
    }
}

// =============================================================================
// Risk Score Tests
// =============================================================================

mod score_tests {
    use super::*;

    #[test]
    fn test_score_bounded_across_inputs() {
        let limits = RiskLimits::default();
        for total in [0.0, 5.0, 50.0, 1e6] {
            for loss in [-10.0, 0.0, 2.5, 99.0] {
                for drawdown in [0.0, 7.5, 80.0] {
                    for count in [0, 5, 50] {
                        let score = risk_score(total, loss, drawdown, count, &limits).total();
                        assert!((0.0..=100.0).contains(&score), "score {} out of range", score);
                    }
                }
            }
        }
    }

    #[test]
    fn test_snapshot_score_matches_breakdown() {
        let positions = vec![
            RiskPosition::new("AAPL", PositionSide::Buy, 20.0, 100.0, 90.0),
            RiskPosition::new("MSFT", PositionSide::Sell, 5.0, 400.0, 380.0),
        ];
        let account = AccountState {
            balance: 10_000.0,
            daily_start_balance: 10_200.0,
            peak_equity: 10_500.0,
        };
        let snapshot = build_snapshot(&account, &positions, &RiskLimits::default(), 0);
        assert_eq!(snapshot.open_positions, 2);
        assert!((snapshot.equity - 9_900.0).abs() < 1e-9);
        assert!((snapshot.risk_score - snapshot.score_breakdown.total()).abs() < 1e-12);
        assert!(snapshot.risk_score > 0.0 && snapshot.risk_score <= 100.0);
    }
}
