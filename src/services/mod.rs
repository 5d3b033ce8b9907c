pub mod alerts;
pub mod chain;
pub mod market;
pub mod math;
pub mod options;
pub mod portfolio;
pub mod risk;
pub mod rules;
pub mod scheduler;
pub mod validator;

pub use alerts::{AlertLog, Subscription, DEFAULT_ALERT_CAPACITY};
pub use chain::{ChainConfig, ChainGenerator};
pub use market::{MarketSimulator, UnderlyingQuote};
pub use options::{OptionsError, OptionsService};
pub use portfolio::{ClosedPosition, PortfolioAggregator, PortfolioError, RepriceReport};
pub use risk::{AlertDebouncer, RiskManager};
pub use rules::{RiskRule, RiskRuleBuilder, RiskRuleEngine, RuleError};
pub use scheduler::ScheduledTask;
pub use validator::{OrderValidator, ValidationError};
