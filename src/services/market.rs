//! Market Simulator
//!
//! Random-walk underlying prices standing in for a live quote feed. Each tick
//! moves every tracked symbol by a uniform percentage in ±`tick_volatility`.
//! Symbols advance in sorted order, so a seeded simulator replays exactly.

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Mutex;

/// Lowest simulated price.
const MIN_PRICE: f64 = 0.01;

/// Largest per-tick move as a fraction of price.
pub const MAX_TICK_VOLATILITY: f64 = 0.5;

/// One simulated underlying quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnderlyingQuote {
    pub symbol: String,
    pub price: f64,
    /// Move since the previous tick in percent
    pub change_percent: f64,
    /// Timestamp (ms)
    pub timestamp: i64,
}

pub struct MarketSimulator {
    prices: DashMap<String, f64>,
    rng: Mutex<StdRng>,
    tick_volatility: f64,
}

impl MarketSimulator {
    /// `seed` fixes the walk; `None` seeds from entropy. The per-tick
    /// volatility is clamped to [0, `MAX_TICK_VOLATILITY`]; a non-finite
    /// value freezes prices.
    pub fn new(seed: Option<u64>, tick_volatility: f64) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            prices: DashMap::new(),
            rng: Mutex::new(rng),
            tick_volatility: if tick_volatility.is_finite() {
                tick_volatility.abs().min(MAX_TICK_VOLATILITY)
            } else {
                0.0
            },
        }
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices.insert(symbol.to_uppercase(), price.max(MIN_PRICE));
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(&symbol.to_uppercase()).map(|p| *p)
    }

    /// Tracked symbols in sorted order.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.prices.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    /// Advance every symbol one step.
    pub fn tick(&self) -> Vec<UnderlyingQuote> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());

        self.symbols()
            .into_iter()
            .filter_map(|symbol| {
                let mut entry = self.prices.get_mut(&symbol)?;
                let change = if self.tick_volatility > 0.0 {
                    rng.gen_range(-self.tick_volatility..self.tick_volatility)
                } else {
                    0.0
                };
                let previous = *entry;
                *entry = (previous * (1.0 + change)).max(MIN_PRICE);
                Some(UnderlyingQuote {
                    symbol,
                    price: *entry,
                    change_percent: (*entry / previous - 1.0) * 100.0,
                    timestamp,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(seed: u64) -> MarketSimulator {
        let sim = MarketSimulator::new(Some(seed), 0.01);
        sim.set_price("msft", 410.0);
        sim.set_price("AAPL", 192.85);
        sim
    }

    #[test]
    fn test_seeded_walk_replays() {
        let a = seeded(9);
        let b = seeded(9);
        for _ in 0..5 {
            let qa: Vec<f64> = a.tick().into_iter().map(|q| q.price).collect();
            let qb: Vec<f64> = b.tick().into_iter().map(|q| q.price).collect();
            assert_eq!(qa, qb);
        }
    }

    #[test]
    fn test_tick_moves_within_bounds() {
        let sim = seeded(3);
        let quotes = sim.tick();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].symbol, "AAPL");
        for q in &quotes {
            assert!(q.change_percent.abs() <= 1.0 + 1e-9);
            assert_eq!(sim.price(&q.symbol), Some(q.price));
        }
    }

    #[test]
    fn test_zero_volatility_is_flat() {
        let sim = MarketSimulator::new(None, 0.0);
        sim.set_price("SPY", 500.0);
        assert_eq!(sim.tick()[0].price, 500.0);
    }

    #[test]
    fn test_out_of_range_volatility_is_clamped() {
        let frozen = MarketSimulator::new(Some(3), f64::INFINITY);
        frozen.set_price("SPY", 500.0);
        assert_eq!(frozen.tick()[0].price, 500.0);

        let wild = MarketSimulator::new(Some(3), 7.0);
        wild.set_price("SPY", 500.0);
        for _ in 0..100 {
            let quote = &wild.tick()[0];
            assert!(quote.price.is_finite() && quote.price >= 0.01);
            assert!(quote.change_percent.abs() <= MAX_TICK_VOLATILITY * 100.0 + 1e-9);
        }
    }
}
