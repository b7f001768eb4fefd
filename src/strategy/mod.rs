//! §4.4 StrategyRegistry & Strategies. Each strategy is a pure function over
//! the latest bar and the shared indicator window -- stateless between ticks,
//! in the same spirit as the teacher's `Strategy::eval` trait (on_bar style),
//! generalised from a single breakout strategy into a fixed, closed registry
//! of the six canonical strategies the spec names.

pub mod ema_crossover;
pub mod mean_reversion;
pub mod momentum_breakout;
pub mod rsi_reversal;
pub mod scalping;
pub mod sma_crossover;
pub mod trend_following;

use crate::domain::{Bar, IndicatorFrame, Signal};

pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Columns this strategy reads from the shared `IndicatorFrame`.
    fn required_indicators(&self) -> &'static [&'static str];

    fn on_bar(&self, symbol: &str, bar: &Bar, indicators: &IndicatorFrame) -> Option<Signal>;
}

pub struct StrategyRegistry {
    strategies: Vec<Box<dyn Strategy>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_canonical_strategies()
    }
}

impl StrategyRegistry {
    pub fn with_canonical_strategies() -> Self {
        Self {
            strategies: vec![
                Box::new(sma_crossover::SmaCrossoverStrategy::default()),
                Box::new(ema_crossover::EmaCrossoverStrategy::default()),
                Box::new(rsi_reversal::RsiReversalStrategy::default()),
                Box::new(momentum_breakout::MomentumBreakoutStrategy::default()),
                Box::new(scalping::ScalpingStrategy::default()),
                Box::new(mean_reversion::MeanReversionStrategy::default()),
                Box::new(trend_following::TrendFollowingStrategy::default()),
            ],
        }
    }

    pub fn strategies(&self) -> &[Box<dyn Strategy>] {
        &self.strategies
    }

    pub fn by_name(&self, name: &str) -> Option<&dyn Strategy> {
        self.strategies.iter().find(|s| s.name() == name).map(|b| b.as_ref())
    }
}
