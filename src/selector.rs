//! §4.5 StrategySelector: scores every registered strategy on (performance,
//! regime-affinity, confidence), picks a primary and an ordered fallback
//! chain, and asks each in turn until one produces a signal. The scoring shape
//! mirrors the teacher's `RiskManager::calculate_position` composition style
//! (weighted terms summed into one scalar) applied here to strategy choice
//! rather than position sizing.

use std::collections::HashMap;

use crate::config::SelectorConfig;
use crate::domain::{Bar, IndicatorFrame, RegimeLabel, Signal, StrategyStats};
use crate::strategy::StrategyRegistry;

/// Static affinity lookup, stored as data rather than code. Values are in
/// [0, 1]; a strategy with no entry for a regime defaults to neutral (0.5).
pub fn affinity(strategy_name: &str, regime: RegimeLabel) -> f64 {
    use RegimeLabel::*;
    let table: &[(&str, RegimeLabel, f64)] = &[
        ("sma_crossover", TrendingUpStrong, 0.8),
        ("sma_crossover", TrendingDownStrong, 0.8),
        ("sma_crossover", RangingTight, 0.2),
        ("ema_crossover", TrendingUpWeak, 0.7),
        ("ema_crossover", TrendingDownWeak, 0.7),
        ("ema_crossover", Consolidating, 0.2),
        ("rsi_reversal", Reversal, 0.9),
        ("rsi_reversal", RangingWide, 0.6),
        ("rsi_reversal", TrendingUpStrong, 0.2),
        ("momentum_breakout", VolatileBreakout, 0.95),
        ("momentum_breakout", RangingTight, 0.1),
        ("scalping", RangingTight, 0.8),
        ("scalping", VolatileBreakout, 0.2),
        ("mean_reversion", RangingTight, 0.85),
        ("mean_reversion", RangingWide, 0.7),
        ("mean_reversion", TrendingUpStrong, 0.1),
        ("mean_reversion", TrendingDownStrong, 0.1),
        ("trend_following", TrendingUpStrong, 0.95),
        ("trend_following", TrendingDownStrong, 0.95),
        ("trend_following", VolatileConsolidation, 0.3),
    ];
    table
        .iter()
        .find(|(name, label, _)| *name == strategy_name && *label == regime)
        .map(|(_, _, score)| *score)
        .unwrap_or(0.5)
}

pub struct StrategySelector {
    config: SelectorConfig,
}

#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    pub signal: Signal,
    pub chosen_strategy: String,
    pub primary_strategy: String,
}

impl StrategySelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    fn score(&self, strategy_name: &str, regime: RegimeLabel, stats: &HashMap<String, StrategyStats>) -> f64 {
        let perf = stats
            .get(strategy_name)
            .map(|s| {
                if (s.wins + s.losses) < self.config.min_strategy_signals {
                    // Cold-start: neutral performance until enough outcomes exist.
                    0.5
                } else {
                    0.5 * s.win_rate() + 0.3 * (s.profit_factor() / 2.0).min(1.0) + 0.2 * s.recent_performance()
                }
            })
            .unwrap_or(0.5);
        let avg_confidence = stats.get(strategy_name).map(|s| s.average_confidence()).unwrap_or(0.5);

        self.config.performance_weight * perf
            + self.config.regime_weight * affinity(strategy_name, regime)
            + self.config.confidence_weight * avg_confidence
    }

    /// Ranks every strategy by score, returning `(primary, fallback_chain)`.
    pub fn rank(
        &self,
        registry: &StrategyRegistry,
        regime: RegimeLabel,
        stats: &HashMap<String, StrategyStats>,
    ) -> (String, Vec<String>) {
        let mut scored: Vec<(String, f64)> = registry
            .strategies()
            .iter()
            .map(|s| (s.name().to_string(), self.score(s.name(), regime, stats)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let primary = scored.first().map(|(name, _)| name.clone()).unwrap_or_default();
        let fallback = scored
            .into_iter()
            .skip(1)
            .take(self.config.fallback_depth)
            .map(|(name, _)| name)
            .collect();
        (primary, fallback)
    }

    /// Requests a signal from the primary strategy; on `None`, walks the
    /// fallback chain and accepts the first non-`None` signal.
    pub fn select(
        &self,
        registry: &StrategyRegistry,
        symbol: &str,
        bar: &Bar,
        indicators: &IndicatorFrame,
        regime: RegimeLabel,
        stats: &HashMap<String, StrategyStats>,
    ) -> Option<SelectionOutcome> {
        let (primary, fallback) = self.rank(registry, regime, stats);

        for candidate in std::iter::once(primary.clone()).chain(fallback) {
            if let Some(strategy) = registry.by_name(&candidate) {
                if let Some(signal) = strategy.on_bar(symbol, bar, indicators) {
                    return Some(SelectionOutcome {
                        signal,
                        chosen_strategy: candidate,
                        primary_strategy: primary,
                    });
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SelectorConfig {
        SelectorConfig {
            regime_check_interval_s: 180,
            min_strategy_signals: 20,
            performance_weight: 0.5,
            regime_weight: 0.3,
            confidence_weight: 0.2,
            fallback_depth: 3,
        }
    }

    #[test]
    fn cold_start_strategies_score_as_neutral_performance() {
        let selector = StrategySelector::new(config());
        let stats = HashMap::new();
        let (primary, _) = selector.rank(&StrategyRegistry::default(), RegimeLabel::TrendingUpStrong, &stats);
        // trend_following has the highest affinity for a strong uptrend and
        // every strategy is at neutral performance, so it should win.
        assert_eq!(primary, "trend_following");
    }

    #[test]
    fn fallback_chain_excludes_primary() {
        let selector = StrategySelector::new(config());
        let stats = HashMap::new();
        let (primary, fallback) = selector.rank(&StrategyRegistry::default(), RegimeLabel::RangingTight, &stats);
        assert!(!fallback.contains(&primary));
        assert!(fallback.len() <= 3);
    }
}
