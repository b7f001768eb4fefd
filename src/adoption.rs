//! §4.9 AdoptionScanner: detects broker positions not originated by this
//! engine and, subject to the policy table, enrolls them under management
//! with default protection. Grounded on the teacher's own distinction between
//! `origin=ENGINE`/`origin=ADOPTED` and its magic-number ownership check.

use chrono::Utc;
use tracing::info;

use crate::config::{AdoptionConfig, ExitsConfig, RiskConfig};
use crate::domain::{Position, PositionOrigin};

pub struct AdoptionScanner {
    config: AdoptionConfig,
}

#[derive(Debug, Clone)]
pub struct DefaultProtection {
    pub stop_loss: f64,
    pub take_profit: f64,
}

impl AdoptionScanner {
    pub fn new(config: AdoptionConfig) -> Self {
        Self { config }
    }

    pub fn is_due(&self, tick_count: u64) -> bool {
        self.config.enabled && tick_count % self.config.adopt_interval_ticks.max(1) == 0
    }

    /// True if this broker position is not owned by the engine (distinct
    /// magic number or absent) and passes the policy table.
    pub fn should_adopt(&self, symbol: &str, position_magic: Option<u64>, engine_magic: u64, position_age_hours: f64) -> bool {
        if position_magic == Some(engine_magic) {
            return false;
        }
        if self.config.ignore_symbols.iter().any(|s| s == symbol) {
            return false;
        }
        if !self.config.adopt_symbols.is_empty() && !self.config.adopt_symbols.iter().any(|s| s == symbol) {
            return false;
        }
        if position_age_hours > self.config.max_age_hours as f64 {
            return false;
        }
        true
    }

    pub fn log_only(&self) -> bool {
        self.config.log_only
    }

    /// Computes SL at the configured emergency percentage below/above entry
    /// and TP at the configured R:R.
    pub fn default_protection(&self, position: &Position, risk_config: &RiskConfig) -> DefaultProtection {
        let distance = position.entry_price * risk_config.emergency_stop_loss_pct;
        let (stop_loss, take_profit) = match position.side {
            crate::domain::Side::Long => (
                position.entry_price - distance,
                position.entry_price + distance * risk_config.min_risk_reward_ratio,
            ),
            crate::domain::Side::Short => (
                position.entry_price + distance,
                position.entry_price - distance * risk_config.min_risk_reward_ratio,
            ),
        };
        DefaultProtection { stop_loss, take_profit }
    }

    /// Scans the given broker positions for unowned ones and returns the
    /// subset that should be adopted (policy-filtered), each accompanied by
    /// its default protection. Crypto symbols are later exempt from the
    /// weekend-close policy in [`crate::exits`], not here.
    pub fn scan(
        &self,
        positions: &[Position],
        engine_magic: u64,
        position_magics: impl Fn(u64) -> Option<u64>,
        risk_config: &RiskConfig,
        exits_config: &ExitsConfig,
    ) -> Vec<(Position, DefaultProtection)> {
        let mut adopted = Vec::new();
        for position in positions {
            if position.origin == PositionOrigin::Adopted {
                continue;
            }
            let age_hours = (Utc::now() - position.entry_time).num_minutes() as f64 / 60.0;
            let magic = position_magics(position.ticket);
            if !self.should_adopt(&position.symbol, magic, engine_magic, age_hours) {
                continue;
            }

            info!(
                ticket = position.ticket,
                symbol = %position.symbol,
                crypto = exits_config.is_crypto(&position.symbol),
                "adopting unowned broker position"
            );

            let mut adopted_position = position.clone();
            adopted_position.origin = PositionOrigin::Adopted;
            let protection = self.default_protection(&adopted_position, risk_config);
            adopted.push((adopted_position, protection));
        }
        adopted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;

    fn config() -> AdoptionConfig {
        AdoptionConfig {
            enabled: true,
            adopt_symbols: vec![],
            ignore_symbols: vec![],
            max_age_hours: 72,
            log_only: false,
            adopt_interval_ticks: 20,
        }
    }

    fn position(ticket: u64, symbol: &str) -> Position {
        Position {
            ticket,
            symbol: symbol.to_string(),
            side: Side::Long,
            volume: 1.0,
            entry_price: 100.0,
            entry_time: Utc::now(),
            current_price: 100.0,
            unrealized_pnl: 0.0,
            stop_loss: None,
            take_profit: None,
            max_favorable: 0.0,
            max_adverse: 0.0,
            holding_bars: 0,
            origin: PositionOrigin::Engine,
            strategy_name: None,
        }
    }

    #[test]
    fn s3_adoption_computes_emergency_protection() {
        let scanner = AdoptionScanner::new(config());
        let risk_config = RiskConfig {
            fractional_risk: 0.02,
            max_position_size: 1.0,
            max_daily_loss: 0.06,
            drawdown_halt_percent: 0.5,
            sl_balance_thresholds: (0.1, 0.03, 0.02, 0.015),
            sl_balance_breakpoints: vec![5.0, 100.0, 1000.0, 5000.0],
            emergency_stop_loss_pct: 0.05,
            min_risk_reward_ratio: 2.0,
            performance_based_sizing: true,
            use_stabilized: true,
            max_open_positions: 10,
            leverage: 30.0,
        };
        let protection = scanner.default_protection(&position(1001, "BTCUSD"), &risk_config);
        assert!((protection.stop_loss - 95.0).abs() < 1e-9);
        assert!((protection.take_profit - 110.0).abs() < 1e-9);
    }

    #[test]
    fn engine_owned_positions_are_never_adopted() {
        let scanner = AdoptionScanner::new(config());
        assert!(!scanner.should_adopt("EURUSD", Some(778001), 778001, 1.0));
        assert!(scanner.should_adopt("EURUSD", Some(1), 778001, 1.0));
        assert!(scanner.should_adopt("EURUSD", None, 778001, 1.0));
    }
}
