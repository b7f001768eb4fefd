//! `ProfitScalingExit` (priority 60) takes partial profit at fixed R-multiple
//! tiers, tracked via `TrackedExit.scaled_tiers_hit` so each tier fires only
//! once. `TakeProfitExit` (priority 55) is the plain full-close at the static
//! take-profit price, lower priority than scaling since a tier should be
//! realised before the position fully closes at the same level.

use chrono::{DateTime, Utc};

use crate::config::ExitsConfig;
use crate::domain::{IndicatorFrame, Position, RiskState, Side, TrackedExit};

use super::{ExitAction, ExitDecision, ExitPolicy};

/// (R-multiple reached, fraction of remaining volume to scale out, tier id).
const TIERS: [(f64, f64, u8); 3] = [(1.0, 0.33, 1), (2.0, 0.33, 2), (3.0, 0.34, 3)];

#[derive(Default)]
pub struct ProfitScalingExit;

fn r_multiple(position: &Position) -> Option<f64> {
    let stop = position.stop_loss?;
    let risk_distance = (position.entry_price - stop).abs();
    if risk_distance <= 0.0 {
        return None;
    }
    let favorable = match position.side {
        Side::Long => position.current_price - position.entry_price,
        Side::Short => position.entry_price - position.current_price,
    };
    Some(favorable / risk_distance)
}

impl ExitPolicy for ProfitScalingExit {
    fn name(&self) -> &'static str {
        "profit_scaling"
    }

    fn base_priority(&self) -> i32 {
        60
    }

    fn evaluate(
        &self,
        position: &Position,
        tracked: &TrackedExit,
        _indicators: &IndicatorFrame,
        _risk_state: &RiskState,
        _config: &ExitsConfig,
        _now: DateTime<Utc>,
    ) -> Option<ExitDecision> {
        let r = r_multiple(position)?;
        for (threshold, fraction, tier) in TIERS {
            if r >= threshold && !tracked.scaled_tiers_hit.contains(&tier) {
                return Some(ExitDecision {
                    action: ExitAction::ScaleOut(fraction),
                    policy_name: self.name(),
                    reason: format!("reached {:.0}R, scaling out tier {}", threshold, tier),
                });
            }
        }
        None
    }
}

pub struct TakeProfitExit;

impl ExitPolicy for TakeProfitExit {
    fn name(&self) -> &'static str {
        "take_profit"
    }

    fn base_priority(&self) -> i32 {
        55
    }

    fn evaluate(
        &self,
        position: &Position,
        _tracked: &TrackedExit,
        _indicators: &IndicatorFrame,
        _risk_state: &RiskState,
        _config: &ExitsConfig,
        _now: DateTime<Utc>,
    ) -> Option<ExitDecision> {
        let tp = position.take_profit?;
        let crossed = match position.side {
            Side::Long => position.current_price >= tp,
            Side::Short => position.current_price <= tp,
        };
        if crossed {
            Some(ExitDecision {
                action: ExitAction::Close,
                policy_name: self.name(),
                reason: "static take-profit price reached".to_string(),
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PositionOrigin;
    use std::collections::HashSet;

    fn position() -> Position {
        Position {
            ticket: 1,
            symbol: "EURUSD".to_string(),
            side: Side::Long,
            volume: 1.0,
            entry_price: 1.1000,
            entry_time: Utc::now(),
            current_price: 1.1016,
            unrealized_pnl: 160.0,
            stop_loss: Some(1.0984),
            take_profit: Some(1.1100),
            max_favorable: 0.0016,
            max_adverse: 0.0,
            holding_bars: 3,
            origin: PositionOrigin::Engine,
            strategy_name: None,
        }
    }

    #[test]
    fn first_tier_fires_at_one_r() {
        let tracked = TrackedExit::default();
        let decision = ProfitScalingExit.evaluate(&position(), &tracked, &IndicatorFrame::default(), &RiskState::new(10_000.0), &dummy_config(), Utc::now());
        assert!(matches!(decision.unwrap().action, ExitAction::ScaleOut(f) if (f - 0.33).abs() < 1e-9));
    }

    #[test]
    fn already_hit_tier_is_skipped() {
        let mut tracked = TrackedExit::default();
        tracked.scaled_tiers_hit = HashSet::from([1]);
        let decision = ProfitScalingExit.evaluate(&position(), &tracked, &IndicatorFrame::default(), &RiskState::new(10_000.0), &dummy_config(), Utc::now());
        assert!(decision.is_none());
    }

    fn dummy_config() -> ExitsConfig {
        ExitsConfig {
            adverse_movement_pct: 0.01,
            adverse_movement_window_s: 60,
            max_hold_hours: 24,
            friday_cutoff_hour_utc: 21,
            crypto_prefixes: vec![],
            trailing_activation_atr: 1.0,
            trailing_alpha: 0.5,
            confluence_emergency: 0.9,
            confluence_close_now: 0.75,
            confluence_scale_out: 0.55,
        }
    }
}
