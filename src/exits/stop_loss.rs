//! Two related policies: `AdaptiveLossExit` (priority 90) closes early when
//! price has moved against an ATR-scaled threshold tighter than the static
//! stop would allow, widening the static `Position.stop_loss` is not an
//! option the spec permits post-entry so this is the only way to express a
//! volatility-adaptive cut. `StopLossExit` (priority 65) is the simple
//! fallback: the static stop has been crossed but the broker hasn't reported
//! the close yet (e.g. stale price feed).

use chrono::{DateTime, Utc};

use crate::config::ExitsConfig;
use crate::domain::{IndicatorFrame, Position, RiskState, Side, TrackedExit};

use super::{ExitAction, ExitDecision, ExitPolicy};

pub struct AdaptiveLossExit;

impl ExitPolicy for AdaptiveLossExit {
    fn name(&self) -> &'static str {
        "stop_loss"
    }

    fn base_priority(&self) -> i32 {
        90
    }

    fn evaluate(
        &self,
        position: &Position,
        _tracked: &TrackedExit,
        indicators: &IndicatorFrame,
        _risk_state: &RiskState,
        _config: &ExitsConfig,
        _now: DateTime<Utc>,
    ) -> Option<ExitDecision> {
        let atr = indicators.last("atr_14");
        if atr.is_nan() || atr <= 0.0 {
            return None;
        }
        let adverse = position.max_adverse;
        if adverse >= atr * 3.0 {
            Some(ExitDecision {
                action: ExitAction::Close,
                policy_name: "stop_loss",
                reason: "adverse excursion exceeds 3x ATR, adaptive cut".to_string(),
            })
        } else {
            None
        }
    }
}

pub struct StopLossExit;

impl ExitPolicy for StopLossExit {
    fn name(&self) -> &'static str {
        "stop_loss_hit"
    }

    fn base_priority(&self) -> i32 {
        65
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
        let stop = position.stop_loss?;
        let crossed = match position.side {
            Side::Long => position.current_price <= stop,
            Side::Short => position.current_price >= stop,
        };
        if crossed {
            Some(ExitDecision {
                action: ExitAction::Close,
                policy_name: "stop_loss_hit",
                reason: "static stop-loss price crossed".to_string(),
            })
        } else {
            None
        }
    }
}
