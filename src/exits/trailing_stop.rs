//! Lowest-priority policy (40): once price has moved `trailing_activation_atr`
//! ATRs in favour, trail a stop behind the peak at `trailing_alpha` of ATR.
//! `TrackedExit.trail_reference` holds the current trail level so it only
//! ever ratchets in the position's favour.

use chrono::{DateTime, Utc};

use crate::config::ExitsConfig;
use crate::domain::{IndicatorFrame, Position, RiskState, Side, TrackedExit};

use super::{ExitAction, ExitDecision, ExitPolicy};

#[derive(Default)]
pub struct TrailingStopExit;

impl ExitPolicy for TrailingStopExit {
    fn name(&self) -> &'static str {
        "trailing_stop"
    }

    fn base_priority(&self) -> i32 {
        40
    }

    fn evaluate(
        &self,
        position: &Position,
        tracked: &TrackedExit,
        indicators: &IndicatorFrame,
        _risk_state: &RiskState,
        config: &ExitsConfig,
        _now: DateTime<Utc>,
    ) -> Option<ExitDecision> {
        let atr = indicators.last("atr_14");
        if atr.is_nan() || atr <= 0.0 {
            return None;
        }
        if position.max_favorable < atr * config.trailing_activation_atr {
            return None;
        }

        let trail_distance = atr * config.trailing_alpha;
        let trail_level = match position.side {
            Side::Long => position.entry_price + position.max_favorable - trail_distance,
            Side::Short => position.entry_price - position.max_favorable + trail_distance,
        };
        let reference = tracked.trail_reference.unwrap_or(trail_level);

        let breached = match position.side {
            Side::Long => position.current_price <= reference,
            Side::Short => position.current_price >= reference,
        };

        if breached {
            Some(ExitDecision {
                action: ExitAction::Close,
                policy_name: self.name(),
                reason: format!("trailing stop at {:.5} breached", reference),
            })
        } else {
            None
        }
    }
}
