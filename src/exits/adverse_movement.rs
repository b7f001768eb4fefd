//! Priority 70: a sharp move against the position within a short rolling
//! window triggers an early exit, independent of whether the static stop has
//! been reached yet. `TrackedExit.last_adverse_sample` provides the rolling
//! reference point; the caller is responsible for updating it once per tick.

use chrono::{DateTime, Utc};

use crate::config::ExitsConfig;
use crate::domain::{IndicatorFrame, Position, RiskState, Side, TrackedExit};

use super::{ExitAction, ExitDecision, ExitPolicy};

#[derive(Default)]
pub struct AdverseMovementExit;

impl ExitPolicy for AdverseMovementExit {
    fn name(&self) -> &'static str {
        "adverse_movement"
    }

    fn base_priority(&self) -> i32 {
        70
    }

    fn evaluate(
        &self,
        position: &Position,
        tracked: &TrackedExit,
        _indicators: &IndicatorFrame,
        _risk_state: &RiskState,
        config: &ExitsConfig,
        now: DateTime<Utc>,
    ) -> Option<ExitDecision> {
        let (sampled_at, sampled_price) = tracked.last_adverse_sample?;
        let window = chrono::Duration::seconds(config.adverse_movement_window_s as i64);
        if now - sampled_at > window {
            return None;
        }

        let moved_against = match position.side {
            Side::Long => sampled_price - position.current_price,
            Side::Short => position.current_price - sampled_price,
        };
        let pct = moved_against / sampled_price.max(1e-9);

        if pct >= config.adverse_movement_pct {
            Some(ExitDecision {
                action: ExitAction::Close,
                policy_name: self.name(),
                reason: format!("price moved {:.3}% against position within {}s window", pct * 100.0, config.adverse_movement_window_s),
            })
        } else {
            None
        }
    }
}
