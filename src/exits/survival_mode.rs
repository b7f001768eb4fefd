//! Highest-priority exit policy (100): once `RiskState` is in `Survival` or
//! `Critical`, any position showing a loss is closed outright rather than
//! managed. Grounded on the teacher's `DrawdownMonitor` emergency-halt path.

use chrono::{DateTime, Utc};

use crate::config::ExitsConfig;
use crate::domain::{DrawdownState, IndicatorFrame, Position, RiskState, TrackedExit};

use super::{ExitAction, ExitDecision, ExitPolicy};

pub struct SurvivalModeExit;

impl ExitPolicy for SurvivalModeExit {
    fn name(&self) -> &'static str {
        "survival_mode"
    }

    fn base_priority(&self) -> i32 {
        100
    }

    fn evaluate(
        &self,
        position: &Position,
        _tracked: &TrackedExit,
        _indicators: &IndicatorFrame,
        risk_state: &RiskState,
        _config: &ExitsConfig,
        _now: DateTime<Utc>,
    ) -> Option<ExitDecision> {
        let in_emergency = matches!(risk_state.drawdown_state, DrawdownState::Survival | DrawdownState::Critical);
        if in_emergency && position.unrealized_pnl < 0.0 {
            Some(ExitDecision {
                action: ExitAction::Close,
                policy_name: self.name(),
                reason: format!("account in {:?}, closing losing position defensively", risk_state.drawdown_state),
            })
        } else {
            None
        }
    }
}
