//! Priority 80: on small accounts a single adverse tick can wipe out a
//! disproportionate share of equity before the static stop is reached.
//! Grounded on the teacher's balance-tiered `emergency_stop_loss_pct` idea in
//! `risk.rs`, re-purposed here as a per-position circuit breaker rather than a
//! sizing input.

use chrono::{DateTime, Utc};

use crate::config::ExitsConfig;
use crate::domain::{IndicatorFrame, Position, RiskState, TrackedExit};

use super::{ExitAction, ExitDecision, ExitPolicy};

const MICRO_ACCOUNT_EQUITY_CEILING: f64 = 100.0;

pub struct MicroAccountProtectExit;

impl ExitPolicy for MicroAccountProtectExit {
    fn name(&self) -> &'static str {
        "micro_account_protect"
    }

    fn base_priority(&self) -> i32 {
        80
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
        if risk_state.equity > MICRO_ACCOUNT_EQUITY_CEILING {
            return None;
        }
        let loss_fraction = (-position.unrealized_pnl / risk_state.equity.max(1e-9)).max(0.0);
        if loss_fraction >= 0.05 {
            Some(ExitDecision {
                action: ExitAction::Close,
                policy_name: self.name(),
                reason: format!("micro account loss fraction {:.2}% exceeds 5% ceiling", loss_fraction * 100.0),
            })
        } else {
            None
        }
    }
}
