//! Priority 45: closes positions held past `max_hold_hours`, and force-closes
//! ahead of the weekend close (P6) — except crypto symbols, which trade
//! through the weekend and are exempt from the Friday cutoff.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};

use crate::config::ExitsConfig;
use crate::domain::{IndicatorFrame, Position, RiskState, TrackedExit};

use super::{ExitAction, ExitDecision, ExitPolicy};

pub struct TimeBasedExit;

fn past_friday_cutoff(now: DateTime<Utc>, cutoff_hour: u32) -> bool {
    now.weekday() == Weekday::Fri && now.hour() >= cutoff_hour
}

impl ExitPolicy for TimeBasedExit {
    fn name(&self) -> &'static str {
        "time_based"
    }

    fn base_priority(&self) -> i32 {
        45
    }

    fn evaluate(
        &self,
        position: &Position,
        _tracked: &TrackedExit,
        _indicators: &IndicatorFrame,
        _risk_state: &RiskState,
        config: &ExitsConfig,
        now: DateTime<Utc>,
    ) -> Option<ExitDecision> {
        let is_crypto = config.is_crypto(&position.symbol);

        if !is_crypto && past_friday_cutoff(now, config.friday_cutoff_hour_utc) {
            return Some(ExitDecision {
                action: ExitAction::Close,
                policy_name: self.name(),
                reason: "weekend close approaching, non-crypto position flattened".to_string(),
            });
        }

        let held = now - position.entry_time;
        if held.num_hours() >= config.max_hold_hours as i64 {
            return Some(ExitDecision {
                action: ExitAction::Close,
                policy_name: self.name(),
                reason: format!("held for {}h, exceeds max_hold_hours", held.num_hours()),
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn p6_friday_evening_triggers_cutoff_for_fiat_not_crypto() {
        let friday_close = Utc.with_ymd_and_hms(2026, 7, 24, 22, 0, 0).unwrap();
        assert!(past_friday_cutoff(friday_close, 21));
        let thursday = Utc.with_ymd_and_hms(2026, 7, 23, 22, 0, 0).unwrap();
        assert!(!past_friday_cutoff(thursday, 21));
    }
}
