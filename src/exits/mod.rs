//! §4.10 ExitCoordinator: an ordered, dynamically re-prioritised set of exit
//! policies. For each open position per tick, policies are evaluated in
//! descending adjusted priority; the first non-None signal wins and no other
//! policy is evaluated for that position this tick (P3, P9).

pub mod adverse_movement;
pub mod confluence;
pub mod micro_account_protect;
pub mod profit_scaling;
pub mod stop_loss;
pub mod survival_mode;
pub mod time_based;
pub mod trailing_stop;

use chrono::{DateTime, Utc};

use crate::config::ExitsConfig;
use crate::domain::{IndicatorFrame, Position, RiskState, TrackedExit};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitAction {
    Close,
    ScaleOut(f64),
}

#[derive(Debug, Clone)]
pub struct ExitDecision {
    pub action: ExitAction,
    pub policy_name: &'static str,
    pub reason: String,
}

/// Context deltas applied at evaluation time (§4.10): high volatility, near
/// market close, news window, deep loss, and long hold each bump specific
/// policies' priority for this tick only.
#[derive(Debug, Clone, Default)]
pub struct ExitContext {
    pub now: Option<DateTime<Utc>>,
    pub high_volatility: bool,
    pub near_market_close: bool,
    pub news_window: bool,
    pub long_hold: bool,
}

pub trait ExitPolicy: Send + Sync {
    fn name(&self) -> &'static str;
    fn base_priority(&self) -> i32;

    fn evaluate(
        &self,
        position: &Position,
        tracked: &TrackedExit,
        indicators: &IndicatorFrame,
        risk_state: &RiskState,
        config: &ExitsConfig,
        now: DateTime<Utc>,
    ) -> Option<ExitDecision>;
}

fn adjusted_priority(policy: &dyn ExitPolicy, ctx: &ExitContext) -> i32 {
    let mut priority = policy.base_priority();
    let name = policy.name();

    if ctx.high_volatility && (name == "stop_loss" || name == "adverse_movement") {
        priority += 10;
    }
    if ctx.near_market_close && name == "time_based" {
        priority += 20;
    }
    if ctx.news_window {
        priority += 15;
    }
    if ctx.long_hold && name == "time_based" {
        priority += 10;
    }
    priority
}

pub struct ExitCoordinator {
    policies: Vec<Box<dyn ExitPolicy>>,
}

impl Default for ExitCoordinator {
    fn default() -> Self {
        Self::with_canonical_policies()
    }
}

impl ExitCoordinator {
    pub fn with_canonical_policies() -> Self {
        Self {
            policies: vec![
                Box::new(survival_mode::SurvivalModeExit),
                Box::new(stop_loss::AdaptiveLossExit),
                Box::new(micro_account_protect::MicroAccountProtectExit),
                Box::new(confluence::ConfluenceExit::default()),
                Box::new(adverse_movement::AdverseMovementExit::default()),
                Box::new(stop_loss::StopLossExit),
                Box::new(profit_scaling::ProfitScalingExit::default()),
                Box::new(profit_scaling::TakeProfitExit),
                Box::new(time_based::TimeBasedExit),
                Box::new(trailing_stop::TrailingStopExit::default()),
            ],
        }
    }

    /// Also used by §4.10's deep-loss delta: positions at or below -2% get
    /// +20 on StopLoss regardless of the generic `ExitContext` flags, since
    /// that delta depends on per-position state the context doesn't carry.
    fn deep_loss_bonus(policy: &dyn ExitPolicy, unrealized_pct: f64) -> i32 {
        if policy.name() == "stop_loss" && unrealized_pct <= -0.02 {
            20
        } else {
            0
        }
    }

    /// Evaluates every policy in descending adjusted priority and returns the
    /// first non-None decision (P3: highest adjusted priority fires; P9: at
    /// most one close signal per position per tick, enforced by returning
    /// after the first hit).
    pub fn evaluate(
        &self,
        position: &Position,
        tracked: &TrackedExit,
        indicators: &IndicatorFrame,
        risk_state: &RiskState,
        config: &ExitsConfig,
        ctx: &ExitContext,
    ) -> Option<ExitDecision> {
        let now = ctx.now.unwrap_or_else(Utc::now);
        let unrealized_pct = if position.entry_price != 0.0 {
            position.unrealized_pnl / (position.entry_price * position.volume).max(1e-9)
        } else {
            0.0
        };

        let mut ordered: Vec<&Box<dyn ExitPolicy>> = self.policies.iter().collect();
        ordered.sort_by_key(|p| {
            let priority = adjusted_priority(p.as_ref(), ctx) + Self::deep_loss_bonus(p.as_ref(), unrealized_pct);
            std::cmp::Reverse(priority)
        });

        for policy in ordered {
            if let Some(decision) = policy.evaluate(position, tracked, indicators, risk_state, config, now) {
                return Some(decision);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PositionOrigin, Side};
    use std::collections::HashMap;

    fn position() -> Position {
        Position {
            ticket: 1,
            symbol: "EURUSD".to_string(),
            side: Side::Long,
            volume: 1.0,
            entry_price: 1.1000,
            entry_time: Utc::now() - chrono::Duration::hours(1),
            current_price: 1.0950,
            unrealized_pnl: -500.0,
            stop_loss: Some(1.0984),
            take_profit: Some(1.1100),
            max_favorable: 0.0,
            max_adverse: 0.0050,
            holding_bars: 5,
            origin: PositionOrigin::Engine,
            strategy_name: Some("sma_crossover".to_string()),
        }
    }

    #[test]
    fn p9_only_one_decision_returned_even_with_multiple_eligible_policies() {
        let coordinator = ExitCoordinator::with_canonical_policies();
        let tracked = TrackedExit::default();
        let frame = IndicatorFrame { columns: HashMap::new() };
        let risk_state = RiskState::new(10_000.0);
        let config = ExitsConfig {
            adverse_movement_pct: 0.001,
            adverse_movement_window_s: 60,
            max_hold_hours: 24,
            friday_cutoff_hour_utc: 21,
            crypto_prefixes: vec!["BTC".to_string()],
            trailing_activation_atr: 1.0,
            trailing_alpha: 0.5,
            confluence_emergency: 0.9,
            confluence_close_now: 0.75,
            confluence_scale_out: 0.55,
        };
        let decision = coordinator.evaluate(&position(), &tracked, &frame, &risk_state, &config, &ExitContext::default());
        assert!(decision.is_some());
    }
}
