//! §4.7 RiskEvaluator & SizingPipeline.
//!
//! This module is a direct generalisation of the original risk engine: the
//! balance-tiered adaptive loss curve plays the role the old `KellyCalculator`
//! played (a bounded, monotone fraction-of-equity sizer), and `DrawdownState`
//! (domain.rs) plays the role the old `DrawdownMonitor` played (throttle
//! state derived from peak-to-trough equity). The two overlapping "risk
//! managers" the source mixed (`risk/manager`, `position/risk_manager`) are
//! collapsed here into the single `RiskEvaluator` the spec calls for --
//! Open Question #2 (§9).

use crate::config::RiskConfig;
use crate::domain::{
    DrawdownState, EntryQuality, EntryQualityClass, PositionSizeDecision, RiskState, Side,
    SizeAdjustment, Signal,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskRejection {
    DailyLossLimitReached,
    DrawdownHaltReached,
    ConfidenceBelowSurvivalThreshold,
    RiskRewardBelowSurvivalThreshold,
    PositionCountCapReached,
    InsufficientMargin,
    SymbolNotTradable,
    RiskDistanceTooSmall,
    BelowLotMin,
}

impl RiskRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            RiskRejection::DailyLossLimitReached => "daily loss limit reached",
            RiskRejection::DrawdownHaltReached => "drawdown halt percent reached",
            RiskRejection::ConfidenceBelowSurvivalThreshold => "confidence below SURVIVAL threshold",
            RiskRejection::RiskRewardBelowSurvivalThreshold => "risk:reward below SURVIVAL threshold (requires R:R >= 5)",
            RiskRejection::PositionCountCapReached => "position count cap reached",
            RiskRejection::InsufficientMargin => "insufficient margin",
            RiskRejection::SymbolNotTradable => "symbol not tradable",
            RiskRejection::RiskDistanceTooSmall => "stop distance below minimum tick multiple",
            RiskRejection::BelowLotMin => "below lot_min",
        }
    }
}

pub struct SymbolSpec {
    pub pip_value_per_lot: f64,
    pub lot_step: f64,
    pub lot_min: f64,
    pub min_tick: f64,
    pub tradable: bool,
}

pub struct RiskContext<'a> {
    pub risk_state: &'a RiskState,
    pub open_position_count: u32,
    pub max_positions: u32,
    pub margin_available: f64,
    pub margin_required: f64,
    pub daily_realized_loss: f64,
}

/// Anchored balance-tier loss curve. Interpolates monotonically between the
/// documented breakpoints, then halves in recovery-mode drawdown (Open
/// Question #4: performance-based sizing has no canonical table upstream, so
/// this is the configured-anchor interpolation the spec asks for).
pub fn adaptive_fractional_risk(config: &RiskConfig, equity: f64, drawdown_pct: f64) -> f64 {
    let breakpoints = &config.sl_balance_breakpoints;
    let (tiny, small, medium, large) = config.sl_balance_thresholds;
    let tiers = [tiny, small, medium, large];

    let r = if equity <= breakpoints[0] {
        tiers[0]
    } else if equity >= *breakpoints.last().unwrap() {
        *tiers.last().unwrap()
    } else {
        let mut r_effective = tiers[0];
        for window in breakpoints.windows(2).enumerate() {
            let (i, pair) = window;
            let (lo, hi) = (pair[0], pair[1]);
            if equity >= lo && equity <= hi {
                let t = (equity - lo) / (hi - lo).max(1e-9);
                r_effective = tiers[i] + t * (tiers[i + 1] - tiers[i]);
                break;
            }
        }
        r_effective
    };

    if drawdown_pct > 0.20 {
        r * 0.5
    } else {
        r
    }
}

/// Streak adjustment from §4.7: +20% after 4 wins, -20% after 3 losses, -40%
/// after 4 losses.
pub fn streak_multiplier(risk_state: &RiskState) -> f64 {
    if risk_state.consecutive_wins >= 4 {
        1.2
    } else if risk_state.consecutive_losses >= 4 {
        0.6
    } else if risk_state.consecutive_losses >= 3 {
        0.8
    } else {
        1.0
    }
}

pub struct RiskEvaluator {
    config: RiskConfig,
}

impl RiskEvaluator {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    fn hard_rejections(&self, ctx: &RiskContext, quality: &EntryQuality, signal: &Signal) -> Option<RiskRejection> {
        // Ordered fastest-check-first, mirroring a pre-trade risk gate: cheap
        // state lookups before anything that touches floating-point sizing.
        if ctx.daily_realized_loss >= self.config.max_daily_loss {
            return Some(RiskRejection::DailyLossLimitReached);
        }
        if ctx.risk_state.drawdown_pct >= self.config.drawdown_halt_percent {
            return Some(RiskRejection::DrawdownHaltReached);
        }
        let min_confidence = ctx.risk_state.drawdown_state.min_confidence();
        if min_confidence > 0.0 && quality.score.max(signal.confidence) < min_confidence {
            return Some(RiskRejection::ConfidenceBelowSurvivalThreshold);
        }
        // P7: SURVIVAL additionally requires R:R >= 5, not just the confidence floor above.
        if ctx.risk_state.drawdown_state == DrawdownState::Survival
            && !survival_gate_passes(signal, quality.score.max(signal.confidence))
        {
            return Some(RiskRejection::RiskRewardBelowSurvivalThreshold);
        }
        if let Some(cap) = ctx.risk_state.drawdown_state.max_positions_cap() {
            if ctx.open_position_count >= cap {
                return Some(RiskRejection::PositionCountCapReached);
            }
        }
        if ctx.open_position_count >= ctx.max_positions {
            return Some(RiskRejection::PositionCountCapReached);
        }
        if ctx.margin_available < ctx.margin_required {
            return Some(RiskRejection::InsufficientMargin);
        }
        None
    }

    /// Hard-rejection gate only, for manual orders submitted with an
    /// operator-supplied volume (§6 `POST /trade`) where there is no sizing
    /// pipeline to run. A human-submitted order is treated as maximally
    /// confident for the SURVIVAL/CRITICAL confidence floors.
    pub fn check_manual_order(&self, signal: &Signal, ctx: &RiskContext) -> Result<(), RiskRejection> {
        let quality = EntryQuality {
            class: EntryQualityClass::Premium,
            score: 1.0,
            size_multiplier: 1.0,
        };
        match self.hard_rejections(ctx, &quality, signal) {
            Some(rejection) => Err(rejection),
            None => Ok(()),
        }
    }

    /// Computes the base position size from fractional risk: `(r * equity) /
    /// (stop_distance * pip_value)`, clamped to `max_position_size`.
    pub fn base_size(&self, signal: &Signal, ctx: &RiskContext, spec: &SymbolSpec) -> Result<f64, RiskRejection> {
        if !spec.tradable {
            return Err(RiskRejection::SymbolNotTradable);
        }
        let distance = signal.risk_distance();
        if distance < spec.min_tick * 2.0 {
            return Err(RiskRejection::RiskDistanceTooSmall);
        }

        let r = adaptive_fractional_risk(&self.config, ctx.risk_state.equity, ctx.risk_state.drawdown_pct);
        let raw = (r * ctx.risk_state.equity) / (distance * spec.pip_value_per_lot);
        Ok(raw.min(self.config.max_position_size))
    }

    /// The fixed-order sizing chain from §4.7: entry_quality, loss_curve,
    /// cognition (optional external scorer), performance_streak. Every
    /// multiplier is recorded with its reason.
    pub fn evaluate(
        &self,
        signal: &Signal,
        quality: &EntryQuality,
        ctx: &RiskContext,
        spec: &SymbolSpec,
        cognition_multiplier: Option<f64>,
    ) -> Result<PositionSizeDecision, RiskRejection> {
        if quality.class == EntryQualityClass::Reject {
            return Err(RiskRejection::SymbolNotTradable); // unreachable: caller filters REJECT upstream
        }
        if let Some(rejection) = self.hard_rejections(ctx, quality, signal) {
            return Err(rejection);
        }

        let base = self.base_size(signal, ctx, spec)?;

        let mut adjustments = vec![SizeAdjustment {
            reason: "entry_quality".to_string(),
            multiplier: quality.size_multiplier,
        }];

        let loss_curve_multiplier = drawdown_size_multiplier(ctx.risk_state.drawdown_state);
        adjustments.push(SizeAdjustment {
            reason: "loss_curve".to_string(),
            multiplier: loss_curve_multiplier,
        });

        if let Some(cognition) = cognition_multiplier {
            adjustments.push(SizeAdjustment {
                reason: "cognition".to_string(),
                multiplier: cognition.clamp(0.5, 1.5),
            });
        }

        if self.config.performance_based_sizing {
            adjustments.push(SizeAdjustment {
                reason: "performance_streak".to_string(),
                multiplier: streak_multiplier(ctx.risk_state),
            });
        }

        let decision = crate::sizing::SizingPipeline::compose(base, adjustments, spec.lot_step);

        if decision.final_size < spec.lot_min {
            return Err(RiskRejection::BelowLotMin);
        }
        if decision.final_size > self.config.max_position_size {
            let mut decision = decision;
            decision.final_size = (self.config.max_position_size / spec.lot_step).floor() * spec.lot_step;
            return Ok(decision);
        }

        Ok(decision)
    }
}

fn drawdown_size_multiplier(state: DrawdownState) -> f64 {
    state.size_multiplier()
}

/// R:R floor check enforced alongside the SURVIVAL confidence gate in
/// `hard_rejections` (P7): `confidence >= 0.95 and R:R >= 5`.
pub fn survival_gate_passes(signal: &Signal, confidence: f64) -> bool {
    let rr = if signal.risk_distance() > 0.0 {
        (signal.take_profit - signal.entry_price).abs() / signal.risk_distance()
    } else {
        0.0
    };
    confidence >= 0.95 && rr >= 5.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::domain::{EntryQualityClass, RiskState, Timeframe};

    fn risk_config() -> RiskConfig {
        RiskConfig {
            fractional_risk: 0.02,
            max_position_size: 1.0,
            max_daily_loss: 0.06,
            drawdown_halt_percent: 0.60,
            sl_balance_thresholds: (0.10, 0.03, 0.02, 0.015),
            sl_balance_breakpoints: vec![5.0, 100.0, 1000.0, 5000.0],
            emergency_stop_loss_pct: 0.05,
            min_risk_reward_ratio: 1.5,
            performance_based_sizing: true,
            use_stabilized: true,
            max_open_positions: 10,
            leverage: 30.0,
        }
    }

    fn spec() -> SymbolSpec {
        SymbolSpec {
            pip_value_per_lot: 10.0,
            lot_step: 0.01,
            lot_min: 0.01,
            min_tick: 0.00001,
            tradable: true,
        }
    }

    #[test]
    fn s1_long_scalp_normal_drawdown() {
        let evaluator = RiskEvaluator::new(risk_config());
        let signal = Signal::new("EURUSD", Timeframe::M15, Side::Long, 1.1000, 1.0984, 1.1032, 0.9, "sma_crossover", "s1");
        let risk_state = RiskState::new(10_000.0);
        let ctx = RiskContext {
            risk_state: &risk_state,
            open_position_count: 0,
            max_positions: 10,
            margin_available: 100_000.0,
            margin_required: 100.0,
            daily_realized_loss: 0.0,
        };
        let quality = EntryQuality {
            class: EntryQualityClass::Good,
            score: 0.7,
            size_multiplier: 0.85,
        };
        let decision = evaluator.evaluate(&signal, &quality, &ctx, &spec(), None).unwrap();
        assert!((decision.final_size - 0.85).abs() < 1e-6, "expected ~0.85 lots, got {}", decision.final_size);
    }

    #[test]
    fn s4_drawdown_escalation_rejects_low_confidence() {
        let evaluator = RiskEvaluator::new(risk_config());
        let signal = Signal::new("EURUSD", Timeframe::M15, Side::Long, 1.1000, 1.0984, 1.1032, 0.80, "sma_crossover", "s4");
        let mut risk_state = RiskState::new(10_000.0);
        risk_state.update_equity(4_900.0); // 51% drawdown -> SURVIVAL
        assert_eq!(risk_state.drawdown_state, DrawdownState::Survival);
        let ctx = RiskContext {
            risk_state: &risk_state,
            open_position_count: 0,
            max_positions: 10,
            margin_available: 100_000.0,
            margin_required: 100.0,
            daily_realized_loss: 0.0,
        };
        let quality = EntryQuality {
            class: EntryQualityClass::Good,
            score: 0.80,
            size_multiplier: 0.85,
        };
        let result = evaluator.evaluate(&signal, &quality, &ctx, &spec(), None);
        assert_eq!(result.unwrap_err(), RiskRejection::ConfidenceBelowSurvivalThreshold);
    }

    #[test]
    fn p7_survival_size_multiplier_is_at_most_005() {
        assert!((DrawdownState::Survival.size_multiplier() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn p7_survival_rejects_high_confidence_low_rr() {
        let evaluator = RiskEvaluator::new(risk_config());
        // confidence 0.97 clears the SURVIVAL confidence floor, but R:R is only 2:1.
        let signal = Signal::new("EURUSD", Timeframe::M15, Side::Long, 1.1000, 1.0984, 1.1032, 0.97, "sma_crossover", "p7");
        let mut risk_state = RiskState::new(10_000.0);
        risk_state.update_equity(4_900.0); // 51% drawdown -> SURVIVAL
        assert_eq!(risk_state.drawdown_state, DrawdownState::Survival);
        let ctx = RiskContext {
            risk_state: &risk_state,
            open_position_count: 0,
            max_positions: 10,
            margin_available: 100_000.0,
            margin_required: 100.0,
            daily_realized_loss: 0.0,
        };
        let quality = EntryQuality {
            class: EntryQualityClass::Premium,
            score: 0.97,
            size_multiplier: 1.0,
        };
        let result = evaluator.evaluate(&signal, &quality, &ctx, &spec(), None);
        assert_eq!(result.unwrap_err(), RiskRejection::RiskRewardBelowSurvivalThreshold);
    }

    #[test]
    fn p7_survival_admits_high_confidence_high_rr() {
        let evaluator = RiskEvaluator::new(risk_config());
        // confidence 0.97, R:R = (1.1080 - 1.1000) / (1.1000 - 1.0984) = 5:1.
        let signal = Signal::new("EURUSD", Timeframe::M15, Side::Long, 1.1000, 1.0984, 1.1080, 0.97, "sma_crossover", "p7");
        let mut risk_state = RiskState::new(10_000.0);
        risk_state.update_equity(4_900.0); // 51% drawdown -> SURVIVAL
        let ctx = RiskContext {
            risk_state: &risk_state,
            open_position_count: 0,
            max_positions: 10,
            margin_available: 100_000.0,
            margin_required: 100.0,
            daily_realized_loss: 0.0,
        };
        let quality = EntryQuality {
            class: EntryQualityClass::Premium,
            score: 0.97,
            size_multiplier: 1.0,
        };
        assert!(evaluator.evaluate(&signal, &quality, &ctx, &spec(), None).is_ok());
    }

    #[test]
    fn manual_order_is_rejected_when_daily_loss_limit_reached() {
        let evaluator = RiskEvaluator::new(risk_config());
        let signal = Signal::new("EURUSD", Timeframe::M15, Side::Long, 1.1000, 1.0984, 1.1032, 0.5, "manual", "manual");
        let risk_state = RiskState::new(10_000.0);
        let ctx = RiskContext {
            risk_state: &risk_state,
            open_position_count: 0,
            max_positions: 10,
            margin_available: 100_000.0,
            margin_required: 100.0,
            daily_realized_loss: 0.07, // above max_daily_loss of 0.06
        };
        assert_eq!(evaluator.check_manual_order(&signal, &ctx).unwrap_err(), RiskRejection::DailyLossLimitReached);
    }

    #[test]
    fn manual_order_passes_when_within_limits() {
        let evaluator = RiskEvaluator::new(risk_config());
        let signal = Signal::new("EURUSD", Timeframe::M15, Side::Long, 1.1000, 1.0984, 1.1032, 0.5, "manual", "manual");
        let risk_state = RiskState::new(10_000.0);
        let ctx = RiskContext {
            risk_state: &risk_state,
            open_position_count: 0,
            max_positions: 10,
            margin_available: 100_000.0,
            margin_required: 100.0,
            daily_realized_loss: 0.0,
        };
        assert!(evaluator.check_manual_order(&signal, &ctx).is_ok());
    }
}
