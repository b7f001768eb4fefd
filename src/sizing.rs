//! §4.9 SizingPipeline: the deterministic multiplier chain consumed by
//! [`crate::risk::RiskEvaluator`]. Kept as its own module because the spec
//! names it as a distinct component from RiskEvaluator even though both are
//! driven by the same `RiskContext` -- the fixed order (`entry_quality`,
//! `loss_curve`, optional `cognition`, `performance_streak`) is the contract
//! callers rely on, so it lives next to the `PositionSizeDecision` type it
//! produces rather than being inlined into the evaluator.

use crate::domain::{PositionSizeDecision, SizeAdjustment};

pub struct SizingPipeline;

impl SizingPipeline {
    /// `final_size == base_size * product(multipliers)`, rounded down to
    /// `lot_step` (P1).
    pub fn compose(base_size: f64, adjustments: Vec<SizeAdjustment>, lot_step: f64) -> PositionSizeDecision {
        PositionSizeDecision::compose(base_size, adjustments, lot_step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p1_final_size_is_base_times_product_rounded_down() {
        let adjustments = vec![
            SizeAdjustment { reason: "entry_quality".into(), multiplier: 0.85 },
            SizeAdjustment { reason: "loss_curve".into(), multiplier: 0.75 },
            SizeAdjustment { reason: "performance_streak".into(), multiplier: 1.2 },
        ];
        let decision = SizingPipeline::compose(1.0, adjustments, 0.01);
        let expected = (1.0 * 0.85 * 0.75 * 1.2 / 0.01).floor() * 0.01;
        assert!((decision.final_size - expected).abs() < 1e-9);
    }
}
