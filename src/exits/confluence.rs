//! Priority 75: closes or scales out when multiple independent indicator
//! signals agree the position thesis has flipped. Grounded on the teacher's
//! `signals/quality.rs` confluence-scoring approach, generalised from entry
//! confirmation to exit confirmation.
//!
//! The five evidences are RSI turn, MACD flip, Bollinger-band rejection,
//! profit giveback from peak, and volume surge -- an EMA cross and an ADX
//! floor are kept alongside them as two further, generic trend-exhaustion
//! signals the source's confluence gate also counts.
//!
//! Open Question #3 (§9): the source's confluence bonus for 3-way/4-way
//! agreement is undocumented beyond "more evidence -> stronger signal". We
//! implement it as an additive bonus per additional agreeing signal beyond
//! the first two, capped at the emergency threshold.

use chrono::{DateTime, Utc};

use crate::config::ExitsConfig;
use crate::domain::{IndicatorFrame, Position, RiskState, Side, TrackedExit};

use super::{ExitAction, ExitDecision, ExitPolicy};

#[derive(Default)]
pub struct ConfluenceExit;

/// Fraction of `volume_sma_20` the latest bar's volume must clear to count as
/// a surge.
const VOLUME_SURGE_MULTIPLE: f64 = 1.5;

/// Fraction of peak favorable excursion given back before it counts as
/// evidence of a reversal (S5's worked example uses 40%).
const PROFIT_GIVEBACK_THRESHOLD: f64 = 0.40;

fn favorable_diff(position: &Position) -> f64 {
    match position.side {
        Side::Long => position.current_price - position.entry_price,
        Side::Short => position.entry_price - position.current_price,
    }
}

fn profit_giveback_pct(position: &Position) -> f64 {
    if position.max_favorable <= 0.0 {
        return 0.0;
    }
    ((position.max_favorable - favorable_diff(position)) / position.max_favorable).max(0.0)
}

fn reversal_evidence(position: &Position, indicators: &IndicatorFrame) -> u32 {
    let mut count = 0;
    let ema_10 = indicators.last("ema_10");
    let ema_20 = indicators.last("ema_20");
    let rsi = indicators.last("rsi_14");
    let adx = indicators.last("adx_14");
    let bb_upper = indicators.last("bb_upper_20_2");
    let bb_lower = indicators.last("bb_lower_20_2");
    let macd_line = indicators.last("macd_line");
    let macd_signal = indicators.last("macd_signal");
    let macd_line_prev = indicators.get("macd_line", 1);
    let macd_signal_prev = indicators.get("macd_signal", 1);
    let volume = indicators.last("volume");
    let volume_sma = indicators.last("volume_sma_20");

    let volume_surge = !volume.is_nan() && !volume_sma.is_nan() && volume > volume_sma * VOLUME_SURGE_MULTIPLE;
    if volume_surge {
        count += 1;
    }
    if profit_giveback_pct(position) >= PROFIT_GIVEBACK_THRESHOLD {
        count += 1;
    }

    match position.side {
        Side::Long => {
            if !ema_10.is_nan() && !ema_20.is_nan() && ema_10 < ema_20 {
                count += 1;
            }
            if !rsi.is_nan() && rsi >= 70.0 {
                count += 1;
            }
            if !bb_upper.is_nan() && position.current_price >= bb_upper {
                count += 1;
            }
            if !adx.is_nan() && adx < 15.0 {
                count += 1;
            }
            // MACD flip: line was at or above signal, now below -- a bearish cross.
            if [macd_line, macd_signal, macd_line_prev, macd_signal_prev].iter().all(|v| !v.is_nan())
                && macd_line_prev >= macd_signal_prev
                && macd_line < macd_signal
            {
                count += 1;
            }
        }
        Side::Short => {
            if !ema_10.is_nan() && !ema_20.is_nan() && ema_10 > ema_20 {
                count += 1;
            }
            if !rsi.is_nan() && rsi <= 30.0 {
                count += 1;
            }
            if !bb_lower.is_nan() && position.current_price <= bb_lower {
                count += 1;
            }
            if !adx.is_nan() && adx < 15.0 {
                count += 1;
            }
            // MACD flip: line was at or below signal, now above -- a bullish cross.
            if [macd_line, macd_signal, macd_line_prev, macd_signal_prev].iter().all(|v| !v.is_nan())
                && macd_line_prev <= macd_signal_prev
                && macd_line > macd_signal
            {
                count += 1;
            }
        }
    }
    count
}

/// Base 0.25 per agreeing signal, plus a 0.10 bonus for each agreeing signal
/// beyond the second (3-way, 4-way confluence compounds rather than adds
/// linearly).
fn confluence_score(evidence_count: u32) -> f64 {
    let base = evidence_count as f64 * 0.25;
    let bonus = (evidence_count.saturating_sub(2)) as f64 * 0.10;
    (base + bonus).min(1.0)
}

impl ExitPolicy for ConfluenceExit {
    fn name(&self) -> &'static str {
        "confluence_exit"
    }

    fn base_priority(&self) -> i32 {
        75
    }

    fn evaluate(
        &self,
        position: &Position,
        _tracked: &TrackedExit,
        indicators: &IndicatorFrame,
        _risk_state: &RiskState,
        config: &ExitsConfig,
        _now: DateTime<Utc>,
    ) -> Option<ExitDecision> {
        let evidence = reversal_evidence(position, indicators);
        let score = confluence_score(evidence);

        if score >= config.confluence_emergency {
            Some(ExitDecision {
                action: ExitAction::Close,
                policy_name: self.name(),
                reason: format!("confluence score {:.2} at emergency threshold ({} signals)", score, evidence),
            })
        } else if score >= config.confluence_close_now {
            Some(ExitDecision {
                action: ExitAction::Close,
                policy_name: self.name(),
                reason: format!("confluence score {:.2} above close-now threshold ({} signals)", score, evidence),
            })
        } else if score >= config.confluence_scale_out {
            Some(ExitDecision {
                action: ExitAction::ScaleOut(0.5),
                policy_name: self.name(),
                reason: format!("confluence score {:.2} above scale-out threshold ({} signals)", score, evidence),
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IndicatorSeries, PositionOrigin};
    use std::collections::HashMap;

    #[test]
    fn four_way_agreement_scores_above_emergency_threshold() {
        assert!(confluence_score(4) >= 0.90);
    }

    #[test]
    fn single_signal_scores_below_scale_out() {
        assert!(confluence_score(1) < 0.55);
    }

    fn long_position() -> Position {
        Position {
            ticket: 1,
            symbol: "EURUSD".to_string(),
            side: Side::Long,
            volume: 1.0,
            entry_price: 1.1000,
            entry_time: Utc::now() - chrono::Duration::hours(3),
            current_price: 1.1088,
            unrealized_pnl: 528.0,
            stop_loss: Some(1.0950),
            take_profit: Some(1.1200),
            max_favorable: 0.0150,
            max_adverse: 0.0,
            holding_bars: 12,
            origin: PositionOrigin::Engine,
            strategy_name: Some("momentum_breakout".to_string()),
        }
    }

    fn series(values: Vec<f64>) -> IndicatorSeries {
        IndicatorSeries { values }
    }

    /// S5: long position at +0.8%, RSI overbought, MACD flips below signal,
    /// 40% giveback from peak -> 3-way confluence, CLOSE_NOW but not emergency.
    #[test]
    fn s5_three_way_confluence_reproduces_close_now() {
        let position = long_position();
        // max_favorable is 0.0150; current favorable is 1.1088 - 1.1000 = 0.0088,
        // giving back (0.0150 - 0.0088) / 0.0150 = 41.3% from peak.
        assert!(profit_giveback_pct(&position) >= PROFIT_GIVEBACK_THRESHOLD);

        let mut columns = HashMap::new();
        columns.insert("rsi_14".to_string(), series(vec![78.0, 72.0]));
        columns.insert("macd_line".to_string(), series(vec![0.0006, -0.0002]));
        columns.insert("macd_signal".to_string(), series(vec![0.0004, 0.0001]));
        let frame = IndicatorFrame { columns };

        let evidence = reversal_evidence(&position, &frame);
        assert_eq!(evidence, 3, "expected RSI + MACD flip + giveback, got {evidence}");
        let score = confluence_score(evidence);
        assert!(score >= 0.75 && score < 0.90, "score {score} should be CLOSE_NOW, not EMERGENCY");
    }

    #[test]
    fn volume_surge_counts_as_evidence() {
        let position = long_position();
        let mut columns = HashMap::new();
        columns.insert("volume".to_string(), series(vec![400.0]));
        columns.insert("volume_sma_20".to_string(), series(vec![200.0]));
        let frame = IndicatorFrame { columns };
        // giveback alone (1) + volume surge (1) = 2.
        assert_eq!(reversal_evidence(&position, &frame), 2);
    }

    #[test]
    fn no_evidence_when_flat_and_no_giveback() {
        let mut position = long_position();
        position.max_favorable = 0.0;
        let frame = IndicatorFrame { columns: HashMap::new() };
        assert_eq!(reversal_evidence(&position, &frame), 0);
    }
}
