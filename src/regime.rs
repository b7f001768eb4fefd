//! §4.3 RegimeClassifier: derives a discrete [`RegimeLabel`] from the latest
//! IndicatorFrame. Purely a function of indicator state, so identical inputs
//! always return identical labels (P8) -- no hidden mutable state here, unlike
//! the teacher's stateful `DrawdownMonitor`/`CalibrationRegistry`, because the
//! spec requires this determinism as a tested property.

use crate::domain::{IndicatorFrame, RegimeLabel};

pub struct RegimeClassifier {
    pub check_interval_s: u64,
    last_checked_at: Option<chrono::DateTime<chrono::Utc>>,
    cached_label: Option<RegimeLabel>,
}

impl RegimeClassifier {
    pub fn new(check_interval_s: u64) -> Self {
        Self {
            check_interval_s,
            last_checked_at: None,
            cached_label: None,
        }
    }

    /// Recomputes at most every `check_interval_s`; otherwise returns the
    /// cached label from the last refresh.
    pub fn classify_throttled(&mut self, frame: &IndicatorFrame, now: chrono::DateTime<chrono::Utc>) -> RegimeLabel {
        let due = match self.last_checked_at {
            None => true,
            Some(last) => (now - last).num_seconds() as u64 >= self.check_interval_s,
        };
        if due || self.cached_label.is_none() {
            let label = classify(frame);
            self.cached_label = Some(label);
            self.last_checked_at = Some(now);
        }
        self.cached_label.unwrap()
    }
}

/// Pure classification function -- deterministic given identical indicator
/// inputs (P8). Ties among the listed conditions are broken by evaluation
/// order, exactly as enumerated in the spec.
pub fn classify(frame: &IndicatorFrame) -> RegimeLabel {
    let adx = frame.last("adx_14");
    let return_20 = frame.last("return_20");
    let bb_width = frame.last("bb_width_pct_20_2");
    let atr = frame.last("atr_14");
    let atr_prev = frame.get("atr_14", 5);

    let atr_ratio = if atr_prev.is_finite() && atr_prev != 0.0 {
        atr / atr_prev
    } else {
        f64::NAN
    };

    let volume = frame.last("volume");
    let volume_sma = frame.last("volume_sma_20");
    let volume_surge = !volume.is_nan() && !volume_sma.is_nan() && volume > volume_sma * 1.5;

    let close = frame.last("close");
    let prior_range_high = frame.get("range_high_20", 1);
    let prior_range_low = frame.get("range_low_20", 1);
    let range_breakout = !close.is_nan()
        && ((!prior_range_high.is_nan() && close > prior_range_high)
            || (!prior_range_low.is_nan() && close < prior_range_low));

    if !adx.is_nan() && adx > 30.0 && return_20.abs() > 0.01 {
        return if return_20 > 0.0 {
            RegimeLabel::TrendingUpStrong
        } else {
            RegimeLabel::TrendingDownStrong
        };
    }

    if !adx.is_nan() && (20.0..=30.0).contains(&adx) && (0.005..=0.01).contains(&return_20.abs()) {
        return if return_20 > 0.0 {
            RegimeLabel::TrendingUpWeak
        } else {
            RegimeLabel::TrendingDownWeak
        };
    }

    if !adx.is_nan() && adx < 20.0 {
        if !bb_width.is_nan() && bb_width < 0.01 {
            return RegimeLabel::RangingTight;
        }
        if !bb_width.is_nan() && bb_width < 0.02 {
            return RegimeLabel::RangingWide;
        }
    }

    if !atr_ratio.is_nan() && atr_ratio > 1.5 && !bb_width.is_nan() && bb_width > 0.02 && volume_surge && range_breakout {
        return RegimeLabel::VolatileBreakout;
    }

    if !atr_ratio.is_nan() && atr_ratio > 1.3 && !bb_width.is_nan() && bb_width < 0.01 {
        return RegimeLabel::VolatileConsolidation;
    }

    if !adx.is_nan() && adx < 15.0 && !bb_width.is_nan() && bb_width < 0.01 {
        return RegimeLabel::Consolidating;
    }

    let return_5 = frame.get("return_20", 5);
    if return_20.signum() != return_5.signum() && return_5 != 0.0 && return_20 != 0.0 {
        return RegimeLabel::Reversal;
    }

    RegimeLabel::RangingWide
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IndicatorSeries;
    use std::collections::HashMap;

    fn frame_with(adx: f64, return_20: f64, bb_width: f64) -> IndicatorFrame {
        let mut columns = HashMap::new();
        columns.insert("adx_14".to_string(), IndicatorSeries { values: vec![adx] });
        columns.insert("return_20".to_string(), IndicatorSeries { values: vec![return_20] });
        columns.insert("bb_width_pct_20_2".to_string(), IndicatorSeries { values: vec![bb_width] });
        columns.insert("atr_14".to_string(), IndicatorSeries { values: vec![0.001] });
        IndicatorFrame { columns }
    }

    /// Six-bar series (enough for `atr_14`'s 5-bars-ago lookback); only the
    /// last bar varies between the scenarios below.
    fn volatile_breakout_frame(volume_surge: bool, range_breakout: bool) -> IndicatorFrame {
        let mut columns = HashMap::new();
        columns.insert("adx_14".to_string(), IndicatorSeries { values: vec![22.0; 6] });
        columns.insert("return_20".to_string(), IndicatorSeries { values: vec![0.002; 6] });
        columns.insert("bb_width_pct_20_2".to_string(), IndicatorSeries { values: vec![0.03; 6] });
        columns.insert("atr_14".to_string(), IndicatorSeries { values: vec![0.001, 0.001, 0.001, 0.001, 0.001, 0.002] });
        let volume = if volume_surge { 500.0 } else { 150.0 };
        columns.insert("volume".to_string(), IndicatorSeries { values: vec![150.0, 150.0, 150.0, 150.0, 150.0, volume] });
        columns.insert("volume_sma_20".to_string(), IndicatorSeries { values: vec![200.0; 6] });
        let close = if range_breakout { 1.25 } else { 1.10 };
        columns.insert("close".to_string(), IndicatorSeries { values: vec![1.10, 1.10, 1.10, 1.10, 1.10, close] });
        columns.insert("range_high_20".to_string(), IndicatorSeries { values: vec![1.15; 6] });
        columns.insert("range_low_20".to_string(), IndicatorSeries { values: vec![1.00; 6] });
        IndicatorFrame { columns }
    }

    #[test]
    fn strong_uptrend_classification() {
        let frame = frame_with(35.0, 0.015, 0.03);
        assert_eq!(classify(&frame), RegimeLabel::TrendingUpStrong);
    }

    #[test]
    fn ranging_tight_when_adx_low_and_bb_narrow() {
        let frame = frame_with(10.0, 0.001, 0.005);
        assert_eq!(classify(&frame), RegimeLabel::RangingTight);
    }

    #[test]
    fn classification_is_deterministic_for_identical_inputs() {
        let frame = frame_with(25.0, 0.007, 0.015);
        assert_eq!(classify(&frame), classify(&frame));
    }

    #[test]
    fn volatile_breakout_requires_volume_surge_and_range_breakout() {
        let frame = volatile_breakout_frame(true, true);
        assert_eq!(classify(&frame), RegimeLabel::VolatileBreakout);
    }

    #[test]
    fn atr_and_bb_alone_do_not_classify_as_volatile_breakout() {
        let frame = volatile_breakout_frame(false, true);
        assert_ne!(classify(&frame), RegimeLabel::VolatileBreakout);
        let frame = volatile_breakout_frame(true, false);
        assert_ne!(classify(&frame), RegimeLabel::VolatileBreakout);
    }
}
