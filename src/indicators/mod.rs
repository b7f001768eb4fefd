//! §4.2 IndicatorEngine: pure functions over bar series, evaluated in a single
//! topological pass per tick, namespaced to avoid collisions (`runtime_` prefix
//! for dynamically added series). Missing history yields NaN, which downstream
//! consumers treat as "no signal".
//!
//! Numerical semantics follow the spec exactly: EMA/SMA are the standard
//! recursive definitions, ATR and RSI use Wilder smoothing, Bollinger width is
//! `2*stddev(close, n)`, and ADX follows the standard directional-movement
//! recipe with Wilder smoothing. All are exact, not streaming-approximated, so
//! recomputation over identical bars reproduces identical values (the
//! IndicatorFrame determinism invariant).

pub mod requirements;

use crate::domain::{Bar, IndicatorFrame, IndicatorSeries};

/// Simple moving average over `period` closes.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }
    let mut sum = 0.0;
    for i in 0..values.len() {
        sum += values[i];
        if i >= period {
            sum -= values[i - period];
        }
        if i + 1 >= period {
            out[i] = sum / period as f64;
        }
    }
    out
}

/// Exponential moving average, standard recursive definition seeded with the
/// SMA of the first `period` values.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = seed;
    let mut prev = seed;
    for (i, &value) in values.iter().enumerate().skip(period) {
        let current = alpha * value + (1.0 - alpha) * prev;
        out[i] = current;
        prev = current;
    }
    out
}

/// Wilder's smoothing: `wilder[i] = wilder[i-1] - wilder[i-1]/period + value[i]`,
/// seeded with the simple average of the first `period` values.
fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = seed;
    let mut prev = seed;
    for (i, &value) in values.iter().enumerate().skip(period) {
        let current = prev - (prev / period as f64) + value;
        out[i] = current;
        prev = current;
    }
    out
}

pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    if closes.len() < period + 1 {
        return out;
    }
    let mut gains = vec![0.0; closes.len()];
    let mut losses = vec![0.0; closes.len()];
    for i in 1..closes.len() {
        let delta = closes[i] - closes[i - 1];
        gains[i] = delta.max(0.0);
        losses[i] = (-delta).max(0.0);
    }
    let avg_gain = wilder_smooth(&gains[1..], period);
    let avg_loss = wilder_smooth(&losses[1..], period);
    for i in 0..avg_gain.len() {
        if avg_gain[i].is_nan() {
            continue;
        }
        let rs = if avg_loss[i] == 0.0 {
            f64::INFINITY
        } else {
            avg_gain[i] / avg_loss[i]
        };
        let value = 100.0 - (100.0 / (1.0 + rs));
        out[i + 1] = value;
    }
    out
}

/// Rolling max/min over a trailing `period`-bar window, inclusive of the
/// current bar. Used for recent-range breakout detection.
fn rolling_max(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in 0..values.len() {
        if i + 1 < period {
            continue;
        }
        out[i] = values[i + 1 - period..=i].iter().cloned().fold(f64::MIN, f64::max);
    }
    out
}

fn rolling_min(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in 0..values.len() {
        if i + 1 < period {
            continue;
        }
        out[i] = values[i + 1 - period..=i].iter().cloned().fold(f64::MAX, f64::min);
    }
    out
}

fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut tr = vec![f64::NAN; bars.len()];
    if bars.is_empty() {
        return tr;
    }
    tr[0] = bars[0].high - bars[0].low;
    for i in 1..bars.len() {
        let hl = bars[i].high - bars[i].low;
        let hc = (bars[i].high - bars[i - 1].close).abs();
        let lc = (bars[i].low - bars[i - 1].close).abs();
        tr[i] = hl.max(hc).max(lc);
    }
    tr
}

pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    let tr = true_range(bars);
    wilder_smooth(&tr, period)
}

/// `(middle, upper, lower)` where width = `upper - lower = 2 * stddev * k`.
pub fn bollinger(closes: &[f64], period: usize, k: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let middle = sma(closes, period);
    let mut upper = vec![f64::NAN; closes.len()];
    let mut lower = vec![f64::NAN; closes.len()];
    for i in 0..closes.len() {
        if middle[i].is_nan() {
            continue;
        }
        let window = &closes[i + 1 - period..=i];
        let mean = middle[i];
        let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        let stddev = variance.sqrt();
        upper[i] = mean + k * stddev;
        lower[i] = mean - k * stddev;
    }
    (middle, upper, lower)
}

/// Standard directional-movement ADX recipe, Wilder-smoothed throughout.
pub fn adx(bars: &[Bar], period: usize) -> Vec<f64> {
    let n = bars.len();
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up_move = bars[i].high - bars[i - 1].high;
        let down_move = bars[i - 1].low - bars[i].low;
        plus_dm[i] = if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 };
        minus_dm[i] = if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 };
    }
    let tr = true_range(bars);
    let smoothed_tr = wilder_smooth(&tr, period);
    let smoothed_plus = wilder_smooth(&plus_dm, period);
    let smoothed_minus = wilder_smooth(&minus_dm, period);

    let mut dx = vec![f64::NAN; n];
    for i in 0..n {
        if smoothed_tr[i].is_nan() || smoothed_tr[i] == 0.0 {
            continue;
        }
        let plus_di = 100.0 * smoothed_plus[i] / smoothed_tr[i];
        let minus_di = 100.0 * smoothed_minus[i] / smoothed_tr[i];
        let di_sum = plus_di + minus_di;
        if di_sum > 0.0 {
            dx[i] = 100.0 * (plus_di - minus_di).abs() / di_sum;
        }
    }
    wilder_smooth(&dx, period)
}

/// `ema` seeded on a series that itself starts with a run of NaNs (e.g. MACD's
/// line, which is undefined until the slower EMA warms up). Skips the leading
/// NaN run before seeding so the NaN doesn't propagate forever.
fn ema_skip_leading_nan(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    let Some(start) = values.iter().position(|v| !v.is_nan()) else {
        return out;
    };
    let tail = ema(&values[start..], period);
    out[start..].copy_from_slice(&tail);
    out
}

pub fn n_bar_return(closes: &[f64], n: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    for i in n..closes.len() {
        if closes[i - n] != 0.0 {
            out[i] = (closes[i] - closes[i - n]) / closes[i - n];
        }
    }
    out
}

/// Computes the fixed, declared set of columns for one bar window in a single
/// pass. The set is small and closed (no runtime plugin discovery), so a
/// literal evaluation order stands in for full topological sorting; each
/// column only ever depends on raw bars, never on another named column, which
/// keeps this trivially acyclic.
pub struct IndicatorEngine;

impl IndicatorEngine {
    pub fn compute(bars: &[Bar]) -> IndicatorFrame {
        let mut frame = IndicatorFrame::default();
        if bars.is_empty() {
            return frame;
        }
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

        frame.columns.insert("ema_10".into(), IndicatorSeries { values: ema(&closes, 10) });
        frame.columns.insert("ema_20".into(), IndicatorSeries { values: ema(&closes, 20) });
        frame.columns.insert("sma_50".into(), IndicatorSeries { values: sma(&closes, 50) });
        frame.columns.insert("rsi_14".into(), IndicatorSeries { values: rsi(&closes, 14) });
        frame.columns.insert("atr_14".into(), IndicatorSeries { values: atr(bars, 14) });
        frame.columns.insert("adx_14".into(), IndicatorSeries { values: adx(bars, 14) });
        frame.columns.insert("return_20".into(), IndicatorSeries { values: n_bar_return(&closes, 20) });

        let (bb_mid, bb_upper, bb_lower) = bollinger(&closes, 20, 2.0);
        frame.columns.insert("bb_middle_20_2".into(), IndicatorSeries { values: bb_mid.clone() });
        frame.columns.insert("bb_upper_20_2".into(), IndicatorSeries { values: bb_upper.clone() });
        frame.columns.insert("bb_lower_20_2".into(), IndicatorSeries { values: bb_lower.clone() });
        let bb_width: Vec<f64> = bb_upper
            .iter()
            .zip(bb_lower.iter())
            .zip(bb_mid.iter())
            .map(|((u, l), m)| if m.is_nan() || *m == 0.0 { f64::NAN } else { (u - l) / m })
            .collect();
        frame.columns.insert("bb_width_pct_20_2".into(), IndicatorSeries { values: bb_width });

        // MACD(12,26,9): standard EMA-of-EMA-difference recipe, used by the
        // confluence exit's "MACD flip" evidence and nothing else in the
        // engine, so only the line and its signal are kept, not the
        // histogram.
        let ema_12 = ema(&closes, 12);
        let ema_26 = ema(&closes, 26);
        let macd_line: Vec<f64> = ema_12
            .iter()
            .zip(ema_26.iter())
            .map(|(fast, slow)| if fast.is_nan() || slow.is_nan() { f64::NAN } else { fast - slow })
            .collect();
        let macd_signal = ema_skip_leading_nan(&macd_line, 9);
        frame.columns.insert("ema_12".into(), IndicatorSeries { values: ema_12 });
        frame.columns.insert("ema_26".into(), IndicatorSeries { values: ema_26 });
        frame.columns.insert("macd_line".into(), IndicatorSeries { values: macd_line });
        frame.columns.insert("macd_signal".into(), IndicatorSeries { values: macd_signal });

        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        frame.columns.insert("volume_sma_20".into(), IndicatorSeries { values: sma(&volumes, 20) });
        frame.columns.insert("volume".into(), IndicatorSeries { values: volumes });
        frame.columns.insert("close".into(), IndicatorSeries { values: closes });

        let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
        frame.columns.insert("range_high_20".into(), IndicatorSeries { values: rolling_max(&highs, 20) });
        frame.columns.insert("range_low_20".into(), IndicatorSeries { values: rolling_min(&lows, 20) });

        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn series_bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                timestamp: Utc.timestamp_opt(i as i64 * 60, 0).unwrap(),
                open: c,
                high: c + 0.5,
                low: c - 0.5,
                close: c,
                volume: 100.0,
                tick_volume: 100.0,
                spread: 0.0001,
            })
            .collect()
    }

    #[test]
    fn sma_matches_hand_computed_average() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&values, 3);
        assert!(result[1].is_nan());
        assert!((result[2] - 2.0).abs() < 1e-9);
        assert!((result[4] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_is_bounded_between_0_and_100() {
        let closes: Vec<f64> = (0..60).map(|i| 1.0 + (i as f64 * 0.01).sin()).collect();
        let result = rsi(&closes, 14);
        for value in result.iter().filter(|v| !v.is_nan()) {
            assert!(*value >= 0.0 && *value <= 100.0, "rsi out of bounds: {value}");
        }
    }

    #[test]
    fn recomputation_is_deterministic() {
        let closes: Vec<f64> = (0..100).map(|i| 1.1 + (i as f64 * 0.001)).collect();
        let bars = series_bars(&closes);
        let first = IndicatorEngine::compute(&bars);
        let second = IndicatorEngine::compute(&bars);
        let a = first.last("rsi_14");
        let b = second.last("rsi_14");
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn insufficient_history_yields_nan() {
        let bars = series_bars(&[1.0, 1.01, 1.02]);
        let frame = IndicatorEngine::compute(&bars);
        assert!(frame.last("rsi_14").is_nan());
        assert!(frame.last("adx_14").is_nan());
    }

    #[test]
    fn macd_signal_warms_up_without_propagating_leading_nan() {
        let closes: Vec<f64> = (0..80).map(|i| 1.1 + (i as f64 * 0.0015)).collect();
        let bars = series_bars(&closes);
        let frame = IndicatorEngine::compute(&bars);
        assert!(frame.last("macd_line").is_finite());
        assert!(frame.last("macd_signal").is_finite());
    }
}
