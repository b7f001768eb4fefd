use crate::domain::{Bar, IndicatorFrame, Side, Signal, Timeframe};

use super::Strategy;

/// Requires strong directional strength (ADX above threshold) plus price
/// trading on the correct side of the slow EMA, the closest in-core proxy for
/// the source's Supertrend/VWAP alignment check.
pub struct TrendFollowingStrategy {
    pub adx_floor: f64,
    pub atr_stop_multiple: f64,
}

impl Default for TrendFollowingStrategy {
    fn default() -> Self {
        Self {
            adx_floor: 28.0,
            atr_stop_multiple: 2.0,
        }
    }
}

impl Strategy for TrendFollowingStrategy {
    fn name(&self) -> &'static str {
        "trend_following"
    }

    fn required_indicators(&self) -> &'static [&'static str] {
        &["adx_14", "ema_20", "atr_14"]
    }

    fn on_bar(&self, symbol: &str, bar: &Bar, indicators: &IndicatorFrame) -> Option<Signal> {
        let adx = indicators.last("adx_14");
        let ema_20 = indicators.last("ema_20");
        let atr = indicators.last("atr_14");
        if [adx, ema_20, atr].iter().any(|v| v.is_nan()) {
            return None;
        }
        if adx < self.adx_floor {
            return None;
        }

        let side = if bar.close > ema_20 {
            Side::Long
        } else if bar.close < ema_20 {
            Side::Short
        } else {
            return None;
        };

        let stop_distance = atr * self.atr_stop_multiple;
        let (stop_loss, take_profit) = match side {
            Side::Long => (bar.close - stop_distance, bar.close + stop_distance * 2.5),
            Side::Short => (bar.close + stop_distance, bar.close - stop_distance * 2.5),
        };

        let confidence = (adx / 60.0).clamp(0.4, 0.9);

        Some(Signal::new(
            symbol,
            Timeframe::H1,
            side,
            bar.close,
            stop_loss,
            take_profit,
            confidence,
            self.name(),
            "strong adx trend with ema alignment",
        ))
    }
}
