use crate::domain::{Bar, IndicatorFrame, Side, Signal, Timeframe};

use super::Strategy;

/// Fires instantly on an RSI extremum turning back through a direction change,
/// rather than waiting for confirmation bars.
pub struct RsiReversalStrategy {
    pub oversold: f64,
    pub overbought: f64,
    pub atr_stop_multiple: f64,
}

impl Default for RsiReversalStrategy {
    fn default() -> Self {
        Self {
            oversold: 30.0,
            overbought: 70.0,
            atr_stop_multiple: 1.0,
        }
    }
}

impl Strategy for RsiReversalStrategy {
    fn name(&self) -> &'static str {
        "rsi_reversal"
    }

    fn required_indicators(&self) -> &'static [&'static str] {
        &["rsi_14", "atr_14"]
    }

    fn on_bar(&self, symbol: &str, bar: &Bar, indicators: &IndicatorFrame) -> Option<Signal> {
        let rsi_prev = indicators.get("rsi_14", 1);
        let rsi_now = indicators.last("rsi_14");
        let atr = indicators.last("atr_14");
        if [rsi_prev, rsi_now, atr].iter().any(|v| v.is_nan()) {
            return None;
        }

        let side = if rsi_prev <= self.oversold && rsi_now > rsi_prev {
            Side::Long
        } else if rsi_prev >= self.overbought && rsi_now < rsi_prev {
            Side::Short
        } else {
            return None;
        };

        let stop_distance = atr * self.atr_stop_multiple;
        let (stop_loss, take_profit) = match side {
            Side::Long => (bar.close - stop_distance, bar.close + stop_distance * 1.5),
            Side::Short => (bar.close + stop_distance, bar.close - stop_distance * 1.5),
        };

        let confidence = ((rsi_now - rsi_prev).abs() / 20.0).clamp(0.3, 0.9);

        Some(Signal::new(
            symbol,
            Timeframe::M15,
            side,
            bar.close,
            stop_loss,
            take_profit,
            confidence,
            self.name(),
            "rsi extremum reversal",
        ))
    }
}
