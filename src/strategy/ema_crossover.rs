use crate::domain::{Bar, IndicatorFrame, Side, Signal, Timeframe};

use super::Strategy;

/// Faster of the two MA crosses (EMA-10/EMA-20 vs SMA-50), same ATR stop idea.
pub struct EmaCrossoverStrategy {
    pub atr_stop_multiple: f64,
    pub risk_reward: f64,
}

impl Default for EmaCrossoverStrategy {
    fn default() -> Self {
        Self {
            atr_stop_multiple: 1.2,
            risk_reward: 2.0,
        }
    }
}

impl Strategy for EmaCrossoverStrategy {
    fn name(&self) -> &'static str {
        "ema_crossover"
    }

    fn required_indicators(&self) -> &'static [&'static str] {
        &["ema_10", "ema_20", "atr_14"]
    }

    fn on_bar(&self, symbol: &str, bar: &Bar, indicators: &IndicatorFrame) -> Option<Signal> {
        let fast = indicators.last("ema_10");
        let slow = indicators.last("ema_20");
        let fast_prev = indicators.get("ema_10", 1);
        let slow_prev = indicators.get("ema_20", 1);
        let atr = indicators.last("atr_14");

        if [fast, slow, fast_prev, slow_prev, atr].iter().any(|v| v.is_nan()) {
            return None;
        }

        let crossed_up = fast_prev <= slow_prev && fast > slow;
        let crossed_down = fast_prev >= slow_prev && fast < slow;
        let side = if crossed_up {
            Side::Long
        } else if crossed_down {
            Side::Short
        } else {
            return None;
        };

        let stop_distance = atr * self.atr_stop_multiple;
        let (stop_loss, take_profit) = match side {
            Side::Long => (bar.close - stop_distance, bar.close + stop_distance * self.risk_reward),
            Side::Short => (bar.close + stop_distance, bar.close - stop_distance * self.risk_reward),
        };

        Some(Signal::new(
            symbol,
            Timeframe::M15,
            side,
            bar.close,
            stop_loss,
            take_profit,
            0.6,
            self.name(),
            "ema fast/slow crossover",
        ))
    }
}
