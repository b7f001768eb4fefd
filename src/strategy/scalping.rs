use crate::domain::{Bar, IndicatorFrame, Side, Signal, Timeframe};

use super::Strategy;

/// Fast EMA cross plus an RSI recovery out of an extreme, gated by a spread
/// filter since scalps can't absorb a wide spread.
pub struct ScalpingStrategy {
    pub max_spread: f64,
    pub rsi_recovery_floor: f64,
    pub rsi_recovery_ceiling: f64,
}

impl Default for ScalpingStrategy {
    fn default() -> Self {
        Self {
            max_spread: 0.00020,
            rsi_recovery_floor: 35.0,
            rsi_recovery_ceiling: 65.0,
        }
    }
}

impl Strategy for ScalpingStrategy {
    fn name(&self) -> &'static str {
        "scalping"
    }

    fn required_indicators(&self) -> &'static [&'static str] {
        &["ema_10", "rsi_14", "atr_14"]
    }

    fn on_bar(&self, symbol: &str, bar: &Bar, indicators: &IndicatorFrame) -> Option<Signal> {
        if bar.spread > self.max_spread {
            return None;
        }

        let ema_fast = indicators.last("ema_10");
        let ema_prev = indicators.get("ema_10", 1);
        let rsi = indicators.last("rsi_14");
        let atr = indicators.last("atr_14");
        if [ema_fast, ema_prev, rsi, atr].iter().any(|v| v.is_nan()) {
            return None;
        }

        let rising = ema_fast > ema_prev;
        let side = if rising && rsi > self.rsi_recovery_floor && rsi < 50.0 {
            Side::Long
        } else if !rising && rsi < self.rsi_recovery_ceiling && rsi > 50.0 {
            Side::Short
        } else {
            return None;
        };

        let stop_distance = atr * 0.8;
        let (stop_loss, take_profit) = match side {
            Side::Long => (bar.close - stop_distance, bar.close + stop_distance * 1.2),
            Side::Short => (bar.close + stop_distance, bar.close - stop_distance * 1.2),
        };

        Some(Signal::new(
            symbol,
            Timeframe::M1,
            side,
            bar.close,
            stop_loss,
            take_profit,
            0.5,
            self.name(),
            "fast ema cross with rsi recovery",
        ))
    }
}
