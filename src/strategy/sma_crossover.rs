use crate::domain::{Bar, IndicatorFrame, Side, Signal, Timeframe};

use super::Strategy;

/// Fast/slow moving-average cross with an ATR-based stop.
pub struct SmaCrossoverStrategy {
    pub atr_stop_multiple: f64,
    pub risk_reward: f64,
}

impl Default for SmaCrossoverStrategy {
    fn default() -> Self {
        Self {
            atr_stop_multiple: 1.5,
            risk_reward: 2.0,
        }
    }
}

impl Strategy for SmaCrossoverStrategy {
    fn name(&self) -> &'static str {
        "sma_crossover"
    }

    fn required_indicators(&self) -> &'static [&'static str] {
        &["ema_10", "sma_50", "atr_14"]
    }

    fn on_bar(&self, symbol: &str, bar: &Bar, indicators: &IndicatorFrame) -> Option<Signal> {
        let fast = indicators.last("ema_10");
        let slow = indicators.last("sma_50");
        let fast_prev = indicators.get("ema_10", 1);
        let slow_prev = indicators.get("sma_50", 1);
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
            "sma/ema crossover",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IndicatorSeries;
    use chrono::Utc;
    use std::collections::HashMap;

    fn frame(fast_prev: f64, fast: f64, slow_prev: f64, slow: f64, atr: f64) -> IndicatorFrame {
        let mut columns = HashMap::new();
        columns.insert("ema_10".into(), IndicatorSeries { values: vec![fast_prev, fast] });
        columns.insert("sma_50".into(), IndicatorSeries { values: vec![slow_prev, slow] });
        columns.insert("atr_14".into(), IndicatorSeries { values: vec![atr, atr] });
        IndicatorFrame { columns }
    }

    fn bar() -> Bar {
        Bar {
            timestamp: Utc::now(),
            open: 1.1,
            high: 1.1,
            low: 1.1,
            close: 1.1,
            volume: 100.0,
            tick_volume: 100.0,
            spread: 0.0001,
        }
    }

    #[test]
    fn upward_cross_emits_long_signal() {
        let strategy = SmaCrossoverStrategy::default();
        let frame = frame(0.99, 1.01, 1.0, 1.0, 0.001);
        let signal = strategy.on_bar("EURUSD", &bar(), &frame).unwrap();
        assert_eq!(signal.side, Side::Long);
    }

    #[test]
    fn no_cross_emits_nothing() {
        let strategy = SmaCrossoverStrategy::default();
        let frame = frame(1.02, 1.03, 1.0, 1.0, 0.001);
        assert!(strategy.on_bar("EURUSD", &bar(), &frame).is_none());
    }
}
