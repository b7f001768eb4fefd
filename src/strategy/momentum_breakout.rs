use crate::domain::{Bar, IndicatorFrame, Side, Signal, Timeframe};

use super::Strategy;

/// Breaks out of the recent Bollinger band range with volume confirmation,
/// filtered by RSI to avoid chasing an already-exhausted move.
pub struct MomentumBreakoutStrategy {
    pub volume_surge_multiple: f64,
    pub rsi_ceiling_long: f64,
    pub rsi_floor_short: f64,
}

impl Default for MomentumBreakoutStrategy {
    fn default() -> Self {
        Self {
            volume_surge_multiple: 1.5,
            rsi_ceiling_long: 75.0,
            rsi_floor_short: 25.0,
        }
    }
}

impl Strategy for MomentumBreakoutStrategy {
    fn name(&self) -> &'static str {
        "momentum_breakout"
    }

    fn required_indicators(&self) -> &'static [&'static str] {
        &["bb_upper_20_2", "bb_lower_20_2", "rsi_14", "atr_14"]
    }

    fn on_bar(&self, symbol: &str, bar: &Bar, indicators: &IndicatorFrame) -> Option<Signal> {
        let upper = indicators.last("bb_upper_20_2");
        let lower = indicators.last("bb_lower_20_2");
        let rsi = indicators.last("rsi_14");
        let atr = indicators.last("atr_14");
        if [upper, lower, rsi, atr].iter().any(|v| v.is_nan()) {
            return None;
        }

        let volume_confirmed = bar.volume > bar.tick_volume.max(1.0) * self.volume_surge_multiple;

        let side = if bar.close > upper && rsi < self.rsi_ceiling_long {
            Side::Long
        } else if bar.close < lower && rsi > self.rsi_floor_short {
            Side::Short
        } else {
            return None;
        };
        if !volume_confirmed {
            return None;
        }

        let stop_distance = atr * 1.5;
        let (stop_loss, take_profit) = match side {
            Side::Long => (bar.close - stop_distance, bar.close + stop_distance * 2.0),
            Side::Short => (bar.close + stop_distance, bar.close - stop_distance * 2.0),
        };

        Some(Signal::new(
            symbol,
            Timeframe::M15,
            side,
            bar.close,
            stop_loss,
            take_profit,
            0.65,
            self.name(),
            "range breakout with volume confirmation",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IndicatorSeries;
    use chrono::Utc;
    use std::collections::HashMap;

    fn frame() -> IndicatorFrame {
        let mut columns = HashMap::new();
        columns.insert("bb_upper_20_2".into(), IndicatorSeries { values: vec![1.1050] });
        columns.insert("bb_lower_20_2".into(), IndicatorSeries { values: vec![1.0950] });
        columns.insert("rsi_14".into(), IndicatorSeries { values: vec![60.0] });
        columns.insert("atr_14".into(), IndicatorSeries { values: vec![0.0010] });
        IndicatorFrame { columns }
    }

    fn breakout_bar(volume: f64, tick_volume: f64) -> Bar {
        Bar {
            timestamp: Utc::now(),
            open: 1.1040,
            high: 1.1070,
            low: 1.1040,
            close: 1.1070,
            volume,
            tick_volume,
            spread: 0.0001,
        }
    }

    #[test]
    fn weak_volume_does_not_confirm_breakout() {
        let strategy = MomentumBreakoutStrategy::default();
        // volume_surge_multiple is 1.5, so 120 against a tick_volume of 100 falls short.
        let bar = breakout_bar(120.0, 100.0);
        assert!(strategy.on_bar("EURUSD", &bar, &frame()).is_none());
    }

    #[test]
    fn volume_surge_confirms_breakout() {
        let strategy = MomentumBreakoutStrategy::default();
        let bar = breakout_bar(200.0, 100.0);
        assert!(strategy.on_bar("EURUSD", &bar, &frame()).is_some());
    }
}
