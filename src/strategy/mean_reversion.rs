use crate::domain::{Bar, IndicatorFrame, Side, Signal, Timeframe};

use super::Strategy;

/// Bollinger-band touch with an RSI extremum, only in a low-ADX (non-trending)
/// regime where mean reversion is the better-grounded hypothesis.
pub struct MeanReversionStrategy {
    pub adx_ceiling: f64,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
}

impl Default for MeanReversionStrategy {
    fn default() -> Self {
        Self {
            adx_ceiling: 25.0,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
        }
    }
}

impl Strategy for MeanReversionStrategy {
    fn name(&self) -> &'static str {
        "mean_reversion"
    }

    fn required_indicators(&self) -> &'static [&'static str] {
        &["bb_upper_20_2", "bb_lower_20_2", "bb_middle_20_2", "rsi_14", "adx_14"]
    }

    fn on_bar(&self, symbol: &str, bar: &Bar, indicators: &IndicatorFrame) -> Option<Signal> {
        let upper = indicators.last("bb_upper_20_2");
        let lower = indicators.last("bb_lower_20_2");
        let middle = indicators.last("bb_middle_20_2");
        let rsi = indicators.last("rsi_14");
        let adx = indicators.last("adx_14");
        if [upper, lower, middle, rsi, adx].iter().any(|v| v.is_nan()) {
            return None;
        }
        if adx >= self.adx_ceiling {
            return None;
        }

        let side = if bar.close <= lower && rsi <= self.rsi_oversold {
            Side::Long
        } else if bar.close >= upper && rsi >= self.rsi_overbought {
            Side::Short
        } else {
            return None;
        };

        let stop_distance = (upper - lower) * 0.5;
        let (stop_loss, take_profit) = match side {
            Side::Long => (bar.close - stop_distance * 0.6, middle),
            Side::Short => (bar.close + stop_distance * 0.6, middle),
        };

        Some(Signal::new(
            symbol,
            Timeframe::M15,
            side,
            bar.close,
            stop_loss,
            take_profit,
            0.55,
            self.name(),
            "bollinger touch with rsi extremum in range regime",
        ))
    }
}
