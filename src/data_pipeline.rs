//! §4.2 DataPipeline: an in-memory ordered window per (symbol, timeframe),
//! sized to the largest indicator lookback plus a safety margin. Rejects
//! out-of-order bars and deduplicates by timestamp, the same bounded-window
//! discipline the teacher's rolling-stats structures use (`RollingStats`,
//! `VecDeque`-backed windows), generalised here to full OHLCV bars.

use std::collections::HashMap;

use crate::domain::{Bar, Timeframe};

pub const LOOKBACK_SAFETY_MARGIN: usize = 50;

pub struct DataPipeline {
    windows: HashMap<(String, Timeframe), Vec<Bar>>,
    max_window: usize,
}

impl DataPipeline {
    pub fn new(largest_lookback: usize) -> Self {
        Self {
            windows: HashMap::new(),
            max_window: largest_lookback + LOOKBACK_SAFETY_MARGIN,
        }
    }

    /// Appends closed bars in order, rejecting anything not strictly newer
    /// than the current tail and deduplicating by timestamp.
    pub fn ingest(&mut self, symbol: &str, timeframe: Timeframe, bars: impl IntoIterator<Item = Bar>) {
        let key = (symbol.to_string(), timeframe);
        let window = self.windows.entry(key).or_default();

        for bar in bars {
            match window.last() {
                Some(last) if bar.timestamp <= last.timestamp => continue,
                _ => {}
            }
            window.push(bar);
        }

        if window.len() > self.max_window {
            let excess = window.len() - self.max_window;
            window.drain(0..excess);
        }
    }

    pub fn window(&self, symbol: &str, timeframe: Timeframe) -> &[Bar] {
        self.windows
            .get(&(symbol.to_string(), timeframe))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn latest(&self, symbol: &str, timeframe: Timeframe) -> Option<&Bar> {
        self.window(symbol, timeframe).last()
    }

    pub fn closes(&self, symbol: &str, timeframe: Timeframe) -> Vec<f64> {
        self.window(symbol, timeframe).iter().map(|b| b.close).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(ts_secs: i64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.timestamp_opt(ts_secs, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            tick_volume: 1.0,
            spread: 0.0001,
        }
    }

    #[test]
    fn out_of_order_and_duplicate_bars_are_rejected() {
        let mut pipeline = DataPipeline::new(20);
        pipeline.ingest("EURUSD", Timeframe::M15, vec![bar(100, 1.0), bar(200, 1.1)]);
        pipeline.ingest("EURUSD", Timeframe::M15, vec![bar(200, 1.1), bar(150, 1.05), bar(300, 1.2)]);
        let window = pipeline.window("EURUSD", Timeframe::M15);
        assert_eq!(window.len(), 3);
        assert_eq!(window[2].close, 1.2);
    }

    #[test]
    fn window_is_bounded_by_lookback_plus_margin() {
        let mut pipeline = DataPipeline::new(10);
        let bars: Vec<Bar> = (0..200).map(|i| bar(i * 60, i as f64)).collect();
        pipeline.ingest("EURUSD", Timeframe::M1, bars);
        assert_eq!(pipeline.window("EURUSD", Timeframe::M1).len(), 60);
    }
}
