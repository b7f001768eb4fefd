//! Declared indicator dependencies. Every strategy and exit policy names the
//! columns it needs; the set is fixed and closed, so the engine doesn't need
//! general dependency-graph machinery, just a lookup of `name -> min bars`.

pub const KNOWN_COLUMNS: &[(&str, usize)] = &[
    ("ema_10", 10),
    ("ema_20", 20),
    ("sma_50", 50),
    ("rsi_14", 15),
    ("atr_14", 15),
    ("adx_14", 28),
    ("return_20", 20),
    ("bb_middle_20_2", 20),
    ("bb_upper_20_2", 20),
    ("bb_lower_20_2", 20),
    ("bb_width_pct_20_2", 20),
    ("ema_12", 12),
    ("ema_26", 26),
    ("macd_line", 26),
    ("macd_signal", 35),
    ("volume_sma_20", 20),
    ("range_high_20", 20),
    ("range_low_20", 20),
];

pub fn min_bars_for(columns: &[&str]) -> usize {
    columns
        .iter()
        .filter_map(|name| KNOWN_COLUMNS.iter().find(|(n, _)| n == name).map(|(_, n)| *n))
        .max()
        .unwrap_or(0)
}

pub fn largest_lookback() -> usize {
    KNOWN_COLUMNS.iter().map(|(_, n)| *n).max().unwrap_or(0)
}
