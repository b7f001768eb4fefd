//! Core data model shared by every subsystem: bars, signals, orders, positions,
//! risk state and the append-only provenance record.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single OHLCV observation for a (symbol, timeframe). Immutable once inserted
/// into a [`crate::data_pipeline::DataPipeline`] window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub tick_volume: f64,
    pub spread: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        }
    }
}

/// An aligned numeric series for one named indicator column, keyed to the same
/// bar window it was derived from. NaN means "insufficient history for this bar".
#[derive(Debug, Clone, Default)]
pub struct IndicatorSeries {
    pub values: Vec<f64>,
}

impl IndicatorSeries {
    pub fn last(&self) -> f64 {
        self.values.last().copied().unwrap_or(f64::NAN)
    }

    pub fn get(&self, bars_ago: usize) -> f64 {
        let len = self.values.len();
        if bars_ago >= len {
            f64::NAN
        } else {
            self.values[len - 1 - bars_ago]
        }
    }
}

/// Mapping from a namespaced indicator key (`rsi_14`, `atr_14`, `bb_upper_20_2`,
/// `adx_14`, `runtime_*`) to its aligned series, for a single (symbol, timeframe).
#[derive(Debug, Clone, Default)]
pub struct IndicatorFrame {
    pub columns: std::collections::HashMap<String, IndicatorSeries>,
}

impl IndicatorFrame {
    pub fn last(&self, key: &str) -> f64 {
        self.columns.get(key).map(|s| s.last()).unwrap_or(f64::NAN)
    }

    pub fn get(&self, key: &str, bars_ago: usize) -> f64 {
        self.columns
            .get(key)
            .map(|s| s.get(bars_ago))
            .unwrap_or(f64::NAN)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn flip(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

/// Created by a strategy from `on_bar`. Immutable; consumed exactly once by the
/// orchestrator in the tick it was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub timeframe: String,
    pub side: Side,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub confidence: f64,
    pub strategy_name: String,
    pub reason: String,
    pub metadata: Option<String>,
}

impl Signal {
    pub fn new(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        side: Side,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
        confidence: f64,
        strategy_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            signal_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            symbol: symbol.into(),
            timeframe: timeframe.as_str().to_string(),
            side,
            entry_price,
            stop_loss,
            take_profit,
            confidence: confidence.clamp(0.0, 1.0),
            strategy_name: strategy_name.into(),
            reason: reason.into(),
            metadata: None,
        }
    }

    pub fn risk_distance(&self) -> f64 {
        (self.entry_price - self.stop_loss).abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryQualityClass {
    Reject,
    Marginal,
    Good,
    Premium,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EntryQuality {
    pub class: EntryQualityClass,
    pub score: f64,
    pub size_multiplier: f64,
}

/// One labelled multiplicative adjustment applied by the sizing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeAdjustment {
    pub reason: String,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSizeDecision {
    pub base_size: f64,
    pub adjustments: Vec<SizeAdjustment>,
    pub final_size: f64,
    pub reasoning: String,
}

impl PositionSizeDecision {
    /// `final_size == base_size * product(adjustments)`, rounded down to `lot_step`.
    pub fn compose(base_size: f64, adjustments: Vec<SizeAdjustment>, lot_step: f64) -> Self {
        let product: f64 = adjustments.iter().map(|a| a.multiplier).product();
        let raw = base_size * product;
        let final_size = if lot_step > 0.0 {
            (raw / lot_step).floor() * lot_step
        } else {
            raw
        };
        let reasoning = adjustments
            .iter()
            .map(|a| format!("{}={:.4}", a.reason, a.multiplier))
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            base_size,
            adjustments,
            final_size,
            reasoning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_tag: String,
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub order_type: OrderType,
    pub price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub deviation_ticks: u32,
    pub magic_number: u64,
    pub source_signal_id: Option<Uuid>,
}

impl OrderRequest {
    /// Deterministic idempotency key derived from the signal, so retries after a
    /// network-induced uncertainty generate the identical `client_tag`.
    pub fn client_tag_for(signal: &Signal, magic_number: u64) -> String {
        let namespace = Uuid::NAMESPACE_OID;
        let name = format!("order:{}:{}", magic_number, signal.signal_id);
        Uuid::new_v5(&namespace, name.as_bytes()).to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Placed,
    Filled,
    Partial,
    Rejected,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub status: OrderStatus,
    pub ticket: Option<u64>,
    pub filled_volume: f64,
    pub fill_price: f64,
    pub commission: f64,
    pub swap: f64,
    pub broker_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionOrigin {
    Engine,
    Adopted,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub current_price: f64,
    pub unrealized_pnl: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub max_favorable: f64,
    pub max_adverse: f64,
    pub holding_bars: u64,
    pub origin: PositionOrigin,
    pub strategy_name: Option<String>,
}

impl Position {
    pub fn update_price(&mut self, price: f64, pip_value_per_unit: f64) {
        self.current_price = price;
        let diff = match self.side {
            Side::Long => price - self.entry_price,
            Side::Short => self.entry_price - price,
        };
        self.unrealized_pnl = diff * self.volume * pip_value_per_unit;
        let favorable = diff.max(0.0);
        let adverse = (-diff).max(0.0);
        if favorable > self.max_favorable {
            self.max_favorable = favorable;
        }
        if adverse > self.max_adverse {
            self.max_adverse = adverse;
        }
    }
}

/// Per-position exit bookkeeping that does not belong on the authoritative
/// [`Position`] record itself.
#[derive(Debug, Clone, Default)]
pub struct TrackedExit {
    pub peak_profit: f64,
    pub trail_reference: Option<f64>,
    pub scaled_tiers_hit: HashSet<u8>,
    pub last_adverse_sample: Option<(DateTime<Utc>, f64)>,
}

#[derive(Debug, Clone)]
pub struct PendingSlTpUpdate {
    pub ticket: u64,
    pub desired_sl: Option<f64>,
    pub desired_tp: Option<f64>,
    pub attempts: u32,
    pub next_retry_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawdownState {
    Normal,
    Caution,
    Warning,
    Danger,
    Critical,
    Survival,
    Recovery,
}

impl DrawdownState {
    /// Discrete size multiplier table from §4.7.
    pub fn size_multiplier(self) -> f64 {
        match self {
            DrawdownState::Normal => 1.0,
            DrawdownState::Caution => 0.75,
            DrawdownState::Warning => 0.5,
            DrawdownState::Danger => 0.25,
            DrawdownState::Critical => 0.1,
            DrawdownState::Survival => 0.05,
            DrawdownState::Recovery => 0.6,
        }
    }

    pub fn min_confidence(self) -> f64 {
        match self {
            DrawdownState::Survival => 0.95,
            DrawdownState::Critical => 0.85,
            _ => 0.0,
        }
    }

    pub fn max_positions_cap(self) -> Option<u32> {
        match self {
            DrawdownState::Survival => Some(1),
            DrawdownState::Critical => Some(2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub account_balance: f64,
    pub equity: f64,
    pub peak_equity: f64,
    pub drawdown_pct: f64,
    pub drawdown_state: DrawdownState,
    pub consecutive_wins: u32,
    pub consecutive_losses: u32,
    pub trades_today: u32,
    pub daily_realized_pnl: f64,
    pub day_start: DateTime<Utc>,
}

impl RiskState {
    pub fn new(initial_equity: f64) -> Self {
        Self {
            account_balance: initial_equity,
            equity: initial_equity,
            peak_equity: initial_equity,
            drawdown_pct: 0.0,
            drawdown_state: DrawdownState::Normal,
            consecutive_wins: 0,
            consecutive_losses: 0,
            trades_today: 0,
            daily_realized_pnl: 0.0,
            day_start: Utc::now(),
        }
    }

    /// Resets the daily counters once `now` has rolled past `day_start`'s
    /// calendar day, mirroring the balance-tier reset the source applies at
    /// session rollover.
    pub fn roll_day_if_needed(&mut self, now: DateTime<Utc>) {
        if now.date_naive() != self.day_start.date_naive() {
            self.trades_today = 0;
            self.daily_realized_pnl = 0.0;
            self.day_start = now;
        }
    }

    /// Daily realized loss as a fraction of account balance, the unit
    /// `RiskConfig::max_daily_loss` is expressed in.
    pub fn daily_loss_fraction(&self) -> f64 {
        (-self.daily_realized_pnl).max(0.0) / self.account_balance.max(1e-9)
    }

    pub fn update_equity(&mut self, equity: f64) {
        self.equity = equity;
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
        self.drawdown_pct = if self.peak_equity > 0.0 {
            ((self.peak_equity - equity) / self.peak_equity).max(0.0)
        } else {
            0.0
        };
        self.drawdown_state = classify_drawdown(self.drawdown_pct, self.drawdown_state);
    }

    pub fn record_trade_outcome(&mut self, realized_pnl: f64) {
        self.roll_day_if_needed(Utc::now());
        self.trades_today += 1;
        self.daily_realized_pnl += realized_pnl;
        if realized_pnl > 0.0 {
            self.consecutive_wins += 1;
            self.consecutive_losses = 0;
        } else {
            self.consecutive_losses += 1;
            self.consecutive_wins = 0;
        }
    }
}

/// Hysteresis thresholds for the drawdown state machine: escalation happens on
/// crossing the next tier's threshold, de-escalation only once drawdown falls
/// a full tier below, to avoid chattering at the boundary.
fn classify_drawdown(drawdown_pct: f64, previous: DrawdownState) -> DrawdownState {
    const TIERS: [(f64, DrawdownState); 6] = [
        (0.50, DrawdownState::Survival),
        (0.35, DrawdownState::Critical),
        (0.25, DrawdownState::Danger),
        (0.15, DrawdownState::Warning),
        (0.08, DrawdownState::Caution),
        (0.0, DrawdownState::Normal),
    ];
    let escalated = TIERS
        .iter()
        .find(|(threshold, _)| drawdown_pct >= *threshold)
        .map(|(_, state)| *state)
        .unwrap_or(DrawdownState::Normal);

    if escalated as u8 <= previous as u8 || previous == DrawdownState::Recovery {
        // Drawdown is easing. Stay in Recovery (a distinct, lower-risk state)
        // until it has fully cleared into Normal territory.
        if drawdown_pct < 0.04 {
            DrawdownState::Normal
        } else if (escalated as u8) < (previous as u8) {
            DrawdownState::Recovery
        } else {
            previous
        }
    } else {
        escalated
    }
}

#[derive(Debug, Clone, Default)]
pub struct StrategyStats {
    pub wins: u64,
    pub losses: u64,
    pub pnl_sum: f64,
    pub recent_outcomes: VecDeque<bool>,
    pub confidence_sum: f64,
    pub confidence_count: u64,
}

impl StrategyStats {
    const RECENT_WINDOW: usize = 50;

    pub fn record(&mut self, won: bool, pnl: f64, confidence: f64) {
        if won {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.pnl_sum += pnl;
        self.confidence_sum += confidence;
        self.confidence_count += 1;
        self.recent_outcomes.push_back(won);
        if self.recent_outcomes.len() > Self::RECENT_WINDOW {
            self.recent_outcomes.pop_front();
        }
    }

    pub fn total_trades(&self) -> u64 {
        self.wins + self.losses
    }

    pub fn win_rate(&self) -> f64 {
        let total = self.total_trades();
        if total == 0 {
            0.5
        } else {
            self.wins as f64 / total as f64
        }
    }

    pub fn profit_factor(&self) -> f64 {
        let gross_profit: f64 = self
            .recent_outcomes
            .iter()
            .filter(|&&w| w)
            .count() as f64;
        let gross_loss: f64 = self
            .recent_outcomes
            .iter()
            .filter(|&&w| !w)
            .count() as f64;
        if gross_loss == 0.0 {
            if gross_profit > 0.0 {
                2.0
            } else {
                1.0
            }
        } else {
            gross_profit / gross_loss
        }
    }

    pub fn recent_performance(&self) -> f64 {
        if self.recent_outcomes.is_empty() {
            0.5
        } else {
            let wins = self.recent_outcomes.iter().filter(|&&w| w).count() as f64;
            wins / self.recent_outcomes.len() as f64
        }
    }

    pub fn average_confidence(&self) -> f64 {
        if self.confidence_count == 0 {
            0.5
        } else {
            self.confidence_sum / self.confidence_count as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegimeLabel {
    TrendingUpStrong,
    TrendingUpWeak,
    TrendingDownStrong,
    TrendingDownWeak,
    RangingTight,
    RangingWide,
    VolatileBreakout,
    VolatileConsolidation,
    Consolidating,
    Reversal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub order_id: String,
    pub signal_id: Uuid,
    pub strategy_name: String,
    pub regime: RegimeLabel,
    pub sizing_decision: PositionSizeDecision,
    pub signal_at: DateTime<Utc>,
    pub sized_at: DateTime<Utc>,
    pub placed_at: Option<DateTime<Utc>>,
    pub filled_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizing_composition_rounds_down_to_lot_step() {
        let adjustments = vec![
            SizeAdjustment { reason: "entry_quality".into(), multiplier: 0.85 },
            SizeAdjustment { reason: "loss_curve".into(), multiplier: 1.0 },
        ];
        let decision = PositionSizeDecision::compose(1.0, adjustments, 0.01);
        assert!((decision.final_size - 0.85).abs() < 1e-9);
    }

    #[test]
    fn client_tag_is_deterministic_for_same_signal() {
        let signal = Signal::new(
            "EURUSD",
            Timeframe::M15,
            Side::Long,
            1.1000,
            1.0984,
            1.1032,
            0.9,
            "ema_crossover",
            "test",
        );
        let a = OrderRequest::client_tag_for(&signal, 778001);
        let b = OrderRequest::client_tag_for(&signal, 778001);
        assert_eq!(a, b);
    }

    #[test]
    fn daily_realized_loss_accumulates_as_fraction_of_balance() {
        let mut risk_state = RiskState::new(10_000.0);
        risk_state.record_trade_outcome(-200.0);
        risk_state.record_trade_outcome(50.0);
        risk_state.record_trade_outcome(-100.0);
        assert!((risk_state.daily_loss_fraction() - 0.03).abs() < 1e-9);
        assert_eq!(risk_state.trades_today, 3);
    }

    #[test]
    fn drawdown_escalates_through_tiers() {
        assert_eq!(classify_drawdown(0.0, DrawdownState::Normal), DrawdownState::Normal);
        assert_eq!(classify_drawdown(0.10, DrawdownState::Normal), DrawdownState::Warning);
        assert_eq!(classify_drawdown(0.51, DrawdownState::Normal), DrawdownState::Survival);
    }
}
