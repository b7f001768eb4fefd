//! §4.11 Persistence: an append-mostly `rusqlite` store for signals, orders,
//! trades and order provenance. Grounded directly on the teacher's
//! `vault::vault_db::VaultDb` -- same `Arc<Mutex<Connection>>` handle, same
//! `pragma_update` WAL/synchronous setup, same `CREATE TABLE IF NOT EXISTS`
//! plus explicit index style, same `INSERT OR REPLACE` dedupe-by-primary-key
//! idiom.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::config::PersistenceConfig;
use crate::domain::{
    OrderRequest, OrderResult, OrderStatus, PositionSizeDecision, ProvenanceRecord, RegimeLabel,
    Signal,
};

#[derive(Clone)]
pub struct PersistenceStore {
    conn: Arc<Mutex<Connection>>,
}

fn regime_to_str(regime: RegimeLabel) -> &'static str {
    match regime {
        RegimeLabel::TrendingUpStrong => "trending_up_strong",
        RegimeLabel::TrendingUpWeak => "trending_up_weak",
        RegimeLabel::TrendingDownStrong => "trending_down_strong",
        RegimeLabel::TrendingDownWeak => "trending_down_weak",
        RegimeLabel::RangingTight => "ranging_tight",
        RegimeLabel::RangingWide => "ranging_wide",
        RegimeLabel::VolatileBreakout => "volatile_breakout",
        RegimeLabel::VolatileConsolidation => "volatile_consolidation",
        RegimeLabel::Consolidating => "consolidating",
        RegimeLabel::Reversal => "reversal",
    }
}

fn order_status_to_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Placed => "placed",
        OrderStatus::Filled => "filled",
        OrderStatus::Partial => "partial",
        OrderStatus::Rejected => "rejected",
        OrderStatus::Error => "error",
    }
}

impl PersistenceStore {
    pub fn open(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open(&config.path).context("open persistence db")?;
        if config.wal_enabled {
            conn.pragma_update(None, "journal_mode", "WAL").ok();
        }
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS signals (
                signal_id TEXT PRIMARY KEY,
                ts INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price REAL NOT NULL,
                stop_loss REAL NOT NULL,
                take_profit REAL NOT NULL,
                confidence REAL NOT NULL,
                strategy_name TEXT NOT NULL,
                reason TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_signals_symbol_ts ON signals(symbol, ts DESC)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS orders (
                client_tag TEXT PRIMARY KEY,
                signal_id TEXT,
                ts INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                volume REAL NOT NULL,
                status TEXT NOT NULL,
                ticket INTEGER,
                fill_price REAL,
                broker_message TEXT
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_orders_ticket ON orders(ticket)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                ticket INTEGER NOT NULL,
                closed_at INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                volume REAL NOT NULL,
                entry_price REAL NOT NULL,
                exit_price REAL NOT NULL,
                realized_pnl REAL NOT NULL,
                strategy_name TEXT,
                PRIMARY KEY (ticket, closed_at)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_strategy ON trades(strategy_name, closed_at DESC)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS order_provenance (
                order_id TEXT PRIMARY KEY,
                signal_id TEXT NOT NULL,
                strategy_name TEXT NOT NULL,
                regime TEXT NOT NULL,
                base_size REAL NOT NULL,
                final_size REAL NOT NULL,
                reasoning TEXT NOT NULL,
                signal_at INTEGER NOT NULL,
                sized_at INTEGER NOT NULL,
                placed_at INTEGER,
                filled_at INTEGER,
                closed_at INTEGER
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metric_snapshots (
                id TEXT PRIMARY KEY,
                ts INTEGER NOT NULL,
                equity REAL NOT NULL,
                drawdown_pct REAL NOT NULL,
                open_positions INTEGER NOT NULL,
                sl_tp_failure_total INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_metric_snapshots_ts ON metric_snapshots(ts DESC)",
            [],
        )?;

        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// In-memory store for tests (no file on disk).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&PersistenceConfig {
            path: ":memory:".to_string(),
            wal_enabled: false,
            writer_queue_cap: 1024,
        })
    }

    pub async fn record_signal(&self, signal: &Signal) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO signals \
             (signal_id, ts, symbol, timeframe, side, entry_price, stop_loss, take_profit, confidence, strategy_name, reason) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                signal.signal_id.to_string(),
                signal.timestamp.timestamp(),
                signal.symbol,
                signal.timeframe,
                format!("{:?}", signal.side),
                signal.entry_price,
                signal.stop_loss,
                signal.take_profit,
                signal.confidence,
                signal.strategy_name,
                signal.reason,
            ],
        )?;
        Ok(())
    }

    /// Dedupe key is `client_tag` (P2): re-recording the same order is an
    /// idempotent upsert, mirroring the execution engine's own dedup.
    pub async fn record_order(&self, request: &OrderRequest, result: &OrderResult) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO orders \
             (client_tag, signal_id, ts, symbol, side, volume, status, ticket, fill_price, broker_message) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                request.client_tag,
                request.source_signal_id.map(|id| id.to_string()),
                Utc::now().timestamp(),
                request.symbol,
                format!("{:?}", request.side),
                request.volume,
                order_status_to_str(result.status),
                result.ticket.map(|t| t as i64),
                result.fill_price,
                result.broker_message,
            ],
        )?;
        Ok(())
    }

    pub async fn record_trade(
        &self,
        ticket: u64,
        symbol: &str,
        side: &str,
        volume: f64,
        entry_price: f64,
        exit_price: f64,
        realized_pnl: f64,
        strategy_name: Option<&str>,
        closed_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO trades \
             (ticket, closed_at, symbol, side, volume, entry_price, exit_price, realized_pnl, strategy_name) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                ticket as i64,
                closed_at.timestamp(),
                symbol,
                side,
                volume,
                entry_price,
                exit_price,
                realized_pnl,
                strategy_name,
            ],
        )?;
        info!(ticket, realized_pnl, "trade finalized and persisted");
        Ok(())
    }

    pub async fn record_provenance(&self, record: &ProvenanceRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO order_provenance \
             (order_id, signal_id, strategy_name, regime, base_size, final_size, reasoning, signal_at, sized_at, placed_at, filled_at, closed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.order_id,
                record.signal_id.to_string(),
                record.strategy_name,
                regime_to_str(record.regime),
                record.sizing_decision.base_size,
                record.sizing_decision.final_size,
                record.sizing_decision.reasoning,
                record.signal_at.timestamp(),
                record.sized_at.timestamp(),
                record.placed_at.map(|t| t.timestamp()),
                record.filled_at.map(|t| t.timestamp()),
                record.closed_at.map(|t| t.timestamp()),
            ],
        )?;
        Ok(())
    }

    pub async fn provenance_for_order(&self, order_id: &str) -> Result<Option<ProvenanceSummary>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT order_id, signal_id, strategy_name, regime, base_size, final_size, reasoning \
             FROM order_provenance WHERE order_id = ?1",
        )?;
        let mut rows = stmt.query(params![order_id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        Ok(Some(ProvenanceSummary {
            order_id: row.get(0)?,
            signal_id: row.get(1)?,
            strategy_name: row.get(2)?,
            regime: row.get(3)?,
            base_size: row.get(4)?,
            final_size: row.get(5)?,
            reasoning: row.get(6)?,
        }))
    }

    pub async fn record_metric_snapshot(
        &self,
        equity: f64,
        drawdown_pct: f64,
        open_positions: u32,
        sl_tp_failure_total: u64,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO metric_snapshots \
             (id, ts, equity, drawdown_pct, open_positions, sl_tp_failure_total) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                Uuid::new_v4().to_string(),
                Utc::now().timestamp(),
                equity,
                drawdown_pct,
                open_positions as i64,
                sl_tp_failure_total as i64,
            ],
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ProvenanceSummary {
    pub order_id: String,
    pub signal_id: String,
    pub strategy_name: String,
    pub regime: String,
    pub base_size: f64,
    pub final_size: f64,
    pub reasoning: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PositionSizeDecision, Side, Timeframe};

    #[tokio::test]
    async fn signal_and_order_round_trip_through_sqlite() {
        let store = PersistenceStore::open_in_memory().unwrap();
        let signal = Signal::new("EURUSD", Timeframe::M15, Side::Long, 1.1, 1.098, 1.103, 0.8, "sma_crossover", "test");
        store.record_signal(&signal).await.unwrap();

        let request = OrderRequest {
            client_tag: "tag-1".to_string(),
            symbol: "EURUSD".to_string(),
            side: Side::Long,
            volume: 0.5,
            order_type: crate::domain::OrderType::Market,
            price: Some(1.1),
            stop_loss: Some(1.098),
            take_profit: Some(1.103),
            deviation_ticks: 5,
            magic_number: 778001,
            source_signal_id: Some(signal.signal_id),
        };
        let result = OrderResult {
            status: OrderStatus::Filled,
            ticket: Some(42),
            filled_volume: 0.5,
            fill_price: 1.1001,
            commission: 0.0,
            swap: 0.0,
            broker_message: None,
        };
        store.record_order(&request, &result).await.unwrap();

        let provenance = ProvenanceRecord {
            order_id: "tag-1".to_string(),
            signal_id: signal.signal_id,
            strategy_name: "sma_crossover".to_string(),
            regime: RegimeLabel::TrendingUpStrong,
            sizing_decision: PositionSizeDecision::compose(1.0, vec![], 0.01),
            signal_at: Utc::now(),
            sized_at: Utc::now(),
            placed_at: Some(Utc::now()),
            filled_at: Some(Utc::now()),
            closed_at: None,
        };
        store.record_provenance(&provenance).await.unwrap();

        let fetched = store.provenance_for_order("tag-1").await.unwrap().unwrap();
        assert_eq!(fetched.strategy_name, "sma_crossover");
        assert_eq!(fetched.regime, "trending_up_strong");
    }
}
