//! §4.12 Orchestrator: the single-threaded cooperative tick loop that drives
//! every other component (§5's concurrency model -- one task owns sequencing,
//! auxiliary I/O runs through `tokio::time::timeout`-bounded calls so a stuck
//! broker call can never stall the whole loop indefinitely).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::adoption::AdoptionScanner;
use crate::broker::BrokerAdapter;
use crate::config::Config;
use crate::data_pipeline::DataPipeline;
use crate::domain::{
    DrawdownState, OrderRequest, OrderResult, OrderStatus, ProvenanceRecord, RiskState, Side,
    Signal, StrategyStats, Timeframe, TrackedExit,
};
use crate::error::CoreError;
use crate::exits::{ExitAction, ExitContext, ExitCoordinator};
use crate::execution::ExecutionEngine;
use crate::indicators::requirements::largest_lookback;
use crate::indicators::IndicatorEngine;
use crate::persistence::PersistenceStore;
use crate::position::PositionManager;
use crate::quality_gate::EntryQualityGate;
use crate::regime::RegimeClassifier;
use crate::risk::{RiskContext, RiskEvaluator, RiskRejection, SymbolSpec};
use crate::selector::StrategySelector;
use crate::strategy::StrategyRegistry;
use crate::supervision::{CircuitBreaker, HealthRegistry, RateLimiter};

pub struct Orchestrator {
    config: Config,
    broker: Arc<dyn BrokerAdapter>,
    pipeline: DataPipeline,
    registry: StrategyRegistry,
    selector: StrategySelector,
    regime_classifiers: HashMap<String, RegimeClassifier>,
    quality_gate: EntryQualityGate,
    risk: RiskEvaluator,
    execution: ExecutionEngine,
    positions: PositionManager,
    exits: ExitCoordinator,
    adoption: AdoptionScanner,
    persistence: PersistenceStore,
    health: HealthRegistry,
    circuit: CircuitBreaker,
    rate_limiter: RateLimiter,
    risk_state: RiskState,
    strategy_stats: HashMap<String, StrategyStats>,
    tracked_exits: HashMap<u64, TrackedExit>,
    tick_count: u64,
    manual_trade_rx: Option<mpsc::Receiver<(ManualTradeRequest, oneshot::Sender<ManualTradeOutcome>)>>,
}

/// §6 `POST /trade` request, already validated (side parsed, volume positive)
/// by the HTTP layer. `price`/`stop_loss`/`take_profit` fall back to the
/// latest known bar / a zero-distance stop when omitted, same as the wire
/// contract's optional fields.
#[derive(Debug, Clone)]
pub struct ManualTradeRequest {
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

/// Outcome of a manually-submitted trade, routed back over the oneshot the
/// HTTP handler is waiting on and mapped to an HTTP status there.
#[derive(Debug)]
pub enum ManualTradeOutcome {
    Placed(OrderResult),
    RiskRejected(String),
    RateLimited,
    Failed(String),
}

/// Per-symbol static facts the sizing pipeline needs. A real deployment would
/// source this from the broker's symbol spec lookup; tests/fixtures supply it
/// directly so the orchestrator stays broker-agnostic.
pub trait SymbolSpecLookup: Send + Sync {
    fn lookup(&self, symbol: &str) -> SymbolSpec;
}

impl Orchestrator {
    pub fn new(
        config: Config,
        broker: Arc<dyn BrokerAdapter>,
        persistence: PersistenceStore,
        initial_equity: f64,
    ) -> Self {
        let lookback = largest_lookback();
        Self {
            registry: StrategyRegistry::with_canonical_strategies(),
            selector: StrategySelector::new(config.selector.clone()),
            regime_classifiers: HashMap::new(),
            quality_gate: EntryQualityGate::default(),
            risk: RiskEvaluator::new(config.risk.clone()),
            execution: ExecutionEngine::new(config.execution.clone()),
            positions: PositionManager::new(),
            exits: ExitCoordinator::with_canonical_policies(),
            adoption: AdoptionScanner::new(config.adoption.clone()),
            circuit: CircuitBreaker::new("broker", config.supervision.circuit.clone()),
            rate_limiter: RateLimiter::new(10.0, 5.0),
            health: HealthRegistry::default(),
            risk_state: RiskState::new(initial_equity),
            strategy_stats: HashMap::new(),
            tracked_exits: HashMap::new(),
            tick_count: 0,
            manual_trade_rx: None,
            pipeline: DataPipeline::new(lookback),
            persistence,
            config,
            broker,
        }
    }

    pub fn health(&self) -> HealthRegistry {
        self.health.clone()
    }

    /// Wires the HTTP control surface's manual-trade inbox. Requests queued
    /// here are drained and run through the real risk/execution pipeline on
    /// the next `tick()`, same as any other order -- there is no second path
    /// that places orders.
    pub fn attach_manual_trade_inbox(
        &mut self,
        rx: mpsc::Receiver<(ManualTradeRequest, oneshot::Sender<ManualTradeOutcome>)>,
    ) {
        self.manual_trade_rx = Some(rx);
    }

    /// One full tick, per the nine numbered steps in §4.12.
    pub async fn tick(&mut self, spec_lookup: &dyn SymbolSpecLookup) -> Result<(), CoreError> {
        self.tick_count += 1;

        // 1. connection health check
        if !self.circuit.allow() {
            warn!("circuit open, skipping tick");
            self.health.set_circuit_state(self.circuit.state());
            return Ok(());
        }
        let connected = self.broker.is_connected().await;
        self.health.set_broker_connected(connected);
        if !connected {
            match self.broker.connect().await {
                Ok(()) => self.circuit.record_success(),
                Err(err) => {
                    self.circuit.record_failure();
                    self.health.set_circuit_state(self.circuit.state());
                    warn!(error = %err, "broker reconnect failed");
                    return Ok(());
                }
            }
        }

        // 2. position reconciliation
        let broker_positions = self.broker.list_positions().await.map_err(|e| {
            self.circuit.record_failure();
            CoreError::Fetch(e)
        })?;
        self.circuit.record_success();
        self.health.set_circuit_state(self.circuit.state());

        let (_events, finalized) = self.positions.reconcile(broker_positions, |_| 10.0);
        for trade in &finalized {
            self.tracked_exits.remove(&trade.ticket);
            let pnl = trade.position.unrealized_pnl;
            self.risk_state.record_trade_outcome(pnl);
            if let Some(name) = &trade.position.strategy_name {
                self.strategy_stats.entry(name.clone()).or_default().record(pnl > 0.0, pnl, 0.5);
            }
        }

        self.drain_manual_trades(spec_lookup).await;

        for symbol in self.config.symbols.clone() {
            self.tick_symbol(&symbol, spec_lookup).await?;
        }

        // 7. retry queue drain
        self.execution.drain_retry_queue(self.broker.as_ref()).await;
        self.health.set_sl_tp_failure_total(self.execution.sl_tp_failure_total);

        // 8. adoption scanner at a lower cadence
        if self.adoption.is_due(self.tick_count) {
            let engine_magic = self.config.execution.magic_number;
            let known: Vec<u64> = self.positions.all().map(|p| p.ticket).collect();
            let owned = |ticket: u64| if known.contains(&ticket) { Some(engine_magic) } else { None };
            let broker_positions = self.broker.list_positions().await.unwrap_or_default();
            let adopted = self.adoption.scan(&broker_positions, engine_magic, owned, &self.config.risk, &self.config.exits);
            for (position, protection) in adopted {
                if self.adoption.log_only() {
                    info!(ticket = position.ticket, "would adopt position (log_only)");
                    continue;
                }
                if self.broker.modify_position(position.ticket, Some(protection.stop_loss), Some(protection.take_profit)).await.is_ok() {
                    let _ = self.positions.register_new(position);
                }
            }
        }

        // 9. metrics snapshot
        self.health.set_drawdown_state(self.risk_state.drawdown_state);
        self.persistence
            .record_metric_snapshot(
                self.risk_state.equity,
                self.risk_state.drawdown_pct,
                self.positions.len() as u32,
                self.execution.sl_tp_failure_total,
            )
            .await
            .map_err(|_| CoreError::ConfigInvalid("metric snapshot persist failed".to_string()))?;

        Ok(())
    }

    async fn tick_symbol(&mut self, symbol: &str, spec_lookup: &dyn SymbolSpecLookup) -> Result<(), CoreError> {
        if !self.rate_limiter.try_acquire("broker.fetch_bars") {
            return Ok(());
        }

        // 3. bar fetch + indicator update
        let bars = self
            .broker
            .fetch_bars(symbol, Timeframe::M15.as_str(), largest_lookback() + 50)
            .await?;
        self.pipeline.ingest(symbol, Timeframe::M15, bars);
        let window = self.pipeline.window(symbol, Timeframe::M15);
        if window.is_empty() {
            return Ok(());
        }
        let frame = IndicatorEngine::compute(window);
        let latest_bar = *window.last().unwrap();

        // 4. throttled regime classification
        let classifier = self.regime_classifiers.entry(symbol.to_string()).or_insert_with(|| {
            RegimeClassifier::new(self.config.selector.regime_check_interval_s)
        });
        let regime = classifier.classify_throttled(&frame, Utc::now());

        // 5. strategy selection -> quality gate -> risk/sizing -> execution -> registration -> persistence
        if let Some(outcome) = self.selector.select(&self.registry, symbol, &latest_bar, &frame, regime, &self.strategy_stats) {
            self.persistence.record_signal(&outcome.signal).await.ok();
            let quality = self.quality_gate.evaluate(&outcome.signal, &frame);

            if quality.class != crate::domain::EntryQualityClass::Reject {
                let spec = spec_lookup.lookup(symbol);
                let leverage = self.config.risk.leverage.max(1.0);
                let used_margin: f64 = self
                    .positions
                    .all()
                    .map(|p| p.volume * p.entry_price / leverage)
                    .sum();
                let ctx = RiskContext {
                    risk_state: &self.risk_state,
                    open_position_count: self.positions.len() as u32,
                    max_positions: self.config.risk.max_open_positions,
                    margin_available: self.risk_state.equity - used_margin,
                    margin_required: spec.lot_min * outcome.signal.entry_price / leverage,
                    daily_realized_loss: self.risk_state.daily_loss_fraction(),
                };

                match self.risk.evaluate(&outcome.signal, &quality, &ctx, &spec, None) {
                    Ok(decision) => {
                        let client_tag = OrderRequest::client_tag_for(&outcome.signal, self.config.execution.magic_number);
                        let request = OrderRequest {
                            client_tag: client_tag.clone(),
                            symbol: symbol.to_string(),
                            side: outcome.signal.side,
                            volume: decision.final_size,
                            order_type: crate::domain::OrderType::Market,
                            price: Some(outcome.signal.entry_price),
                            stop_loss: Some(outcome.signal.stop_loss),
                            take_profit: Some(outcome.signal.take_profit),
                            deviation_ticks: 5,
                            magic_number: self.config.execution.magic_number,
                            source_signal_id: Some(outcome.signal.signal_id),
                        };

                        if self.rate_limiter.try_acquire("broker.send_order") {
                            match self.execution.place(self.broker.as_ref(), request.clone()).await {
                                Ok(result) => {
                                    self.persistence.record_order(&request, &result).await.ok();
                                    if matches!(result.status, OrderStatus::Filled | OrderStatus::Partial) {
                                        if let Some(ticket) = result.ticket {
                                            let position = crate::domain::Position {
                                                ticket,
                                                symbol: symbol.to_string(),
                                                side: outcome.signal.side,
                                                volume: result.filled_volume,
                                                entry_price: result.fill_price,
                                                entry_time: Utc::now(),
                                                current_price: result.fill_price,
                                                unrealized_pnl: 0.0,
                                                stop_loss: Some(outcome.signal.stop_loss),
                                                take_profit: Some(outcome.signal.take_profit),
                                                max_favorable: 0.0,
                                                max_adverse: 0.0,
                                                holding_bars: 0,
                                                origin: crate::domain::PositionOrigin::Engine,
                                                strategy_name: Some(outcome.chosen_strategy.clone()),
                                            };
                                            if self.positions.register_new(position).is_ok() {
                                                let provenance = ProvenanceRecord {
                                                    order_id: client_tag,
                                                    signal_id: outcome.signal.signal_id,
                                                    strategy_name: outcome.chosen_strategy,
                                                    regime,
                                                    sizing_decision: decision,
                                                    signal_at: outcome.signal.timestamp,
                                                    sized_at: Utc::now(),
                                                    placed_at: Some(Utc::now()),
                                                    filled_at: Some(Utc::now()),
                                                    closed_at: None,
                                                };
                                                self.persistence.record_provenance(&provenance).await.ok();
                                            }
                                        }
                                    }
                                }
                                Err(err) => error!(symbol, error = %err, "order placement failed"),
                            }
                        }
                    }
                    Err(rejection) => {
                        info!(symbol, reason = rejection.reason(), "signal rejected by risk evaluator");
                    }
                }
            }
        }

        // 6. exit coordinator evaluation for every open position on this symbol
        let tickets: Vec<u64> = self.positions.all().filter(|p| p.symbol == symbol).map(|p| p.ticket).collect();
        for ticket in tickets {
            self.evaluate_exit(ticket, &frame).await;
        }

        Ok(())
    }

    async fn evaluate_exit(&mut self, ticket: u64, frame: &crate::domain::IndicatorFrame) {
        let Some(position) = self.positions.get(ticket).cloned() else { return };
        let tracked = self.tracked_exits.entry(ticket).or_default();
        tracked.last_adverse_sample = Some((Utc::now(), position.current_price));

        let ctx = ExitContext {
            now: Some(Utc::now()),
            high_volatility: frame.last("atr_14") > frame.get("atr_14", 20).max(1e-9) * 1.5,
            near_market_close: false,
            news_window: false,
            long_hold: position.holding_bars > 200,
        };

        let decision = self.exits.evaluate(&position, tracked, frame, &self.risk_state, &self.config.exits, &ctx);
        let Some(decision) = decision else { return };

        match decision.action {
            ExitAction::Close => {
                info!(ticket, policy = decision.policy_name, reason = %decision.reason, "closing position");
                if self.execution.close(self.broker.as_ref(), ticket, None).await.is_ok() {
                    if let Some(closed) = self.positions.remove(ticket) {
                        self.tracked_exits.remove(&ticket);
                        self.risk_state.record_trade_outcome(closed.unrealized_pnl);
                        self.persistence
                            .record_trade(
                                ticket,
                                &closed.symbol,
                                &format!("{:?}", closed.side),
                                closed.volume,
                                closed.entry_price,
                                closed.current_price,
                                closed.unrealized_pnl,
                                closed.strategy_name.as_deref(),
                                Utc::now(),
                            )
                            .await
                            .ok();
                    }
                }
            }
            ExitAction::ScaleOut(fraction) => {
                let volume = position.volume * fraction;
                info!(ticket, policy = decision.policy_name, fraction, "scaling out position");
                if self.execution.close(self.broker.as_ref(), ticket, Some(volume)).await.is_ok() {
                    if decision.policy_name == "profit_scaling" {
                        if let Some(tier) = tier_for_fraction(fraction) {
                            self.tracked_exits.entry(ticket).or_default().scaled_tiers_hit.insert(tier);
                        }
                    }
                }
            }
        }
    }

    /// Drains every manual trade request queued since the last tick, taking
    /// the receiver out of `self` first so `process_manual_trade` can still
    /// borrow `self` mutably without a double-borrow on `manual_trade_rx`.
    async fn drain_manual_trades(&mut self, spec_lookup: &dyn SymbolSpecLookup) {
        let Some(mut rx) = self.manual_trade_rx.take() else { return };
        while let Ok((request, reply)) = rx.try_recv() {
            let outcome = self.process_manual_trade(request, spec_lookup).await;
            let _ = reply.send(outcome);
        }
        self.manual_trade_rx = Some(rx);
    }

    async fn process_manual_trade(
        &mut self,
        request: ManualTradeRequest,
        spec_lookup: &dyn SymbolSpecLookup,
    ) -> ManualTradeOutcome {
        if !self.rate_limiter.try_acquire("http.trade") {
            return ManualTradeOutcome::RateLimited;
        }

        let price = request.price.or_else(|| {
            self.pipeline.window(&request.symbol, Timeframe::M15).last().map(|bar| bar.close)
        });
        let Some(entry_price) = price else {
            return ManualTradeOutcome::Failed(format!("no known price for {}", request.symbol));
        };
        let stop_loss = request.stop_loss.unwrap_or(entry_price);
        let take_profit = request.take_profit.unwrap_or(entry_price);

        let signal = Signal::new(
            request.symbol.clone(),
            Timeframe::M15,
            request.side,
            entry_price,
            stop_loss,
            take_profit,
            1.0,
            "manual",
            "operator-submitted via POST /trade",
        );

        let spec = spec_lookup.lookup(&request.symbol);
        if !spec.tradable {
            return ManualTradeOutcome::RiskRejected(RiskRejection::SymbolNotTradable.reason().to_string());
        }
        let leverage = self.config.risk.leverage.max(1.0);
        let used_margin: f64 =
            self.positions.all().map(|p| p.volume * p.entry_price / leverage).sum();
        let ctx = RiskContext {
            risk_state: &self.risk_state,
            open_position_count: self.positions.len() as u32,
            max_positions: self.config.risk.max_open_positions,
            margin_available: self.risk_state.equity - used_margin,
            margin_required: request.volume * entry_price / leverage,
            daily_realized_loss: self.risk_state.daily_loss_fraction(),
        };

        if let Err(rejection) = self.risk.check_manual_order(&signal, &ctx) {
            return ManualTradeOutcome::RiskRejected(rejection.reason().to_string());
        }

        let client_tag = OrderRequest::client_tag_for(&signal, self.config.execution.magic_number);
        let order_request = OrderRequest {
            client_tag: client_tag.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            volume: request.volume,
            order_type: crate::domain::OrderType::Market,
            price: Some(entry_price),
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            deviation_ticks: 5,
            magic_number: self.config.execution.magic_number,
            source_signal_id: Some(signal.signal_id),
        };

        match self.execution.place(self.broker.as_ref(), order_request.clone()).await {
            Ok(result) => {
                self.persistence.record_order(&order_request, &result).await.ok();
                if matches!(result.status, OrderStatus::Filled | OrderStatus::Partial) {
                    if let Some(ticket) = result.ticket {
                        let position = crate::domain::Position {
                            ticket,
                            symbol: request.symbol.clone(),
                            side: request.side,
                            volume: result.filled_volume,
                            entry_price: result.fill_price,
                            entry_time: Utc::now(),
                            current_price: result.fill_price,
                            unrealized_pnl: 0.0,
                            stop_loss: request.stop_loss,
                            take_profit: request.take_profit,
                            max_favorable: 0.0,
                            max_adverse: 0.0,
                            holding_bars: 0,
                            origin: crate::domain::PositionOrigin::Manual,
                            strategy_name: Some("manual".to_string()),
                        };
                        let _ = self.positions.register_new(position);
                    }
                }
                ManualTradeOutcome::Placed(result)
            }
            Err(err) => ManualTradeOutcome::Failed(err.to_string()),
        }
    }

    pub fn risk_state(&self) -> &RiskState {
        &self.risk_state
    }

    pub fn drawdown_state(&self) -> DrawdownState {
        self.risk_state.drawdown_state
    }
}

fn tier_for_fraction(fraction: f64) -> Option<u8> {
    if (fraction - 0.33).abs() < 1e-6 {
        Some(1)
    } else if (fraction - 0.34).abs() < 1e-6 {
        Some(3)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::fake::FakeBrokerAdapter;
    use crate::config::{
        AdoptionConfig, CircuitConfig, ExecutionConfig, ExitsConfig, HttpConfig, PersistenceConfig,
        RiskConfig, SelectorConfig, SupervisionConfig,
    };

    struct FlatSpecLookup;
    impl SymbolSpecLookup for FlatSpecLookup {
        fn lookup(&self, _symbol: &str) -> SymbolSpec {
            SymbolSpec { pip_value_per_lot: 10.0, lot_step: 0.01, lot_min: 0.01, min_tick: 0.00001, tradable: true }
        }
    }

    fn test_config() -> Config {
        Config {
            risk: RiskConfig {
                fractional_risk: 0.02,
                max_position_size: 1.0,
                max_daily_loss: 0.06,
                drawdown_halt_percent: 0.60,
                sl_balance_thresholds: (0.10, 0.03, 0.02, 0.015),
                sl_balance_breakpoints: vec![5.0, 100.0, 1000.0, 5000.0],
                emergency_stop_loss_pct: 0.05,
                min_risk_reward_ratio: 1.5,
                performance_based_sizing: true,
                use_stabilized: true,
                max_open_positions: 10,
                leverage: 30.0,
            },
            selector: SelectorConfig {
                regime_check_interval_s: 180,
                min_strategy_signals: 20,
                performance_weight: 0.5,
                regime_weight: 0.3,
                confidence_weight: 0.2,
                fallback_depth: 3,
            },
            execution: ExecutionConfig {
                submission_timeout_ms: 5000,
                sl_tp_retries: 3,
                sl_tp_backoff_ms_cap: 50,
                order_dedup_ttl_s: 3600,
                magic_number: 778001,
                sl_tp_max_background_retries: 5,
                sl_tp_unverified_timeout_s: 120,
                t_sl_seconds: 3,
            },
            exits: ExitsConfig {
                adverse_movement_pct: 0.01,
                adverse_movement_window_s: 60,
                max_hold_hours: 24,
                friday_cutoff_hour_utc: 21,
                crypto_prefixes: vec![],
                trailing_activation_atr: 1.0,
                trailing_alpha: 0.5,
                confluence_emergency: 0.9,
                confluence_close_now: 0.75,
                confluence_scale_out: 0.55,
            },
            adoption: AdoptionConfig {
                enabled: true,
                adopt_symbols: vec![],
                ignore_symbols: vec![],
                max_age_hours: 72,
                log_only: true,
                adopt_interval_ticks: 20,
            },
            supervision: SupervisionConfig {
                poll_interval_s: 5,
                singleton_lock_path: "/tmp/test.lock".to_string(),
                shutdown_deadline_s: 30,
                leave_positions_on_shutdown: true,
                circuit: CircuitConfig { failure_threshold: 5, half_open_probes: 1, open_timeout_s: 30 },
            },
            persistence: PersistenceConfig { path: ":memory:".to_string(), wal_enabled: false, writer_queue_cap: 1024 },
            http: HttpConfig { enabled: false, bind_addr: "127.0.0.1:8088".to_string() },
            symbols: vec!["EURUSD".to_string()],
        }
    }

    #[tokio::test]
    async fn tick_with_no_bars_does_not_error() {
        let broker = Arc::new(FakeBrokerAdapter::new());
        broker.connect().await.unwrap();
        let persistence = PersistenceStore::open_in_memory().unwrap();
        let mut orchestrator = Orchestrator::new(test_config(), broker, persistence, 10_000.0);
        orchestrator.tick(&FlatSpecLookup).await.unwrap();
    }

    #[tokio::test]
    async fn manual_trade_queued_before_tick_is_placed_and_registered() {
        let broker = Arc::new(FakeBrokerAdapter::new());
        broker.connect().await.unwrap();
        let persistence = PersistenceStore::open_in_memory().unwrap();
        let mut orchestrator = Orchestrator::new(test_config(), broker, persistence, 10_000.0);

        let (tx, rx) = mpsc::channel(8);
        orchestrator.attach_manual_trade_inbox(rx);

        let request = ManualTradeRequest {
            symbol: "EURUSD".to_string(),
            side: Side::Long,
            volume: 0.01,
            price: Some(1.1000),
            stop_loss: Some(1.0950),
            take_profit: Some(1.1300),
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send((request, reply_tx)).await.unwrap();

        orchestrator.tick(&FlatSpecLookup).await.unwrap();

        match reply_rx.await.unwrap() {
            ManualTradeOutcome::Placed(result) => {
                assert_eq!(result.status, OrderStatus::Filled);
            }
            other => panic!("expected Placed, got {other:?}"),
        }
        assert_eq!(orchestrator.positions.len(), 1);
    }

    #[tokio::test]
    async fn manual_trade_rejected_when_position_cap_reached() {
        let broker = Arc::new(FakeBrokerAdapter::new());
        broker.connect().await.unwrap();
        let persistence = PersistenceStore::open_in_memory().unwrap();
        let mut config = test_config();
        config.risk.max_open_positions = 0;
        let mut orchestrator = Orchestrator::new(config, broker, persistence, 10_000.0);

        let (tx, rx) = mpsc::channel(8);
        orchestrator.attach_manual_trade_inbox(rx);

        let request = ManualTradeRequest {
            symbol: "EURUSD".to_string(),
            side: Side::Long,
            volume: 0.01,
            price: Some(1.1000),
            stop_loss: Some(1.0950),
            take_profit: Some(1.1300),
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send((request, reply_tx)).await.unwrap();

        orchestrator.tick(&FlatSpecLookup).await.unwrap();

        match reply_rx.await.unwrap() {
            ManualTradeOutcome::RiskRejected(_) => {}
            other => panic!("expected RiskRejected, got {other:?}"),
        }
        assert_eq!(orchestrator.positions.len(), 0);
    }
}
