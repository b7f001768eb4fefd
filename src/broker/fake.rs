//! Deterministic in-memory broker used to drive the S1-S6 scenarios and the
//! property tests in §8. Modelled on the teacher's `PaperExecutionAdapter`:
//! same dedup-by-client-tag idempotency contract, same shape of simulated
//! fill/slippage behaviour, but synchronous and seed-driven rather than
//! randomised, so tests are reproducible.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{Bar, OrderRequest, OrderResult, OrderStatus, OrderType, Position, Side};
use crate::error::{ConnectionError, FetchError, ModifyError, OrderError, SymbolNotFound};

use super::BrokerAdapter;

#[derive(Debug, Clone)]
struct FakeBrokerState {
    connected: bool,
    next_ticket: u64,
    positions: HashMap<u64, Position>,
    /// client_tag -> (ticket, OrderResult) for idempotent resend.
    orders_by_tag: HashMap<String, (Option<u64>, OrderResult)>,
    /// Every call, in order, for assertion in property tests (P2).
    call_log: Vec<String>,
    bars: HashMap<(String, String), Vec<Bar>>,
    known_symbols: Vec<String>,
    reject_next_modify: bool,
    force_unverified_modifies: u32,
}

impl Default for FakeBrokerState {
    fn default() -> Self {
        Self {
            connected: false,
            next_ticket: 1000,
            positions: HashMap::new(),
            orders_by_tag: HashMap::new(),
            call_log: Vec::new(),
            bars: HashMap::new(),
            known_symbols: vec!["EURUSD".to_string(), "GBPUSD".to_string(), "BTCUSD".to_string()],
            reject_next_modify: false,
            force_unverified_modifies: 0,
        }
    }
}

/// A memory-resident broker with fully deterministic fills (no randomness):
/// market orders always fill completely at the requested price.
pub struct FakeBrokerAdapter {
    state: Mutex<FakeBrokerState>,
}

impl Default for FakeBrokerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBrokerAdapter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeBrokerState::default()),
        }
    }

    pub fn seed_bars(&self, symbol: &str, timeframe: &str, bars: Vec<Bar>) {
        let mut state = self.state.lock().unwrap();
        state.bars.insert((symbol.to_string(), timeframe.to_string()), bars);
    }

    pub fn seed_position(&self, position: Position) {
        let mut state = self.state.lock().unwrap();
        state.next_ticket = state.next_ticket.max(position.ticket + 1);
        state.positions.insert(position.ticket, position);
    }

    /// Next `modify_position` call will be acknowledged but the readback will
    /// not reflect the change, simulating S2's first unverified attempt.
    pub fn force_next_modify_unverified(&self) {
        let mut state = self.state.lock().unwrap();
        state.force_unverified_modifies = 1;
    }

    pub fn call_log(&self) -> Vec<String> {
        self.state.lock().unwrap().call_log.clone()
    }

    pub fn fills_for_tag(&self, client_tag: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .call_log
            .iter()
            .filter(|c| c.starts_with(&format!("send_order:{client_tag}:fill")))
            .count()
    }
}

#[async_trait]
impl BrokerAdapter for FakeBrokerAdapter {
    async fn connect(&self) -> Result<(), ConnectionError> {
        self.state.lock().unwrap().connected = true;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    async fn resolve_symbol(&self, name: &str) -> Result<String, SymbolNotFound> {
        let state = self.state.lock().unwrap();
        super::resolve_against(name, &state.known_symbols)
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        n: usize,
    ) -> Result<Vec<Bar>, FetchError> {
        let state = self.state.lock().unwrap();
        let bars = state
            .bars
            .get(&(symbol.to_string(), timeframe.to_string()))
            .cloned()
            .unwrap_or_default();
        let len = bars.len();
        let start = len.saturating_sub(n);
        Ok(bars[start..].to_vec())
    }

    async fn send_order(&self, request: OrderRequest) -> Result<OrderResult, OrderError> {
        let mut state = self.state.lock().unwrap();
        state.call_log.push(format!("send_order:{}:request", request.client_tag));

        // Idempotency contract (P2): the same client_tag never opens a second
        // position at the broker.
        if let Some((_, prior)) = state.orders_by_tag.get(&request.client_tag) {
            state
                .call_log
                .push(format!("send_order:{}:dedup", request.client_tag));
            return Ok(prior.clone());
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;

        let result = OrderResult {
            status: OrderStatus::Filled,
            ticket: Some(ticket),
            filled_volume: request.volume,
            fill_price: request.price.unwrap_or(0.0),
            commission: 0.0,
            swap: 0.0,
            broker_message: None,
        };

        let position = Position {
            ticket,
            symbol: request.symbol.clone(),
            side: request.side,
            volume: request.volume,
            entry_price: result.fill_price,
            entry_time: Utc::now(),
            current_price: result.fill_price,
            unrealized_pnl: 0.0,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            max_favorable: 0.0,
            max_adverse: 0.0,
            holding_bars: 0,
            origin: crate::domain::PositionOrigin::Engine,
            strategy_name: None,
        };
        state.positions.insert(ticket, position);
        state
            .orders_by_tag
            .insert(request.client_tag.clone(), (Some(ticket), result.clone()));
        state
            .call_log
            .push(format!("send_order:{}:fill:{}", request.client_tag, ticket));

        Ok(result)
    }

    async fn modify_position(
        &self,
        ticket: u64,
        sl: Option<f64>,
        tp: Option<f64>,
    ) -> Result<(), ModifyError> {
        let mut state = self.state.lock().unwrap();
        state.call_log.push(format!("modify_position:{ticket}"));

        if state.reject_next_modify {
            state.reject_next_modify = false;
            return Err(ModifyError::Rejected("price out of range".to_string()));
        }

        let unverified = state.force_unverified_modifies > 0;
        if unverified {
            state.force_unverified_modifies -= 1;
        }

        let position = state
            .positions
            .get_mut(&ticket)
            .ok_or_else(|| ModifyError::Rejected("unknown ticket".to_string()))?;

        if !unverified {
            if let Some(sl) = sl {
                position.stop_loss = Some(sl);
            }
            if let Some(tp) = tp {
                position.take_profit = Some(tp);
            }
            Ok(())
        } else {
            Err(ModifyError::Unverified)
        }
    }

    async fn close_position(&self, ticket: u64, volume: Option<f64>) -> Result<OrderResult, OrderError> {
        let mut state = self.state.lock().unwrap();
        state.call_log.push(format!("close_position:{ticket}"));
        let position = state
            .positions
            .get(&ticket)
            .cloned()
            .ok_or_else(|| OrderError::Rejected("unknown ticket".to_string()))?;
        let closed_volume = volume.unwrap_or(position.volume);

        if closed_volume >= position.volume {
            state.positions.remove(&ticket);
        } else if let Some(p) = state.positions.get_mut(&ticket) {
            p.volume -= closed_volume;
        }

        Ok(OrderResult {
            status: OrderStatus::Filled,
            ticket: Some(ticket),
            filled_volume: closed_volume,
            fill_price: position.current_price,
            commission: 0.0,
            swap: 0.0,
            broker_message: None,
        })
    }

    async fn list_positions(&self) -> Result<Vec<Position>, FetchError> {
        let state = self.state.lock().unwrap();
        Ok(state.positions.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderType, Side};

    fn sample_request(tag: &str) -> OrderRequest {
        OrderRequest {
            client_tag: tag.to_string(),
            symbol: "EURUSD".to_string(),
            side: Side::Long,
            volume: 0.85,
            order_type: OrderType::Market,
            price: Some(1.1000),
            stop_loss: Some(1.0984),
            take_profit: Some(1.1032),
            deviation_ticks: 5,
            magic_number: 778001,
            source_signal_id: None,
        }
    }

    #[tokio::test]
    async fn duplicate_client_tag_yields_one_fill() {
        let broker = FakeBrokerAdapter::new();
        broker.connect().await.unwrap();
        let first = broker.send_order(sample_request("tag-1")).await.unwrap();
        let second = broker.send_order(sample_request("tag-1")).await.unwrap();
        assert_eq!(first.ticket, second.ticket);
        assert_eq!(broker.fills_for_tag("tag-1"), 1);
        assert_eq!(broker.list_positions().await.unwrap().len(), 1);
    }
}
