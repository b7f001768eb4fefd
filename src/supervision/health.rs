//! Aggregated health state backing the `/health` HTTP endpoint: broker
//! connectivity, circuit states, SL/TP failure counters and current
//! drawdown tier, all readable without locking the hot trading path.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::domain::{CircuitState, DrawdownState};

#[derive(Clone)]
pub struct HealthRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    broker_connected: AtomicBool,
    sl_tp_failure_total: AtomicU64,
    drawdown_state: parking_lot::Mutex<DrawdownState>,
    circuit_state: parking_lot::Mutex<CircuitState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub broker_connected: bool,
    pub sl_tp_failure_total: u64,
    pub drawdown_state: String,
    pub circuit_state: String,
    pub healthy: bool,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                broker_connected: AtomicBool::new(false),
                sl_tp_failure_total: AtomicU64::new(0),
                drawdown_state: parking_lot::Mutex::new(DrawdownState::Normal),
                circuit_state: parking_lot::Mutex::new(CircuitState::Closed),
            }),
        }
    }
}

impl HealthRegistry {
    pub fn set_broker_connected(&self, connected: bool) {
        self.inner.broker_connected.store(connected, Ordering::Relaxed);
    }

    pub fn set_sl_tp_failure_total(&self, total: u64) {
        self.inner.sl_tp_failure_total.store(total, Ordering::Relaxed);
    }

    pub fn set_drawdown_state(&self, state: DrawdownState) {
        *self.inner.drawdown_state.lock() = state;
    }

    pub fn set_circuit_state(&self, state: CircuitState) {
        *self.inner.circuit_state.lock() = state;
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let broker_connected = self.inner.broker_connected.load(Ordering::Relaxed);
        let circuit_state = *self.inner.circuit_state.lock();
        let drawdown_state = *self.inner.drawdown_state.lock();
        let healthy = broker_connected && !matches!(circuit_state, CircuitState::Open);

        HealthSnapshot {
            broker_connected,
            sl_tp_failure_total: self.inner.sl_tp_failure_total.load(Ordering::Relaxed),
            drawdown_state: format!("{drawdown_state:?}"),
            circuit_state: format!("{circuit_state:?}"),
            healthy,
        }
    }
}
