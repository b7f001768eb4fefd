//! Three-state circuit breaker (CLOSED/OPEN/HALF_OPEN), generalised from the
//! teacher's `DataSourceKillSwitch` in `main.rs`: that type only ever latched
//! into a permanent `kill_triggered` state. This version adds the HALF_OPEN
//! probe so a broker connection can recover automatically once its outage
//! window has elapsed, instead of requiring a restart.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::CircuitConfig;
use crate::domain::CircuitState;

pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitConfig,
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_successes: u32,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitConfig) -> Self {
        Self {
            name,
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            half_open_successes: 0,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Call before attempting an operation; returns false if the circuit is
    /// open and the cooldown hasn't elapsed (caller should skip the call).
    pub fn allow(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                if elapsed >= Duration::from_secs(self.config.open_timeout_s) {
                    info!(circuit = self.name, "open timeout elapsed, probing half-open");
                    self.state = CircuitState::HalfOpen;
                    self.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= self.config.half_open_probes {
                    info!(circuit = self.name, "half-open probes succeeded, closing circuit");
                    self.state = CircuitState::Closed;
                    self.consecutive_failures = 0;
                    self.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&mut self) {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.config.failure_threshold {
                    warn!(circuit = self.name, failures = self.consecutive_failures, "opening circuit");
                    self.state = CircuitState::Open;
                    self.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!(circuit = self.name, "half-open probe failed, re-opening circuit");
                self.state = CircuitState::Open;
                self.opened_at = Some(Instant::now());
            }
            CircuitState::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitConfig {
        CircuitConfig { failure_threshold: 3, half_open_probes: 1, open_timeout_s: 0 }
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let mut breaker = CircuitBreaker::new("broker", config());
        assert!(breaker.allow());
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_success_closes_circuit() {
        let mut breaker = CircuitBreaker::new("broker", config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.allow()); // open_timeout_s = 0, immediately probes
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
