//! §4.9 PositionManager: the single writer of `Position` state, reconciling
//! the locally-held set against the broker's authoritative list every tick.
//! Mirrors the teacher's merge-then-reconcile pattern (`PositionManager`
//! step in `main()` / `VaultEngine` loops: pull broker truth, update local
//! records, finalise anything that vanished).

use std::collections::HashMap;

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::Position;
use crate::error::InvariantViolation;

#[derive(Debug, Clone)]
pub struct ReconciliationEvent {
    pub ticket: u64,
    pub field: &'static str,
    pub local_value: f64,
    pub broker_value: f64,
}

#[derive(Debug, Clone)]
pub struct FinalizedTrade {
    pub ticket: u64,
    pub position: Position,
    pub closed_at: chrono::DateTime<Utc>,
}

#[derive(Default)]
pub struct PositionManager {
    positions: HashMap<u64, Position>,
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ticket: u64) -> Option<&Position> {
        self.positions.get(&ticket)
    }

    pub fn all(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// P5: at no point does the engine hold two Position records with the
    /// same ticket -- enforced structurally by keying a `HashMap` on ticket,
    /// but insertion of an already-present *different* record is still a
    /// fatal invariant violation worth surfacing rather than silently
    /// overwriting.
    pub fn register_new(&mut self, position: Position) -> Result<(), InvariantViolation> {
        if self.positions.contains_key(&position.ticket) {
            return Err(InvariantViolation::DuplicateTicket(position.ticket));
        }
        self.positions.insert(position.ticket, position);
        Ok(())
    }

    /// Merge broker truth into local state: update known positions, add
    /// unknown ones, finalise anything the broker no longer reports, and
    /// reconcile any divergence (logging a reconciliation event rather than
    /// silently trusting local state).
    pub fn reconcile(
        &mut self,
        broker_positions: Vec<Position>,
        pip_value_lookup: impl Fn(&str) -> f64,
    ) -> (Vec<ReconciliationEvent>, Vec<FinalizedTrade>) {
        let mut events = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for broker_position in broker_positions {
            seen.insert(broker_position.ticket);
            let pip_value = pip_value_lookup(&broker_position.symbol);

            match self.positions.get_mut(&broker_position.ticket) {
                Some(local) => {
                    if (local.volume - broker_position.volume).abs() > 1e-9 {
                        events.push(ReconciliationEvent {
                            ticket: local.ticket,
                            field: "volume",
                            local_value: local.volume,
                            broker_value: broker_position.volume,
                        });
                        local.volume = broker_position.volume;
                    }
                    local.update_price(broker_position.current_price, pip_value);
                    local.holding_bars += 1;
                    local.stop_loss = broker_position.stop_loss.or(local.stop_loss);
                    local.take_profit = broker_position.take_profit.or(local.take_profit);
                }
                None => {
                    info!(ticket = broker_position.ticket, "adding broker position unknown locally");
                    self.positions.insert(broker_position.ticket, broker_position);
                }
            }
        }

        let closed_tickets: Vec<u64> = self
            .positions
            .keys()
            .copied()
            .filter(|t| !seen.contains(t))
            .collect();

        let mut finalized = Vec::new();
        for ticket in closed_tickets {
            if let Some(position) = self.positions.remove(&ticket) {
                warn!(ticket, "position closed at broker, finalising trade record");
                finalized.push(FinalizedTrade { ticket, position, closed_at: Utc::now() });
            }
        }

        (events, finalized)
    }

    pub fn remove(&mut self, ticket: u64) -> Option<Position> {
        self.positions.remove(&ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PositionOrigin, Side};

    fn sample(ticket: u64, volume: f64) -> Position {
        Position {
            ticket,
            symbol: "EURUSD".to_string(),
            side: Side::Long,
            volume,
            entry_price: 1.1,
            entry_time: Utc::now(),
            current_price: 1.1,
            unrealized_pnl: 0.0,
            stop_loss: Some(1.09),
            take_profit: Some(1.12),
            max_favorable: 0.0,
            max_adverse: 0.0,
            holding_bars: 0,
            origin: PositionOrigin::Engine,
            strategy_name: Some("sma_crossover".to_string()),
        }
    }

    #[test]
    fn p5_duplicate_ticket_registration_is_rejected() {
        let mut manager = PositionManager::new();
        manager.register_new(sample(1, 1.0)).unwrap();
        let err = manager.register_new(sample(1, 1.0)).unwrap_err();
        assert!(matches!(err, InvariantViolation::DuplicateTicket(1)));
    }

    #[test]
    fn reconcile_detects_volume_divergence_and_finalizes_closed_positions() {
        let mut manager = PositionManager::new();
        manager.register_new(sample(1, 1.0)).unwrap();
        manager.register_new(sample(2, 0.5)).unwrap();

        let mut broker_view = sample(1, 0.8);
        broker_view.current_price = 1.105;
        let (events, finalized) = manager.reconcile(vec![broker_view], |_| 10.0);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].field, "volume");
        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[0].ticket, 2);
        assert_eq!(manager.len(), 1);
    }
}
