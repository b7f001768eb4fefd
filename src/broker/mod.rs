//! The broker boundary (§4.1). `BrokerAdapter` is the one trait every other
//! subsystem talks to; the terminal itself is an opaque external collaborator,
//! so the only adapter the core ships is the deterministic in-memory fake used
//! to drive the end-to-end scenarios (S1-S6).

pub mod fake;

use async_trait::async_trait;

use crate::domain::{OrderRequest, OrderResult, Position};
use crate::error::{ConnectionError, FetchError, ModifyError, OrderError, SymbolNotFound};

#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    async fn connect(&self) -> Result<(), ConnectionError>;

    async fn is_connected(&self) -> bool;

    /// Exact case-insensitive match on alphanumerics; no heuristic variant
    /// substitution. Logs the candidate list on failure.
    async fn resolve_symbol(&self, name: &str) -> Result<String, SymbolNotFound>;

    /// Up to `n` most recent *closed* bars, monotonically increasing. An
    /// in-progress bar must never be returned.
    async fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        n: usize,
    ) -> Result<Vec<crate::domain::Bar>, FetchError>;

    /// Must be serialised per symbol by the caller to avoid broker race
    /// conditions; this trait itself makes no ordering guarantee.
    async fn send_order(&self, request: OrderRequest) -> Result<OrderResult, OrderError>;

    /// Succeeds only once the broker has acknowledged AND a readback shows the
    /// applied values within `max(point, 1e-5)` tolerance.
    async fn modify_position(
        &self,
        ticket: u64,
        sl: Option<f64>,
        tp: Option<f64>,
    ) -> Result<(), ModifyError>;

    async fn close_position(&self, ticket: u64, volume: Option<f64>) -> Result<OrderResult, OrderError>;

    async fn list_positions(&self) -> Result<Vec<Position>, FetchError>;
}

fn normalize(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| c.is_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

pub(crate) fn resolve_against(name: &str, known: &[String]) -> Result<String, SymbolNotFound> {
    let target = normalize(name);
    known
        .iter()
        .find(|s| normalize(s) == target)
        .cloned()
        .ok_or_else(|| SymbolNotFound {
            requested: name.to_string(),
            candidates: known.to_vec(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_exact_case_insensitive_alphanumeric() {
        let known = vec!["EURUSD".to_string(), "BTCUSD".to_string()];
        assert_eq!(resolve_against("eurusd", &known).unwrap(), "EURUSD");
        assert_eq!(resolve_against("EUR-USD", &known).unwrap(), "EURUSD");
        assert!(resolve_against("GBPUSD", &known).is_err());
    }
}
