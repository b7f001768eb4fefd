//! Error taxonomy for the trading core (§7). Transient I/O and rate-limit
//! conditions are distinguished from business rejections and from the one
//! fatal kind, `InvariantViolation`, which forces the orchestrator to exit 4.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("login failed: {0}")]
    LoginFailed(String),
    #[error("terminal initialisation failed: {0}")]
    InitFailed(String),
    #[error("timed out connecting to broker")]
    Timeout,
}

#[derive(Debug, Error)]
#[error("symbol not found: {requested} (candidates: {candidates:?})")]
pub struct SymbolNotFound {
    pub requested: String,
    pub candidates: Vec<String>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transient I/O error fetching bars: {0}")]
    Transient(String),
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("circuit open for {endpoint}")]
    CircuitOpen { endpoint: String },
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("transient I/O error sending order: {0}")]
    Transient(String),
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("rejected by broker: {0}")]
    Rejected(String),
    #[error("circuit open for {endpoint}")]
    CircuitOpen { endpoint: String },
}

#[derive(Debug, Error)]
pub enum ModifyError {
    #[error("transient I/O error modifying position: {0}")]
    Transient(String),
    #[error("rejected by broker: {0}")]
    Rejected(String),
    #[error("modify acknowledged but readback did not verify the applied values")]
    Unverified,
}

/// The only fatal error kind in the core. Carries enough context for the
/// safe-state flush the orchestrator attempts before exiting with code 4.
#[derive(Debug, Error)]
pub enum InvariantViolation {
    #[error("duplicate ticket held by PositionManager: {0}")]
    DuplicateTicket(u64),
    #[error("negative position size computed: {0}")]
    NegativeSize(f64),
    #[error("position references unknown symbol: {0}")]
    UnknownSymbol(String),
    #[error("two close signals emitted for the same ticket {0} in one tick")]
    DoubleClose(u64),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    SymbolNotFound(#[from] SymbolNotFound),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Modify(#[from] ModifyError),
    #[error("fatal invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
    #[error("configuration invalid: {0}")]
    ConfigInvalid(String),
    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),
}
