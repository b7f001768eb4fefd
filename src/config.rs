//! Central configuration, loaded from the environment the way every
//! `*Config::from_env()` in the original backend does: `env::var(KEY).ok()`,
//! parse, filter out nonsensical values, fall back to a documented default.
//! Invalid configuration fails fast at startup (§7).

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_filtered<T: std::str::FromStr + PartialOrd>(key: &str, default: T, min: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .filter(|v| *v >= min)
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    env::var(key)
        .ok()
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_else(|| default.iter().map(|s| s.to_string()).collect())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub fractional_risk: f64,
    pub max_position_size: f64,
    pub max_daily_loss: f64,
    pub drawdown_halt_percent: f64,
    pub sl_balance_thresholds: (f64, f64, f64, f64),
    pub sl_balance_breakpoints: Vec<f64>,
    pub emergency_stop_loss_pct: f64,
    pub min_risk_reward_ratio: f64,
    pub performance_based_sizing: bool,
    pub use_stabilized: bool,
    pub max_open_positions: u32,
    pub leverage: f64,
}

impl RiskConfig {
    fn from_env() -> Self {
        Self {
            fractional_risk: env_filtered("RISK_FRACTIONAL_RISK", 0.02, 0.0001),
            max_position_size: env_filtered("RISK_MAX_POSITION_SIZE", 1.0, 0.0),
            max_daily_loss: env_filtered("RISK_MAX_DAILY_LOSS", 0.06, 0.0),
            drawdown_halt_percent: env_filtered("RISK_DRAWDOWN_HALT_PERCENT", 0.50, 0.0),
            // anchored at $5 -> 10%, $100 -> 3%, $1000 -> 2%, $5000 -> 1.5%
            sl_balance_thresholds: (0.10, 0.03, 0.02, 0.015),
            sl_balance_breakpoints: vec![5.0, 100.0, 1000.0, 5000.0],
            emergency_stop_loss_pct: env_filtered("RISK_EMERGENCY_SL_PCT", 0.05, 0.0),
            min_risk_reward_ratio: env_filtered("RISK_MIN_RR", 1.5, 0.0),
            performance_based_sizing: env_bool("RISK_PERFORMANCE_BASED_SIZING", true),
            use_stabilized: env_bool("RISK_USE_STABILIZED", true),
            max_open_positions: env_filtered("RISK_MAX_OPEN_POSITIONS", 10, 1),
            leverage: env_filtered("RISK_LEVERAGE", 30.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub regime_check_interval_s: u64,
    pub min_strategy_signals: u64,
    pub performance_weight: f64,
    pub regime_weight: f64,
    pub confidence_weight: f64,
    pub fallback_depth: usize,
}

impl SelectorConfig {
    fn from_env() -> Self {
        Self {
            regime_check_interval_s: env_parsed("SELECTOR_REGIME_CHECK_INTERVAL_S", 180),
            min_strategy_signals: env_parsed("SELECTOR_MIN_STRATEGY_SIGNALS", 20),
            performance_weight: env_parsed("SELECTOR_PERFORMANCE_WEIGHT", 0.5),
            regime_weight: env_parsed("SELECTOR_REGIME_WEIGHT", 0.3),
            confidence_weight: env_parsed("SELECTOR_CONFIDENCE_WEIGHT", 0.2),
            fallback_depth: env_parsed("SELECTOR_FALLBACK_DEPTH", 3),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub submission_timeout_ms: u64,
    pub sl_tp_retries: u32,
    pub sl_tp_backoff_ms_cap: u64,
    pub order_dedup_ttl_s: u64,
    pub magic_number: u64,
    pub sl_tp_max_background_retries: u32,
    pub sl_tp_unverified_timeout_s: u64,
    pub t_sl_seconds: u64,
}

impl ExecutionConfig {
    fn from_env() -> Self {
        Self {
            submission_timeout_ms: env_parsed("EXEC_SUBMISSION_TIMEOUT_MS", 10_000),
            sl_tp_retries: env_parsed("EXEC_SL_TP_RETRIES", 3),
            sl_tp_backoff_ms_cap: env_parsed("EXEC_SL_TP_BACKOFF_MS_CAP", 5_000),
            order_dedup_ttl_s: env_parsed("EXEC_ORDER_DEDUP_TTL_S", 3600),
            magic_number: env_parsed("EXEC_MAGIC_NUMBER", 778_001),
            // Open Question #1 (§9): the source is inconsistent about the cap on
            // background SL/TP retries before a defensive force-close; we make it
            // an explicit, documented config value.
            sl_tp_max_background_retries: env_parsed("EXEC_SL_TP_MAX_BACKGROUND_RETRIES", 10),
            sl_tp_unverified_timeout_s: env_parsed("EXEC_SL_TP_UNVERIFIED_TIMEOUT_S", 120),
            t_sl_seconds: env_parsed("EXEC_T_SL_SECONDS", 3),
        }
    }

    pub fn submission_timeout(&self) -> Duration {
        Duration::from_millis(self.submission_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitsConfig {
    pub adverse_movement_pct: f64,
    pub adverse_movement_window_s: u64,
    pub max_hold_hours: u64,
    pub friday_cutoff_hour_utc: u32,
    pub crypto_prefixes: Vec<String>,
    pub trailing_activation_atr: f64,
    pub trailing_alpha: f64,
    pub confluence_emergency: f64,
    pub confluence_close_now: f64,
    pub confluence_scale_out: f64,
}

impl ExitsConfig {
    fn from_env() -> Self {
        Self {
            adverse_movement_pct: env_parsed("EXITS_ADVERSE_MOVEMENT_PCT", 0.01),
            adverse_movement_window_s: env_parsed("EXITS_ADVERSE_MOVEMENT_WINDOW_S", 60),
            max_hold_hours: env_parsed("EXITS_MAX_HOLD_HOURS", 24),
            friday_cutoff_hour_utc: env_parsed("EXITS_FRIDAY_CUTOFF_HOUR_UTC", 21),
            crypto_prefixes: env_list(
                "EXITS_CRYPTO_PREFIXES",
                &["BTC", "ETH", "XRP", "LTC", "SOL", "DOGE", "BNB"],
            ),
            trailing_activation_atr: env_parsed("EXITS_TRAILING_ACTIVATION_ATR", 1.0),
            trailing_alpha: env_parsed("EXITS_TRAILING_ALPHA", 0.5),
            confluence_emergency: env_parsed("EXITS_CONFLUENCE_EMERGENCY", 0.90),
            confluence_close_now: env_parsed("EXITS_CONFLUENCE_CLOSE_NOW", 0.75),
            confluence_scale_out: env_parsed("EXITS_CONFLUENCE_SCALE_OUT", 0.55),
        }
    }

    pub fn is_crypto(&self, symbol: &str) -> bool {
        self.crypto_prefixes.iter().any(|p| symbol.starts_with(p.as_str()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdoptionConfig {
    pub enabled: bool,
    pub adopt_symbols: Vec<String>,
    pub ignore_symbols: Vec<String>,
    pub max_age_hours: u64,
    pub log_only: bool,
    pub adopt_interval_ticks: u64,
}

impl AdoptionConfig {
    fn from_env() -> Self {
        Self {
            enabled: env_bool("ADOPTION_ENABLED", true),
            adopt_symbols: env_list("ADOPTION_ADOPT_SYMBOLS", &[]),
            ignore_symbols: env_list("ADOPTION_IGNORE_SYMBOLS", &[]),
            max_age_hours: env_parsed("ADOPTION_MAX_AGE_HOURS", 72),
            log_only: env_bool("ADOPTION_LOG_ONLY", false),
            adopt_interval_ticks: env_parsed("ADOPTION_INTERVAL_TICKS", 20),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    pub failure_threshold: u32,
    pub half_open_probes: u32,
    pub open_timeout_s: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisionConfig {
    pub poll_interval_s: u64,
    pub singleton_lock_path: String,
    pub shutdown_deadline_s: u64,
    pub leave_positions_on_shutdown: bool,
    pub circuit: CircuitConfig,
}

impl SupervisionConfig {
    fn from_env() -> Self {
        Self {
            poll_interval_s: env_parsed("SUPERVISION_POLL_INTERVAL_S", 5),
            singleton_lock_path: env::var("SUPERVISION_SINGLETON_LOCK_PATH")
                .unwrap_or_else(|_| "/tmp/trading-core.lock".to_string()),
            shutdown_deadline_s: env_parsed("SUPERVISION_SHUTDOWN_DEADLINE_S", 30),
            leave_positions_on_shutdown: env_bool("SUPERVISION_LEAVE_POSITIONS_ON_SHUTDOWN", true),
            circuit: CircuitConfig {
                failure_threshold: env_parsed("SUPERVISION_CIRCUIT_FAILURE_THRESHOLD", 5),
                half_open_probes: env_parsed("SUPERVISION_CIRCUIT_HALF_OPEN_PROBES", 1),
                open_timeout_s: env_parsed("SUPERVISION_CIRCUIT_OPEN_TIMEOUT_S", 30),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub path: String,
    pub wal_enabled: bool,
    pub writer_queue_cap: usize,
}

impl PersistenceConfig {
    fn from_env() -> Self {
        Self {
            path: env::var("PERSISTENCE_PATH").unwrap_or_else(|_| "./trading-core.db".to_string()),
            wal_enabled: env_bool("PERSISTENCE_WAL_ENABLED", true),
            writer_queue_cap: env_parsed("PERSISTENCE_WRITER_QUEUE_CAP", 1024),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub enabled: bool,
    pub bind_addr: String,
}

impl HttpConfig {
    fn from_env() -> Self {
        Self {
            enabled: env_bool("HTTP_ENABLED", false),
            bind_addr: env::var("HTTP_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8088".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub risk: RiskConfig,
    pub selector: SelectorConfig,
    pub execution: ExecutionConfig,
    pub exits: ExitsConfig,
    pub adoption: AdoptionConfig,
    pub supervision: SupervisionConfig,
    pub persistence: PersistenceConfig,
    pub http: HttpConfig,
    pub symbols: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            risk: RiskConfig::from_env(),
            selector: SelectorConfig::from_env(),
            execution: ExecutionConfig::from_env(),
            exits: ExitsConfig::from_env(),
            adoption: AdoptionConfig::from_env(),
            supervision: SupervisionConfig::from_env(),
            persistence: PersistenceConfig::from_env(),
            http: HttpConfig::from_env(),
            symbols: env_list("TRADING_SYMBOLS", &["EURUSD"]),
        };

        config.validate()?;
        Ok(config)
    }

    /// Config invalid at load is a fail-fast startup error (§7).
    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.risk.fractional_risk > 0.0, "risk.fractional_risk must be positive");
        anyhow::ensure!(self.risk.max_position_size > 0.0, "risk.max_position_size must be positive");
        anyhow::ensure!(!self.symbols.is_empty(), "at least one trading symbol must be configured");
        anyhow::ensure!(
            self.selector.performance_weight + self.selector.regime_weight + self.selector.confidence_weight > 0.0,
            "selector weights must not all be zero"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = Config {
            risk: RiskConfig::from_env(),
            selector: SelectorConfig::from_env(),
            execution: ExecutionConfig::from_env(),
            exits: ExitsConfig::from_env(),
            adoption: AdoptionConfig::from_env(),
            supervision: SupervisionConfig::from_env(),
            persistence: PersistenceConfig::from_env(),
            http: HttpConfig::from_env(),
            symbols: vec!["EURUSD".to_string()],
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn crypto_prefix_detection() {
        let exits = ExitsConfig::from_env();
        assert!(exits.is_crypto("BTCUSD"));
        assert!(!exits.is_crypto("EURUSD"));
    }
}
