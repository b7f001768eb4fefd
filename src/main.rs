//! Entry point: parses CLI flags, loads config, acquires the singleton lock,
//! then drives the orchestrator's tick loop on a fixed interval until
//! shutdown or a fatal invariant violation (§6/§7).

use std::sync::Arc;

use anyhow::Result;
use betterbot_backend::broker::fake::FakeBrokerAdapter;
use betterbot_backend::config::Config;
use betterbot_backend::orchestrator::{Orchestrator, SymbolSpecLookup};
use betterbot_backend::persistence::PersistenceStore;
use betterbot_backend::risk::SymbolSpec;
use betterbot_backend::supervision::SingletonLock;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "trading-core", about = "Autonomous multi-strategy trading core")]
struct Cli {
    /// Run a single tick and exit instead of looping forever.
    #[arg(long)]
    once: bool,

    /// Starting equity for a fresh run (ignored once the ledger has history).
    #[arg(long, default_value_t = 10_000.0)]
    initial_equity: f64,
}

/// Conservative default pip values, used until a real broker adapter can
/// supply per-symbol specs. Forex majors default to $10/lot, crypto symbols
/// to a coarser tick.
struct DefaultSpecLookup;

impl SymbolSpecLookup for DefaultSpecLookup {
    fn lookup(&self, symbol: &str) -> SymbolSpec {
        if symbol.starts_with("BTC") || symbol.starts_with("ETH") {
            SymbolSpec { pip_value_per_lot: 1.0, lot_step: 0.001, lot_min: 0.001, min_tick: 0.01, tradable: true }
        } else {
            SymbolSpec { pip_value_per_lot: 10.0, lot_step: 0.01, lot_min: 0.01, min_tick: 0.00001, tradable: true }
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "betterbot_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "configuration invalid");
            std::process::exit(1);
        }
    };

    let _lock = match SingletonLock::acquire(config.supervision.singleton_lock_path.clone()) {
        Ok(lock) => lock,
        Err(err) => {
            error!(error = %err, "another instance already holds the singleton lock");
            std::process::exit(3);
        }
    };

    if let Err(err) = run(cli, config).await {
        error!(error = %err, "fatal error, exiting");
        std::process::exit(4);
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let persistence = PersistenceStore::open(&config.persistence)?;

    let broker = Arc::new(FakeBrokerAdapter::new());
    if broker.connect().await.is_err() {
        error!("broker unreachable at startup");
        std::process::exit(2);
    }

    let http_enabled = config.http.enabled;
    let http_bind_addr = config.http.bind_addr.clone();
    let poll_interval = std::time::Duration::from_secs(config.supervision.poll_interval_s);

    let mut orchestrator = Orchestrator::new(config, broker, persistence.clone(), cli.initial_equity);
    let spec_lookup = DefaultSpecLookup;
    let health = orchestrator.health();

    if http_enabled {
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        orchestrator.attach_manual_trade_inbox(rx);
        let state = betterbot_backend::http::HttpState { persistence, health: health.clone(), inbox: Arc::new(tx) };
        let router = betterbot_backend::http::router(state);
        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(&http_bind_addr).await {
                Ok(listener) => {
                    info!(addr = %http_bind_addr, "http control surface listening");
                    if let Err(err) = axum::serve(listener, router).await {
                        warn!(error = %err, "http server exited");
                    }
                }
                Err(err) => warn!(error = %err, addr = %http_bind_addr, "failed to bind http control surface"),
            }
        });
    }

    info!("trading core starting");

    if cli.once {
        orchestrator.tick(&spec_lookup).await?;
        return Ok(());
    }

    let mut interval = tokio::time::interval(poll_interval);
    loop {
        interval.tick().await;
        orchestrator.tick(&spec_lookup).await?;
    }
}
