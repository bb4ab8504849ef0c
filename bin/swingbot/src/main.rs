use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use alerts::{AlertStore, MemoryKv};
use common::{BrokerClient, Config, Execution, Notifier, UserDirectory};
use engine::{
    EngineRegistry, KisBroker, KisConfig, MarketClock, SchedulerConfig, TokenCache,
    TradingScheduler,
};
use paper::PaperBroker;
use risk::RiskConfig;
use store::SqliteStore;
use telegram_alert::{run_approval_bot, ApprovalDeps, TelegramNotifier};

/// How often expired pending alerts are swept in the background.
const ALERT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Paper-mode starting cash, KRW.
const PAPER_INITIAL_CASH: f64 = 10_000_000.0;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    info!(mode = %cfg.trading_mode, tz = %cfg.market_tz, "SwingBot starting");

    // ── User / watchlist store ────────────────────────────────────────────────
    let user_store = SqliteStore::connect(&cfg.database_url)
        .await
        .unwrap_or_else(|e| panic!("Failed to open database: {e}"));
    let users: Arc<dyn UserDirectory> = Arc::new(user_store);
    info!("Database ready");

    // ── Broker (injected per EXECUTION) ───────────────────────────────────────
    let broker: Arc<dyn BrokerClient> = match cfg.execution {
        Execution::Live => {
            info!(mock = cfg.kis_is_mock, "Live execution — using KisBroker");
            let tokens = Arc::new(TokenCache::new());
            Arc::new(KisBroker::new(
                KisConfig {
                    app_key: cfg.kis_app_key.clone(),
                    app_secret: cfg.kis_app_secret.clone(),
                    account_no: cfg.kis_account_no.clone(),
                    is_mock: cfg.kis_is_mock,
                    max_concurrent_calls: cfg.max_concurrent_broker_calls,
                },
                tokens,
            ))
        }
        Execution::Paper => {
            info!("Paper execution — using PaperBroker");
            Arc::new(PaperBroker::new(PAPER_INITIAL_CASH))
        }
    };

    // ── Risk configuration ────────────────────────────────────────────────────
    let risk_config = match &cfg.risk_config_path {
        Some(path) => {
            info!(path, "loading risk config");
            RiskConfig::load(path)
        }
        None => RiskConfig::default(),
    };

    // ── Alert store ───────────────────────────────────────────────────────────
    let alert_store = AlertStore::new(Arc::new(MemoryKv::new()));

    // ── Notifier (optional) ───────────────────────────────────────────────────
    let telegram = cfg
        .telegram_token
        .as_ref()
        .map(|token| Arc::new(TelegramNotifier::new(teloxide::Bot::new(token.clone()))));
    let notifier: Option<Arc<dyn Notifier>> =
        telegram.as_ref().map(|t| t.clone() as Arc<dyn Notifier>);
    if notifier.is_none() {
        warn!("TELEGRAM_TOKEN not set; alerts will be stored but not delivered");
    }

    // ── Engine registry ───────────────────────────────────────────────────────
    let registry = Arc::new(EngineRegistry::new(
        cfg.trading_mode,
        broker.clone(),
        risk_config,
        alert_store.clone(),
        notifier,
        cfg.max_concurrent_broker_calls,
    ));

    // ── Scheduler ─────────────────────────────────────────────────────────────
    let clock = MarketClock::new(&cfg.market_tz)
        .unwrap_or_else(|e| panic!("Invalid MARKET_TZ: {e}"));
    let scheduler = Arc::new(TradingScheduler::new(
        clock,
        users,
        broker,
        registry.clone(),
        SchedulerConfig {
            tick_interval_min: cfg.tick_interval_min,
            tick_deadline: Duration::from_secs(cfg.tick_deadline_secs),
        },
    ));

    // ── Shutdown signal plumbing ──────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_termination().await;
        info!("Shutdown signal received; draining current tick");
        let _ = shutdown_tx.send(true);
    });

    // ── Background tasks ──────────────────────────────────────────────────────
    if let Some(telegram) = telegram {
        let deps = ApprovalDeps { decisions: registry.clone() };
        tokio::spawn(run_approval_bot(telegram.bot(), deps));
    }

    {
        let registry = registry.clone();
        tokio::spawn(async move {
            let mut sweep = tokio::time::interval(ALERT_CLEANUP_INTERVAL);
            loop {
                sweep.tick().await;
                let removed = registry.cleanup_expired_alerts().await;
                if removed > 0 {
                    info!(removed, "expired alerts cleaned up");
                }
            }
        });
    }

    // ── Run until shutdown ────────────────────────────────────────────────────
    info!("All subsystems started");
    scheduler.run(shutdown_rx).await;
    info!("Shutdown complete");
    Ok(())
}

async fn wait_for_termination() {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
