use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use alerts::{AlertStore, MemoryKv};
use common::{
    AlertData, ApprovalOutcome, Notifier, OrderSide, Position, Result, SignalKind, TradingMode,
};
use engine::{TickInput, TradingEngine};
use paper::PaperBroker;
use risk::{RiskConfig, RiskManager};

fn alert_store() -> AlertStore {
    AlertStore::new(Arc::new(MemoryKv::new()))
}

fn engine_with(
    mode: TradingMode,
    broker: Arc<PaperBroker>,
    store: AlertStore,
    notifier: Option<Arc<dyn Notifier>>,
) -> TradingEngine {
    TradingEngine::new(
        mode,
        broker,
        RiskManager::new(RiskConfig::default()),
        store,
        notifier,
        5,
    )
}

fn tick(watchlist: &[&str], positions: Vec<Position>) -> TickInput {
    TickInput {
        watchlist: watchlist.iter().map(|s| s.to_string()).collect(),
        positions,
        user_id: "u1".to_string(),
        notify_channel: Some("chat-1".to_string()),
        stock_names: HashMap::new(),
        overrides: HashMap::new(),
    }
}

fn position(code: &str, quantity: u32, avg_price: f64, current_price: f64) -> Position {
    Position {
        stock_code: code.to_string(),
        stock_name: code.to_string(),
        quantity,
        avg_price,
        current_price,
        profit_loss: (current_price - avg_price) * quantity as f64,
        profit_loss_rate: (current_price - avg_price) / avg_price * 100.0,
    }
}

/// Oversold crash with a volume blowout buys exactly once in AUTO mode.
#[tokio::test]
async fn oversold_crash_buys_in_auto_mode() {
    let broker = Arc::new(PaperBroker::new(10_000_000.0));
    let closes: Vec<f64> = (0..50).map(|i| 100.0 - 2.0 * i as f64).collect();
    let mut volumes = vec![1_000_000u64; 49];
    volumes.push(3_000_000);
    broker.seed_history("X", &closes, &volumes).await;
    broker.set_quote("X", "Stock X", *closes.last().unwrap()).await;

    let engine = engine_with(TradingMode::Auto, broker.clone(), alert_store(), None);
    let result = engine.run_trading_loop(&tick(&["X"], vec![])).await;

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.orders_executed, 1);
    assert_eq!(result.alerts_sent, 0);

    let orders = broker.executed_orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].side, OrderSide::Buy);
    assert_eq!(orders[0].code, "X");
    assert!(orders[0].quantity > 0);
}

/// Overbought position in ALERT mode queues a sell alert, places nothing.
#[tokio::test]
async fn overbought_position_alerts_in_alert_mode() {
    let broker = Arc::new(PaperBroker::new(10_000_000.0));
    let closes: Vec<f64> = (0..50).map(|i| 50.0 + 2.0 * i as f64).collect();
    let volumes = vec![1_000_000u64; 50];
    broker.seed_history("X", &closes, &volumes).await;
    broker.set_quote("X", "Stock X", 148.0).await;

    let store = alert_store();
    let engine = engine_with(TradingMode::Alert, broker.clone(), store.clone(), None);
    let result = engine.run_trading_loop(&tick(&[], vec![position("X", 10, 60.0, 148.0)])).await;

    assert_eq!(result.alerts_sent, 1);
    assert_eq!(result.orders_executed, 0);
    assert!(broker.executed_orders().await.is_empty());

    let pending = store.get_all().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].signal, SignalKind::Sell);
    assert_eq!(pending[0].suggested_quantity, 10);
}

/// A stop-loss breach sells immediately; no signal is ever computed.
#[tokio::test]
async fn stop_loss_preempts_signal_generation() {
    let broker = Arc::new(PaperBroker::new(10_000_000.0));
    // No daily history seeded: any history fetch would yield a HOLD, and
    // the counters below prove none was even attempted.
    broker.set_quote("X", "Stock X", 90.0).await;

    let engine = engine_with(TradingMode::Auto, broker.clone(), alert_store(), None);
    let result = engine.run_trading_loop(&tick(&[], vec![position("X", 7, 100.0, 90.0)])).await;

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.signals_generated, 0, "risk exit must preempt the signal");
    assert_eq!(result.orders_executed, 1);

    let orders = broker.executed_orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].side, OrderSide::Sell);
    assert_eq!(orders[0].quantity, 7);

    // The closed position's trailing stop is gone.
    assert!(engine.trailing_stop_codes().await.is_empty());
}

/// Flat markets produce a HOLD: no order, no alert.
#[tokio::test]
async fn flat_market_holds() {
    let broker = Arc::new(PaperBroker::new(10_000_000.0));
    broker.seed_history("X", &[100.0; 60], &[1_000_000; 60]).await;
    broker.set_quote("X", "Stock X", 100.0).await;

    let engine = engine_with(TradingMode::Auto, broker.clone(), alert_store(), None);
    let result = engine.run_trading_loop(&tick(&["X"], vec![])).await;

    assert_eq!(result.signals_generated, 1);
    assert_eq!(result.orders_executed, 0);
    assert_eq!(result.alerts_sent, 0);
    assert!(broker.executed_orders().await.is_empty());
}

/// Losing the quote batch aborts the whole tick with an error.
#[tokio::test]
async fn quote_batch_failure_aborts_tick() {
    let broker = Arc::new(PaperBroker::new(10_000_000.0));
    broker.set_offline(true);

    let engine = engine_with(TradingMode::Auto, broker.clone(), alert_store(), None);
    let result = engine.run_trading_loop(&tick(&["X"], vec![position("Y", 1, 100.0, 100.0)])).await;

    assert_eq!(result.processed_stocks, 0);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("failed to fetch stock prices"));
}

/// Positions missing from the quote snapshot are skipped, not errors.
#[tokio::test]
async fn position_without_quote_is_skipped() {
    let broker = Arc::new(PaperBroker::new(10_000_000.0));
    broker.set_quote("X", "Stock X", 100.0).await;
    broker.seed_history("X", &[100.0; 60], &[1_000_000; 60]).await;

    let engine = engine_with(TradingMode::Auto, broker.clone(), alert_store(), None);
    let input = tick(&["X"], vec![position("UNQUOTED", 3, 50.0, 50.0)]);
    let result = engine.run_trading_loop(&input).await;

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert!(broker.executed_orders().await.iter().all(|o| o.code != "UNQUOTED"));
}

/// An expired alert reports `Expired` and never reaches the broker.
#[tokio::test]
async fn expired_alert_is_not_executed() {
    let broker = Arc::new(PaperBroker::new(10_000_000.0));
    let store = alert_store();
    let engine = engine_with(TradingMode::Alert, broker.clone(), store.clone(), None);

    let mut alert =
        AlertData::new("u1", "X", "Stock X", SignalKind::Buy, 0.8, 100.0, 5, "oversold");
    alert.created_at = chrono::Utc::now() - chrono::Duration::seconds(301);
    store.save(&alert).await.unwrap();

    let outcome = engine.approve_alert(&alert.alert_id).await.unwrap();
    assert!(matches!(outcome, ApprovalOutcome::Expired));
    assert!(broker.executed_orders().await.is_empty());
}

/// Approving twice executes once; the second attempt sees nothing.
#[tokio::test]
async fn approve_is_at_most_once() {
    let broker = Arc::new(PaperBroker::new(10_000_000.0));
    let closes: Vec<f64> = (0..50).map(|i| 100.0 - 2.0 * i as f64).collect();
    let mut volumes = vec![1_000_000u64; 49];
    volumes.push(3_000_000);
    broker.seed_history("X", &closes, &volumes).await;
    broker.set_quote("X", "Stock X", *closes.last().unwrap()).await;

    let store = alert_store();
    let engine = engine_with(TradingMode::Alert, broker.clone(), store.clone(), None);
    let result = engine.run_trading_loop(&tick(&["X"], vec![])).await;
    assert_eq!(result.alerts_sent, 1);

    let alert_id = store.get_all().await.unwrap()[0].alert_id.clone();

    let first = engine.approve_alert(&alert_id).await.unwrap();
    assert!(first.is_executed(), "{first:?}");
    assert_eq!(broker.executed_orders().await.len(), 1);

    let second = engine.approve_alert(&alert_id).await.unwrap();
    assert!(matches!(second, ApprovalOutcome::NotFound));
    assert_eq!(broker.executed_orders().await.len(), 1);
}

/// Rejecting a missing alert is a quiet no-op.
#[tokio::test]
async fn reject_missing_alert_reports_not_found() {
    let broker = Arc::new(PaperBroker::new(0.0));
    let engine = engine_with(TradingMode::Alert, broker, alert_store(), None);
    let outcome = engine.reject_alert("no-such-alert").await.unwrap();
    assert!(matches!(outcome, ApprovalOutcome::NotFound));
}

/// Rejected alerts are consumed and cannot be approved afterwards.
#[tokio::test]
async fn reject_then_approve_finds_nothing() {
    let broker = Arc::new(PaperBroker::new(10_000_000.0));
    let store = alert_store();
    let engine = engine_with(TradingMode::Alert, broker.clone(), store.clone(), None);

    broker.set_quote("X", "Stock X", 148.0).await;
    let closes: Vec<f64> = (0..50).map(|i| 50.0 + 2.0 * i as f64).collect();
    broker.seed_history("X", &closes, &vec![1_000_000; 50]).await;

    engine.run_trading_loop(&tick(&[], vec![position("X", 10, 60.0, 148.0)])).await;
    let alert_id = store.get_all().await.unwrap()[0].alert_id.clone();

    let rejected = engine.reject_alert(&alert_id).await.unwrap();
    assert!(matches!(rejected, ApprovalOutcome::Rejected { quantity: 10, .. }));

    let approve = engine.approve_alert(&alert_id).await.unwrap();
    assert!(matches!(approve, ApprovalOutcome::NotFound));
    assert!(broker.executed_orders().await.is_empty());
}

/// Notifier failures are contained: the alert stays stored and counted.
#[tokio::test]
async fn notifier_failure_keeps_alert_stored() {
    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send_alert(&self, _channel: &str, _alert: &AlertData) -> Result<()> {
            Err(common::Error::Notify("simulated outage".to_string()))
        }
    }

    let broker = Arc::new(PaperBroker::new(10_000_000.0));
    broker.set_quote("X", "Stock X", 148.0).await;
    let closes: Vec<f64> = (0..50).map(|i| 50.0 + 2.0 * i as f64).collect();
    broker.seed_history("X", &closes, &vec![1_000_000; 50]).await;

    let store = alert_store();
    let engine = engine_with(
        TradingMode::Alert,
        broker,
        store.clone(),
        Some(Arc::new(FailingNotifier)),
    );
    let result = engine.run_trading_loop(&tick(&[], vec![position("X", 10, 60.0, 148.0)])).await;

    assert_eq!(result.alerts_sent, 1);
    assert_eq!(store.get_all().await.unwrap().len(), 1);
}

/// Per-stock quantity overrides cap the sized order.
#[tokio::test]
async fn override_quantity_caps_buy_size() {
    let broker = Arc::new(PaperBroker::new(10_000_000.0));
    let closes: Vec<f64> = (0..50).map(|i| 100.0 - 2.0 * i as f64).collect();
    let mut volumes = vec![1_000_000u64; 49];
    volumes.push(3_000_000);
    broker.seed_history("X", &closes, &volumes).await;
    broker.set_quote("X", "Stock X", *closes.last().unwrap()).await;

    let engine = engine_with(TradingMode::Auto, broker.clone(), alert_store(), None);
    let mut input = tick(&["X"], vec![]);
    input.overrides.insert(
        "X".to_string(),
        common::WatchlistOverrides { quantity: Some(2), ..Default::default() },
    );

    let result = engine.run_trading_loop(&input).await;
    assert_eq!(result.orders_executed, 1);
    assert_eq!(broker.executed_orders().await[0].quantity, 2);
}

/// Expired alerts are swept by the cleanup pass; live ones survive.
#[tokio::test]
async fn cleanup_removes_only_expired_alerts() {
    let broker = Arc::new(PaperBroker::new(10_000_000.0));
    broker.set_quote("X", "Stock X", 148.0).await;
    let closes: Vec<f64> = (0..50).map(|i| 50.0 + 2.0 * i as f64).collect();
    broker.seed_history("X", &closes, &vec![1_000_000; 50]).await;

    let store = alert_store();
    let engine = engine_with(TradingMode::Alert, broker, store.clone(), None);
    engine.run_trading_loop(&tick(&[], vec![position("X", 10, 60.0, 148.0)])).await;

    // Nothing is expired yet.
    assert_eq!(engine.cleanup_expired_alerts().await, 0);
    assert_eq!(store.get_all().await.unwrap().len(), 1);
}
