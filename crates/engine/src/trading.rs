use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use alerts::AlertStore;
use common::{
    AlertData, ApprovalOutcome, BrokerClient, Notifier, OrderSide, Position, Result, SignalKind,
    StockPrice, TradingMode, WatchlistOverrides,
};
use risk::{RiskAction, RiskCheckResult, RiskManager, TrailingStop, DEFAULT_RISK_PER_TRADE_PCT};
use strategy::SignalGenerator;

/// Statistics from one trading-loop tick.
#[derive(Debug, Default, Clone)]
pub struct TradingLoopResult {
    pub processed_stocks: usize,
    pub signals_generated: usize,
    pub orders_executed: usize,
    pub alerts_sent: usize,
    pub errors: Vec<String>,
}

/// Per-tick input assembled by the scheduler.
#[derive(Debug, Default, Clone)]
pub struct TickInput {
    pub watchlist: Vec<String>,
    pub positions: Vec<Position>,
    pub user_id: String,
    /// Notification channel (e.g. a Telegram chat id), when the user has one.
    pub notify_channel: Option<String>,
    pub stock_names: HashMap<String, String>,
    /// Per-stock risk overrides from the watchlist.
    pub overrides: HashMap<String, WatchlistOverrides>,
}

impl TickInput {
    fn stock_name(&self, code: &str) -> String {
        self.stock_names.get(code).cloned().unwrap_or_else(|| code.to_string())
    }
}

/// Daily-price history cap requested from the broker.
const DAILY_PRICE_COUNT: usize = 100;

/// The per-user trading orchestrator.
///
/// One tick: fetch a consistent price snapshot, run risk checks over open
/// positions, scan the watchlist for entries, and resolve every outcome
/// into either a broker order (AUTO) or a stored alert (ALERT). Ticks for
/// one user never overlap, so the interior state is single-writer.
pub struct TradingEngine {
    mode: TradingMode,
    broker: Arc<dyn BrokerClient>,
    signals: SignalGenerator,
    risk: RiskManager,
    alerts: AlertStore,
    notifier: Option<Arc<dyn Notifier>>,
    max_concurrent_fetches: usize,
    trailing_stops: Mutex<HashMap<String, TrailingStop>>,
    /// Mirror of the alert store for this user's alerts; lets expiry stay
    /// distinguishable from never-existed after the store TTL reaps a key.
    pending: Mutex<HashMap<String, AlertData>>,
    daily_pnl_pct: Mutex<f64>,
}

impl TradingEngine {
    pub fn new(
        mode: TradingMode,
        broker: Arc<dyn BrokerClient>,
        risk: RiskManager,
        alerts: AlertStore,
        notifier: Option<Arc<dyn Notifier>>,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            mode,
            broker,
            signals: SignalGenerator::new(),
            risk,
            alerts,
            notifier,
            max_concurrent_fetches: max_concurrent_fetches.max(1),
            trailing_stops: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            daily_pnl_pct: Mutex::new(0.0),
        }
    }

    pub fn mode(&self) -> TradingMode {
        self.mode
    }

    /// Set by the caller at the start of each tick.
    pub async fn set_daily_pnl(&self, pnl_pct: f64) {
        *self.daily_pnl_pct.lock().await = pnl_pct;
    }

    /// Stock codes with an active trailing stop.
    pub async fn trailing_stop_codes(&self) -> Vec<String> {
        self.trailing_stops.lock().await.keys().cloned().collect()
    }

    /// Pending alerts for this user, from the shared store.
    pub async fn pending_alerts(&self) -> Result<Vec<AlertData>> {
        self.alerts.get_all().await
    }

    pub async fn has_pending(&self, alert_id: &str) -> bool {
        self.pending.lock().await.contains_key(alert_id)
    }

    /// Run one trading-loop tick.
    pub async fn run_trading_loop(&self, input: &TickInput) -> TradingLoopResult {
        let mut result = TradingLoopResult::default();

        if input.watchlist.is_empty() && input.positions.is_empty() {
            return result;
        }

        // One batch quote call per tick: all later price comparisons share
        // a consistent snapshot.
        let mut all_codes: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for code in input.positions.iter().map(|p| &p.stock_code).chain(input.watchlist.iter()) {
            if seen.insert(code.clone()) {
                all_codes.push(code.clone());
            }
        }

        let price_map: HashMap<String, StockPrice> =
            match self.broker.get_stock_prices(&all_codes).await {
                Ok(prices) => prices.into_iter().map(|p| (p.code.clone(), p)).collect(),
                Err(e) => {
                    let msg = format!("failed to fetch stock prices: {e}");
                    error!("{msg}");
                    result.errors.push(msg);
                    return result;
                }
            };
        result.processed_stocks = price_map.len();

        let position_codes: HashSet<&str> =
            input.positions.iter().map(|p| p.stock_code.as_str()).collect();

        // Positions first: risk exits must never wait on watchlist work.
        for position in &input.positions {
            if let Err(e) = self.process_position(position, &price_map, input, &mut result).await {
                let msg = format!("error processing position {}: {e}", position.stock_code);
                warn!("{msg}");
                result.errors.push(msg);
            }
        }

        // Watchlist scan. Histories are prefetched with bounded concurrency;
        // the signals themselves are processed strictly in order.
        let scan_codes: Vec<&String> =
            input.watchlist.iter().filter(|c| !position_codes.contains(c.as_str())).collect();
        let histories: Vec<_> = stream::iter(scan_codes.iter().map(|code| {
            let code = code.as_str();
            async move { self.broker.get_daily_prices(code, DAILY_PRICE_COUNT).await }
        }))
        .buffered(self.max_concurrent_fetches)
        .collect()
        .await;

        for (code, history) in scan_codes.into_iter().zip(histories) {
            let outcome = match history {
                Ok(bars) => {
                    self.process_watchlist_stock(code, bars, &price_map, input, &mut result).await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                let msg = format!("error processing watchlist {code}: {e}");
                warn!("{msg}");
                result.errors.push(msg);
            }
        }

        result
    }

    async fn process_position(
        &self,
        position: &Position,
        price_map: &HashMap<String, StockPrice>,
        input: &TickInput,
        result: &mut TradingLoopResult,
    ) -> Result<()> {
        let code = position.stock_code.as_str();

        let risk_result = {
            let mut stops = self.trailing_stops.lock().await;
            // A trailing stop exists from the first observation of a position,
            // whether or not this tick's snapshot carries a quote for it.
            let trailing = stops.entry(code.to_string()).or_insert_with(|| {
                TrailingStop::new(position.avg_price, self.risk.config().trailing_stop_pct)
            });

            let Some(quote) = price_map.get(code) else {
                debug!(code, "no quote in this tick's snapshot; skipping position");
                return Ok(());
            };
            let current_price = quote.current_price;

            trailing.update_price(current_price);
            self.evaluate_exit_rules(position, current_price, input.overrides.get(code), trailing)
        };

        if risk_result.action.is_exit() {
            info!(
                code,
                action = ?risk_result.action,
                profit_pct = risk_result.current_profit_pct,
                "risk exit triggered"
            );
            // Risk-triggered exits carry full confidence.
            let order = self
                .execute_sell(position, 1.0, &risk_result.reason, input, result)
                .await?;
            if order.map(|o| o.success).unwrap_or(false) {
                self.trailing_stops.lock().await.remove(code);
            }
            return Ok(());
        }

        // No forced exit: look for a strategy sell on the daily history.
        let bars = self.broker.get_daily_prices(code, DAILY_PRICE_COUNT).await?;
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();

        let signal = self.signals.generate(&closes, &volumes);
        result.signals_generated += 1;

        if signal.kind == SignalKind::Sell {
            let order =
                self.execute_sell(position, signal.confidence, &signal.reason, input, result).await?;
            if order.map(|o| o.success).unwrap_or(false) {
                self.trailing_stops.lock().await.remove(code);
            }
        }

        Ok(())
    }

    /// Absolute per-stock override lines take precedence over the
    /// percentage rules, stop before target.
    fn evaluate_exit_rules(
        &self,
        position: &Position,
        current_price: f64,
        overrides: Option<&WatchlistOverrides>,
        trailing: &TrailingStop,
    ) -> RiskCheckResult {
        if position.avg_price > 0.0 {
            let profit_pct = (current_price - position.avg_price) / position.avg_price * 100.0;
            if let Some(o) = overrides {
                if let Some(stop) = o.stop_loss_price {
                    if current_price <= stop {
                        return RiskCheckResult {
                            action: RiskAction::StopLoss,
                            reason: format!(
                                "stop loss triggered: price {current_price:.0} at or below the configured {stop:.0} line"
                            ),
                            current_profit_pct: profit_pct,
                            trigger_price: Some(stop),
                        };
                    }
                }
                if let Some(target) = o.target_price {
                    if current_price >= target {
                        return RiskCheckResult {
                            action: RiskAction::TakeProfit,
                            reason: format!(
                                "take profit triggered: price {current_price:.0} reached the configured {target:.0} target"
                            ),
                            current_profit_pct: profit_pct,
                            trigger_price: Some(target),
                        };
                    }
                }
            }
        }

        self.risk.check_position(position.avg_price, current_price, Some(trailing))
    }

    async fn process_watchlist_stock(
        &self,
        code: &str,
        bars: Vec<common::PriceBar>,
        price_map: &HashMap<String, StockPrice>,
        input: &TickInput,
        result: &mut TradingLoopResult,
    ) -> Result<()> {
        let Some(quote) = price_map.get(code) else {
            debug!(code, "no quote in this tick's snapshot; skipping watchlist stock");
            return Ok(());
        };

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();

        let signal = self.signals.generate(&closes, &volumes);
        result.signals_generated += 1;

        if signal.kind == SignalKind::Buy && signal.confidence >= 0.5 {
            self.execute_buy(
                code,
                quote.current_price,
                signal.confidence,
                &signal.reason,
                input,
                result,
            )
            .await?;
        }

        Ok(())
    }

    async fn execute_buy(
        &self,
        code: &str,
        current_price: f64,
        confidence: f64,
        reason: &str,
        input: &TickInput,
        result: &mut TradingLoopResult,
    ) -> Result<()> {
        // A balance failure sizes against zero capital, which buys nothing.
        let available = match self.broker.get_balance().await {
            Ok(balance) => balance.available_amount,
            Err(e) => {
                warn!(code, error = %e, "balance lookup failed; treating as zero");
                0.0
            }
        };

        let mut quantity =
            self.risk.calculate_position_size(available, current_price, DEFAULT_RISK_PER_TRADE_PCT);
        if let Some(cap) = input.overrides.get(code).and_then(|o| o.quantity) {
            quantity = quantity.min(cap);
        }
        if quantity == 0 {
            return Ok(());
        }

        let investment = current_price * quantity as f64;
        let daily_pnl = *self.daily_pnl_pct.lock().await;
        let (allowed, deny_reason) =
            self.risk.can_open_position(investment, input.positions.len(), daily_pnl);
        if !allowed {
            info!(code, "cannot open position: {deny_reason}");
            return Ok(());
        }

        match self.mode {
            TradingMode::Auto => {
                let order = self.broker.place_order(code, OrderSide::Buy, quantity, None).await?;
                if order.success {
                    result.orders_executed += 1;
                    info!(
                        code,
                        quantity,
                        order_id = order.order_id.as_deref().unwrap_or(""),
                        "buy order executed"
                    );
                } else {
                    warn!(code, "buy order failed: {}", order.message);
                }
            }
            TradingMode::Alert => {
                let alert = AlertData::new(
                    input.user_id.clone(),
                    code,
                    input.stock_name(code),
                    SignalKind::Buy,
                    confidence,
                    current_price,
                    quantity,
                    reason,
                );
                self.queue_alert(alert, input, result).await?;
            }
        }

        Ok(())
    }

    async fn execute_sell(
        &self,
        position: &Position,
        confidence: f64,
        reason: &str,
        input: &TickInput,
        result: &mut TradingLoopResult,
    ) -> Result<Option<common::OrderResult>> {
        let code = position.stock_code.as_str();

        match self.mode {
            TradingMode::Auto => {
                let order =
                    self.broker.place_order(code, OrderSide::Sell, position.quantity, None).await?;
                if order.success {
                    result.orders_executed += 1;
                    info!(
                        code,
                        quantity = position.quantity,
                        order_id = order.order_id.as_deref().unwrap_or(""),
                        reason,
                        "sell order executed"
                    );
                } else {
                    warn!(code, "sell order failed: {}", order.message);
                }
                Ok(Some(order))
            }
            TradingMode::Alert => {
                let alert = AlertData::new(
                    input.user_id.clone(),
                    code,
                    input.stock_name(code),
                    SignalKind::Sell,
                    confidence,
                    position.current_price,
                    position.quantity,
                    reason,
                );
                self.queue_alert(alert, input, result).await?;
                Ok(None)
            }
        }
    }

    /// Store the alert, mirror it in the pending map, then notify. A
    /// notifier failure must never lose the stored alert.
    async fn queue_alert(
        &self,
        alert: AlertData,
        input: &TickInput,
        result: &mut TradingLoopResult,
    ) -> Result<()> {
        self.alerts.save(&alert).await?;
        self.pending.lock().await.insert(alert.alert_id.clone(), alert.clone());
        result.alerts_sent += 1;
        info!(
            code = %alert.stock_code,
            signal = %alert.signal,
            alert_id = %alert.alert_id,
            "alert queued for approval"
        );

        if let (Some(notifier), Some(channel)) = (&self.notifier, &input.notify_channel) {
            if let Err(e) = notifier.send_alert(channel, &alert).await {
                error!(alert_id = %alert.alert_id, error = %e, "alert notification failed");
            }
        }

        Ok(())
    }

    /// Approve a pending alert: claim it atomically, verify it has not
    /// expired, and place the implied market order.
    pub async fn approve_alert(&self, alert_id: &str) -> Result<ApprovalOutcome> {
        let claimed = self.alerts.pop_atomic(alert_id).await?;

        let alert = match claimed {
            Some(alert) => {
                self.pending.lock().await.remove(alert_id);
                alert
            }
            None => {
                // The store no longer has it. If our mirror shows an expired
                // alert, report expiry; anything else is simply gone.
                let mirrored = self.pending.lock().await.remove(alert_id);
                return match mirrored {
                    Some(alert) if alert.is_expired_at(Utc::now()) => {
                        warn!(alert_id, "alert expired before approval");
                        Ok(ApprovalOutcome::Expired)
                    }
                    _ => Ok(ApprovalOutcome::NotFound),
                };
            }
        };

        if alert.is_expired_at(Utc::now()) {
            warn!(alert_id, created_at = %alert.created_at, "alert expired before approval");
            return Ok(ApprovalOutcome::Expired);
        }

        let side = match alert.signal {
            SignalKind::Buy => OrderSide::Buy,
            _ => OrderSide::Sell,
        };

        let order = self
            .broker
            .place_order(&alert.stock_code, side, alert.suggested_quantity, None)
            .await?;

        if order.success {
            info!(
                alert_id,
                code = %alert.stock_code,
                order_id = order.order_id.as_deref().unwrap_or(""),
                "alert approved and order placed"
            );
            Ok(ApprovalOutcome::Executed {
                order_id: order.order_id.unwrap_or_default(),
                stock_code: alert.stock_code,
                stock_name: alert.stock_name,
                side,
                quantity: alert.suggested_quantity,
                price: alert.current_price,
            })
        } else {
            warn!(alert_id, "alert approved but order failed: {}", order.message);
            Ok(ApprovalOutcome::OrderFailed(order.message))
        }
    }

    /// Reject a pending alert. Idempotent: rejecting a missing alert
    /// reports `NotFound` without error.
    pub async fn reject_alert(&self, alert_id: &str) -> Result<ApprovalOutcome> {
        self.alerts.delete(alert_id).await?;
        let mirrored = self.pending.lock().await.remove(alert_id);
        match mirrored {
            Some(alert) => {
                info!(alert_id, code = %alert.stock_code, "alert rejected");
                Ok(ApprovalOutcome::Rejected {
                    stock_code: alert.stock_code,
                    stock_name: alert.stock_name,
                    quantity: alert.suggested_quantity,
                })
            }
            None => Ok(ApprovalOutcome::NotFound),
        }
    }

    /// Drop everything past TTL from the mirror and the store. Idempotent;
    /// safe to call from a background task.
    pub async fn cleanup_expired_alerts(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = {
            let pending = self.pending.lock().await;
            pending
                .values()
                .filter(|a| a.is_expired_at(now))
                .map(|a| a.alert_id.clone())
                .collect()
        };

        for alert_id in &expired {
            if let Err(e) = self.alerts.delete(alert_id).await {
                warn!(alert_id, error = %e, "failed to delete expired alert from store");
            }
            self.pending.lock().await.remove(alert_id);
            info!(alert_id, "expired alert cleaned up");
        }

        expired.len()
    }
}
