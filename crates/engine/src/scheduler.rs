use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use common::{BrokerClient, Position, User, UserDirectory, WatchlistOverrides};

use crate::clock::MarketClock;
use crate::registry::EngineRegistry;
use crate::trading::TickInput;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval_min: u32,
    /// Hard ceiling on one user's tick; must stay below the tick period.
    pub tick_deadline: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_interval_min: 5, tick_deadline: Duration::from_secs(240) }
    }
}

/// Fires the trading loop at absolute minute boundaries during market
/// hours, one user at a time, skipping fires that would overlap a tick
/// still in flight.
pub struct TradingScheduler {
    clock: MarketClock,
    users: Arc<dyn UserDirectory>,
    broker: Arc<dyn BrokerClient>,
    registry: Arc<EngineRegistry>,
    config: SchedulerConfig,
    /// Job-level mutex: at most one outstanding trading job.
    tick_gate: Mutex<()>,
}

impl TradingScheduler {
    pub fn new(
        clock: MarketClock,
        users: Arc<dyn UserDirectory>,
        broker: Arc<dyn BrokerClient>,
        registry: Arc<EngineRegistry>,
        config: SchedulerConfig,
    ) -> Self {
        Self { clock, users, broker, registry, config, tick_gate: Mutex::new(()) }
    }

    /// Run until `shutdown` flips to true. A tick in progress when the
    /// signal arrives is drained before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_min = self.config.tick_interval_min,
            tz = %self.clock.timezone(),
            "trading scheduler started"
        );

        loop {
            let wait = self.clock.until_next_boundary(self.config.tick_interval_min);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if !self.clock.is_open_now() {
                debug!("outside market hours, skipping trading loop");
                continue;
            }

            // Overlapping fires are skipped, never queued.
            match self.tick_gate.try_lock() {
                Ok(_guard) => self.run_trading_job().await,
                Err(_) => warn!("previous trading job still running; skipping this fire"),
            }
        }

        // Drain: wait for any in-flight job before reporting shutdown.
        let _drain = self.tick_gate.lock().await;
        info!("trading scheduler stopped");
    }

    /// One full pass over all active users.
    pub async fn run_trading_job(&self) {
        let users = match self.users.list_active_users().await {
            Ok(users) => users,
            Err(e) => {
                error!(error = %e, "failed to load active users");
                return;
            }
        };

        info!(users = users.len(), "starting trading loop execution");

        for user in users {
            let deadline = self.config.tick_deadline;
            match timeout(deadline, self.process_user(&user)).await {
                Ok(()) => {}
                Err(_) => warn!(
                    user_id = %user.id,
                    deadline_secs = deadline.as_secs(),
                    "user tick hit its deadline; partial results dropped"
                ),
            }
        }

        info!("trading loop execution completed");
    }

    async fn process_user(&self, user: &User) {
        let watchlist = match self.users.watchlist(&user.id).await {
            Ok(list) => list,
            Err(e) => {
                error!(user_id = %user.id, error = %e, "failed to load watchlist");
                return;
            }
        };

        let positions = match self.broker.get_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                error!(user_id = %user.id, error = %e, "failed to load positions");
                return;
            }
        };

        if watchlist.is_empty() && positions.is_empty() {
            debug!(user_id = %user.id, "nothing to process");
            return;
        }

        let mut stock_names: HashMap<String, String> = watchlist
            .iter()
            .map(|w| (w.stock_code.clone(), w.stock_name.clone()))
            .collect();
        for position in &positions {
            stock_names
                .entry(position.stock_code.clone())
                .or_insert_with(|| position.stock_name.clone());
        }

        let mut overrides: HashMap<String, WatchlistOverrides> = HashMap::new();
        for code in stock_names.keys() {
            match self.users.overrides(&user.id, code).await {
                Ok(Some(o)) => {
                    overrides.insert(code.clone(), o);
                }
                Ok(None) => {}
                Err(e) => warn!(user_id = %user.id, code, error = %e, "override lookup failed"),
            }
        }

        let engine = self.registry.engine_for(&user.id).await;
        engine.set_daily_pnl(daily_pnl_pct(&positions)).await;

        let input = TickInput {
            watchlist: watchlist.into_iter().map(|w| w.stock_code).collect(),
            positions,
            user_id: user.id.clone(),
            notify_channel: user.telegram_chat_id.clone(),
            stock_names,
            overrides,
        };

        let result = engine.run_trading_loop(&input).await;

        info!(
            user_id = %user.id,
            processed = result.processed_stocks,
            signals = result.signals_generated,
            orders = result.orders_executed,
            alerts = result.alerts_sent,
            "user trading loop finished"
        );
        for error in &result.errors {
            warn!(user_id = %user.id, "trading error: {error}");
        }
    }
}

/// Aggregate unrealized P&L of the open positions, in percent of cost.
/// Stands in for realized daily P&L until fills are tracked intraday.
fn daily_pnl_pct(positions: &[Position]) -> f64 {
    let cost: f64 = positions.iter().map(|p| p.avg_price * p.quantity as f64).sum();
    if cost <= 0.0 {
        return 0.0;
    }
    let pnl: f64 = positions.iter().map(|p| p.profit_loss).sum();
    pnl / cost * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(code: &str, qty: u32, avg: f64, pnl: f64) -> Position {
        Position {
            stock_code: code.to_string(),
            stock_name: code.to_string(),
            quantity: qty,
            avg_price: avg,
            current_price: avg,
            profit_loss: pnl,
            profit_loss_rate: 0.0,
        }
    }

    #[test]
    fn daily_pnl_is_zero_without_positions() {
        assert_eq!(daily_pnl_pct(&[]), 0.0);
    }

    #[test]
    fn daily_pnl_weights_by_cost() {
        // 1,000,000 cost, -50,000 loss → -5%
        let positions =
            [position("A", 10, 50_000.0, -30_000.0), position("B", 10, 50_000.0, -20_000.0)];
        let pnl = daily_pnl_pct(&positions);
        assert!((pnl + 5.0).abs() < 1e-9, "got {pnl}");
    }
}
