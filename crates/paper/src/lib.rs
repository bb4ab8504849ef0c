//! Simulated broker for paper trading and engine tests.
//!
//! Quotes, daily histories, and the cash balance are seeded by the caller;
//! orders fill instantly at the seeded quote and mutate an in-memory
//! positions ledger. No network calls are ever made.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    Balance, BrokerClient, Error, OrderResult, OrderSide, OrderStatus, Position, PriceBar, Result,
    StockPrice,
};

/// One executed simulated order, for test assertions.
#[derive(Debug, Clone)]
pub struct ExecutedOrder {
    pub code: String,
    pub side: OrderSide,
    pub quantity: u32,
    pub price: Option<f64>,
}

pub struct PaperBroker {
    balance: RwLock<Balance>,
    positions: RwLock<Vec<Position>>,
    quotes: RwLock<HashMap<String, StockPrice>>,
    daily: RwLock<HashMap<String, Vec<PriceBar>>>,
    orders: RwLock<Vec<ExecutedOrder>>,
    /// When set, quote and history calls fail with a transport error.
    offline: AtomicBool,
}

impl PaperBroker {
    pub fn new(initial_cash: f64) -> Self {
        info!(initial_cash, "PaperBroker initialized");
        Self {
            balance: RwLock::new(Balance {
                deposit: initial_cash,
                available_amount: initial_cash,
                total_evaluation: initial_cash,
                net_worth: initial_cash,
                ..Default::default()
            }),
            positions: RwLock::new(Vec::new()),
            quotes: RwLock::new(HashMap::new()),
            daily: RwLock::new(HashMap::new()),
            orders: RwLock::new(Vec::new()),
            offline: AtomicBool::new(false),
        }
    }

    /// Seed (or refresh) the current quote for a code.
    pub async fn set_quote(&self, code: &str, name: &str, price: f64) {
        self.quotes.write().await.insert(
            code.to_string(),
            StockPrice {
                code: code.to_string(),
                name: name.to_string(),
                current_price: price,
                open: price,
                high: price,
                low: price,
                change_rate: 0.0,
                volume: 0,
            },
        );
    }

    /// Seed a daily close/volume history; bars are dated consecutively.
    pub async fn seed_history(&self, code: &str, closes: &[f64], volumes: &[u64]) {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PriceBar {
                date: start.checked_add_days(Days::new(i as u64)).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: volumes.get(i).copied().unwrap_or(0),
            })
            .collect();
        self.daily.write().await.insert(code.to_string(), bars);
    }

    /// Insert an already-open position into the ledger.
    pub async fn seed_position(&self, position: Position) {
        self.positions.write().await.push(position);
    }

    pub async fn set_available(&self, amount: f64) {
        self.balance.write().await.available_amount = amount;
    }

    /// Simulate a broker outage: quote and history calls fail.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Orders executed so far, oldest first.
    pub async fn executed_orders(&self) -> Vec<ExecutedOrder> {
        self.orders.read().await.clone()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(Error::Transport("paper broker is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrokerClient for PaperBroker {
    async fn authenticate(&self) -> Result<()> {
        Ok(())
    }

    async fn get_stock_prices(&self, codes: &[String]) -> Result<Vec<StockPrice>> {
        self.check_online()?;
        let quotes = self.quotes.read().await;
        Ok(codes.iter().filter_map(|c| quotes.get(c).cloned()).collect())
    }

    async fn get_daily_prices(&self, code: &str, count: usize) -> Result<Vec<PriceBar>> {
        self.check_online()?;
        let daily = self.daily.read().await;
        let bars = daily.get(code).cloned().unwrap_or_default();
        let skip = bars.len().saturating_sub(count);
        Ok(bars.into_iter().skip(skip).collect())
    }

    async fn place_order(
        &self,
        code: &str,
        side: OrderSide,
        quantity: u32,
        price: Option<f64>,
    ) -> Result<OrderResult> {
        let quote = self.quotes.read().await.get(code).cloned();
        let fill_price = price.or(quote.as_ref().map(|q| q.current_price)).unwrap_or(0.0);

        self.orders.write().await.push(ExecutedOrder {
            code: code.to_string(),
            side,
            quantity,
            price,
        });

        let mut positions = self.positions.write().await;
        match side {
            OrderSide::Buy => {
                debug!(code, quantity, fill_price, "paper buy filled");
                positions.push(Position {
                    stock_code: code.to_string(),
                    stock_name: quote.map(|q| q.name).unwrap_or_else(|| code.to_string()),
                    quantity,
                    avg_price: fill_price,
                    current_price: fill_price,
                    profit_loss: 0.0,
                    profit_loss_rate: 0.0,
                });
                let mut balance = self.balance.write().await;
                balance.available_amount -= fill_price * quantity as f64;
            }
            OrderSide::Sell => {
                debug!(code, quantity, fill_price, "paper sell filled");
                if let Some(idx) = positions.iter().position(|p| p.stock_code == code) {
                    let position = &mut positions[idx];
                    if position.quantity <= quantity {
                        positions.remove(idx);
                    } else {
                        position.quantity -= quantity;
                    }
                }
                let mut balance = self.balance.write().await;
                balance.available_amount += fill_price * quantity as f64;
            }
        }

        Ok(OrderResult {
            success: true,
            order_id: Some(uuid::Uuid::new_v4().to_string()),
            message: "paper fill".to_string(),
            status: OrderStatus::Filled,
        })
    }

    async fn get_positions(&self) -> Result<Vec<Position>> {
        Ok(self.positions.read().await.clone())
    }

    async fn get_balance(&self) -> Result<Balance> {
        self.check_online()?;
        Ok(self.balance.read().await.clone())
    }
}
