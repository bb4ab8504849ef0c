use async_trait::async_trait;

use crate::{Balance, OrderResult, OrderSide, Position, PriceBar, Result, StockPrice};

/// Abstraction over the brokerage connection.
///
/// `KisBroker` implements this against the KIS open API for live trading;
/// `PaperBroker` implements it for simulation and tests. Only the trading
/// engine should hold a `dyn BrokerClient` reference — every order goes
/// through the risk manager's gates before it reaches the broker.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Obtain (or refresh) an access token. Called lazily on first use and
    /// after a token-expired response.
    async fn authenticate(&self) -> Result<()>;

    /// Current quotes for a batch of stock codes, one consistent snapshot
    /// per tick. Implementations may fan out internally.
    async fn get_stock_prices(&self, codes: &[String]) -> Result<Vec<StockPrice>>;

    /// Daily OHLCV history for one stock, normalized oldest-first.
    async fn get_daily_prices(&self, code: &str, count: usize) -> Result<Vec<PriceBar>>;

    /// Place an order. `price = None` denotes a market order.
    async fn place_order(
        &self,
        code: &str,
        side: OrderSide,
        quantity: u32,
        price: Option<f64>,
    ) -> Result<OrderResult>;

    /// Current open positions at the broker.
    async fn get_positions(&self) -> Result<Vec<Position>>;

    /// Account balance, including the cash available for new orders.
    async fn get_balance(&self) -> Result<Balance>;
}
