pub mod broker;
pub mod config;
pub mod error;
pub mod notify;
pub mod types;
pub mod users;

pub use broker::BrokerClient;
pub use config::{Config, Execution};
pub use error::{Error, Result};
pub use notify::{AlertDecisions, Notifier};
pub use types::{
    AlertData, ApprovalOutcome, Balance, OrderResult, OrderSide, OrderStatus, Position, PriceBar,
    SignalKind, StockPrice, TradingMode, ALERT_TTL_SECONDS,
};
pub use users::{User, UserDirectory, WatchlistEntry, WatchlistOverrides};
