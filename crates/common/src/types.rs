use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One trading day's OHLCV bar.
///
/// Price series are ordered oldest-to-newest, strictly increasing by date.
/// Non-trading days are simply absent from the series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Current market quote for a single stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockPrice {
    pub code: String,
    pub name: String,
    pub current_price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    /// Change versus previous close, in percent.
    pub change_rate: f64,
    pub volume: u64,
}

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Broker-reported lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Filled,
    PartiallyFilled,
    Failed,
    Cancelled,
}

/// Result of an order placement.
///
/// A rejected order is a normal value here, not an error: provider-level
/// rejections carry the broker's message and `success == false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    pub order_id: Option<String>,
    pub message: String,
    pub status: OrderStatus,
}

/// An open holding at the brokerage.
///
/// Positions are owned by the broker; the engine reads them but never
/// mutates one directly — a position changes only as a consequence of a
/// successful order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub stock_code: String,
    pub stock_name: String,
    pub quantity: u32,
    pub avg_price: f64,
    pub current_price: f64,
    pub profit_loss: f64,
    pub profit_loss_rate: f64,
}

/// Account balance snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Balance {
    pub deposit: f64,
    /// Cash available for new orders.
    pub available_amount: f64,
    pub total_evaluation: f64,
    pub net_worth: f64,
    pub purchase_amount: f64,
    pub evaluation_amount: f64,
}

/// Kind of a trading signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Buy => write!(f, "BUY"),
            SignalKind::Sell => write!(f, "SELL"),
            SignalKind::Hold => write!(f, "HOLD"),
        }
    }
}

/// Whether the engine places orders itself or queues them for approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Auto,
    Alert,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Auto => write!(f, "auto"),
            TradingMode::Alert => write!(f, "alert"),
        }
    }
}

impl std::str::FromStr for TradingMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(TradingMode::Auto),
            "alert" => Ok(TradingMode::Alert),
            other => Err(crate::Error::Config(format!(
                "TRADING_MODE must be 'auto' or 'alert', got '{other}'"
            ))),
        }
    }
}

/// How long a pending alert stays actionable.
pub const ALERT_TTL_SECONDS: i64 = 300;

/// A queued trade awaiting human approval (ALERT mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertData {
    pub alert_id: String,
    pub user_id: String,
    pub stock_code: String,
    pub stock_name: String,
    pub signal: SignalKind,
    pub confidence: f64,
    pub current_price: f64,
    pub suggested_quantity: u32,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl AlertData {
    /// Build a new alert with a fresh opaque id, stamped now.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: impl Into<String>,
        stock_code: impl Into<String>,
        stock_name: impl Into<String>,
        signal: SignalKind,
        confidence: f64,
        current_price: f64,
        suggested_quantity: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            stock_code: stock_code.into(),
            stock_name: stock_name.into(),
            signal,
            confidence,
            current_price,
            suggested_quantity,
            reason: reason.into(),
            created_at: Utc::now(),
        }
    }

    /// True once the alert is older than the 5-minute approval window.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > chrono::Duration::seconds(ALERT_TTL_SECONDS)
    }
}

/// Outcome of an approve/reject request against a pending alert.
///
/// "Not found" and "expired" are distinct, explicit results — the notifier
/// must be able to tell the user which one happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApprovalOutcome {
    Executed {
        order_id: String,
        stock_code: String,
        stock_name: String,
        side: OrderSide,
        quantity: u32,
        price: f64,
    },
    Rejected {
        stock_code: String,
        stock_name: String,
        quantity: u32,
    },
    NotFound,
    Expired,
    OrderFailed(String),
}

impl ApprovalOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, ApprovalOutcome::Executed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_expiry_window_is_five_minutes() {
        let alert =
            AlertData::new("u1", "005930", "Samsung", SignalKind::Buy, 0.7, 70000.0, 3, "test");
        let fresh = alert.created_at + chrono::Duration::seconds(299);
        let stale = alert.created_at + chrono::Duration::seconds(301);
        assert!(!alert.is_expired_at(fresh));
        assert!(alert.is_expired_at(stale));
    }

    #[test]
    fn alert_round_trips_through_json() {
        let alert = AlertData::new(
            "u1",
            "005930",
            "Samsung",
            SignalKind::Sell,
            0.9,
            70000.0,
            10,
            "RSI overbought",
        );
        let json = serde_json::to_vec(&alert).unwrap();
        let back: AlertData = serde_json::from_slice(&json).unwrap();
        assert_eq!(back.alert_id, alert.alert_id);
        assert_eq!(back.signal, SignalKind::Sell);
        assert_eq!(back.created_at, alert.created_at);
    }

    #[test]
    fn trading_mode_parses_case_insensitively() {
        assert_eq!("AUTO".parse::<TradingMode>().unwrap(), TradingMode::Auto);
        assert_eq!("alert".parse::<TradingMode>().unwrap(), TradingMode::Alert);
        assert!("manual".parse::<TradingMode>().is_err());
    }
}
