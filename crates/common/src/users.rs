use async_trait::async_trait;

use crate::Result;

/// A user whose watchlist and positions the scheduler processes.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub is_active: bool,
    /// Telegram chat to notify; `None` disables notifications for the user.
    pub telegram_chat_id: Option<String>,
}

/// One monitored stock on a user's watchlist.
#[derive(Debug, Clone)]
pub struct WatchlistEntry {
    pub stock_code: String,
    pub stock_name: String,
}

/// Per-stock overrides for the risk rules. All fields optional.
#[derive(Debug, Clone, Default)]
pub struct WatchlistOverrides {
    /// Absolute take-profit line in KRW.
    pub target_price: Option<f64>,
    /// Absolute stop-loss line in KRW.
    pub stop_loss_price: Option<f64>,
    /// Cap on the order quantity for this stock.
    pub quantity: Option<u32>,
}

/// Read-side of user and watchlist storage.
///
/// The scheduler is the only consumer; write paths (registration,
/// watchlist editing) live outside this system.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list_active_users(&self) -> Result<Vec<User>>;

    /// Active watchlist entries for one user.
    async fn watchlist(&self, user_id: &str) -> Result<Vec<WatchlistEntry>>;

    /// Per-stock risk overrides, if the user configured any.
    async fn overrides(&self, user_id: &str, stock_code: &str)
        -> Result<Option<WatchlistOverrides>>;
}
