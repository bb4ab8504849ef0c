//! Sqlite-backed user and watchlist directory.
//!
//! Read-side only: registration and watchlist editing happen outside this
//! system. Queries are runtime-bound so the crate builds without a
//! prepared-statement cache.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::debug;

use common::{Result, User, UserDirectory, WatchlistEntry, WatchlistOverrides};

/// The sqlx migrator for this schema; run it once at startup.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect and apply migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        MIGRATOR.run(&pool).await.map_err(sqlx::Error::from)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn list_active_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, email, is_active, telegram_chat_id FROM users WHERE is_active = 1",
        )
        .fetch_all(&self.pool)
        .await?;

        let users = rows
            .into_iter()
            .map(|row| User {
                id: row.get("id"),
                email: row.get("email"),
                is_active: row.get::<i64, _>("is_active") != 0,
                telegram_chat_id: row.get("telegram_chat_id"),
            })
            .collect::<Vec<_>>();

        debug!(count = users.len(), "loaded active users");
        Ok(users)
    }

    async fn watchlist(&self, user_id: &str) -> Result<Vec<WatchlistEntry>> {
        let rows = sqlx::query(
            "SELECT stock_code, stock_name FROM watchlist_items \
             WHERE user_id = ?1 AND is_active = 1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| WatchlistEntry {
                stock_code: row.get("stock_code"),
                stock_name: row.get("stock_name"),
            })
            .collect())
    }

    async fn overrides(
        &self,
        user_id: &str,
        stock_code: &str,
    ) -> Result<Option<WatchlistOverrides>> {
        let row = sqlx::query(
            "SELECT target_price, stop_loss_price, quantity FROM watchlist_items \
             WHERE user_id = ?1 AND stock_code = ?2 AND is_active = 1",
        )
        .bind(user_id)
        .bind(stock_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| WatchlistOverrides {
            target_price: row.get("target_price"),
            stop_loss_price: row.get("stop_loss_price"),
            quantity: row.get::<Option<i64>, _>("quantity").map(|q| q as u32),
        }))
    }
}
