use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// KIS issues one token per credential set and rate-limits issuance to one
/// request per minute, so tokens are cached process-wide and shared across
/// users that share credentials. KIS tokens live 24 hours; we keep them for
/// 23 and refresh an hour early.
const TOKEN_TTL_HOURS: i64 = 23;
const REFRESH_BUFFER_HOURS: i64 = 1;

/// Cache key: one entry per (app key, account, mock-endpoint) combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenKey {
    pub app_key: String,
    pub account_no: String,
    pub is_mock: bool,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_usable(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - Duration::hours(REFRESH_BUFFER_HOURS)
    }
}

/// Process-wide OAuth token cache for the KIS open API.
#[derive(Default)]
pub struct TokenCache {
    tokens: Mutex<HashMap<TokenKey, CachedToken>>,
    /// Held only while a token is being issued, so concurrent callers with
    /// the same credentials do not stampede the token endpoint.
    issue_lock: Mutex<()>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A still-usable cached token, if any.
    pub async fn get(&self, key: &TokenKey) -> Option<String> {
        let tokens = self.tokens.lock().await;
        tokens
            .get(key)
            .filter(|t| t.is_usable(Utc::now()))
            .map(|t| t.access_token.clone())
    }

    /// Store a freshly issued token.
    pub async fn put(&self, key: TokenKey, access_token: String) {
        let mut tokens = self.tokens.lock().await;
        debug!(account = %key.account_no, "caching KIS access token");
        tokens.insert(
            key,
            CachedToken { access_token, expires_at: Utc::now() + Duration::hours(TOKEN_TTL_HOURS) },
        );
    }

    /// Drop a token the broker reported as expired.
    pub async fn invalidate(&self, key: &TokenKey) {
        self.tokens.lock().await.remove(key);
    }

    /// Serialize token issuance. The guard spans only the issuance call.
    pub async fn lock_issuance(&self) -> MutexGuard<'_, ()> {
        self.issue_lock.lock().await
    }
}
