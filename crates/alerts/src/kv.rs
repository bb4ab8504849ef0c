use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use common::Result;

/// Minimal key-value surface the alert store needs: string keys, byte
/// values, per-key TTL, and atomic set-if-absent.
///
/// `MemoryKv` backs single-process deployments and tests; a shared service
/// (e.g. Redis) satisfies the same contract for multi-process setups.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write, overwriting any existing value, expiring after `ttl`.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Set-if-absent with TTL. Returns true when the key was claimed.
    async fn put_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool>;

    /// Remove; reports whether a live value was present.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Keys with the given prefix. May be eventually-consistent.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory `KvStore` with lazy expiry.
///
/// Expired entries are dropped on access rather than by a background
/// sweeper; `keys` and `get` never return dead values.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(key) {
            Some(e) if e.is_live(now) => Ok(Some(e.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), Entry { value, expires_at: Instant::now() + ttl });
        Ok(())
    }

    async fn put_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let live = entries.get(key).map(|e| e.is_live(now)).unwrap_or(false);
        if live {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry { value, expires_at: now + ttl });
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.remove(key) {
            Some(e) => Ok(e.is_live(now)),
            None => Ok(false),
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, e| e.is_live(now));
        Ok(entries.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }
}
