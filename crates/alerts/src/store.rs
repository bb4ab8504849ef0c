use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use common::{AlertData, Result, ALERT_TTL_SECONDS};

use crate::kv::KvStore;

const ALERT_KEY_PREFIX: &str = "alert:";
const LOCK_KEY_PREFIX: &str = "lock:alert:";
/// Lock expiry keeps a crashed approver from wedging the alert forever.
const LOCK_TTL: Duration = Duration::from_secs(10);

/// Pending-alert storage with TTL and an atomic pop for concurrent
/// approval attempts.
///
/// The store is the only cross-tick shared mutable state in the system;
/// `pop_atomic` is its one concurrency-ordering primitive — of two racing
/// approve/reject requests, exactly one obtains the alert.
#[derive(Clone)]
pub struct AlertStore {
    kv: Arc<dyn KvStore>,
}

impl AlertStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn key(alert_id: &str) -> String {
        format!("{ALERT_KEY_PREFIX}{alert_id}")
    }

    fn lock_key(alert_id: &str) -> String {
        format!("{LOCK_KEY_PREFIX}{alert_id}")
    }

    /// Write an alert under its id, overwriting, with the 5-minute TTL.
    pub async fn save(&self, alert: &AlertData) -> Result<()> {
        let value = serde_json::to_vec(alert)?;
        self.kv
            .put(&Self::key(&alert.alert_id), value, Duration::from_secs(ALERT_TTL_SECONDS as u64))
            .await
    }

    /// Fetch without consuming. Never extends the TTL.
    pub async fn get(&self, alert_id: &str) -> Result<Option<AlertData>> {
        match self.kv.get(&Self::key(alert_id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get-then-delete without a lock. Single-writer contexts only.
    pub async fn pop(&self, alert_id: &str) -> Result<Option<AlertData>> {
        let alert = self.get(alert_id).await?;
        if alert.is_some() {
            self.delete(alert_id).await?;
        }
        Ok(alert)
    }

    /// Atomically claim and remove an alert.
    ///
    /// Takes the per-alert lock (set-if-absent); on contention returns
    /// `None` without touching the alert. The lock is released afterwards,
    /// and its own TTL bounds the damage if release never happens.
    pub async fn pop_atomic(&self, alert_id: &str) -> Result<Option<AlertData>> {
        let lock_key = Self::lock_key(alert_id);
        let acquired = self.kv.put_nx(&lock_key, b"1".to_vec(), LOCK_TTL).await?;
        if !acquired {
            return Ok(None);
        }

        let result = self.pop(alert_id).await;

        if let Err(e) = self.kv.delete(&lock_key).await {
            warn!(alert_id, error = %e, "failed to release alert lock; TTL will reap it");
        }

        result
    }

    /// Remove an alert; reports whether one was present. Idempotent.
    pub async fn delete(&self, alert_id: &str) -> Result<bool> {
        self.kv.delete(&Self::key(alert_id)).await
    }

    /// All live pending alerts. Eventually-consistent by contract.
    pub async fn get_all(&self) -> Result<Vec<AlertData>> {
        let keys = self.kv.keys(ALERT_KEY_PREFIX).await?;
        let mut alerts = Vec::with_capacity(keys.len());
        for key in keys {
            let alert_id = key.trim_start_matches(ALERT_KEY_PREFIX);
            if let Some(alert) = self.get(alert_id).await? {
                alerts.push(alert);
            }
        }
        Ok(alerts)
    }
}
