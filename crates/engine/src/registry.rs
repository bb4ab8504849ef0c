use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use alerts::AlertStore;
use common::{
    AlertDecisions, ApprovalOutcome, BrokerClient, Notifier, Result, TradingMode,
};
use risk::{RiskConfig, RiskManager};

use crate::trading::TradingEngine;

/// Holds one `TradingEngine` per user, created on first sight and kept
/// across ticks so trailing-stop state survives until positions close.
///
/// Also the system's approve/reject entry point: interactive surfaces
/// (the Telegram bot) talk to this registry, never to an engine directly.
pub struct EngineRegistry {
    mode: TradingMode,
    broker: Arc<dyn BrokerClient>,
    risk_config: RiskConfig,
    alerts: AlertStore,
    notifier: Option<Arc<dyn Notifier>>,
    max_concurrent_fetches: usize,
    engines: Mutex<HashMap<String, Arc<TradingEngine>>>,
}

impl EngineRegistry {
    pub fn new(
        mode: TradingMode,
        broker: Arc<dyn BrokerClient>,
        risk_config: RiskConfig,
        alerts: AlertStore,
        notifier: Option<Arc<dyn Notifier>>,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            mode,
            broker,
            risk_config,
            alerts,
            notifier,
            max_concurrent_fetches,
            engines: Mutex::new(HashMap::new()),
        }
    }

    pub async fn engine_for(&self, user_id: &str) -> Arc<TradingEngine> {
        let mut engines = self.engines.lock().await;
        engines
            .entry(user_id.to_string())
            .or_insert_with(|| {
                debug!(user_id, "creating trading engine");
                Arc::new(TradingEngine::new(
                    self.mode,
                    self.broker.clone(),
                    RiskManager::new(self.risk_config.clone()),
                    self.alerts.clone(),
                    self.notifier.clone(),
                    self.max_concurrent_fetches,
                ))
            })
            .clone()
    }

    /// Sweep expired alerts across every engine. For background tasks.
    pub async fn cleanup_expired_alerts(&self) -> usize {
        let engines: Vec<Arc<TradingEngine>> =
            self.engines.lock().await.values().cloned().collect();
        let mut removed = 0;
        for engine in engines {
            removed += engine.cleanup_expired_alerts().await;
        }
        removed
    }

    /// Find the engine responsible for an alert: by the store's user id
    /// when the alert is still live, by pending-map mirrors otherwise.
    async fn route(&self, alert_id: &str) -> Result<Option<Arc<TradingEngine>>> {
        if let Some(alert) = self.alerts.get(alert_id).await? {
            let engines = self.engines.lock().await;
            return Ok(engines.get(&alert.user_id).cloned());
        }
        let engines: Vec<Arc<TradingEngine>> =
            self.engines.lock().await.values().cloned().collect();
        for engine in engines {
            if engine.has_pending(alert_id).await {
                return Ok(Some(engine));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl AlertDecisions for EngineRegistry {
    async fn approve(&self, alert_id: &str) -> Result<ApprovalOutcome> {
        match self.route(alert_id).await? {
            Some(engine) => engine.approve_alert(alert_id).await,
            None => Ok(ApprovalOutcome::NotFound),
        }
    }

    async fn reject(&self, alert_id: &str) -> Result<ApprovalOutcome> {
        match self.route(alert_id).await? {
            Some(engine) => engine.reject_alert(alert_id).await,
            None => {
                // Nothing mirrored anywhere; still clear the store key.
                self.alerts.delete(alert_id).await?;
                Ok(ApprovalOutcome::NotFound)
            }
        }
    }
}
