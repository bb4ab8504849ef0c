use async_trait::async_trait;

use crate::{AlertData, ApprovalOutcome, Result};

/// Outbound notification channel for pending alerts.
///
/// Delivery is best-effort: a failed send is logged by the caller and the
/// alert stays valid in the store. `send_alert` must be idempotent on
/// `alert_id` so broker-side retries cannot double-notify.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a pending alert to the user's channel.
    async fn send_alert(&self, channel: &str, alert: &AlertData) -> Result<()>;

    /// Rewrite a previously sent alert message after it was acted on.
    /// Optional; the default does nothing.
    async fn edit_after_action(
        &self,
        _channel: &str,
        _message_ref: &str,
        _action: &str,
        _detail: &str,
    ) -> Result<()> {
        Ok(())
    }

    /// Acknowledge an interactive callback (button press). Optional.
    async fn answer_callback(&self, _callback_id: &str, _text: &str, _show_alert: bool) -> Result<()> {
        Ok(())
    }
}

/// Handler for out-of-band approve/reject requests on pending alerts.
///
/// Implemented by the engine registry; the Telegram approval bot (or any
/// other interactive surface) drives it without depending on the engine.
#[async_trait]
pub trait AlertDecisions: Send + Sync {
    async fn approve(&self, alert_id: &str) -> Result<ApprovalOutcome>;
    async fn reject(&self, alert_id: &str) -> Result<ApprovalOutcome>;
}
