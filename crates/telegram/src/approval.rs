use std::sync::Arc;

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::{info, warn};

use common::{AlertDecisions, ApprovalOutcome};

use crate::notifier::format_krw;

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Dependencies injected into every handler via `dptree`.
#[derive(Clone)]
pub struct ApprovalDeps {
    pub decisions: Arc<dyn AlertDecisions>,
}

/// Action parsed from a button's callback data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Approve,
    Reject,
}

/// Parse `approve:{id}` / `reject:{id}` callback payloads.
pub fn parse_callback_data(data: &str) -> Option<(CallbackAction, &str)> {
    let (action, alert_id) = data.split_once(':')?;
    if alert_id.is_empty() {
        return None;
    }
    match action {
        "approve" => Some((CallbackAction::Approve, alert_id)),
        "reject" => Some((CallbackAction::Reject, alert_id)),
        _ => None,
    }
}

/// User-facing summary of an approve/reject outcome.
pub fn outcome_text(action: CallbackAction, outcome: &ApprovalOutcome) -> String {
    match outcome {
        ApprovalOutcome::Executed { stock_name, side, quantity, price, .. } => format!(
            "\u{2705} Approved: {side} {quantity} x {stock_name} @ {} KRW",
            format_krw(*price)
        ),
        ApprovalOutcome::Rejected { stock_name, quantity, .. } => {
            format!("\u{274C} Rejected: {quantity} x {stock_name}")
        }
        ApprovalOutcome::Expired => {
            "\u{23F3} This alert expired (older than 5 minutes). No order was placed.".to_string()
        }
        ApprovalOutcome::NotFound => match action {
            CallbackAction::Approve => {
                "\u{2753} Alert not found. It was already handled or has been cleaned up."
                    .to_string()
            }
            CallbackAction::Reject => "\u{2753} Alert not found; nothing to reject.".to_string(),
        },
        ApprovalOutcome::OrderFailed(message) => {
            format!("\u{1F6A8} Approved, but the order failed: {message}")
        }
    }
}

/// Start the approval bot in long-polling mode.
pub async fn run_approval_bot(bot: Bot, deps: ApprovalDeps) {
    info!("Telegram approval bot starting (long-polling)");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![deps])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync>> {
    Update::filter_callback_query().endpoint(handle_callback)
}

async fn handle_callback(bot: Bot, query: CallbackQuery, deps: ApprovalDeps) -> HandlerResult {
    let Some(data) = query.data.as_deref() else {
        return Ok(());
    };
    let Some((action, alert_id)) = parse_callback_data(data) else {
        warn!(data, "unrecognized callback payload");
        bot.answer_callback_query(query.id).await?;
        return Ok(());
    };

    let outcome = match action {
        CallbackAction::Approve => deps.decisions.approve(alert_id).await,
        CallbackAction::Reject => deps.decisions.reject(alert_id).await,
    };

    let text = match outcome {
        Ok(outcome) => outcome_text(action, &outcome),
        Err(e) => {
            warn!(alert_id, error = %e, "alert decision failed");
            format!("\u{1F6A8} Request failed: {e}")
        }
    };

    bot.answer_callback_query(query.id).text(text.clone()).show_alert(true).await?;

    // Freeze the original alert message so the buttons stop inviting clicks.
    if let Some(message) = query.message {
        bot.edit_message_text(message.chat.id, message.id, text).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderSide;

    #[test]
    fn callback_payloads_parse() {
        assert_eq!(
            parse_callback_data("approve:abc-123"),
            Some((CallbackAction::Approve, "abc-123"))
        );
        assert_eq!(parse_callback_data("reject:xyz"), Some((CallbackAction::Reject, "xyz")));
        assert_eq!(parse_callback_data("approve:"), None);
        assert_eq!(parse_callback_data("noop"), None);
        assert_eq!(parse_callback_data("delete:abc"), None);
    }

    #[test]
    fn outcome_texts_distinguish_expired_from_missing() {
        let expired = outcome_text(CallbackAction::Approve, &ApprovalOutcome::Expired);
        let missing = outcome_text(CallbackAction::Approve, &ApprovalOutcome::NotFound);
        assert!(expired.contains("expired"));
        assert!(missing.contains("not found"));
        assert_ne!(expired, missing);
    }

    #[test]
    fn executed_outcome_mentions_the_fill() {
        let outcome = ApprovalOutcome::Executed {
            order_id: "ODNO1".to_string(),
            stock_code: "005930".to_string(),
            stock_name: "Samsung Electronics".to_string(),
            side: OrderSide::Buy,
            quantity: 5,
            price: 70_000.0,
        };
        let text = outcome_text(CallbackAction::Approve, &outcome);
        assert!(text.contains("BUY 5 x Samsung Electronics"));
        assert!(text.contains("70,000"));
    }
}
