use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode};
use tokio::sync::Mutex;
use tracing::info;

use common::{AlertData, Error, Notifier, Result, SignalKind};

/// Telegram delivery of pending alerts, with inline approve/reject buttons.
///
/// Sends are idempotent on `alert_id`: a re-send of an alert that already
/// went out is a no-op, so broker-side retries cannot double-notify.
pub struct TelegramNotifier {
    bot: Bot,
    sent: Mutex<HashSet<String>>,
    /// Message id per alert, for editing after an approve/reject.
    messages: Mutex<HashMap<String, (ChatId, MessageId)>>,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot, sent: Mutex::new(HashSet::new()), messages: Mutex::new(HashMap::new()) }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    /// The message reference recorded for an alert, if one was sent.
    /// Pass it back through [`Notifier::edit_after_action`] to rewrite the
    /// original alert message once the alert is decided.
    pub async fn message_ref(&self, alert_id: &str) -> Option<String> {
        self.messages.lock().await.get(alert_id).map(|(_, id)| id.0.to_string())
    }
}

fn parse_chat(channel: &str) -> Result<ChatId> {
    channel
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| Error::Notify(format!("invalid Telegram chat id '{channel}'")))
}

/// HTML body of an alert message.
pub fn format_alert_message(alert: &AlertData) -> String {
    let (emoji, action) = match alert.signal {
        SignalKind::Buy => ("\u{1F7E2}", "BUY"),
        SignalKind::Sell => ("\u{1F534}", "SELL"),
        SignalKind::Hold => ("\u{26AA}", "HOLD"),
    };

    let mut lines = vec![
        "\u{1F514} <b>Trading alert</b>".to_string(),
        String::new(),
        format!("\u{1F4C8} Stock: {} ({})", alert.stock_name, alert.stock_code),
        format!("\u{1F4CA} Signal: {emoji} {action} ({:.0}%)", alert.confidence * 100.0),
        format!("\u{1F4B0} Price: {} KRW", format_krw(alert.current_price)),
        format!("\u{1F522} Quantity: {} shares", alert.suggested_quantity),
        String::new(),
        "<b>Reasoning:</b>".to_string(),
    ];
    for reason in alert.reason.split(", ") {
        lines.push(format!("\u{2022} {reason}"));
    }
    lines.push(String::new());
    lines.push(format!("\u{23F0} {}", alert.created_at.format("%Y-%m-%d %H:%M:%S UTC")));
    lines.join("\n")
}

/// Thousands-grouped integer rendering of a KRW amount.
pub fn format_krw(amount: f64) -> String {
    let whole = amount.round() as i64;
    let digits = whole.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if whole < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Callback-data payloads carried by the inline buttons.
pub fn approval_keyboard(alert_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[
        InlineKeyboardButton::callback("\u{2705} Approve", format!("approve:{alert_id}")),
        InlineKeyboardButton::callback("\u{274C} Reject", format!("reject:{alert_id}")),
    ]])
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_alert(&self, channel: &str, alert: &AlertData) -> Result<()> {
        {
            let mut sent = self.sent.lock().await;
            if !sent.insert(alert.alert_id.clone()) {
                info!(alert_id = %alert.alert_id, "alert already notified; skipping");
                return Ok(());
            }
        }

        let chat = parse_chat(channel)?;
        let message = self
            .bot
            .send_message(chat, format_alert_message(alert))
            .parse_mode(ParseMode::Html)
            .reply_markup(approval_keyboard(&alert.alert_id))
            .await
            .map_err(|e| Error::Notify(e.to_string()))?;

        self.messages.lock().await.insert(alert.alert_id.clone(), (chat, message.id));
        info!(alert_id = %alert.alert_id, chat = chat.0, "alert notification sent");
        Ok(())
    }

    async fn edit_after_action(
        &self,
        channel: &str,
        message_ref: &str,
        action: &str,
        detail: &str,
    ) -> Result<()> {
        let chat = parse_chat(channel)?;
        let message_id = message_ref
            .parse::<i32>()
            .map(MessageId)
            .map_err(|_| Error::Notify(format!("invalid message ref '{message_ref}'")))?;

        self.bot
            .edit_message_text(chat, message_id, format!("{action}\n{detail}"))
            .await
            .map_err(|e| Error::Notify(e.to_string()))?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: &str, show_alert: bool) -> Result<()> {
        self.bot
            .answer_callback_query(callback_id)
            .text(text)
            .show_alert(show_alert)
            .await
            .map_err(|e| Error::Notify(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert() -> AlertData {
        let mut alert = AlertData::new(
            "u1",
            "005930",
            "Samsung Electronics",
            SignalKind::Buy,
            0.72,
            70_000.0,
            5,
            "RSI oversold (27.3), volume spike detected",
        );
        alert.alert_id = "fixed-id".to_string();
        alert
    }

    #[test]
    fn krw_amounts_are_comma_grouped() {
        assert_eq!(format_krw(0.0), "0");
        assert_eq!(format_krw(999.0), "999");
        assert_eq!(format_krw(70_000.0), "70,000");
        assert_eq!(format_krw(1_234_567.0), "1,234,567");
        assert_eq!(format_krw(-1_234_567.0), "-1,234,567");
    }

    #[test]
    fn alert_message_contains_the_essentials() {
        let text = format_alert_message(&alert());
        assert!(text.contains("Samsung Electronics (005930)"));
        assert!(text.contains("BUY (72%)"));
        assert!(text.contains("70,000 KRW"));
        assert!(text.contains("5 shares"));
        assert!(text.contains("\u{2022} RSI oversold (27.3)"));
        assert!(text.contains("\u{2022} volume spike detected"));
    }

    #[test]
    fn keyboard_embeds_the_alert_id() {
        let kb = approval_keyboard("abc-123");
        let row = &kb.inline_keyboard[0];
        assert_eq!(row.len(), 2);
        let datas: Vec<String> = row
            .iter()
            .filter_map(|b| match &b.kind {
                teloxide::types::InlineKeyboardButtonKind::CallbackData(d) => Some(d.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(datas, vec!["approve:abc-123", "reject:abc-123"]);
    }
}
