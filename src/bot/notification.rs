use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::markdown::{bold, code_inline, escape};
use tracing::{error, info, warn};

use crate::discovery::scheduler::AlertSink;
use crate::error::GemHunterError;
use crate::models::DiscoveredToken;
use crate::portfolio::{AlertKind, PositionAlert};

/// Formats a USD amount, keeping precision for sub-dollar prices.
pub(crate) fn usd(value: Option<f64>) -> String {
    match value {
        Some(v) if v.abs() >= 1.0 => format!("${:.2}", v),
        Some(v) => format!("${:.8}", v),
        None => "n/a".to_string(),
    }
}

pub(crate) fn percent(value: f64) -> String {
    format!("{:+.2}%", value)
}

pub fn format_gem_alert(token: &DiscoveredToken) -> String {
    let payload = &token.token;
    format!(
        "💎 {}\n\n\
        *Symbol:* {}\n\
        *Address:* {}\n\
        *Streak:* {} consecutive sightings\n\
        *Price:* {}\n\
        *Liquidity:* {}\n\
        *Market Cap:* {}\n\
        *24h Volume:* {}",
        bold(&escape(&format!("Promising token ({})", token.strategy))),
        escape(payload.display_symbol()),
        code_inline(&payload.address),
        token.consecutive_appearances,
        escape(&usd(payload.price)),
        escape(&usd(payload.liquidity)),
        escape(&usd(payload.market_cap)),
        escape(&usd(payload.volume24h)),
    )
}

pub fn format_position_alert(alert: &PositionAlert) -> String {
    let emoji = match alert.kind {
        AlertKind::TakeProfit => "🚀",
        AlertKind::StopLoss => "💥",
    };
    let position = &alert.position;
    format!(
        "{} {}\n\n\
        *Token:* {} {}\n\
        *Entry:* {}\n\
        *Current:* {}\n\
        *PnL:* {}",
        emoji,
        bold(&escape(&format!("{} reached", alert.kind))),
        escape(&position.token_symbol),
        code_inline(&position.token_address),
        escape(&usd(Some(position.entry_price_usd))),
        escape(&usd(Some(position.current_price_usd))),
        escape(&percent(alert.pnl_percent)),
    )
}

pub fn format_error_alert(message: &str) -> String {
    format!("❌ *Error Alert*\n\n{}", escape(message))
}

pub fn format_status_update(status_type: &str, message: &str) -> String {
    format!("ℹ️ {}\n\n{}", bold(&escape(&format!("{} Update", status_type))), escape(message))
}

/// Handles sending notifications to authorized users
pub struct NotificationManager {
    bot: Bot,
    chat_ids: Vec<i64>,
}

impl NotificationManager {
    pub fn new(bot: Bot, chat_ids: Vec<i64>) -> Self {
        Self { bot, chat_ids }
    }

    pub async fn send_status_update(&self, status_type: &str, message: &str) -> Result<(), GemHunterError> {
        self.send_to_all_users(&format_status_update(status_type, message)).await
    }

    /// Sends an already MarkdownV2-formatted message to every configured chat.
    async fn send_to_all_users(&self, message: &str) -> Result<(), GemHunterError> {
        if self.chat_ids.is_empty() {
            warn!("No Telegram chats configured, dropping notification");
            return Ok(());
        }

        let mut failures = Vec::new();
        for &chat_id in &self.chat_ids {
            match self
                .bot
                .send_message(ChatId(chat_id), message)
                .parse_mode(ParseMode::MarkdownV2)
                .await
            {
                Ok(_) => info!("Notification sent to chat {}", chat_id),
                Err(e) => {
                    error!("Failed to send notification to chat {}: {}", chat_id, e);
                    failures.push(format!("{}: {}", chat_id, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(GemHunterError::TelegramError(format!(
                "{} of {} deliveries failed ({})",
                failures.len(),
                self.chat_ids.len(),
                failures.join("; ")
            )))
        }
    }
}

#[async_trait]
impl AlertSink for NotificationManager {
    async fn gem_alert(&self, token: &DiscoveredToken) -> Result<(), GemHunterError> {
        self.send_to_all_users(&format_gem_alert(token)).await
    }

    async fn position_alert(&self, alert: &PositionAlert) -> Result<(), GemHunterError> {
        self.send_to_all_users(&format_position_alert(alert)).await
    }

    async fn error_alert(&self, message: &str) -> Result<(), GemHunterError> {
        self.send_to_all_users(&format_error_alert(message)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenPayload;
    use crate::portfolio::{PositionThresholds, PositionTracker};

    #[test]
    fn test_usd_precision() {
        assert_eq!(usd(Some(1234.567)), "$1234.57");
        assert_eq!(usd(Some(0.000123)), "$0.00012300");
        assert_eq!(usd(None), "n/a");
        assert_eq!(percent(-21.0), "-21.00%");
    }

    #[test]
    fn test_gem_alert_escapes_dynamic_text() {
        let token = DiscoveredToken {
            strategy: "Price Momentum".to_string(),
            token: TokenPayload {
                address: "Mint1".to_string(),
                symbol: Some("MY.GEM".to_string()),
                price: Some(0.5),
                liquidity: Some(60_000.0),
                ..Default::default()
            },
            consecutive_appearances: 2,
            first_seen: 1_700_000_000,
            appearances: vec![1_700_000_000, 1_700_003_600],
        };

        let text = format_gem_alert(&token);
        assert!(text.contains("*Promising token \\(Price Momentum\\)*"));
        assert!(text.contains("MY\\.GEM"));
        assert!(text.contains("`Mint1`"));
        assert!(text.contains("$60000\\.00"));
        assert!(text.contains("*Market Cap:* n/a"));
        assert!(text.contains("2 consecutive sightings"));
    }

    #[test]
    fn test_position_alert_format() {
        let tracker = PositionTracker::temporary(PositionThresholds::default()).unwrap();
        let position = tracker.open_position(1, "Mint1", "GEM", 1.0).unwrap();
        let alert = tracker.reprice(&position, 0.75).unwrap().unwrap();

        let text = format_position_alert(&alert);
        assert!(text.starts_with("💥"));
        assert!(text.contains("*Stop Loss reached*"));
        assert!(text.contains("\\-25\\.00%"));
    }

    #[test]
    fn test_error_alert_escapes_message() {
        let text = format_error_alert("History for Volume Momentum was corrupted (bad json).");
        assert!(text.starts_with("❌ *Error Alert*"));
        assert!(text.contains("\\(bad json\\)\\."));
    }
}
