use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use teloxide::utils::markdown::{bold, code_inline, escape};
use tracing::{error, info, warn};

use crate::bot::notification::{percent, usd};
use crate::bot::BotState;
use crate::portfolio::TrackedPosition;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Start the bot")]
    Start,
    #[command(description = "Show this help message")]
    Help,
    #[command(description = "Show promising tokens per strategy")]
    Promising,
    #[command(description = "Show discovery strategies")]
    Strategies,
    #[command(description = "Track a token: /track <address> [entry_price]")]
    Track(String),
    #[command(description = "Stop tracking a token: /untrack <address>")]
    Untrack(String),
    #[command(description = "View tracked positions")]
    Positions,
}

/// Splits `/track` arguments into an address and an optional entry price.
pub fn parse_track_args(args: &str) -> Result<(String, Option<f64>), String> {
    let mut parts = args.split_whitespace();
    let address = parts
        .next()
        .ok_or_else(|| "Usage: /track <address> [entry_price]".to_string())?
        .to_string();

    let price = match parts.next() {
        Some(raw) => {
            let price: f64 = raw
                .parse()
                .map_err(|_| format!("'{}' is not a valid price", raw))?;
            if !price.is_finite() || price <= 0.0 {
                return Err("Entry price must be positive".to_string());
            }
            Some(price)
        }
        None => None,
    };

    if parts.next().is_some() {
        return Err("Usage: /track <address> [entry_price]".to_string());
    }
    Ok((address, price))
}

pub struct StrategySummary {
    pub name: String,
    pub filter: &'static str,
    pub min_consecutive_appearances: u32,
    pub tracked: usize,
    pub promising: usize,
}

pub fn format_promising(results: &[(String, Vec<String>)]) -> String {
    let mut message = String::from("💎 *Promising Tokens*\n");
    for (strategy, addresses) in results {
        message.push_str(&format!("\n{}\n", bold(&escape(strategy))));
        if addresses.is_empty() {
            message.push_str("None yet\n");
        }
        for address in addresses {
            message.push_str(&format!("• {}\n", code_inline(address)));
        }
    }
    message
}

pub fn format_strategies(summaries: &[StrategySummary]) -> String {
    let mut message = String::from("📋 *Strategies*\n");
    for summary in summaries {
        message.push_str(&format!(
            "\n{}\nFilter: {}\nPromising after: {} sightings\nTracked: {}\nPromising: {}\n",
            bold(&escape(&summary.name)),
            escape(summary.filter),
            summary.min_consecutive_appearances,
            summary.tracked,
            summary.promising,
        ));
    }
    message
}

pub fn format_positions(positions: &[TrackedPosition]) -> String {
    if positions.is_empty() {
        return "✅ No tracked positions\\.".to_string();
    }

    let mut message = String::from("📊 *Tracked Positions*\n");
    for position in positions {
        message.push_str(&format!(
            "\n{} {}\nEntry: {}\nCurrent: {}\nPnL: {}\n",
            bold(&escape(&position.token_symbol)),
            code_inline(&position.token_address),
            escape(&usd(Some(position.entry_price_usd))),
            escape(&usd(Some(position.current_price_usd))),
            escape(&percent(position.pnl_percent())),
        ));
    }
    message
}

async fn send_markdown(bot: &Bot, chat_id: ChatId, text: String) -> ResponseResult<()> {
    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::MarkdownV2)
        .await?;
    Ok(())
}

/// Symbol from the most recent sighting by any strategy, else from the price source.
async fn lookup_symbol(state: &BotState, address: &str) -> Option<String> {
    for engine in &state.engines {
        let engine = engine.lock().await;
        if let Some(symbol) = engine
            .history()
            .get(address)
            .and_then(|record| record.last_data.symbol.clone())
        {
            return Some(symbol);
        }
    }

    match state.prices.get_symbol(address).await {
        Ok(symbol) => symbol,
        Err(e) => {
            warn!("Symbol lookup failed for {}: {}", address, e);
            None
        }
    }
}

async fn track(bot: &Bot, chat_id: ChatId, state: &BotState, args: &str) -> ResponseResult<()> {
    let (address, price) = match parse_track_args(args) {
        Ok(parsed) => parsed,
        Err(usage) => {
            bot.send_message(chat_id, usage).await?;
            return Ok(());
        }
    };

    let entry_price = match price {
        Some(price) => price,
        None => match state.prices.get_price(&address).await {
            Ok(Some(price)) => price,
            Ok(None) => {
                bot.send_message(chat_id, "❌ No price available, pass one: /track <address> <entry_price>")
                    .await?;
                return Ok(());
            }
            Err(e) => {
                error!("Price lookup failed for {}: {}", address, e);
                bot.send_message(chat_id, format!("❌ Price lookup failed: {}", e)).await?;
                return Ok(());
            }
        },
    };

    let symbol = lookup_symbol(state, &address)
        .await
        .unwrap_or_else(|| address.chars().take(6).collect());

    match state.positions.open_position(chat_id.0, &address, &symbol, entry_price) {
        Ok(position) => {
            let text = format!(
                "✅ Tracking {} {} from {}",
                bold(&escape(&position.token_symbol)),
                code_inline(&position.token_address),
                escape(&usd(Some(position.entry_price_usd))),
            );
            send_markdown(bot, chat_id, text).await
        }
        Err(e) => {
            bot.send_message(chat_id, format!("❌ {}", e)).await?;
            Ok(())
        }
    }
}

pub async fn command_handler(bot: Bot, msg: Message, cmd: Command, state: Arc<BotState>) -> ResponseResult<()> {
    let chat_id = msg.chat.id;
    let user_id = msg.from().map(|user| user.id.0 as i64);

    if !state.is_authorized(user_id) {
        warn!("Unauthorized access attempt by user: {:?}", user_id);
        bot.send_message(
            chat_id,
            "⚠️ You are not authorized to use this bot. Please contact the administrator.",
        )
        .await?;
        return Ok(());
    }

    info!("Received command: {:?} from user: {:?}", cmd, user_id);

    match cmd {
        Command::Start => {
            let text = format!(
                "🤖 *Welcome to Gem Hunter*\n\n\
                Watching {} discovery strategies for promising Solana tokens\\.\n\n\
                Use /help to see commands\\.",
                state.engines.len()
            );
            send_markdown(&bot, chat_id, text).await?;
        }
        Command::Help => {
            bot.send_message(chat_id, Command::descriptions().to_string()).await?;
        }
        Command::Promising => {
            let mut results = Vec::with_capacity(state.engines.len());
            for engine in &state.engines {
                let engine = engine.lock().await;
                results.push((engine.name().to_string(), engine.get_promising_tokens()));
            }
            send_markdown(&bot, chat_id, format_promising(&results)).await?;
        }
        Command::Strategies => {
            let mut summaries = Vec::with_capacity(state.engines.len());
            for engine in &state.engines {
                let engine = engine.lock().await;
                summaries.push(StrategySummary {
                    name: engine.name().to_string(),
                    filter: engine.strategy().filter.label(),
                    min_consecutive_appearances: engine.strategy().min_consecutive_appearances,
                    tracked: engine.history().len(),
                    promising: engine.get_promising_tokens().len(),
                });
            }
            send_markdown(&bot, chat_id, format_strategies(&summaries)).await?;
        }
        Command::Track(args) => {
            track(&bot, chat_id, &state, &args).await?;
        }
        Command::Untrack(args) => {
            let address = args.trim();
            if address.is_empty() {
                bot.send_message(chat_id, "Usage: /untrack <address>").await?;
                return Ok(());
            }
            match state.positions.close_position(chat_id.0, address) {
                Ok(Some(position)) => {
                    let text = format!(
                        "🛑 Stopped tracking {} at {}",
                        bold(&escape(&position.token_symbol)),
                        escape(&percent(position.pnl_percent())),
                    );
                    send_markdown(&bot, chat_id, text).await?;
                }
                Ok(None) => {
                    bot.send_message(chat_id, "No tracked position for that address.").await?;
                }
                Err(e) => {
                    error!("Failed to untrack {}: {}", address, e);
                    bot.send_message(chat_id, format!("❌ {}", e)).await?;
                }
            }
        }
        Command::Positions => match state.positions.list(chat_id.0) {
            Ok(positions) => send_markdown(&bot, chat_id, format_positions(&positions)).await?,
            Err(e) => {
                error!("Failed to list positions: {}", e);
                bot.send_message(chat_id, format!("❌ {}", e)).await?;
            }
        },
    }

    Ok(())
}

/// Runs the command dispatcher until the task is aborted.
pub async fn start_bot(bot: Bot, state: Arc<BotState>) {
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {}", e);
    }

    let handler = Update::filter_message()
        .filter_command::<Command>()
        .endpoint(command_handler);

    info!("Telegram command bot started");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::{PositionThresholds, PositionTracker};

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/promising", "gembot").unwrap(), Command::Promising);
        assert_eq!(
            Command::parse("/track Mint1 0.5", "gembot").unwrap(),
            Command::Track("Mint1 0.5".to_string())
        );
        assert_eq!(
            Command::parse("/untrack Mint1", "gembot").unwrap(),
            Command::Untrack("Mint1".to_string())
        );
    }

    #[test]
    fn test_parse_track_args() {
        assert_eq!(parse_track_args("Mint1").unwrap(), ("Mint1".to_string(), None));
        assert_eq!(parse_track_args(" Mint1  0.25 ").unwrap(), ("Mint1".to_string(), Some(0.25)));
        assert!(parse_track_args("").is_err());
        assert!(parse_track_args("Mint1 abc").is_err());
        assert!(parse_track_args("Mint1 -1").is_err());
        assert!(parse_track_args("Mint1 1 2").is_err());
    }

    #[test]
    fn test_format_promising() {
        let text = format_promising(&[
            ("Volume Momentum".to_string(), vec!["MintA".to_string()]),
            ("Recent Listings".to_string(), Vec::new()),
        ]);
        assert!(text.contains("*Volume Momentum*"));
        assert!(text.contains("• `MintA`"));
        assert!(text.contains("*Recent Listings*\nNone yet"));
    }

    #[test]
    fn test_format_strategies() {
        let text = format_strategies(&[StrategySummary {
            name: "High Trading Activity".to_string(),
            filter: "high trading activity",
            min_consecutive_appearances: 3,
            tracked: 12,
            promising: 1,
        }]);
        assert!(text.contains("*High Trading Activity*"));
        assert!(text.contains("Tracked: 12"));
        assert!(text.contains("Promising after: 3 sightings"));
    }

    #[test]
    fn test_format_positions() {
        assert_eq!(format_positions(&[]), "✅ No tracked positions\\.");

        let tracker = PositionTracker::temporary(PositionThresholds::default()).unwrap();
        let position = tracker.open_position(5, "MintA", "AAA", 2.0).unwrap();
        tracker.reprice(&position, 3.0).unwrap();

        let text = format_positions(&tracker.list(5).unwrap());
        assert!(text.contains("*AAA* `MintA`"));
        assert!(text.contains("Entry: $2\\.00"));
        assert!(text.contains("PnL: \\+50\\.00%"));
    }

    #[test]
    fn test_authorization() {
        let state = BotState {
            engines: Vec::new(),
            positions: Arc::new(PositionTracker::temporary(PositionThresholds::default()).unwrap()),
            prices: Arc::new(NoPrices),
            authorized_users: vec![42],
        };
        assert!(state.is_authorized(Some(42)));
        assert!(!state.is_authorized(Some(7)));
        assert!(!state.is_authorized(None));
    }

    struct NoPrices;

    #[async_trait::async_trait]
    impl crate::api::PriceSource for NoPrices {
        async fn get_price(&self, _token_address: &str) -> Result<Option<f64>, crate::error::GemHunterError> {
            Ok(None)
        }
    }
}
