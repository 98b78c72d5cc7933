use anyhow::{Context, Result};
use dotenv::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod bot;
mod config;
mod discovery;
mod error;
mod models;
mod portfolio;

use crate::api::birdeye::BirdeyeClient;
use crate::config::AppConfig;
use crate::discovery::scheduler::{AlertSink, DiscoveryScheduler, LogAlertSink, SharedEngine};
use crate::discovery::{JsonFileHistory, StrategyEngine};
use crate::portfolio::PositionTracker;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before the filter reads RUST_LOG
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    let strategies = config.load_strategies()?;
    info!("Loaded {} discovery strategies", strategies.len());

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("Failed to create data directory {:?}", config.data_dir))?;

    let birdeye_client = Arc::new(BirdeyeClient::new(&config.birdeye_api_key)?);
    info!("Birdeye client initialized");

    let mut engines: Vec<SharedEngine> = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        let persistence = Arc::new(JsonFileHistory::for_strategy(&config.data_dir, &strategy.name));
        let engine = StrategyEngine::from_strategy(strategy, persistence).await;
        info!("{}: tracking {} tokens", engine.name(), engine.history().len());
        engines.push(Arc::new(Mutex::new(engine)));
    }

    let positions = Arc::new(
        PositionTracker::open_at(&config.positions_path(), config.position_thresholds())
            .context("Failed to open position store")?,
    );

    let mut bot_task = None;
    let alerts: Arc<dyn AlertSink> = match &config.telegram_bot_token {
        Some(token) => {
            let bot = Bot::new(token);
            let notifications = Arc::new(bot::notification::NotificationManager::new(
                bot.clone(),
                config.authorized_users.clone(),
            ));
            if let Err(e) = notifications
                .send_status_update("Gem Hunter", "Discovery started")
                .await
            {
                warn!("Startup notification failed: {}", e);
            }

            let state = Arc::new(bot::BotState {
                engines: engines.clone(),
                positions: positions.clone(),
                prices: birdeye_client.clone(),
                authorized_users: config.authorized_users.clone(),
            });
            bot_task = Some(tokio::spawn(bot::commands::start_bot(bot, state)));
            notifications
        }
        None => {
            warn!("TELEGRAM_BOT_TOKEN not set, alerts will only be logged");
            Arc::new(LogAlertSink)
        }
    };

    let mut scheduler = DiscoveryScheduler::new(engines, birdeye_client.clone(), alerts, config.scheduler())
        .with_positions(positions.clone(), birdeye_client);
    scheduler.report_load_outcomes().await;

    info!("Starting gem discovery ({:?} mode)...", config.run_mode);
    tokio::select! {
        _ = scheduler.run() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        }
    }

    if let Some(task) = bot_task {
        task.abort();
    }
    if let Err(e) = positions.flush().await {
        error!("Failed to flush position store: {}", e);
    }
    info!("Gem Hunter stopped");

    Ok(())
}
