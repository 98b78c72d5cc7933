use thiserror::Error;

#[derive(Debug, Error)]
pub enum GemHunterError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Corrupted history: {0}")]
    CorruptedHistory(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Position error: {0}")]
    PositionError(String),

    #[error("Telegram error: {0}")]
    TelegramError(String),
}
