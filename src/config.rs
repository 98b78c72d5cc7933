use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::discovery::history::DEFAULT_MAX_AGE_DAYS;
use crate::discovery::scheduler::{RunMode, SchedulerConfig};
use crate::discovery::strategy::StrategyConfig;
use crate::portfolio::PositionThresholds;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub birdeye_api_key: String,
    pub telegram_bot_token: Option<String>,
    pub authorized_users: Vec<i64>, // Populated from TELEGRAM_ADMIN_USER_ID

    pub data_dir: PathBuf,
    pub scan_interval_secs: u64,
    pub strategy_stagger_secs: u64,
    pub history_max_age_days: u32,
    pub run_mode: RunMode,

    pub position_take_profit_percent: f64,
    pub position_stop_loss_percent: f64,

    pub strategies_file: Option<PathBuf>,
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Failed to parse {}='{}': {}", key, raw, e)),
        _ => Ok(default),
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `load` uses the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let birdeye_api_key =
            non_empty(&lookup, "BIRDEYE_API_KEY").context("BIRDEYE_API_KEY not set in environment")?;

        let authorized_users = match non_empty(&lookup, "TELEGRAM_ADMIN_USER_ID") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| {
                    id.parse::<i64>()
                        .with_context(|| format!("Failed to parse TELEGRAM_ADMIN_USER_ID entry '{}'", id))
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let config = Self {
            birdeye_api_key,
            telegram_bot_token: non_empty(&lookup, "TELEGRAM_BOT_TOKEN"),
            authorized_users,
            data_dir: non_empty(&lookup, "DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            scan_interval_secs: parse_or(&lookup, "SCAN_INTERVAL_SECS", 900)?,
            strategy_stagger_secs: parse_or(&lookup, "STRATEGY_STAGGER_SECS", 30)?,
            history_max_age_days: parse_or(&lookup, "HISTORY_MAX_AGE_DAYS", DEFAULT_MAX_AGE_DAYS)?,
            run_mode: parse_or(&lookup, "RUN_MODE", RunMode::Sequential)?,
            position_take_profit_percent: parse_or(&lookup, "POSITION_TAKE_PROFIT_PERCENT", 50.0)?,
            position_stop_loss_percent: parse_or(&lookup, "POSITION_STOP_LOSS_PERCENT", 20.0)?,
            strategies_file: non_empty(&lookup, "STRATEGIES_FILE").map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scan_interval_secs == 0 {
            bail!("SCAN_INTERVAL_SECS must be greater than zero");
        }
        if self.history_max_age_days == 0 {
            bail!("HISTORY_MAX_AGE_DAYS must be at least 1");
        }
        if !(self.position_take_profit_percent > 0.0) {
            bail!("POSITION_TAKE_PROFIT_PERCENT must be positive");
        }
        if !(self.position_stop_loss_percent > 0.0 && self.position_stop_loss_percent < 100.0) {
            bail!("POSITION_STOP_LOSS_PERCENT must be between 0 and 100");
        }
        Ok(())
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            scan_interval: Duration::from_secs(self.scan_interval_secs),
            stagger: Duration::from_secs(self.strategy_stagger_secs),
            max_age_days: self.history_max_age_days,
            run_mode: self.run_mode,
        }
    }

    pub fn position_thresholds(&self) -> PositionThresholds {
        PositionThresholds {
            take_profit_percent: self.position_take_profit_percent,
            stop_loss_percent: self.position_stop_loss_percent,
        }
    }

    pub fn positions_path(&self) -> PathBuf {
        self.data_dir.join("positions")
    }

    /// The configured strategies file, or the built-in presets.
    pub fn load_strategies(&self) -> Result<Vec<StrategyConfig>> {
        match &self.strategies_file {
            Some(path) => load_strategies_file(path),
            None => Ok(StrategyConfig::defaults()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StrategiesFile {
    strategies: Vec<StrategyConfig>,
}

/// Reads strategies from a TOML, JSON or YAML file. `GEM__...` environment
/// variables override file values.
pub fn load_strategies_file(path: &Path) -> Result<Vec<StrategyConfig>> {
    let file: StrategiesFile = ::config::Config::builder()
        .add_source(::config::File::from(path))
        .add_source(::config::Environment::with_prefix("GEM").separator("__"))
        .build()
        .with_context(|| format!("Failed to read strategies file {:?}", path))?
        .try_deserialize()
        .with_context(|| format!("Invalid strategies file {:?}", path))?;

    if file.strategies.is_empty() {
        bail!("Strategies file {:?} defines no strategies", path);
    }

    let mut history_files = HashSet::new();
    for strategy in &file.strategies {
        strategy
            .validate()
            .with_context(|| format!("Invalid strategy in {:?}", path))?;
        if !history_files.insert(strategy.history_file_name()) {
            bail!(
                "Strategy '{}' in {:?} would share a history file with another strategy",
                strategy.name,
                path
            );
        }
    }
    Ok(file.strategies)
}
