use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::api::{PriceSource, TokenListSource};
use crate::discovery::engine::{LoadOutcome, StrategyEngine};
use crate::discovery::history::DEFAULT_MAX_AGE_DAYS;
use crate::error::GemHunterError;
use crate::models::DiscoveredToken;
use crate::portfolio::{PositionAlert, PositionTracker};

pub type SharedEngine = Arc<Mutex<StrategyEngine>>;

/// Where the scheduler sends what it finds.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn gem_alert(&self, token: &DiscoveredToken) -> Result<(), GemHunterError>;
    async fn position_alert(&self, alert: &PositionAlert) -> Result<(), GemHunterError>;
    async fn error_alert(&self, message: &str) -> Result<(), GemHunterError>;
}

/// Sink used when no Telegram bot is configured.
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn gem_alert(&self, token: &DiscoveredToken) -> Result<(), GemHunterError> {
        info!(
            "💎 {} promising: {} ({}) seen {} times in a row",
            token.strategy,
            token.token.display_symbol(),
            token.token.address,
            token.consecutive_appearances
        );
        Ok(())
    }

    async fn position_alert(&self, alert: &PositionAlert) -> Result<(), GemHunterError> {
        info!(
            "{} for {} ({}): PnL {:.2}%",
            alert.kind, alert.position.token_symbol, alert.position.token_address, alert.pnl_percent
        );
        Ok(())
    }

    async fn error_alert(&self, message: &str) -> Result<(), GemHunterError> {
        warn!("⚠️ {}", message);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    #[default]
    Sequential,
    Concurrent,
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "concurrent" => Ok(Self::Concurrent),
            other => Err(format!("unknown run mode '{}', expected sequential or concurrent", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub scan_interval: Duration,
    /// Pause between strategies in sequential mode.
    pub stagger: Duration,
    pub max_age_days: u32,
    pub run_mode: RunMode,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(900),
            stagger: Duration::from_secs(30),
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            run_mode: RunMode::Sequential,
        }
    }
}

struct EngineCycle {
    strategy: String,
    found: Vec<DiscoveredToken>,
    promising: HashSet<String>,
    /// Address to `first_seen` for every record left after the expiry sweep.
    tracked: HashMap<String, i64>,
}

async fn run_engine(
    engine: &SharedEngine,
    source: &dyn TokenListSource,
    scan_id: &str,
    max_age_days: u32,
) -> EngineCycle {
    let mut engine = engine.lock().await;
    let strategy = engine.name().to_string();
    let span = info_span!("discovery_cycle", strategy = %strategy, scan_id);

    async {
        let found = engine.execute(source, Some(scan_id)).await;
        engine.clean_expired_tokens(max_age_days).await;
        let promising = engine.get_promising_tokens().into_iter().collect();
        let tracked = engine
            .history()
            .tokens
            .iter()
            .map(|(address, record)| (address.clone(), record.first_seen))
            .collect();
        EngineCycle {
            strategy: strategy.clone(),
            found,
            promising,
            tracked,
        }
    }
    .instrument(span)
    .await
}

/// Drives every strategy engine on a fixed interval and forwards newly
/// promising tokens and position threshold crossings to an [`AlertSink`].
pub struct DiscoveryScheduler {
    engines: Vec<SharedEngine>,
    source: Arc<dyn TokenListSource>,
    alerts: Arc<dyn AlertSink>,
    config: SchedulerConfig,
    positions: Option<(Arc<PositionTracker>, Arc<dyn PriceSource>)>,
    /// (strategy, address) pairs already announced, with the `first_seen` of
    /// the record that was announced. Dropped once that record is gone.
    alerted: HashMap<(String, String), i64>,
}

impl DiscoveryScheduler {
    pub fn new(
        engines: Vec<SharedEngine>,
        source: Arc<dyn TokenListSource>,
        alerts: Arc<dyn AlertSink>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            engines,
            source,
            alerts,
            config,
            positions: None,
            alerted: HashMap::new(),
        }
    }

    pub fn with_positions(mut self, tracker: Arc<PositionTracker>, prices: Arc<dyn PriceSource>) -> Self {
        self.positions = Some((tracker, prices));
        self
    }

    /// Sends an error alert for every engine whose history could not be restored.
    pub async fn report_load_outcomes(&self) {
        for engine in &self.engines {
            let engine = engine.lock().await;
            if let LoadOutcome::Corrupted(reason) = engine.load_outcome() {
                let message = format!(
                    "History for {} was corrupted and has been reset: {}",
                    engine.name(),
                    reason
                );
                if let Err(e) = self.alerts.error_alert(&message).await {
                    warn!("Failed to send error alert: {}", e);
                }
            }
        }
    }

    /// Runs every engine once. Returns the tokens announced this cycle.
    pub async fn run_cycle(&mut self) -> Vec<DiscoveredToken> {
        let scan_id = Uuid::new_v4().to_string();
        let max_age_days = self.config.max_age_days;
        info!("🔍 Starting discovery scan {} over {} strategies", scan_id, self.engines.len());

        let cycles = match self.config.run_mode {
            RunMode::Sequential => {
                let mut cycles = Vec::with_capacity(self.engines.len());
                for (i, engine) in self.engines.iter().enumerate() {
                    if i > 0 && !self.config.stagger.is_zero() {
                        sleep(self.config.stagger).await;
                    }
                    cycles.push(run_engine(engine, self.source.as_ref(), &scan_id, max_age_days).await);
                }
                cycles
            }
            RunMode::Concurrent => {
                let source = self.source.as_ref();
                join_all(
                    self.engines
                        .iter()
                        .map(|engine| run_engine(engine, source, &scan_id, max_age_days)),
                )
                .await
            }
        };

        let mut announced = Vec::new();
        for cycle in cycles {
            // An expired record is gone for good; a later sighting starts a new one.
            self.alerted.retain(|(strategy, address), first_seen| {
                strategy != &cycle.strategy || cycle.tracked.get(address) == Some(first_seen)
            });

            for token in cycle.found {
                if !cycle.promising.contains(&token.token.address) {
                    continue;
                }
                let key = (cycle.strategy.clone(), token.token.address.clone());
                if self.alerted.contains_key(&key) {
                    debug!("{} already announced for {}", token.token.address, cycle.strategy);
                    continue;
                }
                let first_seen = cycle
                    .tracked
                    .get(&token.token.address)
                    .copied()
                    .unwrap_or(token.first_seen);
                self.alerted.insert(key, first_seen);
                if let Err(e) = self.alerts.gem_alert(&token).await {
                    warn!("Failed to send gem alert for {}: {}", token.token.address, e);
                }
                announced.push(token);
            }
        }

        self.check_positions().await;
        info!("Scan {} finished, {} new promising tokens", scan_id, announced.len());
        announced
    }

    /// Reprices every tracked position and forwards threshold alerts.
    pub async fn check_positions(&self) -> Vec<PositionAlert> {
        let Some((tracker, prices)) = &self.positions else {
            return Vec::new();
        };

        let positions = match tracker.all() {
            Ok(positions) => positions,
            Err(e) => {
                warn!("Failed to list tracked positions: {}", e);
                return Vec::new();
            }
        };

        let mut alerts = Vec::new();
        for position in positions {
            let price = match prices.get_price(&position.token_address).await {
                Ok(Some(price)) => price,
                Ok(None) => {
                    debug!("No price for {}", position.token_address);
                    continue;
                }
                Err(e) => {
                    warn!("Price lookup failed for {}: {}", position.token_address, e);
                    continue;
                }
            };

            match tracker.reprice(&position, price) {
                Ok(Some(alert)) => {
                    if let Err(e) = self.alerts.position_alert(&alert).await {
                        warn!("Failed to send position alert: {}", e);
                    }
                    alerts.push(alert);
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to reprice {}: {}", position.token_address, e),
            }
        }
        alerts
    }

    /// Runs a cycle every `scan_interval` until the task is cancelled.
    pub async fn run(&mut self) {
        let mut ticker = interval(self.config.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_cycle().await;
            info!("Next scan in {}s", self.config.scan_interval.as_secs());
        }
    }
}
