use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::GemHunterError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AlertKind {
    TakeProfit,
    StopLoss,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TakeProfit => write!(f, "Take Profit"),
            Self::StopLoss => write!(f, "Stop Loss"),
        }
    }
}

/// A token a chat asked us to watch, with the price it was entered at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedPosition {
    pub id: String,
    pub chat_id: i64,
    pub token_address: String,
    pub token_symbol: String,
    pub entry_price_usd: f64,
    pub current_price_usd: f64,
    pub highest_price_usd: f64,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last threshold alert sent for this position. Each kind fires once.
    #[serde(default)]
    pub last_alert: Option<AlertKind>,
}

impl TrackedPosition {
    pub fn pnl_percent(&self) -> f64 {
        pnl_percent(self.entry_price_usd, self.current_price_usd)
    }
}

fn pnl_percent(entry: f64, current: f64) -> f64 {
    (current - entry) / entry * 100.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionAlert {
    pub position: TrackedPosition,
    pub kind: AlertKind,
    pub pnl_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionThresholds {
    pub take_profit_percent: f64,
    pub stop_loss_percent: f64,
}

impl Default for PositionThresholds {
    fn default() -> Self {
        Self {
            take_profit_percent: 50.0,
            stop_loss_percent: 20.0,
        }
    }
}

impl PositionThresholds {
    fn crossed(&self, pnl_percent: f64) -> Option<AlertKind> {
        if pnl_percent >= self.take_profit_percent {
            Some(AlertKind::TakeProfit)
        } else if pnl_percent <= -self.stop_loss_percent {
            Some(AlertKind::StopLoss)
        } else {
            None
        }
    }
}

/// Watched positions keyed by `<chat_id>/<address>` in an embedded sled tree.
pub struct PositionTracker {
    db: sled::Db,
    thresholds: PositionThresholds,
}

fn db_error(e: sled::Error) -> GemHunterError {
    GemHunterError::PositionError(format!("position store: {}", e))
}

impl PositionTracker {
    pub fn open_at(path: &Path, thresholds: PositionThresholds) -> Result<Self, GemHunterError> {
        let db = sled::open(path).map_err(db_error)?;
        info!("Opened position store at {:?} ({} positions)", path, db.len());
        Ok(Self { db, thresholds })
    }

    /// Store that lives only as long as the tracker.
    #[cfg(test)]
    pub fn temporary(thresholds: PositionThresholds) -> Result<Self, GemHunterError> {
        let db = sled::Config::new().temporary(true).open().map_err(db_error)?;
        Ok(Self { db, thresholds })
    }

    fn key(chat_id: i64, address: &str) -> String {
        format!("{}/{}", chat_id, address)
    }

    fn write(&self, position: &TrackedPosition) -> Result<(), GemHunterError> {
        let value = serde_json::to_vec(position)
            .map_err(|e| GemHunterError::PositionError(format!("failed to serialize position: {}", e)))?;
        self.db
            .insert(Self::key(position.chat_id, &position.token_address), value)
            .map_err(db_error)?;
        Ok(())
    }

    fn decode(value: &[u8]) -> Option<TrackedPosition> {
        match serde_json::from_slice(value) {
            Ok(position) => Some(position),
            Err(e) => {
                warn!("Skipping unreadable position entry: {}", e);
                None
            }
        }
    }

    fn collect(iter: sled::Iter) -> Result<Vec<TrackedPosition>, GemHunterError> {
        let mut positions = Vec::new();
        for entry in iter {
            let (_, value) = entry.map_err(db_error)?;
            if let Some(position) = Self::decode(&value) {
                positions.push(position);
            }
        }
        positions.sort_by(|a, b| a.opened_at.cmp(&b.opened_at));
        Ok(positions)
    }

    /// Starts watching `address` for `chat_id`, replacing any existing position.
    pub fn open_position(
        &self,
        chat_id: i64,
        address: &str,
        symbol: &str,
        entry_price_usd: f64,
    ) -> Result<TrackedPosition, GemHunterError> {
        if address.trim().is_empty() {
            return Err(GemHunterError::PositionError("token address must not be empty".to_string()));
        }
        if !entry_price_usd.is_finite() || entry_price_usd <= 0.0 {
            return Err(GemHunterError::PositionError(format!(
                "entry price must be positive, got {}",
                entry_price_usd
            )));
        }

        let now = Utc::now();
        let position = TrackedPosition {
            id: Uuid::new_v4().to_string(),
            chat_id,
            token_address: address.to_string(),
            token_symbol: symbol.to_string(),
            entry_price_usd,
            current_price_usd: entry_price_usd,
            highest_price_usd: entry_price_usd,
            opened_at: now,
            updated_at: now,
            last_alert: None,
        };
        self.write(&position)?;
        info!("Tracking {} for chat {} at ${:.8}", symbol, chat_id, entry_price_usd);
        Ok(position)
    }

    pub fn close_position(&self, chat_id: i64, address: &str) -> Result<Option<TrackedPosition>, GemHunterError> {
        let removed = self.db.remove(Self::key(chat_id, address)).map_err(db_error)?;
        Ok(removed.and_then(|value| Self::decode(&value)))
    }

    pub fn list(&self, chat_id: i64) -> Result<Vec<TrackedPosition>, GemHunterError> {
        Self::collect(self.db.scan_prefix(format!("{}/", chat_id)))
    }

    pub fn all(&self) -> Result<Vec<TrackedPosition>, GemHunterError> {
        Self::collect(self.db.iter())
    }

    /// Records a new price for `position`. Returns an alert the first time the
    /// PnL crosses a threshold of a different kind than the last alert sent.
    pub fn reprice(&self, position: &TrackedPosition, price_usd: f64) -> Result<Option<PositionAlert>, GemHunterError> {
        let key = Self::key(position.chat_id, &position.token_address);
        // Re-read so a position closed since the caller listed it is not resurrected.
        let mut current = match self.db.get(&key).map_err(db_error)? {
            Some(value) => match Self::decode(&value) {
                Some(p) => p,
                None => return Ok(None),
            },
            None => {
                debug!("Position {} closed before repricing", key);
                return Ok(None);
            }
        };

        current.current_price_usd = price_usd;
        if price_usd > current.highest_price_usd {
            current.highest_price_usd = price_usd;
        }
        current.updated_at = Utc::now();

        let pnl = current.pnl_percent();
        let alert = match self.thresholds.crossed(pnl) {
            Some(kind) if current.last_alert != Some(kind) => {
                info!("{} hit for {}: PnL {:.2}%", kind, current.token_symbol, pnl);
                current.last_alert = Some(kind);
                Some(kind)
            }
            _ => None,
        };

        self.write(&current)?;
        Ok(alert.map(|kind| PositionAlert {
            position: current,
            kind,
            pnl_percent: pnl,
        }))
    }

    pub async fn flush(&self) -> Result<(), GemHunterError> {
        self.db.flush_async().await.map_err(db_error)?;
        Ok(())
    }
}
