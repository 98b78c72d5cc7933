//! History persistence
//!
//! Engines never touch the filesystem directly; they hold a
//! [`HistoryPersistence`] port. [`JsonFileHistory`] writes one pretty-printed
//! JSON document per strategy. Tests use an in-memory double.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::discovery::history::HistoryStore;
use crate::error::GemHunterError;

/// Outcome of reading a persisted history store.
#[derive(Debug)]
pub enum LoadResult {
    Loaded(HistoryStore),
    Corrupted(GemHunterError),
    Missing,
}

#[async_trait]
pub trait HistoryPersistence: Send + Sync {
    async fn load(&self) -> LoadResult;
    async fn save(&self, store: &HistoryStore) -> Result<(), GemHunterError>;
    /// Human-readable location, for logs.
    fn location(&self) -> String;
}

/// File name used for a strategy's history: lower-cased, spaces replaced by underscores.
pub fn history_file_name(strategy_name: &str) -> String {
    format!("{}.json", strategy_name.trim().to_lowercase().replace(' ', "_"))
}

#[derive(Debug, Clone)]
pub struct JsonFileHistory {
    path: PathBuf,
}

impl JsonFileHistory {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn for_strategy(data_dir: &Path, strategy_name: &str) -> Self {
        Self::new(data_dir.join(history_file_name(strategy_name)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn backup_corrupted(&self) {
        let backup_path = self.path.with_extension("json.bak");
        match fs::copy(&self.path, &backup_path).await {
            Ok(_) => info!("Created backup of corrupted history file at {:?}", backup_path),
            Err(e) => warn!("Failed to create backup of corrupted history file: {}", e),
        }
    }
}

#[async_trait]
impl HistoryPersistence for JsonFileHistory {
    async fn load(&self) -> LoadResult {
        let data = match fs::read_to_string(&self.path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("History file not found at {:?}, starting with an empty history.", self.path);
                return LoadResult::Missing;
            }
            Err(e) => {
                error!("Failed to read history file {:?}: {}", self.path, e);
                return LoadResult::Corrupted(GemHunterError::CorruptedHistory(format!(
                    "unreadable {:?}: {}",
                    self.path, e
                )));
            }
        };

        if data.trim().is_empty() {
            info!("History file {:?} is empty, starting with an empty history.", self.path);
            return LoadResult::Missing;
        }

        match serde_json::from_str::<HistoryStore>(&data) {
            Ok(store) => {
                info!("Loaded {} tracked tokens from {:?}", store.len(), self.path);
                LoadResult::Loaded(store)
            }
            Err(e) => {
                error!("Failed to deserialize history from {:?}: {}", self.path, e);
                self.backup_corrupted().await;
                LoadResult::Corrupted(GemHunterError::CorruptedHistory(format!(
                    "invalid JSON in {:?}: {}",
                    self.path, e
                )))
            }
        }
    }

    async fn save(&self, store: &HistoryStore) -> Result<(), GemHunterError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await.map_err(|e| {
                GemHunterError::PersistenceError(format!("failed to create {:?}: {}", dir, e))
            })?;
        }

        let data = serde_json::to_string_pretty(store)
            .map_err(|e| GemHunterError::PersistenceError(format!("failed to serialize history: {}", e)))?;

        // Write to a temp file first so a crash never leaves a half-written history.
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, data).await.map_err(|e| {
            GemHunterError::PersistenceError(format!("failed to write {:?}: {}", temp_path, e))
        })?;
        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            GemHunterError::PersistenceError(format!("failed to rename {:?} to {:?}: {}", temp_path, self.path, e))
        })?;

        debug!("Saved {} tracked tokens to {:?}", store.len(), self.path);
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
pub use memory::MemoryHistory;
