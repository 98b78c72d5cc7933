//! Discovery cycle runner
//!
//! A [`DiscoveryEngine`] couples one strategy's configuration with its
//! post-filter, its [`HistoryStore`] and the persistence port that store is
//! saved through. One call to [`DiscoveryEngine::execute`] is one discovery
//! cycle: query, track every returned token, filter, save.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::api::TokenListSource;
use crate::discovery::filters::{FilterContext, FilterVerdict, TokenFilter};
use crate::discovery::history::{AppearanceRecord, HistoryStore};
use crate::discovery::persistence::{HistoryPersistence, LoadResult};
use crate::discovery::strategy::StrategyConfig;
use crate::models::{DiscoveredToken, TokenPayload};

/// How the engine's history was obtained at startup.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded { tokens: usize },
    Missing,
    Corrupted(String),
}

pub struct DiscoveryEngine<F: TokenFilter> {
    strategy: StrategyConfig,
    filter: F,
    persistence: Arc<dyn HistoryPersistence>,
    history: HistoryStore,
    load_outcome: LoadOutcome,
}

/// Engine whose filter is chosen at runtime from the strategy's settings.
pub type StrategyEngine = DiscoveryEngine<Box<dyn TokenFilter>>;

impl StrategyEngine {
    pub async fn from_strategy(strategy: StrategyConfig, persistence: Arc<dyn HistoryPersistence>) -> Self {
        let filter = strategy.filter.clone().into_filter();
        Self::load(strategy, filter, persistence).await
    }
}

impl<F: TokenFilter> DiscoveryEngine<F> {
    /// Builds an engine, restoring its history from `persistence`.
    ///
    /// A corrupted history is not fatal: the engine starts empty and reports
    /// the problem through [`DiscoveryEngine::load_outcome`].
    pub async fn load(strategy: StrategyConfig, filter: F, persistence: Arc<dyn HistoryPersistence>) -> Self {
        let (history, load_outcome) = match persistence.load().await {
            LoadResult::Loaded(store) => {
                let tokens = store.len();
                (store, LoadOutcome::Loaded { tokens })
            }
            LoadResult::Missing => (HistoryStore::new(), LoadOutcome::Missing),
            LoadResult::Corrupted(e) => {
                error!(
                    "History for {} at {} is corrupted ({}); starting with an empty history",
                    strategy.name,
                    persistence.location(),
                    e
                );
                (HistoryStore::new(), LoadOutcome::Corrupted(e.to_string()))
            }
        };

        Self {
            strategy,
            filter,
            persistence,
            history,
            load_outcome,
        }
    }

    pub fn name(&self) -> &str {
        &self.strategy.name
    }

    pub fn strategy(&self) -> &StrategyConfig {
        &self.strategy
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.load_outcome
    }

    /// Runs one discovery cycle stamped with the current time.
    pub async fn execute(&mut self, source: &dyn TokenListSource, scan_id: Option<&str>) -> Vec<DiscoveredToken> {
        self.execute_at(source, scan_id, Utc::now().timestamp()).await
    }

    /// Runs one discovery cycle stamped with `now`.
    ///
    /// On an API failure the history is left exactly as it was and the
    /// result is empty.
    pub async fn execute_at(
        &mut self,
        source: &dyn TokenListSource,
        scan_id: Option<&str>,
        now: i64,
    ) -> Vec<DiscoveredToken> {
        let scan_id = scan_id.unwrap_or("-");
        let strategy = self.strategy.name.clone();

        let response = match source.get_token_list(&self.strategy.query).await {
            Ok(response) => response,
            Err(e) => {
                warn!(strategy = %strategy, scan_id, "Token list request failed: {}", e);
                return Vec::new();
            }
        };

        if !response.success {
            warn!(strategy = %strategy, scan_id, "Token list API reported failure");
            return Vec::new();
        }

        let tokens = response.into_tokens();
        let fetched = tokens.len();
        let mut seen_this_cycle = HashSet::new();
        let mut accepted = Vec::new();

        for token in tokens {
            if token.address.is_empty() {
                debug!(strategy = %strategy, "Skipping token without address");
                continue;
            }
            if !seen_this_cycle.insert(token.address.clone()) {
                debug!(strategy = %strategy, "Skipping duplicate {} in response", token.address);
                continue;
            }

            let previous = self.history.get(&token.address).map(|r| r.last_data.clone());
            let record = self.history.track_token(&token.address, token.snapshot(), now);

            let verdict = {
                let mut ctx = FilterContext {
                    token: &token,
                    record: &mut *record,
                    previous: previous.as_ref(),
                    now,
                };
                self.filter.evaluate(&mut ctx)
            };

            match verdict {
                FilterVerdict::Accept => {
                    debug!(
                        strategy = %strategy,
                        "✅ {} accepted ({} consecutive)",
                        token.display_symbol(),
                        record.consecutive_appearances
                    );
                    accepted.push(DiscoveredToken {
                        strategy: strategy.clone(),
                        consecutive_appearances: record.consecutive_appearances,
                        first_seen: record.first_seen,
                        appearances: record.appearances.clone(),
                        token,
                    });
                }
                FilterVerdict::Reject(reason) => {
                    debug!(strategy = %strategy, "❌ {} rejected: {}", token.display_symbol(), reason);
                }
            }
        }

        self.history.last_execution_time = now;
        self.save().await;

        info!(
            strategy = %strategy,
            scan_id,
            fetched,
            accepted = accepted.len(),
            tracked = self.history.len(),
            "Discovery cycle complete"
        );
        accepted
    }

    /// Records a single sighting without filtering. The caller persists.
    pub fn track_token(&mut self, token: &TokenPayload, timestamp: i64) -> &AppearanceRecord {
        self.history.track_token(&token.address, token.snapshot(), timestamp)
    }

    /// Removes tokens unseen for more than `max_age_days`, saving if any were removed.
    pub async fn clean_expired_tokens(&mut self, max_age_days: u32) -> usize {
        self.clean_expired_tokens_at(Utc::now().timestamp(), max_age_days).await
    }

    pub async fn clean_expired_tokens_at(&mut self, now: i64, max_age_days: u32) -> usize {
        let removed = self.history.clean_expired(now, max_age_days);
        if removed > 0 {
            info!("🧹 {}: removed {} tokens unseen for {} days", self.strategy.name, removed, max_age_days);
            self.save().await;
        }
        removed
    }

    /// Addresses that met the strategy's consecutive-appearance threshold.
    pub fn get_promising_tokens(&self) -> Vec<String> {
        self.history.promising(self.strategy.min_consecutive_appearances)
    }

    /// Persists the history. Failures are logged; in-memory state stays authoritative.
    pub async fn save(&self) -> bool {
        match self.persistence.save(&self.history).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Failed to save history for {} to {}: {}",
                    self.strategy.name,
                    self.persistence.location(),
                    e
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::filters::TradingActivityFilter;
    use crate::discovery::persistence::MemoryHistory;
    use crate::discovery::testing::{token, ScriptedSource};

    const T0: i64 = 1_700_000_000;
    const HOUR: i64 = 3600;
    const DAY: i64 = 86_400;

    async fn engine_with(
        strategy: StrategyConfig,
        persistence: Arc<MemoryHistory>,
    ) -> StrategyEngine {
        StrategyEngine::from_strategy(strategy, persistence).await
    }

    fn trading(address: &str, txns: u64) -> TokenPayload {
        TokenPayload {
            txns24h: Some(txns),
            market_cap: Some(1_000_000.0),
            ..token(address)
        }
    }

    #[tokio::test]
    async fn test_execute_tracks_all_and_returns_filtered() {
        let persistence = Arc::new(MemoryHistory::new());
        let mut engine = engine_with(StrategyConfig::high_trading_activity(), persistence.clone()).await;
        let source = ScriptedSource::new();
        source.push_tokens(vec![trading("Washed", 600), trading("Healthy", 400)]).await;

        let found = engine.execute_at(&source, Some("scan-1"), T0).await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].token.address, "Healthy");
        assert_eq!(found[0].strategy, "High Trading Activity");
        assert_eq!(found[0].consecutive_appearances, 1);
        assert_eq!(found[0].first_seen, T0);
        assert_eq!(found[0].appearances, vec![T0]);

        // Rejected tokens are still tracked.
        assert!(engine.history().get("Washed").is_some());
        assert_eq!(engine.history().last_execution_time, T0);

        let saved = persistence.stored().await.unwrap();
        assert_eq!(saved, *engine.history());
        assert_eq!(source.queries().await, vec![StrategyConfig::high_trading_activity().query]);
    }

    #[tokio::test]
    async fn test_streak_builds_across_cycles_until_promising() {
        let persistence = Arc::new(MemoryHistory::new());
        let mut engine = engine_with(StrategyConfig::high_trading_activity(), persistence).await;
        let source = ScriptedSource::new();

        for cycle in 0..3 {
            source.push_tokens(vec![trading("Gem", 100)]).await;
            let found = engine.execute_at(&source, None, T0 + cycle * 4 * HOUR).await;
            assert_eq!(found[0].consecutive_appearances, cycle as u32 + 1);
            if cycle < 2 {
                assert!(engine.get_promising_tokens().is_empty());
            }
        }
        assert_eq!(engine.get_promising_tokens(), vec!["Gem".to_string()]);

        // A long silence breaks the streak.
        source.push_tokens(vec![trading("Gem", 100)]).await;
        let found = engine.execute_at(&source, None, T0 + 8 * HOUR + 9 * HOUR).await;
        assert_eq!(found[0].consecutive_appearances, 1);
        assert!(engine.get_promising_tokens().is_empty());
    }

    #[tokio::test]
    async fn test_api_error_leaves_history_untouched() {
        let persistence = Arc::new(MemoryHistory::new());
        let mut engine = engine_with(StrategyConfig::high_trading_activity(), persistence.clone()).await;
        let source = ScriptedSource::new();
        source.push_tokens(vec![trading("Gem", 100)]).await;
        engine.execute_at(&source, None, T0).await;
        let before = engine.history().clone();
        let saves = persistence.save_count().await;

        source.push_error().await;
        assert!(engine.execute_at(&source, None, T0 + HOUR).await.is_empty());
        source.push_unsuccessful().await;
        assert!(engine.execute_at(&source, None, T0 + 2 * HOUR).await.is_empty());

        assert_eq!(*engine.history(), before);
        assert_eq!(persistence.save_count().await, saves);
    }

    #[tokio::test]
    async fn test_loads_existing_history() {
        let mut store = HistoryStore::new();
        store.track_token("Known", trading("Known", 10).snapshot(), T0);
        store.track_token("Known", trading("Known", 10).snapshot(), T0 + HOUR);
        store.last_execution_time = T0 + HOUR;
        let persistence = Arc::new(MemoryHistory::with_store(store));

        let engine = engine_with(StrategyConfig::price_momentum(), persistence).await;

        assert_eq!(engine.load_outcome(), &LoadOutcome::Loaded { tokens: 1 });
        assert_eq!(engine.get_promising_tokens(), vec!["Known".to_string()]);
        assert_eq!(engine.history().last_execution_time, T0 + HOUR);
    }

    #[tokio::test]
    async fn test_corrupted_history_starts_empty_and_is_reported() {
        let persistence = Arc::new(MemoryHistory::corrupted("truncated file"));
        let engine = engine_with(StrategyConfig::volume_momentum(), persistence).await;

        assert!(engine.history().is_empty());
        match engine.load_outcome() {
            LoadOutcome::Corrupted(msg) => assert!(msg.contains("truncated file")),
            other => panic!("expected Corrupted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_save_keeps_memory_state_and_later_save_catches_up() {
        let persistence = Arc::new(MemoryHistory::new());
        let mut engine = engine_with(StrategyConfig::high_trading_activity(), persistence.clone()).await;
        let source = ScriptedSource::new();

        persistence.set_fail_saves(true).await;
        source.push_tokens(vec![trading("First", 100)]).await;
        let found = engine.execute_at(&source, None, T0).await;
        assert_eq!(found.len(), 1);
        assert!(persistence.stored().await.is_none());

        persistence.set_fail_saves(false).await;
        source.push_tokens(vec![trading("Second", 100)]).await;
        engine.execute_at(&source, None, T0 + HOUR).await;

        let saved = persistence.stored().await.unwrap();
        assert!(saved.get("First").is_some());
        assert!(saved.get("Second").is_some());
    }

    #[tokio::test]
    async fn test_clean_expired_saves_only_when_something_removed() {
        let persistence = Arc::new(MemoryHistory::new());
        let mut engine = engine_with(StrategyConfig::high_trading_activity(), persistence.clone()).await;
        engine.track_token(&trading("Old", 1), T0);
        engine.track_token(&trading("New", 1), T0 + 6 * DAY);

        assert_eq!(engine.clean_expired_tokens_at(T0 + 7 * DAY, 7).await, 0);
        assert_eq!(persistence.save_count().await, 0);

        assert_eq!(engine.clean_expired_tokens_at(T0 + 7 * DAY + 1, 7).await, 1);
        assert_eq!(persistence.save_count().await, 1);
        assert!(engine.history().get("Old").is_none());
        assert!(engine.history().get("New").is_some());
    }

    #[tokio::test]
    async fn test_filter_compares_against_previous_cycle() {
        let persistence = Arc::new(MemoryHistory::new());
        let mut engine = engine_with(StrategyConfig::liquidity_growth(), persistence).await;
        let source = ScriptedSource::new();

        let with_holders = |holders: u64| TokenPayload {
            liquidity: Some(100_000.0),
            market_cap: Some(1_000_000.0),
            holder: Some(holders),
            ..token("Grower")
        };

        source.push_tokens(vec![with_holders(1_000)]).await;
        assert_eq!(engine.execute_at(&source, None, T0).await.len(), 1);

        source.push_tokens(vec![with_holders(1_200)]).await;
        assert_eq!(engine.execute_at(&source, None, T0 + HOUR).await.len(), 1);

        source.push_tokens(vec![with_holders(1_200)]).await;
        assert!(engine.execute_at(&source, None, T0 + 2 * HOUR).await.is_empty());
        assert_eq!(engine.history().get("Grower").unwrap().last_data.holder_count, Some(1_200));
    }

    #[tokio::test]
    async fn test_duplicate_addresses_counted_once_per_cycle() {
        let persistence = Arc::new(MemoryHistory::new());
        let mut engine = engine_with(StrategyConfig::high_trading_activity(), persistence).await;
        let source = ScriptedSource::new();
        source.push_tokens(vec![trading("Dup", 10), trading("Dup", 10), token("")]).await;

        let found = engine.execute_at(&source, None, T0).await;

        assert_eq!(found.len(), 1);
        assert_eq!(engine.history().get("Dup").unwrap().consecutive_appearances, 1);
        assert_eq!(engine.history().len(), 1);
    }

    #[tokio::test]
    async fn test_generic_engine_with_concrete_filter() {
        let persistence = Arc::new(MemoryHistory::new());
        let mut engine = DiscoveryEngine::load(
            StrategyConfig::high_trading_activity(),
            TradingActivityFilter { max_trades_per_million_mcap: 50.0 },
            persistence,
        )
        .await;
        let source = ScriptedSource::new();
        source.push_tokens(vec![trading("Busy", 100)]).await;

        assert!(engine.execute_at(&source, None, T0).await.is_empty());
        assert_eq!(engine.name(), "High Trading Activity");
    }
}
