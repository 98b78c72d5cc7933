//! Token appearance history
//!
//! Every strategy keeps one [`HistoryStore`]: a map from token address to the
//! record of when that strategy has seen the token. A token counts as
//! "consecutive" when it reappears within [`CONSECUTIVE_WINDOW_SECS`] of its
//! previous sighting; a longer gap resets the streak to 1. Records are only
//! ever removed by the expiry sweep.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::models::TokenSnapshot;

/// Maximum gap between two sightings that still extends a streak (8 hours).
pub const CONSECUTIVE_WINDOW_SECS: i64 = 8 * 60 * 60;

/// Number of appearance timestamps kept per token.
pub const MAX_APPEARANCES: usize = 10;

/// Default age after which an unseen token is dropped.
pub const DEFAULT_MAX_AGE_DAYS: u32 = 7;

const SECS_PER_DAY: i64 = 86_400;

/// Appearance record for a single token within one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppearanceRecord {
    /// First sighting by this strategy. Never changes once set.
    pub first_seen: i64,
    /// Most recent sighting.
    pub last_seen: i64,
    /// Most recent sightings, oldest first, at most [`MAX_APPEARANCES`].
    pub appearances: Vec<i64>,
    /// Length of the current streak of sightings within the window.
    pub consecutive_appearances: u32,
    /// Payload from the most recent sighting.
    #[serde(default)]
    pub last_data: TokenSnapshot,
    /// Liquidity when Recent Listings first recorded the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_liquidity: Option<f64>,
}

impl AppearanceRecord {
    fn first_sighting(snapshot: TokenSnapshot, timestamp: i64) -> Self {
        Self {
            first_seen: timestamp,
            last_seen: timestamp,
            appearances: vec![timestamp],
            consecutive_appearances: 1,
            last_data: snapshot,
            first_liquidity: None,
        }
    }

    fn record_sighting(&mut self, snapshot: TokenSnapshot, timestamp: i64) {
        let gap = timestamp - self.last_seen;
        if gap <= CONSECUTIVE_WINDOW_SECS {
            self.consecutive_appearances += 1;
        } else {
            self.consecutive_appearances = 1;
        }

        self.appearances.push(timestamp);
        if self.appearances.len() > MAX_APPEARANCES {
            let excess = self.appearances.len() - MAX_APPEARANCES;
            self.appearances.drain(..excess);
        }

        self.last_seen = timestamp;
        self.last_data = snapshot;
    }

    pub fn is_expired(&self, now: i64, max_age_days: u32) -> bool {
        now - self.last_seen > i64::from(max_age_days) * SECS_PER_DAY
    }
}

/// Per-strategy appearance history, persisted as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryStore {
    #[serde(default)]
    pub tokens: HashMap<String, AppearanceRecord>,
    #[serde(default)]
    pub last_execution_time: i64,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a sighting of `address` at `timestamp` and returns the updated record.
    pub fn track_token(
        &mut self,
        address: &str,
        snapshot: TokenSnapshot,
        timestamp: i64,
    ) -> &mut AppearanceRecord {
        match self.tokens.entry(address.to_string()) {
            Entry::Occupied(entry) => {
                let record = entry.into_mut();
                record.record_sighting(snapshot, timestamp);
                record
            }
            Entry::Vacant(entry) => entry.insert(AppearanceRecord::first_sighting(snapshot, timestamp)),
        }
    }

    /// Drops every record not seen for more than `max_age_days`. Returns how many were removed.
    pub fn clean_expired(&mut self, now: i64, max_age_days: u32) -> usize {
        let before = self.tokens.len();
        self.tokens.retain(|_, record| !record.is_expired(now, max_age_days));
        before - self.tokens.len()
    }

    /// Addresses whose streak is at least `min_consecutive`, sorted.
    pub fn promising(&self, min_consecutive: u32) -> Vec<String> {
        let mut addresses: Vec<String> = self
            .tokens
            .iter()
            .filter(|(_, record)| record.consecutive_appearances >= min_consecutive)
            .map(|(address, _)| address.clone())
            .collect();
        addresses.sort();
        addresses
    }

    pub fn get(&self, address: &str) -> Option<&AppearanceRecord> {
        self.tokens.get(address)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
