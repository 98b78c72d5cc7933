use serde::{Deserialize, Serialize};

/// Current layout version of [`TokenSnapshot`].
pub const SNAPSHOT_VERSION: u32 = 1;

/// Timestamps above this are treated as milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// One row of a token-list response.
///
/// Field names follow the camelCase payload keys; Birdeye's v3 snake_case
/// names are accepted as aliases.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,

    // Market Data
    #[serde(default, alias = "price_usd")]
    pub price: Option<f64>,
    #[serde(default, alias = "market_cap", alias = "mc")]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub liquidity: Option<f64>,

    // Volume & Trade Stats
    #[serde(default, alias = "volume_24h_usd", alias = "v24hUSD")]
    pub volume24h: Option<f64>,
    #[serde(default, alias = "volume_7d_usd")]
    pub volume7d: Option<f64>,
    #[serde(default, alias = "price_change_24h_percent")]
    pub price_change24h: Option<f64>,
    #[serde(default, alias = "volume_24h_change_percent")]
    pub volume_change24h: Option<f64>,
    #[serde(default, alias = "trade_24h_count", alias = "trade24h")]
    pub txns24h: Option<u64>,
    #[serde(default, alias = "holders")]
    pub holder: Option<u64>,

    #[serde(default, alias = "recent_listing_time", alias = "creation_time")]
    pub created_time: Option<i64>,
}

impl TokenPayload {
    /// Creation time in unix seconds, normalising millisecond timestamps.
    pub fn created_time_secs(&self) -> Option<i64> {
        self.created_time
            .filter(|t| *t > 0)
            .map(|t| if t > MILLIS_THRESHOLD { t / 1000 } else { t })
    }

    pub fn display_symbol(&self) -> &str {
        self.symbol
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.address)
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        TokenSnapshot {
            version: SNAPSHOT_VERSION,
            symbol: self.symbol.clone(),
            name: self.name.clone(),
            price_usd: self.price,
            liquidity: self.liquidity,
            market_cap: self.market_cap,
            volume_24h: self.volume24h,
            volume_7d: self.volume7d,
            price_change_24h: self.price_change24h,
            volume_change_24h: self.volume_change24h,
            txns_24h: self.txns24h,
            holder_count: self.holder,
            created_time: self.created_time_secs(),
        }
    }
}

/// Typed copy of the payload seen on a token's most recent sighting.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenSnapshot {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_24h: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_7d: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_change_24h: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_change_24h: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txns_24h: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_time: Option<i64>,
}

impl Default for TokenSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            symbol: None,
            name: None,
            price_usd: None,
            liquidity: None,
            market_cap: None,
            volume_24h: None,
            volume_7d: None,
            price_change_24h: None,
            volume_change_24h: None,
            txns_24h: None,
            holder_count: None,
            created_time: None,
        }
    }
}

/// A token that passed a strategy's filter in the current cycle.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredToken {
    pub strategy: String,
    pub token: TokenPayload,
    pub consecutive_appearances: u32,
    pub first_seen: i64,
    pub appearances: Vec<i64>,
}
