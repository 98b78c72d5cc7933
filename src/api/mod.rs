pub mod birdeye;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GemHunterError;
use crate::models::TokenPayload;

/// Default page size for token-list queries.
pub const DEFAULT_LIST_LIMIT: u32 = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortType {
    Asc,
    #[default]
    Desc,
}

impl fmt::Display for SortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

fn default_limit() -> u32 {
    DEFAULT_LIST_LIMIT
}

/// Parameters of a token-list query: sort order, page size and optional floors.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TokenListQuery {
    pub sort_by: String,
    #[serde(default)]
    pub sort_type: SortType,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub min_liquidity: Option<f64>,
    #[serde(default)]
    pub min_volume_24h_usd: Option<f64>,
    #[serde(default)]
    pub min_trade_24h_count: Option<u64>,
    #[serde(default)]
    pub min_holder: Option<u64>,
    #[serde(default)]
    pub min_market_cap: Option<f64>,
}

impl TokenListQuery {
    pub fn new(sort_by: &str, sort_type: SortType) -> Self {
        Self {
            sort_by: sort_by.to_string(),
            sort_type,
            limit: DEFAULT_LIST_LIMIT,
            min_liquidity: None,
            min_volume_24h_usd: None,
            min_trade_24h_count: None,
            min_holder: None,
            min_market_cap: None,
        }
    }

    /// Query-string pairs; unset floors are omitted.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("sort_by", self.sort_by.clone()),
            ("sort_type", self.sort_type.to_string()),
            ("limit", self.limit.to_string()),
        ];
        if let Some(v) = self.min_liquidity {
            pairs.push(("min_liquidity", v.to_string()));
        }
        if let Some(v) = self.min_volume_24h_usd {
            pairs.push(("min_volume_24h_usd", v.to_string()));
        }
        if let Some(v) = self.min_trade_24h_count {
            pairs.push(("min_trade_24h_count", v.to_string()));
        }
        if let Some(v) = self.min_holder {
            pairs.push(("min_holder", v.to_string()));
        }
        if let Some(v) = self.min_market_cap {
            pairs.push(("min_market_cap", v.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TokenListResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<TokenListData>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TokenListData {
    #[serde(default, alias = "items")]
    pub tokens: Vec<TokenPayload>,
}

impl TokenListResponse {
    #[cfg(test)]
    pub fn ok(tokens: Vec<TokenPayload>) -> Self {
        Self {
            success: true,
            data: Some(TokenListData { tokens }),
        }
    }

    #[cfg(test)]
    pub fn failed() -> Self {
        Self {
            success: false,
            data: None,
        }
    }

    pub fn into_tokens(self) -> Vec<TokenPayload> {
        self.data.map(|d| d.tokens).unwrap_or_default()
    }
}

/// Market-data collaborator consumed by the discovery engine.
#[async_trait]
pub trait TokenListSource: Send + Sync {
    async fn get_token_list(&self, query: &TokenListQuery) -> Result<TokenListResponse, GemHunterError>;
}

/// Spot USD price lookup, used to reprice tracked positions.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn get_price(&self, token_address: &str) -> Result<Option<f64>, GemHunterError>;

    async fn get_symbol(&self, _token_address: &str) -> Result<Option<String>, GemHunterError> {
        Ok(None)
    }
}
