use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::{PriceSource, TokenListQuery, TokenListResponse, TokenListSource};
use crate::error::GemHunterError;

const BIRDEYE_BASE_URL: &str = "https://public-api.birdeye.so";
const TOKEN_LIST_ENDPOINT: &str = "/defi/v3/token/list";
const TOKEN_OVERVIEW_ENDPOINT: &str = "/defi/token_overview";
const PRICE_ENDPOINT: &str = "/defi/price";
const CHAIN: &str = "solana";

#[derive(Debug, Clone)]
pub struct BirdeyeClient {
    api_key: String,
    base_url: String,
    client: Client,
}

// --- Response Structs ---

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TokenOverviewResponse {
    pub data: Option<TokenOverviewData>,
    pub success: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TokenOverviewData {
    pub address: String,
    pub decimals: Option<u8>,
    pub symbol: Option<String>,
    pub name: Option<String>,

    pub price: Option<f64>,
    pub mc: Option<f64>,
    pub liquidity: Option<f64>,

    pub v24h_usd: Option<f64>,
    pub v24h_change_percent: Option<f64>,
    pub trade24h: Option<u64>,
    pub holder: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    data: Option<PriceData>,
    success: bool,
}

#[derive(Debug, Deserialize)]
struct PriceData {
    value: f64,
}

impl BirdeyeClient {
    pub fn new(api_key: &str) -> Result<Self> {
        Self::with_base_url(api_key, BIRDEYE_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .context("Failed to create HTTP client for Birdeye")?;

        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Fetches one page of the token list sorted and filtered per `query`.
    pub async fn fetch_token_list(&self, query: &TokenListQuery) -> Result<TokenListResponse> {
        let url = self.url(TOKEN_LIST_ENDPOINT);
        debug!("Fetching Birdeye token list sorted by {} {}", query.sort_by, query.sort_type);

        let response = self.client
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .header("x-chain", CHAIN)
            .query(&query.to_query_pairs())
            .send()
            .await
            .context("Failed to send request to Birdeye token list API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Birdeye token list API returned {}: {}", status, error_text);
        }

        let body: TokenListResponse = response
            .json()
            .await
            .context("Failed to parse Birdeye token list response")?;

        Ok(body)
    }

    /// Fetches the token overview from the /defi/token_overview endpoint.
    pub async fn get_token_overview(&self, token_address: &str) -> Result<Option<TokenOverviewData>> {
        let url = self.url(TOKEN_OVERVIEW_ENDPOINT);
        debug!("Fetching token overview from Birdeye for {}", token_address);

        let response = self.client
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .header("x-chain", CHAIN)
            .query(&[("address", token_address)])
            .send()
            .await
            .context("Failed to send request to Birdeye Token Overview API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!("Birdeye Token Overview API error for token {}: {} - {}", token_address, status, error_text);
            return Ok(None);
        }

        let response_data: TokenOverviewResponse = match response.json().await {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to parse Birdeye Token Overview API response for {}: {:?}; ignoring", token_address, e);
                return Ok(None);
            }
        };

        if !response_data.success {
            warn!("Birdeye Token Overview API reported failure for token {}", token_address);
            return Ok(None);
        }

        Ok(response_data.data)
    }

    /// USD price of a token from the /defi/price endpoint. `None` when Birdeye has no price.
    pub async fn get_price_usd(&self, token_address: &str) -> Result<Option<f64>> {
        let url = self.url(PRICE_ENDPOINT);

        let response = self.client
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .header("x-chain", CHAIN)
            .query(&[("address", token_address)])
            .send()
            .await
            .context("Failed to send price request to Birdeye API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!("Birdeye Price API error for {}: {} - {}", token_address, status, error_text);
            return Ok(None);
        }

        let response_data: PriceResponse = match response.json().await {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to parse Birdeye Price API response for {}: {:?}", token_address, e);
                return Ok(None);
            }
        };

        if !response_data.success {
            return Ok(None);
        }
        Ok(response_data.data.map(|d| d.value))
    }
}

#[async_trait]
impl TokenListSource for BirdeyeClient {
    async fn get_token_list(&self, query: &TokenListQuery) -> Result<TokenListResponse, GemHunterError> {
        self.fetch_token_list(query)
            .await
            .map_err(|e| GemHunterError::ApiError(format!("{:#}", e)))
    }
}

#[async_trait]
impl PriceSource for BirdeyeClient {
    async fn get_price(&self, token_address: &str) -> Result<Option<f64>, GemHunterError> {
        self.get_price_usd(token_address)
            .await
            .map_err(|e| GemHunterError::ApiError(format!("{:#}", e)))
    }

    async fn get_symbol(&self, token_address: &str) -> Result<Option<String>, GemHunterError> {
        let overview = self
            .get_token_overview(token_address)
            .await
            .map_err(|e| GemHunterError::ApiError(format!("{:#}", e)))?;
        Ok(overview.and_then(|data| data.symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SortType;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_token_list_sends_query_and_parses_items() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", TOKEN_LIST_ENDPOINT)
            .match_header("x-api-key", "test-key")
            .match_header("x-chain", "solana")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("sort_by".into(), "liquidity".into()),
                Matcher::UrlEncoded("sort_type".into(), "desc".into()),
                Matcher::UrlEncoded("limit".into(), "20".into()),
                Matcher::UrlEncoded("min_holder".into(), "1000".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success": true, "data": {"items": [
                {"address": "Mint1", "symbol": "ONE", "liquidity": 120000, "market_cap": 900000, "holder": 1500}
            ]}}"#)
            .create_async()
            .await;

        let client = BirdeyeClient::with_base_url("test-key", &server.url()).unwrap();
        let mut query = TokenListQuery::new("liquidity", SortType::Desc);
        query.min_holder = Some(1000);

        let response = client.get_token_list(&query).await.unwrap();
        mock.assert_async().await;

        assert!(response.success);
        let tokens = response.into_tokens();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].symbol.as_deref(), Some("ONE"));
        assert_eq!(tokens[0].market_cap, Some(900_000.0));
    }

    #[tokio::test]
    async fn test_token_list_http_error_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", TOKEN_LIST_ENDPOINT)
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let client = BirdeyeClient::with_base_url("test-key", &server.url()).unwrap();
        let query = TokenListQuery::new("liquidity", SortType::Desc);

        let err = client.get_token_list(&query).await.unwrap_err();
        assert!(matches!(err, GemHunterError::ApiError(_)));
    }

    #[tokio::test]
    async fn test_price_returns_value() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", PRICE_ENDPOINT)
            .match_query(Matcher::UrlEncoded("address".into(), "Mint1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success": true, "data": {"value": 0.0125}}"#)
            .create_async()
            .await;

        let client = BirdeyeClient::with_base_url("test-key", &server.url()).unwrap();
        let price = client.get_price("Mint1").await.unwrap();
        assert_eq!(price, Some(0.0125));
    }

    #[tokio::test]
    async fn test_price_unsuccessful_payload_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", PRICE_ENDPOINT)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success": false, "data": null}"#)
            .create_async()
            .await;

        let client = BirdeyeClient::with_base_url("test-key", &server.url()).unwrap();
        assert_eq!(client.get_price("Mint1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_symbol_from_token_overview() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", TOKEN_OVERVIEW_ENDPOINT)
            .match_query(Matcher::UrlEncoded("address".into(), "Mint1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success": true, "data": {"address": "Mint1", "symbol": "ONE", "price": 0.5, "holder": 2100}}"#)
            .create_async()
            .await;

        let client = BirdeyeClient::with_base_url("test-key", &server.url()).unwrap();
        assert_eq!(client.get_symbol("Mint1").await.unwrap().as_deref(), Some("ONE"));

        let overview = client.get_token_overview("Mint1").await.unwrap().unwrap();
        assert_eq!(overview.holder, Some(2100));
    }
}
