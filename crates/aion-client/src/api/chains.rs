//! Chain assignment client.
//!
//! ## Endpoints
//!
//! - `GET /chain/market/{market_id}` - Chain already assigned to a market
//! - `GET /chains` - Main chain, dedicated chains and backend thresholds
//! - `POST /chain/market/{market_id}/migrate` - Move a grown market to a dedicated chain
//!
//! Migration is a write endpoint and carries `X-API-Key` when a key is set.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use aion_common::{AllocationThresholds, ChainTier, MarketAllocationInput};

use super::{
    ApiError, ChainInfoSource, DEFAULT_BACKEND_URL, REQUEST_TIMEOUT, check_status, endpoint,
    http_client, validate_market_id, with_api_key,
};

/// Descriptor of a provisioned chain for a market.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChainInfo {
    /// Market the chain serves.
    #[serde(default)]
    pub market_id: Option<String>,
    /// Tier the chain was provisioned as.
    #[serde(alias = "type")]
    pub tier: ChainTier,
    /// Chain identifier on the backend network.
    #[serde(alias = "chainId")]
    pub chain_id: String,
    /// Application deployed on the chain, if any.
    #[serde(default, alias = "appId")]
    pub app_id: Option<String>,
}

impl ChainInfo {
    pub fn label(&self) -> &'static str {
        self.tier.label()
    }
}

/// The backend answers either with the bare descriptor or wrapped with the
/// market id alongside it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChainInfoResponse {
    Wrapped {
        market_id: String,
        chain_info: ChainInfo,
    },
    Flat(ChainInfo),
}

impl ChainInfoResponse {
    fn into_info(self, requested: &str) -> ChainInfo {
        let (market_id, mut info) = match self {
            ChainInfoResponse::Wrapped {
                market_id,
                chain_info,
            } => (market_id, chain_info),
            ChainInfoResponse::Flat(info) => (requested.to_string(), info),
        };
        if info.market_id.is_none() {
            info.market_id = Some(market_id);
        }
        info
    }
}

/// A chain known to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisteredChain {
    #[serde(default)]
    pub market_id: Option<String>,
    #[serde(alias = "chainId")]
    pub chain_id: String,
    #[serde(default, alias = "appId")]
    pub app_id: Option<String>,
    #[serde(alias = "type")]
    pub tier: ChainTier,
}

/// Overview of all active chains.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChainRegistry {
    pub main_chain: RegisteredChain,
    #[serde(default)]
    pub dedicated_chains: Vec<RegisteredChain>,
    /// Thresholds the backend allocates with.
    pub thresholds: AllocationThresholds,
}

/// Outcome of a migration request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MigrationResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub migrated: bool,
    #[serde(default, alias = "chainId")]
    pub chain_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Client for chain assignment endpoints.
pub struct ChainClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ChainClient {
    /// Create a new chain client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Optional backend URL. Defaults to the local backend.
    pub fn new(base_url: Option<String>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
            api_key: None,
        })
    }

    /// Send `key` on migration requests.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    /// Get the chain already assigned to a market.
    pub async fn get_chain_info(&self, market_id: &str) -> Result<ChainInfo, ApiError> {
        validate_market_id(market_id)?;

        let url = endpoint(&self.base_url, &format!("chain/market/{}", market_id));
        debug!(url = %url, "Fetching chain info");

        let response = self.http.get(&url).send().await?;
        let response = check_status(response, "chain info").await?;

        let body: ChainInfoResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Json(format!("Failed to parse chain info response: {}", e)))?;

        let info = body.into_info(market_id);
        debug!(
            market_id = %market_id,
            tier = %info.tier,
            chain_id = %info.chain_id,
            "Chain info fetched"
        );
        Ok(info)
    }

    /// Get the backend's chain registry.
    pub async fn get_chains(&self) -> Result<ChainRegistry, ApiError> {
        let url = endpoint(&self.base_url, "chains");
        let response = self.http.get(&url).send().await?;
        let response = check_status(response, "chains").await?;

        response
            .json()
            .await
            .map_err(|e| ApiError::Json(format!("Failed to parse chain registry: {}", e)))
    }

    /// Ask the backend to move a market to a dedicated chain.
    pub async fn migrate(
        &self,
        market_id: &str,
        input: &MarketAllocationInput,
    ) -> Result<MigrationResult, ApiError> {
        validate_market_id(market_id)?;

        let url = endpoint(&self.base_url, &format!("chain/market/{}/migrate", market_id));
        let response = with_api_key(self.http.post(&url), self.api_key.as_deref())
            .query(&[
                ("current_stake", input.total_stake.to_string()),
                ("participant_count", input.participant_count.to_string()),
            ])
            .send()
            .await?;
        let response = check_status(response, "chain migrate").await?;

        let result: MigrationResult = response
            .json()
            .await
            .map_err(|e| ApiError::Json(format!("Failed to parse migration response: {}", e)))?;

        info!(
            market_id = %market_id,
            migrated = result.migrated,
            chain_id = ?result.chain_id,
            "Market migration requested"
        );
        Ok(result)
    }
}

#[async_trait]
impl ChainInfoSource for ChainClient {
    async fn chain_info(&self, market_id: &str) -> Result<ChainInfo, ApiError> {
        self.get_chain_info(market_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_get_chain_info_flat() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/chain/market/m-42")
            .with_status(200)
            .with_body(r#"{"tier": "dedicated", "chain_id": "e476187f"}"#)
            .create_async()
            .await;

        let client = ChainClient::new(Some(server.url())).unwrap();
        let info = client.get_chain_info("m-42").await.unwrap();

        assert_eq!(info.tier, ChainTier::Dedicated);
        assert_eq!(info.chain_id, "e476187f");
        assert_eq!(info.market_id.as_deref(), Some("m-42"));
        assert_eq!(info.label(), "Dedicated Chain");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_chain_info_wrapped() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/chain/market/m-7")
            .with_status(200)
            .with_body(
                r#"{
                    "market_id": "m-7",
                    "chain_info": {"type": "shared", "chain_id": "aa01", "app_id": "app-9"}
                }"#,
            )
            .create_async()
            .await;

        let client = ChainClient::new(Some(server.url())).unwrap();
        let info = client.get_chain_info("m-7").await.unwrap();

        assert_eq!(info.tier, ChainTier::Shared);
        assert_eq!(info.app_id.as_deref(), Some("app-9"));
        assert_eq!(info.market_id.as_deref(), Some("m-7"));
    }

    #[tokio::test]
    async fn test_get_chain_info_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/chain/market/missing")
            .with_status(404)
            .with_body("Market not found")
            .create_async()
            .await;

        let client = ChainClient::new(Some(server.url())).unwrap();
        assert!(matches!(
            client.get_chain_info("missing").await,
            Err(ApiError::ApiError { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_get_chain_info_empty_id_skips_request() {
        let client = ChainClient::new(Some("http://127.0.0.1:9".to_string())).unwrap();
        assert!(matches!(
            client.get_chain_info("").await,
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_get_chains() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/chains")
            .with_status(200)
            .with_body(
                r#"{
                    "main_chain": {"chain_id": "default", "app_id": "", "type": "main"},
                    "dedicated_chains": [
                        {"market_id": "m-1", "chain_id": "c1", "type": "dedicated"}
                    ],
                    "thresholds": {"high_value": 10000, "high_volume": 100}
                }"#,
            )
            .create_async()
            .await;

        let client = ChainClient::new(Some(server.url())).unwrap();
        let registry = client.get_chains().await.unwrap();

        assert_eq!(registry.main_chain.tier, ChainTier::Main);
        assert_eq!(registry.dedicated_chains.len(), 1);
        assert_eq!(registry.dedicated_chains[0].market_id.as_deref(), Some("m-1"));
        assert_eq!(registry.thresholds.high_value_stake, dec!(10000));
        assert_eq!(registry.thresholds.high_volume_participants, 100);
    }

    #[tokio::test]
    async fn test_migrate_sends_activity() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chain/market/m-3/migrate")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("current_stake".into(), "12000".into()),
                Matcher::UrlEncoded("participant_count".into(), "40".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"success": true, "migrated": true, "chain_id": "d9"}"#)
            .create_async()
            .await;

        let client = ChainClient::new(Some(server.url())).unwrap();
        let result = client
            .migrate("m-3", &MarketAllocationInput::new(dec!(12000), 40))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.migrated);
        assert_eq!(result.chain_id.as_deref(), Some("d9"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_migrate_sends_api_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chain/market/m-4/migrate")
            .match_query(Matcher::Any)
            .match_header("x-api-key", "s3cret")
            .with_status(200)
            .with_body(r#"{"success": true, "migrated": true, "chain_id": "d10"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = ChainClient::new(Some(server.url()))
            .unwrap()
            .with_api_key(Some("s3cret".to_string()));
        let result = client
            .migrate("m-4", &MarketAllocationInput::new(dec!(20000), 3))
            .await
            .unwrap();

        assert_eq!(result.chain_id.as_deref(), Some("d10"));
        mock.assert_async().await;
    }
}
