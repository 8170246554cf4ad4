//! Market creation client.
//!
//! - `POST /markets` - Create a market on the tier the client classified it as
//!
//! Market creation is a write endpoint. When the backend enforces an API key,
//! configure it with `with_api_key` and it is sent as `X-API-Key`.
//!
//! The tier is computed client-side by the chain allocator from the estimated
//! stake and participant count, so the backend provisions the matching chain
//! resource up front.

use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use aion_common::{ChainTier, MarketAllocationInput};

use super::{
    ApiError, DEFAULT_BACKEND_URL, REQUEST_TIMEOUT, check_status, endpoint, http_client,
    validate_market_id, with_api_key,
};

/// A market the user wants to create, before tier classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMarket {
    pub market_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    /// Event resolution time (Unix seconds).
    pub event_date: i64,
    /// Expected total stake once the market is live.
    pub estimated_stake: Decimal,
    /// Expected number of participants.
    pub estimated_participants: u64,
}

impl NewMarket {
    /// Economic activity used for classification.
    pub fn allocation_input(&self) -> MarketAllocationInput {
        MarketAllocationInput::new(self.estimated_stake, self.estimated_participants)
    }
}

/// Body of `POST /markets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateMarketRequest {
    pub market_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub event_date: i64,
    pub estimated_stake: Decimal,
    pub estimated_participants: u64,
    pub tier: ChainTier,
}

impl CreateMarketRequest {
    pub fn new(market: NewMarket, tier: ChainTier) -> Self {
        Self {
            market_id: market.market_id,
            title: market.title,
            description: market.description,
            category: market.category,
            event_date: market.event_date,
            estimated_stake: market.estimated_stake,
            estimated_participants: market.estimated_participants,
            tier,
        }
    }
}

/// Backend answer to a market creation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedMarket {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub market_id: Option<String>,
    #[serde(default, alias = "type")]
    pub tier: Option<ChainTier>,
    #[serde(default, alias = "chainId")]
    pub chain_id: Option<String>,
}

/// Client for market creation.
pub struct MarketClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl MarketClient {
    /// Create a new market client.
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

    /// Send `key` on market creation.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    /// Submit a classified market for creation.
    pub async fn create_market(&self, request: &CreateMarketRequest) -> Result<CreatedMarket, ApiError> {
        validate_market_id(&request.market_id)?;
        if request.title.trim().is_empty() {
            return Err(ApiError::InvalidRequest("Title cannot be empty".to_string()));
        }

        let url = endpoint(&self.base_url, "markets");
        let response = with_api_key(self.http.post(&url), self.api_key.as_deref())
            .json(request)
            .send()
            .await?;
        let response = check_status(response, "create market").await?;

        let created: CreatedMarket = response
            .json()
            .await
            .map_err(|e| ApiError::Json(format!("Failed to parse create market response: {}", e)))?;

        info!(
            market_id = %request.market_id,
            tier = %request.tier,
            chain_id = ?created.chain_id,
            "Market created"
        );
        Ok(created)
    }
}
