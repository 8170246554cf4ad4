//! Wallet balance client.
//!
//! Fetches the platform token balance for a wallet address:
//!
//! - `GET /wallet/{address}/balance` -> `{ available, staked, earned_rewards }`
//!
//! The backend also reports the legacy field names `aion_balance` and
//! `staked_amount`; both spellings are accepted.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use aion_common::{Address, PlatformBalance};

use super::{ApiError, BalanceSource, DEFAULT_BACKEND_URL, REQUEST_TIMEOUT, check_status, endpoint, http_client};

/// Response body of the balance endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletBalanceResponse {
    /// Echo of the requested address, when the backend includes it.
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(alias = "aion_balance")]
    pub available: Decimal,
    #[serde(alias = "staked_amount")]
    pub staked: Decimal,
    #[serde(alias = "earnedRewards")]
    pub earned_rewards: Decimal,
}

impl From<WalletBalanceResponse> for PlatformBalance {
    fn from(response: WalletBalanceResponse) -> Self {
        PlatformBalance::new(response.available, response.staked, response.earned_rewards)
    }
}

/// Client for the wallet balance endpoint.
pub struct WalletClient {
    http: Client,
    base_url: String,
}

impl WalletClient {
    /// Create a new wallet client.
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
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the platform balance for `address`.
    pub async fn get_balance(&self, address: Address) -> Result<PlatformBalance, ApiError> {
        let url = endpoint(&self.base_url, &format!("wallet/{}/balance", address));
        debug!(url = %url, "Fetching platform balance");

        let response = self.http.get(&url).send().await?;
        let response = check_status(response, "wallet balance").await?;

        let body: WalletBalanceResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Json(format!("Failed to parse balance response: {}", e)))?;

        Ok(body.into())
    }
}

#[async_trait]
impl BalanceSource for WalletClient {
    async fn platform_balance(&self, address: Address) -> Result<PlatformBalance, ApiError> {
        self.get_balance(address).await
    }
}
