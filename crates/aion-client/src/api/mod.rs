//! AION backend API clients.
//!
//! This module provides HTTP clients for the backend endpoints the client core
//! depends on, and the traits the session and allocator consume them through.
//!
//! ## Modules
//!
//! - `wallet`: Platform token balance per wallet address
//! - `chains`: Chain assignment lookups, chain registry, migration
//! - `markets`: Market creation with a pre-computed chain tier

pub mod chains;
pub mod markets;
pub mod wallet;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use thiserror::Error;
use tracing::warn;

use aion_common::{Address, PlatformBalance};

pub use chains::{ChainClient, ChainInfo, ChainRegistry, MigrationResult, RegisteredChain};
pub use markets::{CreateMarketRequest, CreatedMarket, MarketClient, NewMarket};
pub use wallet::{WalletBalanceResponse, WalletClient};

/// Default backend base URL.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8001/api";

/// Request timeout for backend calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Header carrying the backend API key on write endpoints.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Errors that can occur when calling the backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error status.
    #[error("API error: status {status}, body: {body}")]
    ApiError { status: u16, body: String },

    /// JSON parsing failed.
    #[error("JSON parsing failed: {0}")]
    Json(String),

    /// Request rejected before sending.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Source of platform token balances.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn platform_balance(&self, address: Address) -> Result<PlatformBalance, ApiError>;
}

/// Source of already-assigned chain descriptors.
#[async_trait]
pub trait ChainInfoSource: Send + Sync {
    async fn chain_info(&self, market_id: &str) -> Result<ChainInfo, ApiError>;
}

/// Build the shared HTTP client used by backend clients.
pub(crate) fn http_client(timeout: Duration) -> Result<Client, ApiError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Attach the API key header when one is configured.
pub(crate) fn with_api_key(request: RequestBuilder, api_key: Option<&str>) -> RequestBuilder {
    match api_key {
        Some(key) => request.header(API_KEY_HEADER, key),
        None => request,
    }
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Turn a non-success response into `ApiError::ApiError`.
pub(crate) async fn check_status(response: Response, what: &str) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(
        endpoint = what,
        status = status.as_u16(),
        body = %body,
        "Backend API error"
    );
    Err(ApiError::ApiError {
        status: status.as_u16(),
        body,
    })
}

/// Validate a market identifier before it is placed in a URL path.
pub(crate) fn validate_market_id(market_id: &str) -> Result<(), ApiError> {
    if market_id.is_empty() {
        return Err(ApiError::InvalidRequest(
            "Market ID cannot be empty".to_string(),
        ));
    }
    if market_id.contains('/') || market_id.contains('?') || market_id.contains('#') {
        return Err(ApiError::InvalidRequest(format!(
            "Market ID contains reserved characters: {}",
            market_id
        )));
    }
    Ok(())
}
