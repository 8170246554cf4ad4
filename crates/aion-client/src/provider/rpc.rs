//! JSON-RPC wallet provider.
//!
//! Talks to a wallet that exposes the EIP-1193 request surface over HTTP
//! JSON-RPC (a local signer daemon, a wallet bridge, or a dev node with
//! unlocked accounts).
//!
//! ## Methods
//!
//! - `eth_requestAccounts` - prompt the user to expose accounts
//! - `eth_accounts` - accounts already authorized (no prompt)
//! - `eth_getBalance` - native balance in wei
//! - `eth_chainId` - current network
//!
//! HTTP has no push channel, so `accountsChanged` / `chainChanged` are
//! synthesized by polling `eth_accounts` and `eth_chainId` while at least one
//! listener is registered.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use aion_common::{Address, ChainId, U256};

use super::{
    EventSink, ListenerId, ListenerRegistry, ProviderError, ProviderEvent, USER_REJECTED_CODE,
    WalletProvider,
};

/// Default wallet RPC endpoint.
pub const DEFAULT_PROVIDER_URL: &str = "http://localhost:8545";

/// Configuration for the RPC wallet provider.
#[derive(Debug, Clone)]
pub struct RpcWalletProviderConfig {
    /// Wallet JSON-RPC endpoint.
    pub url: String,
    /// Per-request timeout. Prompts wait on the user, so keep this generous.
    pub request_timeout: Duration,
    /// How often to poll for account and network changes.
    pub poll_interval: Duration,
}

impl Default for RpcWalletProviderConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PROVIDER_URL.to_string(),
            request_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    #[serde(default)]
    message: String,
}

/// State shared between the provider and its poller task.
struct RpcShared {
    http: Client,
    url: String,
    next_id: AtomicU64,
    listeners: ListenerRegistry,
}

impl RpcShared {
    async fn call(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Transport(format!(
                "{} returned HTTP {}",
                method,
                status.as_u16()
            )));
        }

        let response: RpcResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transport(format!("invalid JSON-RPC response: {}", e)))?;

        if let Some(err) = response.error {
            if err.code == USER_REJECTED_CODE {
                return Err(ProviderError::UserRejected);
            }
            return Err(ProviderError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn account_list(&self, method: &str) -> Result<Vec<Address>, ProviderError> {
        let value = self.call(method, json!([])).await?;
        parse_accounts(value)
    }

    async fn chain_id(&self) -> Result<ChainId, ProviderError> {
        let value = self.call("eth_chainId", json!([])).await?;
        let hex = value
            .as_str()
            .ok_or_else(|| ProviderError::Transport("eth_chainId result is not a string".to_string()))?;
        hex.parse::<ChainId>()
            .map_err(|e| ProviderError::Transport(e.to_string()))
    }
}

fn parse_accounts(value: Value) -> Result<Vec<Address>, ProviderError> {
    let raw: Vec<String> = serde_json::from_value(value)
        .map_err(|e| ProviderError::Transport(format!("invalid account list: {}", e)))?;
    raw.iter()
        .map(|s| {
            s.parse::<Address>()
                .map_err(|e| ProviderError::Transport(format!("invalid address {}: {}", s, e)))
        })
        .collect()
}

/// Wallet provider backed by HTTP JSON-RPC.
pub struct RpcWalletProvider {
    shared: Arc<RpcShared>,
    poll_interval: Duration,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl RpcWalletProvider {
    /// Create a provider for the configured endpoint.
    pub fn new(config: RpcWalletProviderConfig) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            shared: Arc::new(RpcShared {
                http,
                url: config.url,
                next_id: AtomicU64::new(1),
                listeners: ListenerRegistry::new(),
            }),
            poll_interval: config.poll_interval,
            poller: Mutex::new(None),
        })
    }

    /// Endpoint this provider talks to.
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    fn ensure_poller(&self) {
        let mut poller = self.poller.lock();
        if poller.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available, wallet events will not be polled");
            return;
        };

        let shared = Arc::clone(&self.shared);
        let interval = self.poll_interval;
        *poller = Some(runtime.spawn(poll_wallet(shared, interval)));
    }

    fn stop_poller(&self) {
        if let Some(handle) = self.poller.lock().take() {
            handle.abort();
            debug!("Wallet event poller stopped");
        }
    }
}

/// Poll the wallet and emit events for observed changes.
///
/// Exits once no listeners remain.
async fn poll_wallet(shared: Arc<RpcShared>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    let mut last_accounts: Option<Vec<Address>> = None;
    let mut last_chain: Option<ChainId> = None;

    info!(url = %shared.url, interval_ms = interval.as_millis() as u64, "Wallet event poller started");

    loop {
        ticker.tick().await;
        if shared.listeners.is_empty() {
            break;
        }

        match shared.account_list("eth_accounts").await {
            Ok(accounts) => {
                if let Some(previous) = &last_accounts
                    && *previous != accounts
                {
                    shared
                        .listeners
                        .emit(&ProviderEvent::AccountsChanged(accounts.clone()));
                }
                last_accounts = Some(accounts);
            }
            Err(e) => debug!(error = %e, "eth_accounts poll failed"),
        }

        match shared.chain_id().await {
            Ok(chain) => {
                if let Some(previous) = last_chain
                    && previous != chain
                {
                    shared.listeners.emit(&ProviderEvent::ChainChanged(chain));
                }
                last_chain = Some(chain);
            }
            Err(e) => debug!(error = %e, "eth_chainId poll failed"),
        }
    }

    debug!("Wallet event poller exiting, no listeners");
}

#[async_trait]
impl WalletProvider for RpcWalletProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let accounts = self.shared.account_list("eth_requestAccounts").await?;
        if accounts.is_empty() {
            return Err(ProviderError::NoAccounts);
        }
        Ok(accounts)
    }

    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.shared.account_list("eth_accounts").await
    }

    async fn get_address(&self) -> Result<Address, ProviderError> {
        self.accounts()
            .await?
            .first()
            .copied()
            .ok_or(ProviderError::NoAccounts)
    }

    async fn get_balance(&self, address: Address) -> Result<U256, ProviderError> {
        let value = self
            .shared
            .call("eth_getBalance", json!([address.to_string(), "latest"]))
            .await?;
        let hex = value.as_str().ok_or_else(|| {
            ProviderError::Transport("eth_getBalance result is not a string".to_string())
        })?;
        hex.parse::<U256>()
            .map_err(|e| ProviderError::Transport(format!("invalid balance {}: {}", hex, e)))
    }

    async fn get_network(&self) -> Result<ChainId, ProviderError> {
        self.shared.chain_id().await
    }

    fn add_listener(&self, sink: EventSink) -> ListenerId {
        let id = self.shared.listeners.add(sink);
        self.ensure_poller();
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.shared.listeners.remove(id);
        if self.shared.listeners.is_empty() {
            self.stop_poller();
        }
    }

    fn listener_count(&self) -> usize {
        self.shared.listeners.len()
    }
}

impl Drop for RpcWalletProvider {
    fn drop(&mut self) {
        self.stop_poller();
    }
}
