//! Wallet provider abstraction.
//!
//! This module provides the `WalletProvider` trait that abstracts the injected
//! wallet the client talks to. The same session code works with:
//! - A JSON-RPC wallet endpoint (`RpcWalletProvider`)
//! - A scripted in-memory wallet for tests and demos (`InMemoryWalletProvider`)
//!
//! ## Events
//!
//! Providers push `ProviderEvent`s to registered listeners:
//! - `AccountsChanged` when the user switches or locks accounts
//! - `ChainChanged` when the wallet switches network

pub mod memory;
pub mod rpc;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use aion_common::{Address, ChainId, U256};

pub use memory::InMemoryWalletProvider;
pub use rpc::{RpcWalletProvider, RpcWalletProviderConfig};

/// JSON-RPC error code wallets return when the user rejects a request (EIP-1193).
pub const USER_REJECTED_CODE: i64 = 4001;

/// Errors returned by wallet provider calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("user rejected the request")]
    UserRejected,

    #[error("provider request timed out")]
    Timeout,

    #[error("wallet has no accounts")]
    NoAccounts,

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

/// An event pushed by the wallet provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// The set of exposed accounts changed. Empty means locked or disconnected.
    AccountsChanged(Vec<Address>),

    /// The wallet switched network.
    ChainChanged(ChainId),
}

/// Identifies a registered event listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Sending half handed to a provider when registering a listener.
pub type EventSink = mpsc::UnboundedSender<ProviderEvent>;

/// The injected wallet the client consumes.
///
/// Implementations must be cheap to share (`Arc<dyn WalletProvider>`).
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask the wallet to expose accounts. This prompts the user.
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError>;

    /// Accounts already authorized for this client, without prompting.
    async fn accounts(&self) -> Result<Vec<Address>, ProviderError>;

    /// Address of the currently selected signer.
    async fn get_address(&self) -> Result<Address, ProviderError>;

    /// Native balance of `address` in wei.
    async fn get_balance(&self, address: Address) -> Result<U256, ProviderError>;

    /// Network the wallet is currently on.
    async fn get_network(&self) -> Result<ChainId, ProviderError>;

    /// Register a sink for provider events.
    fn add_listener(&self, sink: EventSink) -> ListenerId;

    /// Remove a previously registered sink. Unknown ids are ignored.
    fn remove_listener(&self, id: ListenerId);

    /// Number of registered listeners.
    fn listener_count(&self) -> usize;
}

/// Fan-out of provider events to registered sinks.
///
/// Sinks whose receiving half has been dropped are pruned on the next emit.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    sinks: Mutex<HashMap<ListenerId, EventSink>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, sink: EventSink) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sinks.lock().insert(id, sink);
        debug!(listener = id.0, "Provider listener registered");
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let removed = self.sinks.lock().remove(&id).is_some();
        if removed {
            debug!(listener = id.0, "Provider listener removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sinks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every live sink. Returns the number of deliveries.
    pub fn emit(&self, event: &ProviderEvent) -> usize {
        let mut sinks = self.sinks.lock();
        sinks.retain(|_, sink| sink.send(event.clone()).is_ok());
        sinks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_add_remove() {
        let registry = ListenerRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry.add(tx);
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_emit_prunes_closed_sinks() {
        let registry = ListenerRegistry::new();
        let (live_tx, mut live_rx) = mpsc::unbounded_channel();
        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        registry.add(live_tx);
        registry.add(dead_tx);
        drop(dead_rx);

        let delivered = registry.emit(&ProviderEvent::ChainChanged(ChainId::POLYGON));
        assert_eq!(delivered, 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            live_rx.try_recv().unwrap(),
            ProviderEvent::ChainChanged(ChainId::POLYGON)
        );
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::Rpc {
            code: USER_REJECTED_CODE,
            message: "denied".to_string(),
        };
        assert!(err.to_string().contains("4001"));
        assert!(ProviderError::UserRejected.to_string().contains("rejected"));
    }
}
