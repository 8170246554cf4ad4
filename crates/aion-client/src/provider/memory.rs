//! Scripted in-memory wallet provider.
//!
//! Holds its accounts, balances and network in memory and lets the caller
//! drive wallet-side actions (account switch, lock, network switch, user
//! rejection). Used by tests and offline demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

use aion_common::{Address, ChainId, U256};

use super::{EventSink, ListenerId, ListenerRegistry, ProviderError, ProviderEvent, WalletProvider};

#[derive(Debug)]
struct WalletState {
    accounts: Vec<Address>,
    chain_id: ChainId,
    balances: HashMap<Address, U256>,
    authorized: bool,
}

/// In-memory wallet provider.
#[derive(Debug)]
pub struct InMemoryWalletProvider {
    state: RwLock<WalletState>,
    listeners: ListenerRegistry,
    /// Number of `request_accounts` prompts shown.
    prompts: AtomicUsize,
    /// Whether prompts are answered with a rejection.
    reject_prompts: AtomicBool,
    /// Prompts block until this is `true`.
    prompt_gate: watch::Sender<bool>,
}

impl InMemoryWalletProvider {
    /// Create a wallet exposing `accounts` on `chain_id`, not yet authorized.
    pub fn new(accounts: Vec<Address>, chain_id: ChainId) -> Self {
        let (prompt_gate, _) = watch::channel(true);
        Self {
            state: RwLock::new(WalletState {
                accounts,
                chain_id,
                balances: HashMap::new(),
                authorized: false,
            }),
            listeners: ListenerRegistry::new(),
            prompts: AtomicUsize::new(0),
            reject_prompts: AtomicBool::new(false),
            prompt_gate,
        }
    }

    /// Set the native balance (wei) reported for `address`.
    pub fn with_balance(self, address: Address, wei: U256) -> Self {
        self.set_balance(address, wei);
        self
    }

    /// Mark the current accounts as already authorized for this client.
    pub fn authorized(self) -> Self {
        self.state.write().authorized = true;
        self
    }

    pub fn set_balance(&self, address: Address, wei: U256) {
        self.state.write().balances.insert(address, wei);
    }

    /// Answer future prompts with a user rejection.
    pub fn reject_prompts(&self, reject: bool) {
        self.reject_prompts.store(reject, Ordering::SeqCst);
    }

    /// Hold prompts open until `release_prompts` is called.
    pub fn hold_prompts(&self) {
        self.prompt_gate.send_replace(false);
    }

    pub fn release_prompts(&self) {
        self.prompt_gate.send_replace(true);
    }

    /// Number of prompts shown so far.
    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    /// User switched accounts in the wallet UI.
    pub fn switch_accounts(&self, accounts: Vec<Address>) {
        self.state.write().accounts = accounts.clone();
        let delivered = self
            .listeners
            .emit(&ProviderEvent::AccountsChanged(accounts));
        debug!(delivered, "Emitted accountsChanged");
    }

    /// User locked the wallet.
    pub fn lock(&self) {
        self.switch_accounts(Vec::new());
    }

    /// User switched the wallet network.
    pub fn switch_chain(&self, chain_id: ChainId) {
        self.state.write().chain_id = chain_id;
        let delivered = self.listeners.emit(&ProviderEvent::ChainChanged(chain_id));
        debug!(delivered, chain_id = %chain_id, "Emitted chainChanged");
    }
}

#[async_trait]
impl WalletProvider for InMemoryWalletProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);

        let mut gate = self.prompt_gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| ProviderError::Transport("prompt gate closed".to_string()))?;

        if self.reject_prompts.load(Ordering::SeqCst) {
            return Err(ProviderError::UserRejected);
        }

        let mut state = self.state.write();
        if state.accounts.is_empty() {
            return Err(ProviderError::NoAccounts);
        }
        state.authorized = true;
        Ok(state.accounts.clone())
    }

    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let state = self.state.read();
        if state.authorized {
            Ok(state.accounts.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn get_address(&self) -> Result<Address, ProviderError> {
        self.state
            .read()
            .accounts
            .first()
            .copied()
            .ok_or(ProviderError::NoAccounts)
    }

    async fn get_balance(&self, address: Address) -> Result<U256, ProviderError> {
        Ok(self
            .state
            .read()
            .balances
            .get(&address)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn get_network(&self) -> Result<ChainId, ProviderError> {
        Ok(self.state.read().chain_id)
    }

    fn add_listener(&self, sink: EventSink) -> ListenerId {
        self.listeners.add(sink)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
    }

    fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}
