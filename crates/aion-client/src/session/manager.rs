//! Wallet session manager.
//!
//! Owns the single `Session` snapshot and every transition applied to it:
//! user connect, silent restore, disconnect, account swaps and network
//! changes pushed by the wallet, and balance refreshes.
//!
//! ## Concurrency
//!
//! - The snapshot lives in a `watch` channel and is replaced whole, so readers
//!   always get a consistent `Arc<Session>`.
//! - At most one connect attempt runs at a time. Concurrent callers join the
//!   in-flight attempt and all receive its result.
//! - Balance responses are committed only if the session is still connected
//!   to the account the request was made for. Anything else is dropped.
//! - Disconnect and network change supersede a pending connect attempt. Its
//!   callers get `ConnectAborted` and the next `connect()` starts afresh.
//! - The provider listener is registered once per manager and removed on
//!   shutdown (or drop). Shutdown also aborts pending account-swap refreshes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use aion_common::{Address, ChainId, wei_to_native};

use crate::api::BalanceSource;
use crate::provider::{ListenerId, ProviderEvent, WalletProvider};

use super::error::{BalanceRefresh, SessionError, SessionNotice};
use super::state::{ConnectionState, Session};

/// Capacity of the notice channel. Slow subscribers lag and skip.
const NOTICE_CAPACITY: usize = 64;

/// Configuration for the session manager.
#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    /// Upper bound on the wallet handshake (prompt included).
    pub connect_timeout: Duration,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(60),
        }
    }
}

/// Shared session manager handle.
pub type SharedSessionManager = Arc<SessionManager>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectMode {
    /// User-initiated; the wallet may prompt.
    Prompt,
    /// Restore of an already-authorized wallet; never prompts.
    Silent,
}

type ConnectFuture = Shared<BoxFuture<'static, Result<Arc<Session>, SessionError>>>;

struct ConnectAttempt {
    id: u64,
    future: ConnectFuture,
    abort: AbortHandle,
}

/// Removes the provider listener when dropped.
struct ListenerGuard {
    provider: Arc<dyn WalletProvider>,
    id: ListenerId,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.provider.remove_listener(self.id);
    }
}

struct SessionCore {
    provider: Option<Arc<dyn WalletProvider>>,
    balances: Arc<dyn BalanceSource>,
    config: SessionManagerConfig,
    state: watch::Sender<Arc<Session>>,
    notices: broadcast::Sender<SessionNotice>,
    connecting: Mutex<Option<ConnectAttempt>>,
    next_attempt: AtomicU64,
    /// Balance refreshes started by account swaps.
    refreshes: Mutex<JoinSet<()>>,
    /// Latched on the first network change.
    reload_required: AtomicBool,
    shut_down: AtomicBool,
}

/// Wallet session manager.
pub struct SessionManager {
    core: Arc<SessionCore>,
    listener: Mutex<Option<ListenerGuard>>,
    events: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Create the manager and subscribe to provider events.
    ///
    /// `provider` is `None` when no wallet is installed; every connect then
    /// fails with `ProviderUnavailable`. Must be called inside a Tokio runtime
    /// when a provider is given.
    pub fn start(
        config: SessionManagerConfig,
        provider: Option<Arc<dyn WalletProvider>>,
        balances: Arc<dyn BalanceSource>,
    ) -> Self {
        let (state, _) = watch::channel(Arc::new(Session::disconnected()));
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        let core = Arc::new(SessionCore {
            provider,
            balances,
            config,
            state,
            notices,
            connecting: Mutex::new(None),
            next_attempt: AtomicU64::new(0),
            refreshes: Mutex::new(JoinSet::new()),
            reload_required: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        });

        let (listener, events) = match &core.provider {
            Some(provider) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let id = provider.add_listener(tx);
                let guard = ListenerGuard {
                    provider: provider.clone(),
                    id,
                };
                let handle = tokio::spawn(run_event_loop(core.clone(), rx));
                (Some(guard), Some(handle))
            }
            None => {
                info!("No wallet provider installed");
                (None, None)
            }
        };

        Self {
            core,
            listener: Mutex::new(listener),
            events: Mutex::new(events),
        }
    }

    /// Create a shared manager.
    pub fn new_shared(
        config: SessionManagerConfig,
        provider: Option<Arc<dyn WalletProvider>>,
        balances: Arc<dyn BalanceSource>,
    ) -> SharedSessionManager {
        Arc::new(Self::start(config, provider, balances))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connect the wallet, prompting the user if needed.
    ///
    /// Returns the current session unchanged if already connected. Concurrent
    /// calls share one attempt and one prompt.
    pub async fn connect(&self) -> Result<Arc<Session>, SessionError> {
        self.core.clone().connect(ConnectMode::Prompt).await
    }

    /// Reconnect silently if the wallet already authorized this client.
    ///
    /// Never prompts. Leaves the session disconnected when the wallet exposes
    /// no accounts or none is installed.
    pub async fn restore(&self) -> Result<Arc<Session>, SessionError> {
        let Some(provider) = self.core.provider.clone() else {
            debug!("Restore skipped, no wallet provider");
            return Ok(self.session());
        };

        let accounts = provider.accounts().await?;
        if accounts.is_empty() {
            debug!("Restore skipped, wallet not authorized");
            return Ok(self.session());
        }

        self.core.clone().connect(ConnectMode::Silent).await
    }

    /// Clear the session. A pending connect attempt ends with `ConnectAborted`.
    pub fn disconnect(&self) {
        self.core.clear("user disconnect");
    }

    /// Stop listening to the provider and clear the session. Idempotent.
    pub fn shutdown(&self) {
        if self.core.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        drop(self.listener.lock().take());
        if let Some(handle) = self.events.lock().take() {
            handle.abort();
        }
        self.core.supersede_connect();
        let pending_refreshes = self.core.pending_refreshes();
        self.core.refreshes.lock().abort_all();
        self.core
            .state
            .send_replace(Arc::new(Session::disconnected()));

        info!(pending_refreshes, "Session manager shut down");
    }

    // =========================================================================
    // Balances
    // =========================================================================

    /// Re-fetch the platform balance for the connected account.
    pub async fn refresh_platform_balance(&self) -> Result<BalanceRefresh, SessionError> {
        let account = self.connected_account()?;
        Ok(self.core.refresh_platform_for(account).await)
    }

    /// Re-read network and native balance from the wallet.
    pub async fn refresh_native_balance(&self) -> Result<BalanceRefresh, SessionError> {
        let account = self.connected_account()?;
        Ok(self.core.refresh_wallet_for(account).await)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current session snapshot.
    pub fn session(&self) -> Arc<Session> {
        self.core.session()
    }

    /// Watch every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Session>> {
        self.core.state.subscribe()
    }

    /// Receive user-facing notices.
    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.core.notices.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.core.session().is_connected()
    }

    pub fn has_provider(&self) -> bool {
        self.core.provider.is_some()
    }

    /// True once the wallet changed network. The manager must be rebuilt.
    pub fn requires_reload(&self) -> bool {
        self.core.reload_required.load(Ordering::SeqCst)
    }

    fn connected_account(&self) -> Result<Address, SessionError> {
        let session = self.session();
        match session.account() {
            Some(account) if session.is_connected() => Ok(account),
            _ => Err(SessionError::NotConnected),
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl SessionCore {
    fn session(&self) -> Arc<Session> {
        self.state.borrow().clone()
    }

    fn notify(&self, notice: SessionNotice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }

    /// Publish a disconnected session, notifying only if something changed.
    fn clear(&self, reason: &str) {
        self.supersede_connect();
        let previous = self.state.send_replace(Arc::new(Session::disconnected()));
        if *previous.connection() != ConnectionState::Disconnected {
            info!(reason = reason, account = ?previous.account(), "Wallet disconnected");
            self.notify(SessionNotice::Disconnected);
        }
    }

    /// Abort the in-flight connect attempt and free its slot.
    fn supersede_connect(&self) {
        if let Some(attempt) = self.connecting.lock().take() {
            debug!(attempt = attempt.id, "Connect attempt superseded");
            attempt.abort.abort();
        }
    }

    fn holds_slot(&self, id: u64) -> bool {
        self.connecting
            .lock()
            .as_ref()
            .is_some_and(|attempt| attempt.id == id)
    }

    /// Swap refreshes still running.
    fn pending_refreshes(&self) -> usize {
        let mut refreshes = self.refreshes.lock();
        while refreshes.try_join_next().is_some() {}
        refreshes.len()
    }

    async fn connect(self: Arc<Self>, mode: ConnectMode) -> Result<Arc<Session>, SessionError> {
        if self.provider.is_none() {
            return Err(SessionError::ProviderUnavailable);
        }
        if self.reload_required.load(Ordering::SeqCst) {
            return Err(SessionError::NetworkChangeUnsupported);
        }
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(SessionError::ConnectAborted);
        }

        let current = self.session();
        if current.is_connected() {
            return Ok(current);
        }

        let (id, future) = {
            let mut slot = self.connecting.lock();
            match slot.as_ref() {
                Some(attempt) if attempt.future.peek().is_none() => {
                    debug!(attempt = attempt.id, "Joining in-flight connect");
                    (attempt.id, attempt.future.clone())
                }
                _ => {
                    let id = self.next_attempt.fetch_add(1, Ordering::Relaxed);
                    let handle = tokio::spawn(self.clone().run_connect(id, mode));
                    let abort = handle.abort_handle();
                    let future = async move {
                        handle.await.unwrap_or(Err(SessionError::ConnectAborted))
                    }
                    .boxed()
                    .shared();
                    *slot = Some(ConnectAttempt {
                        id,
                        future: future.clone(),
                        abort,
                    });
                    (id, future)
                }
            }
        };

        let result = future.await;

        let mut slot = self.connecting.lock();
        if slot.as_ref().is_some_and(|attempt| attempt.id == id) {
            *slot = None;
        }
        result
    }

    async fn run_connect(
        self: Arc<Self>,
        id: u64,
        mode: ConnectMode,
    ) -> Result<Arc<Session>, SessionError> {
        let Some(provider) = self.provider.clone() else {
            return Err(SessionError::ProviderUnavailable);
        };

        self.state.send_replace(Arc::new(Session::connecting()));
        debug!(attempt = id, mode = ?mode, "Connecting wallet");

        let handshake =
            tokio::time::timeout(self.config.connect_timeout, handshake(provider.as_ref(), mode))
                .await
                .unwrap_or(Err(SessionError::ConnectTimeout));

        let session = match handshake {
            Ok(session) => Arc::new(session),
            Err(err) => {
                self.fail_connect(id, &err);
                return Err(err);
            }
        };

        // A superseded attempt must not overwrite its successor's state.
        let committed = self.state.send_if_modified(|current| {
            if current.is_connecting() && self.holds_slot(id) {
                *current = session.clone();
                true
            } else {
                false
            }
        });
        let Some(account) = session.account().filter(|_| committed) else {
            warn!("Connect superseded before it completed");
            return Err(SessionError::ConnectAborted);
        };

        info!(
            account = %account,
            network = ?session.network(),
            native_balance = ?session.native_balance(),
            "Wallet connected"
        );
        self.notify(SessionNotice::Connected(account));

        self.refresh_platform_for(account).await;
        Ok(self.session())
    }

    /// Surface a failed connect: `Connecting -> Error -> Disconnected`.
    fn fail_connect(&self, id: u64, err: &SessionError) {
        let reason = err.to_string();
        let errored = self.state.send_if_modified(|current| {
            if current.is_connecting() && self.holds_slot(id) {
                *current = Arc::new(Session::errored(reason.clone()));
                true
            } else {
                false
            }
        });
        if !errored {
            return;
        }

        warn!(error = %reason, "Wallet connect failed");
        self.state.send_if_modified(|current| {
            if matches!(current.connection(), ConnectionState::Error(_)) {
                *current = Arc::new(Session::disconnected());
                true
            } else {
                false
            }
        });
        self.notify(SessionNotice::ConnectFailed(err.clone()));
    }

    async fn refresh_platform_for(&self, account: Address) -> BalanceRefresh {
        let balance = match self.balances.platform_balance(account).await {
            Ok(balance) => balance,
            Err(e) => {
                let err = SessionError::BalanceFetchFailed(e.to_string());
                warn!(account = %account, error = %err, "Platform balance refresh failed");
                return BalanceRefresh::Failed;
            }
        };

        let fetched_at = Utc::now();
        let applied = self.state.send_if_modified(|current| {
            if current.is_connected() && current.account() == Some(account) {
                *current = Arc::new(current.with_platform_balance(balance, fetched_at));
                true
            } else {
                false
            }
        });

        if applied {
            debug!(account = %account, total = %balance.total(), "Platform balance updated");
            BalanceRefresh::Applied
        } else {
            debug!(account = %account, "Discarding stale platform balance");
            BalanceRefresh::Discarded
        }
    }

    async fn refresh_wallet_for(&self, account: Address) -> BalanceRefresh {
        let Some(provider) = self.provider.as_ref() else {
            return BalanceRefresh::Failed;
        };

        let network = match provider.get_network().await {
            Ok(network) => network,
            Err(e) => {
                warn!(account = %account, error = %e, "Network lookup failed");
                return BalanceRefresh::Failed;
            }
        };
        let native = match provider.get_balance(account).await {
            Ok(wei) => wei_to_native(wei),
            Err(e) => {
                warn!(account = %account, error = %e, "Native balance lookup failed");
                return BalanceRefresh::Failed;
            }
        };

        let applied = self.state.send_if_modified(|current| {
            if current.is_connected() && current.account() == Some(account) {
                *current = Arc::new(current.with_wallet_state(network, native));
                true
            } else {
                false
            }
        });

        if applied {
            debug!(account = %account, native_balance = ?native, "Wallet state updated");
            BalanceRefresh::Applied
        } else {
            debug!(account = %account, "Discarding stale wallet state");
            BalanceRefresh::Discarded
        }
    }

    fn handle_event(self: &Arc<Self>, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => {
                if self.reload_required.load(Ordering::SeqCst) {
                    debug!("Ignoring accountsChanged, reload pending");
                    return;
                }
                match accounts.first() {
                    None => self.clear("wallet locked"),
                    Some(&next) => self.swap_account(next),
                }
            }
            ProviderEvent::ChainChanged(chain_id) => self.network_changed(chain_id),
        }
    }

    fn swap_account(self: &Arc<Self>, next: Address) {
        let mut previous = None;
        self.state.send_if_modified(|current| match current.account() {
            Some(account) if current.is_connected() && account != next => {
                previous = Some(account);
                *current = Arc::new(current.swapped_to(next));
                true
            }
            _ => false,
        });

        let Some(from) = previous else {
            debug!(account = %next, "accountsChanged with nothing to swap");
            return;
        };

        info!(from = %from, to = %next, "Wallet account changed");
        self.notify(SessionNotice::AccountChanged { from, to: next });

        let core = self.clone();
        let mut refreshes = self.refreshes.lock();
        while refreshes.try_join_next().is_some() {}
        refreshes.spawn(async move {
            tokio::join!(
                core.refresh_wallet_for(next),
                core.refresh_platform_for(next)
            );
        });
    }

    fn network_changed(&self, chain_id: ChainId) {
        if self.reload_required.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(chain_id = %chain_id, "Wallet network changed, reload required");
        self.supersede_connect();
        self.state.send_replace(Arc::new(Session::disconnected()));
        self.notify(SessionNotice::ReloadRequired(chain_id));
    }
}

async fn handshake(provider: &dyn WalletProvider, mode: ConnectMode) -> Result<Session, SessionError> {
    let accounts = match mode {
        ConnectMode::Prompt => provider.request_accounts().await?,
        ConnectMode::Silent => provider.accounts().await?,
    };
    if accounts.is_empty() {
        return Err(SessionError::Provider("wallet exposed no accounts".to_string()));
    }

    let account = provider.get_address().await?;
    let network = provider.get_network().await?;

    let native = match provider.get_balance(account).await {
        Ok(wei) => {
            let native = wei_to_native(wei);
            if native.is_none() {
                warn!(account = %account, wei = %wei, "Native balance out of range");
            }
            native
        }
        Err(e) => {
            warn!(account = %account, error = %e, "Native balance lookup failed");
            None
        }
    };

    Ok(Session::connected(account, network, native))
}

async fn run_event_loop(core: Arc<SessionCore>, mut events: mpsc::UnboundedReceiver<ProviderEvent>) {
    debug!("Session event loop started");
    while let Some(event) = events.recv().await {
        debug!(event = ?event, "Provider event");
        core.handle_event(event);
    }
    debug!("Session event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::provider::InMemoryWalletProvider;
    use aion_common::{PlatformBalance, U256};
    use alloy::primitives::address;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    const ALICE: Address = address!("0x1111111111111111111111111111111111111111");
    const BOB: Address = address!("0x2222222222222222222222222222222222222222");

    struct FixedBalance;

    #[async_trait]
    impl BalanceSource for FixedBalance {
        async fn platform_balance(&self, _address: Address) -> Result<PlatformBalance, ApiError> {
            Ok(PlatformBalance::new(dec!(250), dec!(50), dec!(5)))
        }
    }

    /// Never answers for BOB.
    struct StalledForBob;

    #[async_trait]
    impl BalanceSource for StalledForBob {
        async fn platform_balance(&self, address: Address) -> Result<PlatformBalance, ApiError> {
            if address == BOB {
                std::future::pending::<()>().await;
            }
            Ok(PlatformBalance::default())
        }
    }

    fn manager(wallet: Arc<InMemoryWalletProvider>) -> SessionManager {
        SessionManager::start(
            SessionManagerConfig::default(),
            Some(wallet),
            Arc::new(FixedBalance),
        )
    }

    #[tokio::test]
    async fn test_connect_populates_session() {
        let one_eth = U256::from(1_000_000_000_000_000_000u128);
        let wallet = Arc::new(
            InMemoryWalletProvider::new(vec![ALICE], ChainId::POLYGON).with_balance(ALICE, one_eth),
        );
        let manager = manager(wallet);

        let session = manager.connect().await.unwrap();
        assert!(session.is_connected());
        assert_eq!(session.account(), Some(ALICE));
        assert_eq!(session.network(), Some(ChainId::POLYGON));
        assert_eq!(session.native_balance(), Some(dec!(1)));
        assert_eq!(session.platform_balance().unwrap().available, dec!(250));
        assert!(session.platform_balance_at().is_some());
    }

    #[tokio::test]
    async fn test_connect_when_connected_is_noop() {
        let wallet = Arc::new(InMemoryWalletProvider::new(vec![ALICE], ChainId::POLYGON));
        let manager = manager(wallet.clone());

        let first = manager.connect().await.unwrap();
        let second = manager.connect().await.unwrap();
        assert_eq!(wallet.prompt_count(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_connect_timeout_returns_to_disconnected() {
        let wallet = Arc::new(InMemoryWalletProvider::new(vec![ALICE], ChainId::POLYGON));
        wallet.hold_prompts();
        let manager = SessionManager::start(
            SessionManagerConfig {
                connect_timeout: Duration::from_millis(20),
            },
            Some(wallet),
            Arc::new(FixedBalance),
        );

        assert_eq!(
            manager.connect().await.unwrap_err(),
            SessionError::ConnectTimeout
        );
        assert_eq!(*manager.session().connection(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let wallet = Arc::new(InMemoryWalletProvider::new(vec![ALICE], ChainId::POLYGON));
        let manager = manager(wallet.clone());
        assert_eq!(wallet.listener_count(), 1);

        manager.shutdown();
        manager.shutdown();
        assert_eq!(wallet.listener_count(), 0);
        assert_eq!(
            manager.connect().await.unwrap_err(),
            SessionError::ConnectAborted
        );
    }

    #[tokio::test]
    async fn test_shutdown_aborts_swap_refreshes() {
        let wallet = Arc::new(InMemoryWalletProvider::new(vec![ALICE, BOB], ChainId::POLYGON));
        let manager = SessionManager::start(
            SessionManagerConfig::default(),
            Some(wallet.clone()),
            Arc::new(StalledForBob),
        );
        manager.connect().await.unwrap();

        wallet.switch_accounts(vec![BOB]);
        let core = manager.core.clone();
        tokio::time::timeout(Duration::from_secs(2), async {
            while core.pending_refreshes() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        manager.shutdown();
        tokio::time::timeout(Duration::from_secs(2), async {
            while core.pending_refreshes() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
