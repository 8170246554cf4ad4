//! Session snapshot and connection state.
//!
//! A `Session` is immutable once published. The manager replaces the whole
//! snapshot on every change, so a reader holding an `Arc<Session>` never sees
//! a half-applied update.
//!
//! Every constructor below keeps `connection == Connected` iff `account` is
//! present.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use aion_common::{Address, ChainId, PlatformBalance};

/// Wallet connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Transient: a failed connect passes through here on its way back to
    /// `Disconnected`.
    Error(String),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// The client's view of wallet identity and balances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    account: Option<Address>,
    network: Option<ChainId>,
    native_balance: Option<Decimal>,
    platform_balance: Option<PlatformBalance>,
    platform_balance_at: Option<DateTime<Utc>>,
    connection: ConnectionState,
}

impl Session {
    pub(crate) fn disconnected() -> Self {
        Self {
            account: None,
            network: None,
            native_balance: None,
            platform_balance: None,
            platform_balance_at: None,
            connection: ConnectionState::Disconnected,
        }
    }

    pub(crate) fn connecting() -> Self {
        Self {
            connection: ConnectionState::Connecting,
            ..Self::disconnected()
        }
    }

    pub(crate) fn errored(reason: String) -> Self {
        Self {
            connection: ConnectionState::Error(reason),
            ..Self::disconnected()
        }
    }

    pub(crate) fn connected(
        account: Address,
        network: ChainId,
        native_balance: Option<Decimal>,
    ) -> Self {
        Self {
            account: Some(account),
            network: Some(network),
            native_balance,
            platform_balance: None,
            platform_balance_at: None,
            connection: ConnectionState::Connected,
        }
    }

    /// Same connection, different account. The platform balance belongs to the
    /// previous account and is dropped; network and native balance stay until
    /// refreshed.
    pub(crate) fn swapped_to(&self, account: Address) -> Self {
        Self {
            account: Some(account),
            platform_balance: None,
            platform_balance_at: None,
            ..self.clone()
        }
    }

    pub(crate) fn with_platform_balance(&self, balance: PlatformBalance, at: DateTime<Utc>) -> Self {
        Self {
            platform_balance: Some(balance),
            platform_balance_at: Some(at),
            ..self.clone()
        }
    }

    pub(crate) fn with_wallet_state(&self, network: ChainId, native_balance: Option<Decimal>) -> Self {
        Self {
            network: Some(network),
            native_balance: native_balance.or(self.native_balance),
            ..self.clone()
        }
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    pub fn network(&self) -> Option<ChainId> {
        self.network
    }

    /// Native asset balance (e.g. ETH), not wei.
    pub fn native_balance(&self) -> Option<Decimal> {
        self.native_balance
    }

    pub fn platform_balance(&self) -> Option<&PlatformBalance> {
        self.platform_balance.as_ref()
    }

    /// When the platform balance was last received.
    pub fn platform_balance_at(&self) -> Option<DateTime<Utc>> {
        self.platform_balance_at
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.connection == ConnectionState::Connecting
    }

    /// True when the snapshot satisfies the session invariants.
    pub fn is_consistent(&self) -> bool {
        let account_matches = self.is_connected() == self.account.is_some();
        let balance_scoped = self.account.is_some() || self.platform_balance.is_none();
        account_matches && balance_scoped
    }

    /// Shortened address for display, e.g. `0x1234...abcd`.
    pub fn short_account(&self) -> Option<String> {
        self.account.map(|a| {
            let full = a.to_string();
            format!("{}...{}", &full[..6], &full[full.len() - 4..])
        })
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::disconnected()
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.account, &self.network) {
            (Some(account), Some(network)) => {
                write!(f, "{} on chain {} ({})", account, network, self.connection)
            }
            (Some(account), None) => write!(f, "{} ({})", account, self.connection),
            _ => write!(f, "{}", self.connection),
        }
    }
}
