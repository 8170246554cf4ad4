//! Session errors and user-facing notices.

use thiserror::Error;

use aion_common::{Address, ChainId};

use crate::provider::ProviderError;

/// Errors surfaced by the session manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No wallet provider is installed.
    #[error("no wallet provider available")]
    ProviderUnavailable,

    /// The user declined the connection prompt.
    #[error("connection request rejected by user")]
    UserRejected,

    /// The wallet did not answer within the connect timeout.
    #[error("wallet connection timed out")]
    ConnectTimeout,

    /// A disconnect or network change superseded the connect attempt.
    #[error("connection attempt aborted")]
    ConnectAborted,

    /// Any other provider failure during connect.
    #[error("wallet provider error: {0}")]
    Provider(String),

    /// The operation requires a connected session.
    #[error("wallet not connected")]
    NotConnected,

    /// The wallet switched network mid-session; the client must reload.
    #[error("network changed, reload required")]
    NetworkChangeUnsupported,

    /// A balance could not be refreshed. Logged, never returned to UI callers.
    #[error("balance fetch failed: {0}")]
    BalanceFetchFailed(String),
}

impl SessionError {
    /// True for failures the user should be told about.
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            SessionError::NotConnected | SessionError::BalanceFetchFailed(_)
        )
    }
}

impl From<ProviderError> for SessionError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::UserRejected => SessionError::UserRejected,
            ProviderError::Timeout => SessionError::ConnectTimeout,
            other => SessionError::Provider(other.to_string()),
        }
    }
}

/// Outcome of a balance refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceRefresh {
    /// The new value was committed.
    Applied,
    /// The session moved on (disconnected or swapped account) before the
    /// response arrived; the response was dropped.
    Discarded,
    /// The fetch failed; the previous value is still shown.
    Failed,
}

/// Session events worth telling the user about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    Connected(Address),
    AccountChanged { from: Address, to: Address },
    Disconnected,
    ConnectFailed(SessionError),
    /// The wallet moved to another network. The session was torn down and the
    /// client must be reloaded.
    ReloadRequired(ChainId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_mapping() {
        assert_eq!(
            SessionError::from(ProviderError::UserRejected),
            SessionError::UserRejected
        );
        assert_eq!(
            SessionError::from(ProviderError::Timeout),
            SessionError::ConnectTimeout
        );
        assert!(matches!(
            SessionError::from(ProviderError::NoAccounts),
            SessionError::Provider(msg) if msg.contains("no accounts")
        ));
    }

    #[test]
    fn test_user_facing() {
        assert!(SessionError::ProviderUnavailable.is_user_facing());
        assert!(SessionError::NetworkChangeUnsupported.is_user_facing());
        assert!(!SessionError::NotConnected.is_user_facing());
        assert!(!SessionError::BalanceFetchFailed("x".to_string()).is_user_facing());
    }
}
