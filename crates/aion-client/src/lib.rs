//! AION prediction-market client core.
//!
//! Two pieces of client-side state management sit between the UI and the
//! backend:
//!
//! - **Session Manager**: connects a wallet, keeps one consistent session
//!   snapshot, and reacts to account and network changes pushed by the wallet.
//! - **Chain Allocator**: classifies a market onto a shared or dedicated chain
//!   from its stake and participant count, and resolves the chain the backend
//!   actually assigned.
//!
//! ## Modules
//!
//! - `config`: Configuration loading and validation
//! - `provider`: Wallet provider abstraction (JSON-RPC, in-memory)
//! - `api`: Backend HTTP clients (balances, chains, markets)
//! - `session`: Wallet session lifecycle
//! - `allocation`: Market to chain tier classification

pub mod allocation;
pub mod api;
pub mod config;
pub mod provider;
pub mod session;

pub use allocation::{ChainAllocator, classify, label};
pub use api::{
    ApiError, BalanceSource, ChainClient, ChainInfo, ChainInfoSource, ChainRegistry,
    CreateMarketRequest, MarketClient, NewMarket, WalletClient,
};
pub use config::ClientConfig;
pub use provider::{
    InMemoryWalletProvider, ProviderError, ProviderEvent, RpcWalletProvider,
    RpcWalletProviderConfig, WalletProvider,
};
pub use session::{
    BalanceRefresh, ConnectionState, Session, SessionError, SessionManager,
    SessionManagerConfig, SessionNotice, SharedSessionManager,
};
