//! Wallet session lifecycle.
//!
//! Tracks who the user is (wallet account), which network the wallet is on,
//! and what the user holds (native asset and platform token balances).
//!
//! ## Architecture
//!
//! ```text
//! SessionManager
//! ├── watch::Sender<Arc<Session>>   (single published snapshot)
//! ├── broadcast::Sender<SessionNotice>
//! ├── in-flight connect attempt     (shared by concurrent callers)
//! └── event loop task
//!     └── WalletProvider listener   (accountsChanged / chainChanged)
//! ```
//!
//! ## Transitions
//!
//! - `Disconnected -> Connecting -> Connected` on a successful connect
//! - `Connecting -> Error -> Disconnected` on a failed connect
//! - `Connected(A) -> Connected(B)` when the wallet switches account
//! - any state `-> Disconnected` on disconnect, wallet lock or network change
//!
//! ## Usage
//!
//! ```ignore
//! let manager = SessionManager::new_shared(config, Some(provider), balances);
//! manager.restore().await?;
//! if !manager.is_connected() {
//!     manager.connect().await?;
//! }
//! let session = manager.session();
//! ```

pub mod error;
pub mod manager;
pub mod state;

pub use error::{BalanceRefresh, SessionError, SessionNotice};
pub use manager::{SessionManager, SessionManagerConfig, SharedSessionManager};
pub use state::{ConnectionState, Session};
