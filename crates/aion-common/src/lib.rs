//! Shared types for the AION prediction-market client.
//!
//! This crate contains:
//! - Wallet primitives (`Address`, `U256`, `ChainId`) and native-unit conversion
//! - Chain allocation types (`ChainTier`, `MarketAllocationInput`, `AllocationThresholds`)
//! - Platform token balances as reported by the backend

pub mod types;

pub use types::*;
