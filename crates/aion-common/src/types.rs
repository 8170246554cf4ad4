//! Shared domain types for the AION client.
//!
//! CRITICAL: All stakes and balances use `rust_decimal::Decimal`.
//! NEVER use f64 for token amounts.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use alloy::primitives::{Address, U256};

/// Number of decimal places between wei and one unit of the native asset.
pub const NATIVE_DECIMALS: u32 = 18;

/// Converts a wei amount into a decimal amount of the native asset.
///
/// Returns `None` if the amount does not fit in a `Decimal` (about 7.9e28 wei).
pub fn wei_to_native(wei: U256) -> Option<Decimal> {
    let raw = u128::try_from(wei).ok()?;
    let raw = i128::try_from(raw).ok()?;
    Decimal::try_from_i128_with_scale(raw, NATIVE_DECIMALS)
        .ok()
        .map(|d| d.normalize())
}

/// Errors produced when parsing shared types from strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown chain tier: {0}")]
    UnknownTier(String),

    #[error("invalid chain id: {0}")]
    InvalidChainId(String),
}

/// Network (chain) identifier reported by the wallet provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    /// Ethereum mainnet.
    pub const MAINNET: ChainId = ChainId(1);
    /// Polygon PoS.
    pub const POLYGON: ChainId = ChainId(137);

    /// Returns the raw numeric id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChainId {
    type Err = ParseError;

    /// Accepts both decimal (`"137"`) and hex quantity (`"0x89"`) forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parsed = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => trimmed.parse::<u64>(),
        };
        parsed
            .map(ChainId)
            .map_err(|_| ParseError::InvalidChainId(s.to_string()))
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        ChainId(id)
    }
}

/// Resource class a market's on-chain state lives on.
///
/// `Main` is the governance/global-state chain. It is assigned administratively
/// to exactly one chain and is never produced by allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainTier {
    Main,
    Dedicated,
    Shared,
}

impl ChainTier {
    /// All tiers, in display order.
    pub const ALL: [ChainTier; 3] = [ChainTier::Main, ChainTier::Dedicated, ChainTier::Shared];

    /// Wire name used by the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainTier::Main => "main",
            ChainTier::Dedicated => "dedicated",
            ChainTier::Shared => "shared",
        }
    }

    /// Human-readable label for display.
    pub fn label(&self) -> &'static str {
        match self {
            ChainTier::Main => "Main Chain",
            ChainTier::Dedicated => "Dedicated Chain",
            ChainTier::Shared => "Shared Chain",
        }
    }

    /// Returns true for tiers that market allocation can assign.
    pub fn is_allocatable(&self) -> bool {
        !matches!(self, ChainTier::Main)
    }
}

impl fmt::Display for ChainTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChainTier {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "main" => Ok(ChainTier::Main),
            "dedicated" => Ok(ChainTier::Dedicated),
            "shared" => Ok(ChainTier::Shared),
            _ => Err(ParseError::UnknownTier(s.to_string())),
        }
    }
}

/// Economic activity of a market, supplied per allocation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketAllocationInput {
    /// Total platform tokens staked on the market.
    pub total_stake: Decimal,
    /// Number of distinct participants.
    pub participant_count: u64,
}

impl MarketAllocationInput {
    pub fn new(total_stake: Decimal, participant_count: u64) -> Self {
        Self {
            total_stake,
            participant_count,
        }
    }
}

/// Thresholds above which a market gets a dedicated chain.
///
/// Loaded once from configuration and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationThresholds {
    /// Stake (platform tokens) at which a market is high-value.
    #[serde(alias = "high_value")]
    pub high_value_stake: Decimal,
    /// Participant count at which a market is high-volume.
    #[serde(alias = "high_volume")]
    pub high_volume_participants: u64,
}

impl AllocationThresholds {
    pub fn new(high_value_stake: Decimal, high_volume_participants: u64) -> Self {
        Self {
            high_value_stake,
            high_volume_participants,
        }
    }
}

impl Default for AllocationThresholds {
    fn default() -> Self {
        Self {
            high_value_stake: dec!(10000),
            high_volume_participants: 100,
        }
    }
}

/// Platform token balance for a wallet, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlatformBalance {
    /// Liquid tokens available to stake.
    #[serde(alias = "aion_balance")]
    pub available: Decimal,
    /// Tokens currently staked on markets.
    #[serde(alias = "staked_amount")]
    pub staked: Decimal,
    /// Rewards earned from resolved stakes.
    #[serde(alias = "earnedRewards")]
    pub earned_rewards: Decimal,
}

impl PlatformBalance {
    pub fn new(available: Decimal, staked: Decimal, earned_rewards: Decimal) -> Self {
        Self {
            available,
            staked,
            earned_rewards,
        }
    }

    /// Available plus staked tokens.
    pub fn total(&self) -> Decimal {
        self.available + self.staked
    }
}
