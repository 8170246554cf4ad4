//! Hybrid chain allocation.
//!
//! Markets start on a shared chain. A market whose stake or participant count
//! crosses the configured thresholds gets a dedicated chain. The main chain
//! holds governance and global state and is never an allocation outcome.
//!
//! `classify` is pure (no clock, randomness, or I/O) so it can be called
//! speculatively, e.g. to preview the tier while a market is being drafted.
//! Looking up the chain a market was actually given goes through the backend
//! and lives on `ChainAllocator::resolve_chain_info`.

use std::sync::Arc;

use tracing::{debug, warn};

use aion_common::{AllocationThresholds, ChainTier, MarketAllocationInput};

use crate::api::{
    ApiError, ChainClient, ChainInfo, ChainInfoSource, CreateMarketRequest, MigrationResult,
    NewMarket,
};

/// Classify a market into a chain tier.
///
/// Returns `Dedicated` when either threshold is reached (inclusive), otherwise
/// `Shared`.
#[inline]
pub fn classify(input: &MarketAllocationInput, thresholds: &AllocationThresholds) -> ChainTier {
    if input.total_stake >= thresholds.high_value_stake
        || input.participant_count >= thresholds.high_volume_participants
    {
        ChainTier::Dedicated
    } else {
        ChainTier::Shared
    }
}

/// Display label for a tier.
#[inline]
pub fn label(tier: ChainTier) -> &'static str {
    tier.label()
}

/// Chain allocator: static thresholds plus the backend lookup.
pub struct ChainAllocator {
    thresholds: AllocationThresholds,
    chains: Arc<dyn ChainInfoSource>,
}

impl ChainAllocator {
    pub fn new(thresholds: AllocationThresholds, chains: Arc<dyn ChainInfoSource>) -> Self {
        Self { thresholds, chains }
    }

    pub fn thresholds(&self) -> &AllocationThresholds {
        &self.thresholds
    }

    /// Classify with the configured thresholds.
    pub fn classify(&self, input: &MarketAllocationInput) -> ChainTier {
        classify(input, &self.thresholds)
    }

    /// Fetch the chain already assigned to `market_id`.
    pub async fn resolve_chain_info(&self, market_id: &str) -> Result<ChainInfo, ApiError> {
        let info = self.chains.chain_info(market_id).await?;
        if info.tier == ChainTier::Main {
            warn!(market_id = %market_id, "Market reported on the main chain");
        }
        Ok(info)
    }

    /// Build the creation request for a market, tagged with its tier.
    pub fn prepare_market(&self, market: NewMarket) -> CreateMarketRequest {
        let tier = self.classify(&market.allocation_input());
        debug!(
            market_id = %market.market_id,
            stake = %market.estimated_stake,
            participants = market.estimated_participants,
            tier = %tier,
            "Market classified"
        );
        CreateMarketRequest::new(market, tier)
    }

    /// Request migration to a dedicated chain if the market has outgrown a
    /// shared one.
    ///
    /// Returns `Ok(None)` without any I/O when the market still classifies as
    /// `Shared`.
    pub async fn plan_migration(
        &self,
        client: &ChainClient,
        market_id: &str,
        input: &MarketAllocationInput,
    ) -> Result<Option<MigrationResult>, ApiError> {
        match self.classify(input) {
            ChainTier::Dedicated => client.migrate(market_id, input).await.map(Some),
            tier => {
                debug!(market_id = %market_id, tier = %tier, "Migration not warranted");
                Ok(None)
            }
        }
    }
}
