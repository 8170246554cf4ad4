//! Integration tests for the chain allocator against a mocked backend.
//!
//! These tests verify:
//! - Market classification with configured thresholds
//! - Market creation carries the classified tier
//! - Chain resolution and migration through the backend clients

use std::sync::Arc;

use mockito::{Matcher, Server};
use rust_decimal_macros::dec;
use serde_json::json;

use aion_client::allocation::ChainAllocator;
use aion_client::api::{ChainClient, MarketClient, NewMarket};
use aion_client::config::ClientConfig;
use aion_common::{AllocationThresholds, ChainTier, MarketAllocationInput};

fn new_market(id: &str, stake: rust_decimal::Decimal, participants: u64) -> NewMarket {
    NewMarket {
        market_id: id.to_string(),
        title: format!("Market {}", id),
        description: String::new(),
        category: "sports".to_string(),
        event_date: 1_767_225_600,
        estimated_stake: stake,
        estimated_participants: participants,
    }
}

#[test]
fn test_thresholds_from_config_drive_classification() {
    let config = ClientConfig::from_toml_str(
        r#"
            [allocation]
            high_value_stake = 500.0
            high_volume_participants = 10
        "#,
    )
    .unwrap();
    let client = ChainClient::new(Some("http://127.0.0.1:9".to_string())).unwrap();
    let allocator = ChainAllocator::new(config.allocation, Arc::new(client));

    assert_eq!(
        allocator.classify(&MarketAllocationInput::new(dec!(500), 0)),
        ChainTier::Dedicated
    );
    assert_eq!(
        allocator.classify(&MarketAllocationInput::new(dec!(499.99), 9)),
        ChainTier::Shared
    );
    assert_eq!(
        allocator.classify(&MarketAllocationInput::new(dec!(0), 10)),
        ChainTier::Dedicated
    );
}

#[tokio::test]
async fn test_create_then_resolve_dedicated_market() {
    let mut server = Server::new_async().await;
    let create = server
        .mock("POST", "/markets")
        .match_body(Matcher::PartialJson(json!({
            "market_id": "final-2026",
            "tier": "dedicated"
        })))
        .with_status(200)
        .with_body(r#"{"success": true, "market_id": "final-2026", "tier": "dedicated", "chain_id": "e1"}"#)
        .create_async()
        .await;
    let lookup = server
        .mock("GET", "/chain/market/final-2026")
        .with_status(200)
        .with_body(r#"{"market_id": "final-2026", "chain_info": {"type": "dedicated", "chain_id": "e1"}}"#)
        .create_async()
        .await;

    let chains = ChainClient::new(Some(server.url())).unwrap();
    let markets = MarketClient::new(Some(server.url())).unwrap();
    let allocator = ChainAllocator::new(AllocationThresholds::default(), Arc::new(chains));

    let request = allocator.prepare_market(new_market("final-2026", dec!(25000), 3));
    assert_eq!(request.tier, ChainTier::Dedicated);
    let created = markets.create_market(&request).await.unwrap();
    assert_eq!(created.chain_id.as_deref(), Some("e1"));

    let info = allocator.resolve_chain_info("final-2026").await.unwrap();
    assert_eq!(info.tier, ChainTier::Dedicated);
    assert_eq!(info.chain_id, "e1");
    assert_eq!(info.label(), "Dedicated Chain");

    create.assert_async().await;
    lookup.assert_async().await;
}

#[tokio::test]
async fn test_small_market_goes_to_shared_chain() {
    let mut server = Server::new_async().await;
    let create = server
        .mock("POST", "/markets")
        .match_body(Matcher::PartialJson(json!({"tier": "shared"})))
        .with_status(200)
        .with_body(r#"{"success": true, "tier": "shared"}"#)
        .create_async()
        .await;

    let markets = MarketClient::new(Some(server.url())).unwrap();
    let chains = ChainClient::new(Some(server.url())).unwrap();
    let allocator = ChainAllocator::new(AllocationThresholds::default(), Arc::new(chains));

    let request = allocator.prepare_market(new_market("derby", dec!(9999), 99));
    assert_eq!(request.tier, ChainTier::Shared);
    let created = markets.create_market(&request).await.unwrap();
    assert_eq!(created.tier, Some(ChainTier::Shared));
    create.assert_async().await;
}

#[tokio::test]
async fn test_grown_market_is_migrated() {
    let mut server = Server::new_async().await;
    let migrate = server
        .mock("POST", "/chain/market/derby/migrate")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("current_stake".into(), "15000".into()),
            Matcher::UrlEncoded("participant_count".into(), "12".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"success": true, "migrated": true, "chain_id": "d42", "message": "Market migrated"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = ChainClient::new(Some(server.url())).unwrap();
    let allocator = ChainAllocator::new(
        AllocationThresholds::default(),
        Arc::new(ChainClient::new(Some(server.url())).unwrap()),
    );

    let still_small = allocator
        .plan_migration(&client, "derby", &MarketAllocationInput::new(dec!(800), 12))
        .await
        .unwrap();
    assert!(still_small.is_none());

    let result = allocator
        .plan_migration(&client, "derby", &MarketAllocationInput::new(dec!(15000), 12))
        .await
        .unwrap()
        .unwrap();
    assert!(result.migrated);
    assert_eq!(result.chain_id.as_deref(), Some("d42"));

    migrate.assert_async().await;
}

#[tokio::test]
async fn test_backend_error_surfaces_from_resolution() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/chain/market/ghost")
        .with_status(404)
        .with_body(r#"{"detail": "Market not found"}"#)
        .create_async()
        .await;

    let allocator = ChainAllocator::new(
        AllocationThresholds::default(),
        Arc::new(ChainClient::new(Some(server.url())).unwrap()),
    );

    let err = allocator.resolve_chain_info("ghost").await.unwrap_err();
    assert!(err.to_string().contains("404"));
}
