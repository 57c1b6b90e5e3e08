//! End-to-end wiring of the Meridian services.

use meridian::Services;
use meridian::config::MeridianConfig;
use meridian::core::SendMessageRequest;
use meridian::recommend::{Candidate, ItemKind, RecommendationOptions};
use meridian::vector::{DocumentMetadata, SearchOptions};
use meridian_test_utils::{EchoProvider, KeywordEmbedding, StaticCatalog};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn services(config: &MeridianConfig) -> Result<Services, meridian::ServicesError> {
    Services::from_config(
        config,
        Arc::new(EchoProvider),
        Arc::new(StaticCatalog::new(vec![Candidate::new(
            "s-intro",
            ItemKind::Script,
            "sales",
            0.8,
        )])),
        Arc::new(KeywordEmbedding::default()),
    )
}

#[tokio::test]
async fn services_share_one_config() {
    let services = services(&MeridianConfig::default()).expect("services");

    let reply = services
        .chat
        .send_message(SendMessageRequest::new("s1", "Hello"))
        .await;
    assert!(reply.success);

    let recommendations = services
        .recommendations
        .get_recommendations(None, &RecommendationOptions::default())
        .await
        .data
        .expect("recommendations");
    assert_eq!(recommendations.scripts.len(), 1);

    services
        .vectors
        .index_text("d1", "hello world", DocumentMetadata::default())
        .await
        .expect("index");
    let response = services
        .vectors
        .search("hello", &SearchOptions::default())
        .await;
    assert_eq!(response.results.len(), 1);
}

#[test]
fn invalid_config_is_rejected_before_wiring() {
    let mut config = MeridianConfig::default();
    config.chat.max_attempts = 0;
    assert!(matches!(
        services(&config),
        Err(meridian::ServicesError::Config(_))
    ));
}
