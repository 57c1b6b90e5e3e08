//! Public SDK surface for Meridian.
//!
//! This crate re-exports the service crates and wires them together from a
//! single [`MeridianConfig`](config::MeridianConfig).

/// Re-export for convenience.
pub use meridian_config as config;
pub use meridian_core as core;
pub use meridian_guard as guard;
/// Re-export for convenience.
pub use meridian_protocol as protocol;
pub use meridian_recommend as recommend;
pub use meridian_vector as vector;

use log::info;
use meridian_config::{ConfigError, MeridianConfig};
use meridian_core::{ChatService, CoreError, ProviderClient};
use meridian_recommend::{CatalogSource, RecommendationEngine};
use meridian_vector::{EmbeddingClient, VectorError, VectorStore};
use std::sync::Arc;
use thiserror::Error;

/// Initialize logging with env_logger, controlled by `RUST_LOG`.
///
/// Binaries should call this early in startup. Repeated calls are ignored.
pub fn init_logging() {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();
}

/// Errors raised while wiring services.
#[derive(Debug, Error)]
pub enum ServicesError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Vector(#[from] VectorError),
}

/// The three Meridian services built from one config.
pub struct Services {
    pub chat: ChatService,
    pub recommendations: RecommendationEngine,
    pub vectors: VectorStore,
}

impl Services {
    /// Build every service from `config` and the external collaborators.
    pub fn from_config(
        config: &MeridianConfig,
        provider: Arc<dyn ProviderClient>,
        catalog: Arc<dyn CatalogSource>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Result<Self, ServicesError> {
        config.validate()?;
        let chat = ChatService::builder(config, provider).build()?;
        let recommendations =
            RecommendationEngine::new(config.recommendations.clone(), catalog);
        let vectors = VectorStore::new(config.vector.clone(), embedder)?;
        info!("meridian services ready");
        Ok(Self {
            chat,
            recommendations,
            vectors,
        })
    }
}
