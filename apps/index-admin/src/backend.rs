use std::sync::Arc;

use core_config::FromEnv;
use domain_embedding_index::{
    BackendKind, EmbeddingIndex, InMemoryBackend, IndexBackend, IndexConfig, OpenAIEmbedder,
    PineconeBackend, PineconeConfig, QdrantBackend, QdrantConfig,
};
use eyre::{Result, WrapErr};
use tracing::{debug, info, warn};

/// Construct the configured vendor adapter and wrap it in an index.
///
/// An embedder is attached when `OPENAI_API_KEY` is set; without one the
/// text commands fail with a configuration error.
pub fn build_index(config: &IndexConfig) -> Result<EmbeddingIndex<dyn IndexBackend>> {
    let backend: Arc<dyn IndexBackend> = match config.backend {
        BackendKind::Pinecone => {
            let pinecone = PineconeConfig::from_env().wrap_err("Invalid Pinecone configuration")?;
            info!(controller = %pinecone.controller_url, "Using Pinecone backend");
            Arc::new(PineconeBackend::new(pinecone)?)
        }
        BackendKind::Qdrant => {
            let qdrant = QdrantConfig::from_env().wrap_err("Invalid Qdrant configuration")?;
            info!(url = %qdrant.url, "Using Qdrant backend");
            Arc::new(QdrantBackend::new(qdrant)?)
        }
        BackendKind::Memory => {
            warn!("Using in-memory backend, nothing outlives this process");
            Arc::new(InMemoryBackend::new())
        }
    };

    let index = EmbeddingIndex::from_shared(backend, config.settings());

    match OpenAIEmbedder::from_env() {
        Ok(embedder) => {
            info!(model = embedder.model(), "Text embedding enabled");
            Ok(index.with_embedder(Arc::new(embedder)))
        }
        Err(e) => {
            debug!(error = %e, "No embedder configured");
            Ok(index)
        }
    }
}
