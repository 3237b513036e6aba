use std::sync::Arc;

use crate::backend::IndexBackend;
use crate::config::{CollectionSettings, IndexSettings};
use crate::embedding::Embedder;
use crate::error::{IndexError, IndexResult};
use crate::models::CollectionKind;

/// Coordinates the text and image collections on top of an [`IndexBackend`].
///
/// Construct once at startup, call
/// [`ensure_collections`](EmbeddingIndex::ensure_collections), then share
/// clones. Clones reference the same backend.
///
/// Operations are grouped by concern:
/// - provisioning: `ensure_collections`, `ensure_collection`
/// - ingestion: `ingest`, `ingest_text`
/// - retrieval: `query`, `query_collection`, `filtered_query`, `fetch_document`
/// - deletion: `delete_by_workspace`, `delete_by_ids`, `drop_collection`
/// - diagnostics: `stats`, `verify_indexing`
pub struct EmbeddingIndex<B: ?Sized> {
    pub(crate) backend: Arc<B>,
    pub(crate) settings: Arc<IndexSettings>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl<B: ?Sized> Clone for EmbeddingIndex<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            settings: Arc::clone(&self.settings),
            embedder: self.embedder.clone(),
        }
    }
}

impl<B: IndexBackend> EmbeddingIndex<B> {
    pub fn new(backend: B, settings: IndexSettings) -> Self {
        Self::from_shared(Arc::new(backend), settings)
    }
}

impl<B: IndexBackend + ?Sized> EmbeddingIndex<B> {
    /// Build from an already shared backend, including `Arc<dyn IndexBackend>`.
    pub fn from_shared(backend: Arc<B>, settings: IndexSettings) -> Self {
        Self {
            backend,
            settings: Arc::new(settings),
            embedder: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub(crate) fn collection(&self, kind: CollectionKind) -> &CollectionSettings {
        self.settings.collection(kind)
    }

    pub(crate) fn collection_name(&self, kind: CollectionKind) -> &str {
        &self.collection(kind).spec.name
    }

    pub(crate) fn check_dimension(&self, kind: CollectionKind, embedding: &[f32]) -> IndexResult<()> {
        let spec = &self.collection(kind).spec;
        if embedding.len() != spec.dimension {
            return Err(IndexError::DimensionMismatch {
                collection: spec.name.clone(),
                expected: spec.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }

    pub(crate) async fn embed(&self, text: &str) -> IndexResult<Vec<f32>> {
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            IndexError::Config("no embedder configured for text operations".to_string())
        })?;
        embedder.embed(text).await
    }
}
