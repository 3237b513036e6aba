use async_trait::async_trait;

use crate::error::IndexResult;

/// Turns text into an embedding vector.
///
/// The index never calls an embedder on its own; it is only used by the
/// text convenience operations (`search_text`, `ingest_text`, `verify_text`).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate the embedding for a single text
    async fn embed(&self, text: &str) -> IndexResult<Vec<f32>>;
}
