use tracing::{debug, warn};

use crate::backend::IndexBackend;
use crate::error::{IndexError, IndexResult};
use crate::models::{
    CollectionKind, DOCUMENT_KEY, IngestOutcome, IngestPolicy, Metadata, TYPE_KEY, VectorRecord,
};
use crate::service::EmbeddingIndex;

/// Caller metadata plus the reserved `document` and `type` keys.
///
/// Reserved keys overwrite caller-supplied values of the same name.
pub fn build_envelope(kind: CollectionKind, text: &str, metadata: Metadata) -> Metadata {
    let mut envelope = metadata;
    envelope.insert(DOCUMENT_KEY.to_string(), text.into());
    envelope.insert(TYPE_KEY.to_string(), kind.as_str().into());
    envelope
}

impl<B: IndexBackend + ?Sized> EmbeddingIndex<B> {
    /// Store `embedding` under `doc_id` in the collection for `kind`,
    /// overwriting any previous vector with that id.
    ///
    /// A wrong-sized embedding is always rejected before any backend call.
    /// Backend failures are returned or downgraded to
    /// [`IngestOutcome::Degraded`] according to the collection's
    /// [`IngestPolicy`].
    pub async fn ingest(
        &self,
        kind: CollectionKind,
        doc_id: &str,
        embedding: Vec<f32>,
        text: &str,
        metadata: Metadata,
    ) -> IndexResult<IngestOutcome> {
        if doc_id.trim().is_empty() {
            return Err(IndexError::Validation(
                "document id must not be empty".to_string(),
            ));
        }
        self.check_dimension(kind, &embedding)?;

        let settings = self.collection(kind);
        let record = VectorRecord::new(doc_id, embedding)
            .with_metadata(build_envelope(kind, text, metadata));

        match self.backend.upsert(&settings.spec.name, record).await {
            Ok(()) => {
                debug!(collection = %settings.spec.name, doc_id, "Stored embedding");
                Ok(IngestOutcome::Stored)
            }
            Err(e) => match settings.ingest_policy {
                IngestPolicy::Strict => Err(e),
                IngestPolicy::BestEffort => {
                    warn!(
                        collection = %settings.spec.name,
                        doc_id,
                        error = %e,
                        "Embedding not stored"
                    );
                    Ok(IngestOutcome::Degraded {
                        reason: e.to_string(),
                    })
                }
            },
        }
    }

    /// Embed `text` with the configured embedder and ingest it.
    pub async fn ingest_text(
        &self,
        kind: CollectionKind,
        doc_id: &str,
        text: &str,
        metadata: Metadata,
    ) -> IndexResult<IngestOutcome> {
        let embedding = self.embed(text).await?;
        self.ingest(kind, doc_id, embedding, text, metadata).await
    }
}
