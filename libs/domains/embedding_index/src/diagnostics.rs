//! Read-only health checks used by operators.

use resilience::{CancellationToken, retry_cancellable_if};
use serde::Serialize;
use tracing::warn;

use crate::backend::IndexBackend;
use crate::error::{IndexError, IndexResult};
use crate::filter::MetadataFilter;
use crate::models::{CollectionKind, IndexStats};
use crate::service::EmbeddingIndex;

/// Workspace document ids listed per collection in [`IndexReport`].
pub const WORKSPACE_SAMPLE_SIZE: usize = 10;
/// Documents fetched and previewed by [`EmbeddingIndex::verify_indexing`].
pub const VERIFY_PREVIEW_COUNT: usize = 5;
/// Characters of content shown per preview.
pub const PREVIEW_CHARS: usize = 200;
/// Upper bound when counting a workspace's documents during verification.
pub const VERIFY_WORKSPACE_LIMIT: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct CollectionReport {
    pub kind: CollectionKind,
    pub name: String,
    pub present: bool,
    pub stats: Option<IndexStats>,
    pub sample_ids: Vec<String>,
    /// Backend error hit while collecting this report
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    /// Every collection the backend lists, configured or not
    pub backend_collections: Vec<String>,
    pub collections: Vec<CollectionReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentPreview {
    pub id: String,
    pub preview: Option<String>,
    pub workspace: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub workspace: Option<String>,
    /// Text-collection matches for the probe embedding, best first
    pub matched_ids: Vec<String>,
    pub previews: Vec<DocumentPreview>,
    /// Documents carrying the workspace, counted up to [`VERIFY_WORKSPACE_LIMIT`]
    pub workspace_document_count: Option<usize>,
    pub workspace_sample_ids: Vec<String>,
}

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

impl<B: IndexBackend + ?Sized> EmbeddingIndex<B> {
    /// Statistics for both collections plus, when `workspace` is given, a
    /// sample of that workspace's document ids.
    ///
    /// Per-collection failures are recorded in the report instead of failing
    /// the whole call. Only a failure to list collections is an error.
    pub async fn stats(&self, workspace: Option<&str>) -> IndexResult<IndexReport> {
        let backend_collections = retry_cancellable_if(
            || self.backend.list_collections(),
            &self.settings.provisioning,
            &CancellationToken::new(),
            IndexError::is_retryable,
        )
        .await
        .map_err(|e| {
            e.into_last_error().unwrap_or_else(|| {
                IndexError::Internal("listing collections was cancelled".to_string())
            })
        })?;

        let filter = workspace
            .filter(|w| !w.trim().is_empty())
            .map(MetadataFilter::workspace);

        let mut collections = Vec::with_capacity(CollectionKind::ALL.len());
        for kind in CollectionKind::ALL {
            let name = self.collection_name(kind).to_string();
            let present = backend_collections.contains(&name);
            let mut report = CollectionReport {
                kind,
                name,
                present,
                stats: None,
                sample_ids: Vec::new(),
                error: None,
            };

            if present {
                match self.backend.describe_stats(&report.name).await {
                    Ok(stats) => report.stats = Some(stats),
                    Err(e) => {
                        warn!(
                            collection = %report.name,
                            error = %e,
                            "Could not describe collection"
                        );
                        report.error = Some(e.to_string());
                    }
                }

                if let Some(filter) = &filter {
                    match self.enumerate_ids(kind, filter, WORKSPACE_SAMPLE_SIZE).await {
                        Ok(ids) => report.sample_ids = ids,
                        Err(e) => {
                            warn!(
                                collection = %report.name,
                                error = %e,
                                "Could not sample workspace documents"
                            );
                            report.error.get_or_insert_with(|| e.to_string());
                        }
                    }
                }
            }

            collections.push(report);
        }

        Ok(IndexReport {
            backend_collections,
            collections,
        })
    }

    /// Check that documents are retrievable: run a text-collection query with
    /// `embedding` (restricted to `workspace` when given), preview the top
    /// matches, and count the workspace's documents.
    pub async fn verify_indexing(
        &self,
        embedding: &[f32],
        workspace: Option<&str>,
        n: usize,
    ) -> IndexResult<VerifyReport> {
        let workspace = workspace.filter(|w| !w.trim().is_empty());
        let filter = workspace.map(MetadataFilter::workspace);

        let matched_ids = self
            .filtered_query(CollectionKind::Text, Some(embedding), filter.as_ref(), n)
            .await?;

        let mut previews = Vec::new();
        for id in matched_ids.iter().take(VERIFY_PREVIEW_COUNT) {
            if let Some(doc) = self.fetch_document(CollectionKind::Text, id).await? {
                previews.push(DocumentPreview {
                    id: doc.id.clone(),
                    preview: doc.content.as_deref().map(preview),
                    workspace: doc.workspace().map(str::to_string),
                });
            }
        }

        let (workspace_document_count, workspace_sample_ids) = match &filter {
            Some(filter) => {
                let ids = self
                    .enumerate_ids(CollectionKind::Text, filter, VERIFY_WORKSPACE_LIMIT)
                    .await?;
                let sample = ids.iter().take(WORKSPACE_SAMPLE_SIZE).cloned().collect();
                (Some(ids.len()), sample)
            }
            None => (None, Vec::new()),
        };

        Ok(VerifyReport {
            workspace: workspace.map(str::to_string),
            matched_ids,
            previews,
            workspace_document_count,
            workspace_sample_ids,
        })
    }

    /// [`verify_indexing`](Self::verify_indexing) for a question in plain text.
    pub async fn verify_text(
        &self,
        question: &str,
        workspace: Option<&str>,
        n: usize,
    ) -> IndexResult<VerifyReport> {
        let embedding = self.embed(question).await?;
        self.verify_indexing(&embedding, workspace, n).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockIndexBackend;
    use crate::config::IndexSettings;
    use crate::models::{Metadata, ScoredMatch, VectorRecord};
    use resilience::RetryConfig;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(250);
        let shown = preview(&long);
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 3);
        assert!(shown.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }

    #[tokio::test]
    async fn test_stats_records_per_collection_errors() {
        let mut backend = MockIndexBackend::new();
        backend
            .expect_list_collections()
            .returning(|| Ok(vec!["text".into(), "image".into(), "legacy".into()]));
        backend
            .expect_describe_stats()
            .withf(|c| c == "text")
            .returning(|_| {
                Ok(IndexStats {
                    dimension: Some(4),
                    total_vector_count: 12,
                })
            });
        backend
            .expect_describe_stats()
            .withf(|c| c == "image")
            .returning(|_| Err(IndexError::UpstreamUnavailable("slow".into())));
        backend.expect_query().never();

        let index = EmbeddingIndex::new(backend, IndexSettings::new(4));
        let report = index.stats(None).await.unwrap();

        assert_eq!(report.backend_collections.len(), 3);
        let text = &report.collections[0];
        assert_eq!(text.stats.as_ref().unwrap().total_vector_count, 12);
        assert!(text.error.is_none());
        let image = &report.collections[1];
        assert!(image.stats.is_none());
        assert!(image.error.as_deref().unwrap().contains("slow"));
    }

    #[tokio::test]
    async fn test_stats_skips_missing_collections() {
        let mut backend = MockIndexBackend::new();
        backend.expect_list_collections().returning(|| Ok(vec![]));
        backend.expect_describe_stats().never();

        let index = EmbeddingIndex::new(backend, IndexSettings::new(4));
        let report = index.stats(Some("ws1")).await.unwrap();
        assert!(report.collections.iter().all(|c| !c.present));
    }

    #[tokio::test]
    async fn test_stats_retries_listing() {
        let mut backend = MockIndexBackend::new();
        backend
            .expect_list_collections()
            .times(3)
            .returning(|| Err(IndexError::UpstreamUnavailable("down".into())));

        let settings = IndexSettings::new(4)
            .with_provisioning(RetryConfig::fixed(3, Duration::from_millis(1)));
        let index = EmbeddingIndex::new(backend, settings);
        assert!(index.stats(None).await.is_err());
    }

    #[tokio::test]
    async fn test_stats_does_not_retry_rejected_listing() {
        let mut backend = MockIndexBackend::new();
        backend.expect_list_collections().times(1).returning(|| {
            Err(IndexError::Backend {
                status: Some(401),
                message: "invalid api key".into(),
            })
        });
        backend.expect_describe_stats().never();

        let index = EmbeddingIndex::new(backend, IndexSettings::new(4));
        let err = index.stats(None).await.unwrap_err();
        assert!(matches!(err, IndexError::Backend { status: Some(401), .. }));
    }

    #[tokio::test]
    async fn test_verify_previews_and_counts_workspace() {
        let mut backend = MockIndexBackend::new();
        backend
            .expect_query()
            .withf(|_, request| request.filter.is_some() && request.top_k == 10)
            .times(1)
            .returning(|_, _| Ok(vec![ScoredMatch::new("d1", 0.9)]));
        backend
            .expect_query()
            .withf(|_, request| request.top_k == VERIFY_WORKSPACE_LIMIT)
            .times(1)
            .returning(|_, _| Ok(vec![ScoredMatch::new("d1", 0.0), ScoredMatch::new("d2", 0.0)]));
        backend.expect_fetch().times(1).returning(|_, id| {
            let mut metadata = Metadata::new();
            metadata.insert("document".into(), json!("x".repeat(300)));
            metadata.insert("workspace_name".into(), json!("ws1"));
            Ok(Some(VectorRecord::new(id, vec![0.0; 4]).with_metadata(metadata)))
        });

        let index = EmbeddingIndex::new(backend, IndexSettings::new(4));
        let report = index
            .verify_indexing(&[1.0, 0.0, 0.0, 0.0], Some("ws1"), 10)
            .await
            .unwrap();

        assert_eq!(report.matched_ids, vec!["d1"]);
        assert_eq!(report.previews.len(), 1);
        assert_eq!(report.previews[0].preview.as_ref().unwrap().len(), PREVIEW_CHARS + 3);
        assert_eq!(report.previews[0].workspace.as_deref(), Some("ws1"));
        assert_eq!(report.workspace_document_count, Some(2));
        assert_eq!(report.workspace_sample_ids, vec!["d1", "d2"]);
    }
}
