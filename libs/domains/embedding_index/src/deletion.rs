use tracing::{info, warn};

use crate::backend::IndexBackend;
use crate::error::{IndexError, IndexResult};
use crate::filter::MetadataFilter;
use crate::models::CollectionKind;
use crate::service::EmbeddingIndex;

/// Most ids a single workspace deletion will enumerate.
pub const ENUMERATION_CAP: usize = 10_000;
/// Ids sent per backend delete call.
pub const DELETE_BATCH_SIZE: usize = 1_000;

/// Explicit opt-in for [`EmbeddingIndex::drop_collection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropConfirmation {
    Unconfirmed,
    Confirmed,
}

impl From<bool> for DropConfirmation {
    fn from(confirmed: bool) -> Self {
        if confirmed {
            DropConfirmation::Confirmed
        } else {
            DropConfirmation::Unconfirmed
        }
    }
}

impl<B: IndexBackend + ?Sized> EmbeddingIndex<B> {
    /// Delete every document whose `workspace_name` equals `workspace`.
    ///
    /// At most [`ENUMERATION_CAP`] documents are removed per call; run it
    /// again when the returned count equals the cap.
    pub async fn delete_by_workspace(
        &self,
        kind: CollectionKind,
        workspace: &str,
    ) -> IndexResult<usize> {
        if workspace.trim().is_empty() {
            return Err(IndexError::Validation(
                "workspace name must not be empty".to_string(),
            ));
        }

        let ids = self
            .enumerate_ids(kind, &MetadataFilter::workspace(workspace), ENUMERATION_CAP)
            .await?;

        if ids.is_empty() {
            info!(collection = %self.collection_name(kind), workspace, "No documents to delete");
            return Ok(0);
        }
        if ids.len() >= ENUMERATION_CAP {
            warn!(
                collection = %self.collection_name(kind),
                workspace,
                cap = ENUMERATION_CAP,
                "Enumeration hit the cap, more documents may remain"
            );
        }

        let deleted = self.delete_in_batches(kind, &ids).await?;
        info!(
            collection = %self.collection_name(kind),
            workspace,
            deleted,
            "Deleted workspace documents"
        );
        Ok(deleted)
    }

    /// Delete the given ids. Unknown ids are ignored by the backend.
    pub async fn delete_by_ids(&self, kind: CollectionKind, ids: &[String]) -> IndexResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.delete_in_batches(kind, ids).await
    }

    /// Irreversibly remove the whole collection. It is not recreated;
    /// call [`ensure_collections`](Self::ensure_collections) to get it back.
    pub async fn drop_collection(
        &self,
        kind: CollectionKind,
        confirmation: DropConfirmation,
    ) -> IndexResult<()> {
        if confirmation != DropConfirmation::Confirmed {
            return Err(IndexError::Validation(
                "dropping a collection requires explicit confirmation".to_string(),
            ));
        }

        let name = self.collection_name(kind);
        warn!(collection = %name, "Dropping collection");
        self.backend.drop_collection(name).await
    }

    async fn delete_in_batches(&self, kind: CollectionKind, ids: &[String]) -> IndexResult<usize> {
        let name = self.collection_name(kind);
        let mut deleted = 0;

        for batch in ids.chunks(DELETE_BATCH_SIZE) {
            self.backend
                .delete_ids(name, batch)
                .await
                .map_err(|e| IndexError::Deletion {
                    collection: name.to_string(),
                    deleted,
                    message: e.to_string(),
                })?;
            deleted += batch.len();
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockIndexBackend;
    use crate::config::IndexSettings;
    use crate::models::ScoredMatch;
    use mockall::Sequence;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("doc-{i}")).collect()
    }

    #[tokio::test]
    async fn test_workspace_deletion_batches_by_thousand() {
        let mut backend = MockIndexBackend::new();
        backend
            .expect_query()
            .withf(|_, request| request.top_k == ENUMERATION_CAP && request.filter.is_some())
            .times(1)
            .returning(|_, _| Ok(ids(2500).into_iter().map(|id| ScoredMatch::new(id, 0.0)).collect()));

        let mut seq = Sequence::new();
        for size in [1000, 1000, 500] {
            backend
                .expect_delete_ids()
                .withf(move |collection, batch| collection == "text" && batch.len() == size)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _| Ok(()));
        }

        let index = EmbeddingIndex::new(backend, IndexSettings::new(4));
        let deleted = index
            .delete_by_workspace(CollectionKind::Text, "ws1")
            .await
            .unwrap();
        assert_eq!(deleted, 2500);
    }

    #[tokio::test]
    async fn test_workspace_over_cap_needs_a_second_call() {
        let mut backend = MockIndexBackend::new();
        let mut seq = Sequence::new();

        backend
            .expect_query()
            .withf(|_, request| request.top_k == ENUMERATION_CAP)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(ids(ENUMERATION_CAP)
                    .into_iter()
                    .map(|id| ScoredMatch::new(id, 0.0))
                    .collect())
            });
        backend
            .expect_delete_ids()
            .withf(|_, batch| batch.len() == DELETE_BATCH_SIZE)
            .times(ENUMERATION_CAP / DELETE_BATCH_SIZE)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        backend
            .expect_query()
            .withf(|_, request| request.top_k == ENUMERATION_CAP)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(vec![ScoredMatch::new("straggler", 0.0)]));
        backend
            .expect_delete_ids()
            .withf(|_, batch| batch == ["straggler".to_string()])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let index = EmbeddingIndex::new(backend, IndexSettings::new(4));
        let first = index
            .delete_by_workspace(CollectionKind::Text, "huge")
            .await
            .unwrap();
        assert_eq!(first, ENUMERATION_CAP);

        let second = index
            .delete_by_workspace(CollectionKind::Text, "huge")
            .await
            .unwrap();
        assert_eq!(second, 1);
    }

    #[tokio::test]
    async fn test_empty_workspace_makes_no_delete_call() {
        let mut backend = MockIndexBackend::new();
        backend.expect_query().times(1).returning(|_, _| Ok(vec![]));
        backend.expect_delete_ids().never();

        let index = EmbeddingIndex::new(backend, IndexSettings::new(4));
        assert_eq!(
            index.delete_by_workspace(CollectionKind::Image, "empty").await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_blank_workspace_is_rejected() {
        let mut backend = MockIndexBackend::new();
        backend.expect_query().never();

        let index = EmbeddingIndex::new(backend, IndexSettings::new(4));
        assert!(matches!(
            index.delete_by_workspace(CollectionKind::Text, "").await,
            Err(IndexError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_failure_reports_partial_progress() {
        let mut backend = MockIndexBackend::new();
        let mut calls = 0;
        backend.expect_delete_ids().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Ok(())
            } else {
                Err(IndexError::UpstreamUnavailable("timeout".into()))
            }
        });

        let index = EmbeddingIndex::new(backend, IndexSettings::new(4));
        let err = index
            .delete_by_ids(CollectionKind::Text, &ids(1800))
            .await
            .unwrap_err();
        assert_eq!(err.deleted_before_failure(), Some(1000));
        assert!(matches!(err, IndexError::Deletion { ref collection, .. } if collection == "text"));
    }

    #[tokio::test]
    async fn test_empty_id_list_is_a_no_op() {
        let mut backend = MockIndexBackend::new();
        backend.expect_delete_ids().never();

        let index = EmbeddingIndex::new(backend, IndexSettings::new(4));
        assert_eq!(index.delete_by_ids(CollectionKind::Text, &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drop_requires_confirmation() {
        let mut backend = MockIndexBackend::new();
        backend
            .expect_drop_collection()
            .withf(|collection| collection == "image")
            .times(1)
            .returning(|_| Ok(()));
        backend.expect_create_collection().never();

        let index = EmbeddingIndex::new(backend, IndexSettings::new(4));
        assert!(matches!(
            index
                .drop_collection(CollectionKind::Image, DropConfirmation::from(false))
                .await,
            Err(IndexError::Validation(_))
        ));
        index
            .drop_collection(CollectionKind::Image, DropConfirmation::Confirmed)
            .await
            .unwrap();
    }
}
