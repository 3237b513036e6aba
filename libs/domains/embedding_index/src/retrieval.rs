use tracing::{debug, warn};

use crate::backend::IndexBackend;
use crate::error::{IndexError, IndexResult};
use crate::filter::MetadataFilter;
use crate::models::{CollectionKind, Document, FanOutMode, QueryRequest};
use crate::service::EmbeddingIndex;

/// Document ids paired with a higher-is-closer similarity.
type Ranked = Vec<(String, f32)>;

/// Sort by descending similarity and keep the first `n` ids.
///
/// The sort is stable, so equal similarities keep their input order. NaN
/// similarities sort last.
pub fn rank_matches(mut matches: Vec<(String, f32)>, n: usize) -> Vec<String> {
    matches.sort_by(|a, b| sort_key(b.1).total_cmp(&sort_key(a.1)));
    matches.into_iter().take(n).map(|(id, _)| id).collect()
}

fn sort_key(similarity: f32) -> f32 {
    if similarity.is_nan() {
        f32::NEG_INFINITY
    } else {
        similarity
    }
}

impl<B: IndexBackend + ?Sized> EmbeddingIndex<B> {
    /// Similarity search over both collections, merged into one ranking.
    ///
    /// Each collection is asked for `n` matches so the best `n` overall are
    /// always available. Fails if either sub-query fails.
    pub async fn query(&self, embedding: &[f32], n: usize) -> IndexResult<Vec<String>> {
        self.query_with_mode(embedding, n, FanOutMode::Strict).await
    }

    /// [`query`](Self::query) with a choice of failure handling.
    pub async fn query_with_mode(
        &self,
        embedding: &[f32],
        n: usize,
        mode: FanOutMode,
    ) -> IndexResult<Vec<String>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        for kind in CollectionKind::ALL {
            self.check_dimension(kind, embedding)?;
        }

        let text = self.scored(CollectionKind::Text, embedding, n, None);
        let image = self.scored(CollectionKind::Image, embedding, n, None);

        let merged = match mode {
            FanOutMode::Strict => {
                let (mut text, image) = tokio::try_join!(text, image)?;
                text.extend(image);
                text
            }
            FanOutMode::BestEffort => match tokio::join!(text, image) {
                (Ok(mut text), Ok(image)) => {
                    text.extend(image);
                    text
                }
                (Ok(text), Err(e)) => {
                    warn!(
                        collection = %self.collection_name(CollectionKind::Image),
                        error = %e,
                        "Sub-query failed, using text results only"
                    );
                    text
                }
                (Err(e), Ok(image)) => {
                    warn!(
                        collection = %self.collection_name(CollectionKind::Text),
                        error = %e,
                        "Sub-query failed, using image results only"
                    );
                    image
                }
                (Err(e), Err(_)) => return Err(e),
            },
        };

        Ok(rank_matches(merged, n))
    }

    /// Similarity search over a single collection.
    pub async fn query_collection(
        &self,
        kind: CollectionKind,
        embedding: &[f32],
        n: usize,
    ) -> IndexResult<Vec<String>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        self.check_dimension(kind, embedding)?;

        let matches = self.scored(kind, embedding, n, None).await?;
        Ok(rank_matches(matches, n))
    }

    /// Search one collection by similarity, by metadata, or both.
    ///
    /// - embedding and filter: similarity search restricted by the filter
    /// - filter only: ids of matching documents, in no particular order
    /// - embedding only: plain similarity search
    ///
    /// An empty filter counts as absent. Supplying neither is a
    /// [`IndexError::Validation`] error and reaches no backend.
    pub async fn filtered_query(
        &self,
        kind: CollectionKind,
        embedding: Option<&[f32]>,
        filter: Option<&MetadataFilter>,
        n: usize,
    ) -> IndexResult<Vec<String>> {
        let filter = filter.filter(|f| !f.is_empty());
        if embedding.is_none() && filter.is_none() {
            return Err(IndexError::Validation(
                "either an embedding or a metadata filter is required".to_string(),
            ));
        }
        if let Some(filter) = filter {
            filter.validate()?;
        }
        if n == 0 {
            return Ok(Vec::new());
        }

        match (embedding, filter) {
            (Some(embedding), filter) => {
                self.check_dimension(kind, embedding)?;
                let matches = self.scored(kind, embedding, n, filter.cloned()).await?;
                Ok(rank_matches(matches, n))
            }
            (None, Some(filter)) => self.enumerate_ids(kind, filter, n).await,
            (None, None) => Ok(Vec::new()),
        }
    }

    /// Ids of up to `limit` documents matching `filter`.
    ///
    /// Uses a zero vector so the backend applies only the filter; the
    /// resulting scores are meaningless and dropped.
    pub(crate) async fn enumerate_ids(
        &self,
        kind: CollectionKind,
        filter: &MetadataFilter,
        limit: usize,
    ) -> IndexResult<Vec<String>> {
        let spec = &self.collection(kind).spec;
        let request = QueryRequest::new(vec![0.0; spec.dimension], limit)
            .with_filter(filter.clone())
            .ids_only();

        let matches = self.backend.query(&spec.name, request).await?;
        debug!(collection = %spec.name, found = matches.len(), limit, "Enumerated ids by filter");
        Ok(matches.into_iter().map(|m| m.id).collect())
    }

    /// Stored vector, metadata and raw text for `doc_id`, if present.
    pub async fn fetch_document(
        &self,
        kind: CollectionKind,
        doc_id: &str,
    ) -> IndexResult<Option<Document>> {
        match self.backend.fetch(self.collection_name(kind), doc_id).await {
            Ok(record) => Ok(record.map(|r| Document::from_record(kind, r))),
            Err(IndexError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Embed `text` and run the two-collection [`query`](Self::query).
    pub async fn search_text(&self, text: &str, n: usize) -> IndexResult<Vec<String>> {
        let embedding = self.embed(text).await?;
        self.query(&embedding, n).await
    }

    /// Embed `text` and run [`filtered_query`](Self::filtered_query) on one
    /// collection.
    pub async fn search_text_in(
        &self,
        kind: CollectionKind,
        text: &str,
        filter: Option<&MetadataFilter>,
        n: usize,
    ) -> IndexResult<Vec<String>> {
        let embedding = self.embed(text).await?;
        self.filtered_query(kind, Some(&embedding), filter, n).await
    }

    async fn scored(
        &self,
        kind: CollectionKind,
        embedding: &[f32],
        top_k: usize,
        filter: Option<MetadataFilter>,
    ) -> IndexResult<Ranked> {
        let spec = &self.collection(kind).spec;
        let mut request = QueryRequest::new(embedding.to_vec(), top_k).ids_only();
        if let Some(filter) = filter {
            request = request.with_filter(filter);
        }

        let matches = self.backend.query(&spec.name, request).await?;
        Ok(matches
            .into_iter()
            .map(|m| (m.id, spec.metric.similarity(m.score)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockIndexBackend;
    use crate::config::IndexSettings;
    use crate::models::{DistanceMetric, ScoredMatch};

    fn ranked(pairs: &[(&str, f32)]) -> Vec<(String, f32)> {
        pairs.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn test_rank_matches_orders_by_score() {
        let ids = rank_matches(ranked(&[("a", 0.2), ("b", 0.9), ("c", 0.5)]), 2);
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_rank_matches_keeps_input_order_on_ties() {
        let ids = rank_matches(ranked(&[("t1", 0.5), ("i1", 0.5), ("t2", 0.5)]), 3);
        assert_eq!(ids, vec!["t1", "i1", "t2"]);
    }

    #[test]
    fn test_rank_matches_puts_nan_last() {
        let ids = rank_matches(ranked(&[("nan", f32::NAN), ("low", -1.0), ("high", 1.0)]), 3);
        assert_eq!(ids, vec!["high", "low", "nan"]);
    }

    #[tokio::test]
    async fn test_fan_out_merges_and_truncates() {
        let mut backend = MockIndexBackend::new();
        backend
            .expect_query()
            .withf(|collection, request| {
                collection == "text" && request.top_k == 2 && !request.include_metadata
            })
            .times(1)
            .returning(|_, _| Ok(vec![ScoredMatch::new("t1", 0.9), ScoredMatch::new("t2", 0.1)]));
        backend
            .expect_query()
            .withf(|collection, request| {
                collection == "image" && request.top_k == 2 && !request.include_metadata
            })
            .times(1)
            .returning(|_, _| Ok(vec![ScoredMatch::new("i1", 0.95)]));

        let index = EmbeddingIndex::new(backend, IndexSettings::new(2));
        let ids = index.query(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(ids, vec!["i1", "t1"]);
    }

    #[tokio::test]
    async fn test_strict_fan_out_fails_when_one_side_fails() {
        let mut backend = MockIndexBackend::new();
        backend
            .expect_query()
            .withf(|collection, _| collection == "text")
            .returning(|_, _| Ok(vec![ScoredMatch::new("t1", 0.9)]));
        backend
            .expect_query()
            .withf(|collection, _| collection == "image")
            .returning(|_, _| Err(IndexError::UpstreamUnavailable("image down".into())));

        let index = EmbeddingIndex::new(backend, IndexSettings::new(2));
        let err = index.query(&[1.0, 0.0], 5).await.unwrap_err();
        assert!(matches!(err, IndexError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_best_effort_fan_out_tolerates_one_failure() {
        let mut backend = MockIndexBackend::new();
        backend
            .expect_query()
            .withf(|collection, _| collection == "text")
            .returning(|_, _| Ok(vec![ScoredMatch::new("t1", 0.9)]));
        backend
            .expect_query()
            .withf(|collection, _| collection == "image")
            .returning(|_, _| Err(IndexError::UpstreamUnavailable("image down".into())));

        let index = EmbeddingIndex::new(backend, IndexSettings::new(2));
        let ids = index
            .query_with_mode(&[1.0, 0.0], 5, FanOutMode::BestEffort)
            .await
            .unwrap();
        assert_eq!(ids, vec!["t1"]);
    }

    #[tokio::test]
    async fn test_best_effort_fan_out_fails_when_both_fail() {
        let mut backend = MockIndexBackend::new();
        backend
            .expect_query()
            .times(2)
            .returning(|_, _| Err(IndexError::UpstreamUnavailable("down".into())));

        let index = EmbeddingIndex::new(backend, IndexSettings::new(2));
        assert!(
            index
                .query_with_mode(&[1.0, 0.0], 5, FanOutMode::BestEffort)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_query_validates_before_calling_backend() {
        let mut backend = MockIndexBackend::new();
        backend.expect_query().never();

        let index = EmbeddingIndex::new(backend, IndexSettings::new(2));
        assert!(index.query(&[1.0, 0.0], 0).await.unwrap().is_empty());
        assert!(matches!(
            index.query(&[1.0, 0.0, 0.0], 3).await,
            Err(IndexError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            index.filtered_query(CollectionKind::Text, None, None, 5).await,
            Err(IndexError::Validation(_))
        ));
        assert!(matches!(
            index
                .filtered_query(CollectionKind::Text, None, Some(&MetadataFilter::new()), 5)
                .await,
            Err(IndexError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_filter_only_uses_zero_vector_and_drops_scores() {
        let mut backend = MockIndexBackend::new();
        backend
            .expect_query()
            .withf(|collection, request| {
                collection == "text"
                    && request.vector == vec![0.0, 0.0]
                    && !request.include_metadata
                    && request.top_k == 10
                    && request.filter == Some(MetadataFilter::workspace("ws1"))
            })
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    ScoredMatch::new("low", 0.0),
                    ScoredMatch::new("high", 0.7),
                ])
            });

        let index = EmbeddingIndex::new(backend, IndexSettings::new(2));
        let ids = index
            .filtered_query(
                CollectionKind::Text,
                None,
                Some(&MetadataFilter::workspace("ws1")),
                10,
            )
            .await
            .unwrap();
        assert_eq!(ids, vec!["low", "high"]);
    }

    #[tokio::test]
    async fn test_euclidean_scores_rank_nearest_first() {
        let mut backend = MockIndexBackend::new();
        backend
            .expect_query()
            .returning(|_, _| Ok(vec![ScoredMatch::new("far", 4.0), ScoredMatch::new("near", 0.5)]));

        let index = EmbeddingIndex::new(
            backend,
            IndexSettings::new(2).with_metric(DistanceMetric::Euclidean),
        );
        let ids = index
            .query_collection(CollectionKind::Text, &[1.0, 1.0], 2)
            .await
            .unwrap();
        assert_eq!(ids, vec!["near", "far"]);
    }

    #[tokio::test]
    async fn test_fetch_missing_collection_is_absent() {
        let mut backend = MockIndexBackend::new();
        backend
            .expect_fetch()
            .returning(|_, _| Err(IndexError::NotFound("collection 'text'".into())));

        let index = EmbeddingIndex::new(backend, IndexSettings::new(2));
        assert!(index.fetch_document(CollectionKind::Text, "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_propagates_transport_errors() {
        let mut backend = MockIndexBackend::new();
        backend
            .expect_fetch()
            .returning(|_, _| Err(IndexError::UpstreamUnavailable("timeout".into())));

        let index = EmbeddingIndex::new(backend, IndexSettings::new(2));
        assert!(index.fetch_document(CollectionKind::Text, "x").await.is_err());
    }
}
