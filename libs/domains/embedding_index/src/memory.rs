use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::IndexBackend;
use crate::error::{IndexError, IndexResult};
use crate::models::{
    CollectionSpec, DistanceMetric, IndexStats, QueryRequest, ScoredMatch, VectorRecord,
};

struct MemoryCollection {
    spec: CollectionSpec,
    // Insertion order breaks score ties.
    records: Vec<VectorRecord>,
}

impl MemoryCollection {
    fn check_dimension(&self, len: usize) -> IndexResult<()> {
        if len != self.spec.dimension {
            return Err(IndexError::Backend {
                status: Some(400),
                message: format!(
                    "vector dimension {} does not match the dimension of the index {}",
                    len, self.spec.dimension
                ),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
struct CallCounters {
    list: AtomicUsize,
    create: AtomicUsize,
    drop: AtomicUsize,
    stats: AtomicUsize,
    upsert: AtomicUsize,
    query: AtomicUsize,
    fetch: AtomicUsize,
    delete: AtomicUsize,
}

/// Number of calls each backend operation has received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallSnapshot {
    pub list: usize,
    pub create: usize,
    pub drop: usize,
    pub stats: usize,
    pub upsert: usize,
    pub query: usize,
    pub fetch: usize,
    pub delete: usize,
}

impl CallSnapshot {
    pub fn total(&self) -> usize {
        self.list
            + self.create
            + self.drop
            + self.stats
            + self.upsert
            + self.query
            + self.fetch
            + self.delete
    }
}

/// Process-local backend for tests and offline runs.
///
/// Scores follow the vendor conventions: cosine similarity and dot product
/// are higher-is-closer, euclidean reports the distance itself.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    collections: Arc<RwLock<HashMap<String, MemoryCollection>>>,
    calls: Arc<CallCounters>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> CallSnapshot {
        let c = &self.calls;
        CallSnapshot {
            list: c.list.load(Ordering::SeqCst),
            create: c.create.load(Ordering::SeqCst),
            drop: c.drop.load(Ordering::SeqCst),
            stats: c.stats.load(Ordering::SeqCst),
            upsert: c.upsert.load(Ordering::SeqCst),
            query: c.query.load(Ordering::SeqCst),
            fetch: c.fetch.load(Ordering::SeqCst),
            delete: c.delete.load(Ordering::SeqCst),
        }
    }

    /// Number of vectors stored in `collection`, zero when it does not exist.
    pub async fn len(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections.get(collection).map_or(0, |c| c.records.len())
    }

    fn not_found(collection: &str) -> IndexError {
        IndexError::NotFound(format!("collection '{}'", collection))
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn score(metric: DistanceMetric, query: &[f32], stored: &[f32]) -> f32 {
    match metric {
        DistanceMetric::DotProduct => dot(query, stored),
        DistanceMetric::Cosine => {
            let norms = dot(query, query).sqrt() * dot(stored, stored).sqrt();
            if norms == 0.0 {
                0.0
            } else {
                dot(query, stored) / norms
            }
        }
        DistanceMetric::Euclidean => query
            .iter()
            .zip(stored)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
    }
}

#[async_trait]
impl IndexBackend for InMemoryBackend {
    async fn list_collections(&self) -> IndexResult<Vec<String>> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        let collections = self.collections.read().await;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> IndexResult<()> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        let mut collections = self.collections.write().await;

        if collections.contains_key(&spec.name) {
            return Err(IndexError::AlreadyExists(spec.name.clone()));
        }

        collections.insert(
            spec.name.clone(),
            MemoryCollection {
                spec: spec.clone(),
                records: Vec::new(),
            },
        );

        tracing::info!(collection = %spec.name, dimension = spec.dimension, "Created in-memory collection");
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> IndexResult<()> {
        self.calls.drop.fetch_add(1, Ordering::SeqCst);
        let mut collections = self.collections.write().await;
        collections
            .remove(collection)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(collection))
    }

    async fn describe_stats(&self, collection: &str) -> IndexResult<IndexStats> {
        self.calls.stats.fetch_add(1, Ordering::SeqCst);
        let collections = self.collections.read().await;
        let c = collections
            .get(collection)
            .ok_or_else(|| Self::not_found(collection))?;

        Ok(IndexStats {
            dimension: Some(c.spec.dimension),
            total_vector_count: c.records.len() as u64,
        })
    }

    async fn upsert(&self, collection: &str, record: VectorRecord) -> IndexResult<()> {
        self.calls.upsert.fetch_add(1, Ordering::SeqCst);
        let mut collections = self.collections.write().await;
        let c = collections
            .get_mut(collection)
            .ok_or_else(|| Self::not_found(collection))?;
        c.check_dimension(record.values.len())?;

        match c.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => c.records.push(record),
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        request: QueryRequest,
    ) -> IndexResult<Vec<ScoredMatch>> {
        self.calls.query.fetch_add(1, Ordering::SeqCst);
        let collections = self.collections.read().await;
        let c = collections
            .get(collection)
            .ok_or_else(|| Self::not_found(collection))?;
        c.check_dimension(request.vector.len())?;

        let metric = c.spec.metric;
        let mut matches: Vec<ScoredMatch> = c
            .records
            .iter()
            .filter(|r| request.filter.as_ref().is_none_or(|f| f.matches(&r.metadata)))
            .map(|r| ScoredMatch {
                id: r.id.clone(),
                score: score(metric, &request.vector, &r.values),
                metadata: request.include_metadata.then(|| r.metadata.clone()),
            })
            .collect();

        matches.sort_by(|a, b| {
            metric
                .similarity(b.score)
                .total_cmp(&metric.similarity(a.score))
        });
        matches.truncate(request.top_k);
        Ok(matches)
    }

    async fn fetch(&self, collection: &str, id: &str) -> IndexResult<Option<VectorRecord>> {
        self.calls.fetch.fetch_add(1, Ordering::SeqCst);
        let collections = self.collections.read().await;
        let c = collections
            .get(collection)
            .ok_or_else(|| Self::not_found(collection))?;
        Ok(c.records.iter().find(|r| r.id == id).cloned())
    }

    async fn delete_ids(&self, collection: &str, ids: &[String]) -> IndexResult<()> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        let mut collections = self.collections.write().await;
        let c = collections
            .get_mut(collection)
            .ok_or_else(|| Self::not_found(collection))?;
        c.records.retain(|r| !ids.contains(&r.id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::MetadataFilter;
    use crate::models::Metadata;
    use serde_json::json;

    async fn backend_with(metric: DistanceMetric) -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend
            .create_collection(&CollectionSpec::new("text", 2).with_metric(metric))
            .await
            .unwrap();
        backend
    }

    fn record(id: &str, values: Vec<f32>, workspace: &str) -> VectorRecord {
        let mut metadata = Metadata::new();
        metadata.insert("workspace_name".into(), json!(workspace));
        VectorRecord::new(id, values).with_metadata(metadata)
    }

    #[tokio::test]
    async fn test_create_twice_reports_already_exists() {
        let backend = backend_with(DistanceMetric::Cosine).await;
        let err = backend
            .create_collection(&CollectionSpec::new("text", 2))
            .await
            .unwrap_err();
        assert!(err.indicates_already_exists());
        assert_eq!(backend.calls().create, 2);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_in_place() {
        let backend = backend_with(DistanceMetric::Cosine).await;
        backend.upsert("text", record("a", vec![1.0, 0.0], "ws1")).await.unwrap();
        backend.upsert("text", record("a", vec![0.0, 1.0], "ws2")).await.unwrap();

        assert_eq!(backend.len("text").await, 1);
        let stored = backend.fetch("text", "a").await.unwrap().unwrap();
        assert_eq!(stored.values, vec![0.0, 1.0]);
        assert_eq!(stored.metadata["workspace_name"], json!("ws2"));
    }

    #[tokio::test]
    async fn test_rejects_wrong_dimension() {
        let backend = backend_with(DistanceMetric::Cosine).await;
        let err = backend
            .upsert("text", VectorRecord::new("a", vec![1.0, 2.0, 3.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Backend { status: Some(400), .. }));
    }

    #[tokio::test]
    async fn test_cosine_query_orders_and_filters() {
        let backend = backend_with(DistanceMetric::Cosine).await;
        backend.upsert("text", record("far", vec![0.0, 1.0], "ws1")).await.unwrap();
        backend.upsert("text", record("near", vec![1.0, 0.1], "ws1")).await.unwrap();
        backend.upsert("text", record("other", vec![1.0, 0.0], "ws2")).await.unwrap();

        let request =
            QueryRequest::new(vec![1.0, 0.0], 10).with_filter(MetadataFilter::workspace("ws1"));
        let matches = backend.query("text", request).await.unwrap();

        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);
        assert!(matches[0].metadata.is_some());
    }

    #[tokio::test]
    async fn test_euclidean_reports_distance_nearest_first() {
        let backend = backend_with(DistanceMetric::Euclidean).await;
        backend.upsert("text", VectorRecord::new("far", vec![5.0, 5.0])).await.unwrap();
        backend.upsert("text", VectorRecord::new("near", vec![1.0, 1.0])).await.unwrap();

        let matches = backend
            .query("text", QueryRequest::new(vec![1.0, 1.0], 1).ids_only())
            .await
            .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "near");
        assert_eq!(matches[0].score, 0.0);
        assert!(matches[0].metadata.is_none());
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let backend = backend_with(DistanceMetric::DotProduct).await;
        for id in ["first", "second", "third"] {
            backend.upsert("text", VectorRecord::new(id, vec![0.0, 0.0])).await.unwrap();
        }

        let matches = backend
            .query("text", QueryRequest::new(vec![1.0, 1.0], 3))
            .await
            .unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_delete_and_drop() {
        let backend = backend_with(DistanceMetric::Cosine).await;
        backend.upsert("text", VectorRecord::new("a", vec![1.0, 0.0])).await.unwrap();
        backend.upsert("text", VectorRecord::new("b", vec![0.0, 1.0])).await.unwrap();

        backend
            .delete_ids("text", &["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(backend.describe_stats("text").await.unwrap().total_vector_count, 1);

        backend.drop_collection("text").await.unwrap();
        assert!(backend.list_collections().await.unwrap().is_empty());
        assert!(matches!(
            backend.fetch("text", "b").await,
            Err(IndexError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_call_snapshot_counts_every_operation() {
        let backend = InMemoryBackend::new();
        let _ = backend.list_collections().await;
        let _ = backend.fetch("missing", "x").await;
        let calls = backend.calls();
        assert_eq!(calls.list, 1);
        assert_eq!(calls.fetch, 1);
        assert_eq!(calls.total(), 2);
    }
}
