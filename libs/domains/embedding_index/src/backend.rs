use async_trait::async_trait;

use crate::error::IndexResult;
use crate::models::{CollectionSpec, IndexStats, QueryRequest, ScoredMatch, VectorRecord};

/// Vendor-neutral view of a managed vector database.
///
/// Collections are addressed by name. Implementations translate errors into
/// [`crate::IndexError`] so callers can classify them without knowing the
/// vendor: transient failures as `UpstreamUnavailable`, create races as
/// `AlreadyExists`, unknown collections as `NotFound`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IndexBackend: Send + Sync {
    // ===== Collection Management =====

    /// Names of all collections visible to the credentials in use
    async fn list_collections(&self) -> IndexResult<Vec<String>>;

    /// Create a collection
    async fn create_collection(&self, spec: &CollectionSpec) -> IndexResult<()>;

    /// Irreversibly delete a collection and everything in it
    async fn drop_collection(&self, collection: &str) -> IndexResult<()>;

    /// Dimension and vector count
    async fn describe_stats(&self, collection: &str) -> IndexResult<IndexStats>;

    // ===== Vector Operations =====

    /// Insert or overwrite the vector stored under `record.id`
    async fn upsert(&self, collection: &str, record: VectorRecord) -> IndexResult<()>;

    /// Nearest neighbours of `request.vector`, best first, raw backend scores
    async fn query(&self, collection: &str, request: QueryRequest)
    -> IndexResult<Vec<ScoredMatch>>;

    /// Stored vector and metadata, `None` when the id is unknown
    async fn fetch(&self, collection: &str, id: &str) -> IndexResult<Option<VectorRecord>>;

    /// Delete vectors by id. Unknown ids are ignored.
    async fn delete_ids(&self, collection: &str, ids: &[String]) -> IndexResult<()>;
}
