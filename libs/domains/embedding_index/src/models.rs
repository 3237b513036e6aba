use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::filter::MetadataFilter;

/// Metadata stored alongside every vector. Values are expected to be scalars.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Reserved metadata key holding a copy of the raw text.
pub const DOCUMENT_KEY: &str = "document";
/// Reserved metadata key holding the owning collection's kind.
pub const TYPE_KEY: &str = "type";
/// Metadata key callers use to scope documents to a workspace.
pub const WORKSPACE_KEY: &str = "workspace_name";

/// The two collections the index coordinates.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CollectionKind {
    Text,
    Image,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 2] = [CollectionKind::Text, CollectionKind::Image];

    /// Discriminant written to the `type` metadata key.
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Text => "text",
            CollectionKind::Image => "image",
        }
    }
}

/// Distance metric for similarity calculations
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum DistanceMetric {
    #[default]
    #[strum(to_string = "cosine")]
    Cosine,
    #[strum(to_string = "dotproduct", serialize = "dot")]
    DotProduct,
    #[strum(to_string = "euclidean", serialize = "euclid")]
    Euclidean,
}

impl DistanceMetric {
    /// Convert a raw backend score into a similarity where higher is closer.
    ///
    /// Backends report euclidean results as distances, so they are negated.
    pub fn similarity(&self, score: f32) -> f32 {
        match self {
            DistanceMetric::Cosine | DistanceMetric::DotProduct => score,
            DistanceMetric::Euclidean => -score,
        }
    }
}

/// Everything needed to create a collection. Fixed once the collection exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub region: String,
}

impl CollectionSpec {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric: DistanceMetric::default(),
            region: crate::provisioning::DEFAULT_REGION.to_string(),
        }
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }
}

/// Backend-reported statistics for one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub dimension: Option<usize>,
    pub total_vector_count: u64,
}

/// A single vector as written to, or read back from, a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Metadata,
}

impl VectorRecord {
    pub fn new(id: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            values,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Query parameters sent to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub filter: Option<MetadataFilter>,
    pub include_metadata: bool,
}

impl QueryRequest {
    pub fn new(vector: Vec<f32>, top_k: usize) -> Self {
        Self {
            vector,
            top_k,
            filter: None,
            include_metadata: true,
        }
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn ids_only(mut self) -> Self {
        self.include_metadata = false;
        self
    }
}

/// A backend match with its raw score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Option<Metadata>,
}

impl ScoredMatch {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
            metadata: None,
        }
    }
}

/// A stored document as returned by [`crate::EmbeddingIndex::fetch_document`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub collection: CollectionKind,
    /// Raw text recovered from the `document` metadata key.
    pub content: Option<String>,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

impl Document {
    pub(crate) fn from_record(collection: CollectionKind, record: VectorRecord) -> Self {
        let content = record
            .metadata
            .get(DOCUMENT_KEY)
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Self {
            id: record.id,
            collection,
            content,
            metadata: record.metadata,
            embedding: record.values,
        }
    }

    pub fn workspace(&self) -> Option<&str> {
        self.metadata.get(WORKSPACE_KEY).and_then(|v| v.as_str())
    }
}

/// How ingestion treats a failed backend write.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum IngestPolicy {
    /// Backend failures are returned to the caller.
    #[default]
    Strict,
    /// Backend failures are logged and reported as [`IngestOutcome::Degraded`].
    BestEffort,
}

/// Result of a successful call to `ingest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestOutcome {
    Stored,
    /// The write failed under [`IngestPolicy::BestEffort`]; nothing was stored.
    Degraded { reason: String },
}

impl IngestOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, IngestOutcome::Stored)
    }
}

/// Failure handling for the two-collection fan-out query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FanOutMode {
    /// Any failing sub-query fails the whole query.
    #[default]
    Strict,
    /// A failing sub-query is logged and skipped; fails only if both fail.
    BestEffort,
}
