//! Embedding Index Domain Library
//!
//! Keeps two vector collections, one for text chunks and one for image
//! captions, on a managed vector database and exposes provisioning,
//! ingestion, retrieval and deletion over them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  EmbeddingIndex  │  ← dimension checks, fan-out, batching, policies
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐     ┌─────────────────┐
//! │   IndexBackend   │     │    Embedder     │  (optional, text helpers)
//! │     (trait)      │     │    (trait)      │
//! └────────┬─────────┘     └────────┬────────┘
//!          │                        │
//! ┌────────▼─────────┐     ┌────────▼────────┐
//! │ PineconeBackend  │     │ OpenAIEmbedder  │
//! │ QdrantBackend    │     └─────────────────┘
//! │ InMemoryBackend  │
//! └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_embedding_index::{
//!     CollectionKind, EmbeddingIndex, IndexConfig, Metadata, MetadataFilter, PineconeBackend,
//!     PineconeConfig,
//! };
//! use core_config::FromEnv;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = IndexConfig::from_env()?;
//! let backend = PineconeBackend::new(PineconeConfig::from_env()?)?;
//! let index = EmbeddingIndex::new(backend, config.settings());
//!
//! index.ensure_collections().await?;
//!
//! let mut metadata = Metadata::new();
//! metadata.insert("workspace_name".into(), "ws1".into());
//! index
//!     .ingest(CollectionKind::Text, "doc-1", vec![0.1; 768], "hello", metadata)
//!     .await?;
//!
//! let nearest = index.query(&vec![0.1; 768], 5).await?;
//! let in_workspace = index
//!     .filtered_query(CollectionKind::Text, None, Some(&MetadataFilter::workspace("ws1")), 10)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod deletion;
pub mod diagnostics;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod ingestion;
pub mod memory;
pub mod models;
pub mod pinecone;
pub mod provisioning;
pub mod qdrant;
pub mod retrieval;
pub mod service;

// Re-export commonly used types
pub use backend::IndexBackend;
pub use config::{BackendKind, CollectionSettings, IndexConfig, IndexSettings};
pub use deletion::{DELETE_BATCH_SIZE, DropConfirmation, ENUMERATION_CAP};
pub use diagnostics::{CollectionReport, DocumentPreview, IndexReport, VerifyReport};
pub use embedding::{Embedder, OpenAIConfig, OpenAIEmbedder};
pub use error::{IndexError, IndexResult};
pub use filter::MetadataFilter;
pub use ingestion::build_envelope;
pub use memory::{CallSnapshot, InMemoryBackend};
pub use models::{
    CollectionKind, CollectionSpec, DistanceMetric, Document, FanOutMode, IndexStats,
    IngestOutcome, IngestPolicy, Metadata, QueryRequest, ScoredMatch, VectorRecord,
    WORKSPACE_KEY,
};
pub use pinecone::{PineconeBackend, PineconeConfig};
pub use provisioning::{ProvisionOutcome, resolve_region};
pub use qdrant::{QdrantBackend, QdrantConfig};
pub use retrieval::rank_matches;
pub use service::EmbeddingIndex;
