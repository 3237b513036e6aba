use std::str::FromStr;
use std::time::Duration;

use core_config::{ConfigError, FromEnv, env_optional, env_or_default, env_parse};
use resilience::RetryConfig;
use strum::{Display, EnumString};

use crate::models::{CollectionKind, CollectionSpec, DistanceMetric, IngestPolicy};
use crate::provisioning::resolve_region;

/// Which vendor adapter an application should construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BackendKind {
    #[default]
    Pinecone,
    Qdrant,
    Memory,
}

/// Settings for one of the two collections.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSettings {
    pub spec: CollectionSpec,
    pub ingest_policy: IngestPolicy,
}

/// Everything [`crate::EmbeddingIndex`] needs besides the backend.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub text: CollectionSettings,
    pub image: CollectionSettings,
    /// Backoff used while provisioning collections
    pub provisioning: RetryConfig,
}

impl IndexSettings {
    /// Both collections at `dimension` with cosine metric, the default region,
    /// strict text ingestion and best-effort image ingestion.
    pub fn new(dimension: usize) -> Self {
        Self {
            text: CollectionSettings {
                spec: CollectionSpec::new(CollectionKind::Text.as_str(), dimension),
                ingest_policy: IngestPolicy::Strict,
            },
            image: CollectionSettings {
                spec: CollectionSpec::new(CollectionKind::Image.as_str(), dimension),
                ingest_policy: IngestPolicy::BestEffort,
            },
            provisioning: RetryConfig::fixed(3, Duration::from_secs(2)),
        }
    }

    pub fn collection(&self, kind: CollectionKind) -> &CollectionSettings {
        match kind {
            CollectionKind::Text => &self.text,
            CollectionKind::Image => &self.image,
        }
    }

    fn collection_mut(&mut self, kind: CollectionKind) -> &mut CollectionSettings {
        match kind {
            CollectionKind::Text => &mut self.text,
            CollectionKind::Image => &mut self.image,
        }
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.text.spec.metric = metric;
        self.image.spec.metric = metric;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        let region = region.into();
        self.text.spec.region = region.clone();
        self.image.spec.region = region;
        self
    }

    pub fn with_collection_name(mut self, kind: CollectionKind, name: impl Into<String>) -> Self {
        self.collection_mut(kind).spec.name = name.into();
        self
    }

    pub fn with_ingest_policy(mut self, kind: CollectionKind, policy: IngestPolicy) -> Self {
        self.collection_mut(kind).ingest_policy = policy;
        self
    }

    pub fn with_provisioning(mut self, retry: RetryConfig) -> Self {
        self.provisioning = retry;
        self
    }

    /// Kind whose backend collection is called `name`.
    pub fn kind_of(&self, name: &str) -> Option<CollectionKind> {
        CollectionKind::ALL
            .into_iter()
            .find(|kind| self.collection(*kind).spec.name == name)
    }
}

/// Index configuration loaded from the environment
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub backend: BackendKind,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub text_collection: String,
    pub image_collection: String,
    /// Region after applying the explicit > legacy > default resolution
    pub region: String,
    pub provision_attempts: u32,
    pub provision_delay: Duration,
    pub text_policy: IngestPolicy,
    pub image_policy: IngestPolicy,
}

impl IndexConfig {
    pub fn settings(&self) -> IndexSettings {
        IndexSettings::new(self.dimension)
            .with_metric(self.metric)
            .with_region(self.region.clone())
            .with_collection_name(CollectionKind::Text, self.text_collection.clone())
            .with_collection_name(CollectionKind::Image, self.image_collection.clone())
            .with_ingest_policy(CollectionKind::Text, self.text_policy)
            .with_ingest_policy(CollectionKind::Image, self.image_policy)
            .with_provisioning(RetryConfig::fixed(
                self.provision_attempts,
                self.provision_delay,
            ))
    }
}

fn parse_strum<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr<Err = strum::ParseError>,
{
    env_parse(key, default)
}

impl FromEnv for IndexConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let dimension: usize = env_parse("INDEX_DIMENSION", 768)?;
        if dimension == 0 {
            return Err(ConfigError::ParseError {
                key: "INDEX_DIMENSION".to_string(),
                details: "dimension must be a positive integer".to_string(),
            });
        }

        let provision_attempts: u32 = env_parse("INDEX_PROVISION_ATTEMPTS", 3)?;
        if provision_attempts == 0 {
            return Err(ConfigError::ParseError {
                key: "INDEX_PROVISION_ATTEMPTS".to_string(),
                details: "at least one attempt is required".to_string(),
            });
        }

        let text_collection = env_or_default("INDEX_TEXT_COLLECTION", "text");
        let image_collection = env_or_default("INDEX_IMAGE_COLLECTION", "image");
        if text_collection == image_collection {
            return Err(ConfigError::ParseError {
                key: "INDEX_IMAGE_COLLECTION".to_string(),
                details: format!(
                    "'{}' is already the text collection, the two collections must differ",
                    image_collection
                ),
            });
        }

        let region = resolve_region(
            env_optional("INDEX_REGION").as_deref(),
            env_optional("PINECONE_ENVIRONMENT").as_deref(),
        );

        Ok(Self {
            backend: parse_strum("VECTOR_BACKEND", BackendKind::Pinecone)?,
            dimension,
            metric: parse_strum("INDEX_METRIC", DistanceMetric::Cosine)?,
            text_collection,
            image_collection,
            region,
            provision_attempts,
            provision_delay: Duration::from_millis(env_parse("INDEX_PROVISION_DELAY_MS", 2000)?),
            text_policy: parse_strum("INDEX_TEXT_INGEST_POLICY", IngestPolicy::Strict)?,
            image_policy: parse_strum("INDEX_IMAGE_INGEST_POLICY", IngestPolicy::BestEffort)?,
        })
    }
}
