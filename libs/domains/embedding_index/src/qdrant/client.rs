use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    self, Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    GetPointsBuilder, PointId, PointStruct, ScrollPointsBuilder, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Qdrant, QdrantError};
use serde_json::Value;
use uuid::Uuid;

use super::QdrantConfig;
use crate::backend::IndexBackend;
use crate::error::{IndexError, IndexResult};
use crate::filter::MetadataFilter;
use crate::models::{
    CollectionSpec, DistanceMetric, IndexStats, Metadata, QueryRequest, ScoredMatch, VectorRecord,
};

/// Payload key carrying the caller's document id.
const DOC_ID_KEY: &str = "_doc_id";

/// Qdrant-backed implementation of [`IndexBackend`].
///
/// Qdrant only accepts integers and UUIDs as point ids, so document ids are
/// mapped to a name-based UUID and the original id travels in the payload.
/// The region in a [`CollectionSpec`] has no meaning for Qdrant and is ignored.
pub struct QdrantBackend {
    client: Qdrant,
}

impl QdrantBackend {
    pub fn new(config: QdrantConfig) -> IndexResult<Self> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(api_key) = config.api_key {
            builder = builder.api_key(api_key);
        }

        builder = builder.timeout(Duration::from_secs(config.timeout_secs));

        let client = builder
            .build()
            .map_err(|e| IndexError::Config(format!("Failed to build Qdrant client: {}", e)))?;

        Ok(Self { client })
    }

    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }
}

fn to_qdrant_distance(metric: DistanceMetric) -> Distance {
    match metric {
        DistanceMetric::Cosine => Distance::Cosine,
        DistanceMetric::Euclidean => Distance::Euclid,
        DistanceMetric::DotProduct => Distance::Dot,
    }
}

fn point_id(doc_id: &str) -> PointId {
    PointId::from(Uuid::new_v5(&Uuid::NAMESPACE_OID, doc_id.as_bytes()).to_string())
}

fn point_id_to_string(id: Option<&PointId>) -> String {
    match id.and_then(|p| p.point_id_options.as_ref()) {
        Some(qdrant::point_id::PointIdOptions::Uuid(uuid)) => uuid.clone(),
        Some(qdrant::point_id::PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

/// Translate client errors, recognising the messages Qdrant uses for
/// missing and duplicate collections.
fn classify(err: QdrantError, collection: &str) -> IndexError {
    let message = err.to_string();
    let lower = message.to_lowercase();

    if lower.contains("already exists") {
        IndexError::AlreadyExists(collection.to_string())
    } else if lower.contains("doesn't exist") || lower.contains("not found") {
        IndexError::NotFound(format!("collection '{}': {}", collection, message))
    } else {
        IndexError::from(err)
    }
}

fn to_qdrant_filter(filter: &MetadataFilter) -> IndexResult<Filter> {
    let conditions = filter
        .conditions()
        .map(|(key, value)| match value {
            Value::String(s) => Ok(Condition::matches(key, s.clone())),
            Value::Bool(b) => Ok(Condition::matches(key, *b)),
            Value::Number(n) => n.as_i64().map(|i| Condition::matches(key, i)).ok_or_else(|| {
                IndexError::Validation(format!(
                    "Qdrant can only match integer values, got {} for '{}'",
                    n, key
                ))
            }),
            other => Err(IndexError::Validation(format!(
                "unsupported filter value {} for '{}'",
                other, key
            ))),
        })
        .collect::<IndexResult<Vec<Condition>>>()?;

    Ok(Filter::must(conditions))
}

fn metadata_to_payload(id: &str, metadata: Metadata) -> HashMap<String, QdrantValue> {
    let mut payload: HashMap<String, QdrantValue> = metadata
        .into_iter()
        .filter_map(|(key, val)| json_to_qdrant_value(val).map(|v| (key, v)))
        .collect();
    payload.insert(DOC_ID_KEY.to_string(), QdrantValue::from(id.to_string()));
    payload
}

/// Split the stored payload into the caller's id and metadata.
fn payload_to_metadata(
    fallback_id: String,
    payload: HashMap<String, QdrantValue>,
) -> (String, Metadata) {
    let mut id = fallback_id;
    let mut metadata = Metadata::new();

    for (key, val) in payload {
        let Some(json_val) = qdrant_value_to_json(val) else {
            continue;
        };
        if key == DOC_ID_KEY {
            if let Value::String(original) = json_val {
                id = original;
            }
        } else {
            metadata.insert(key, json_val);
        }
    }

    (id, metadata)
}

fn json_to_qdrant_value(val: Value) -> Option<QdrantValue> {
    match val {
        Value::Null => None,
        Value::Bool(b) => Some(QdrantValue::from(b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(QdrantValue::from(i))
            } else {
                n.as_f64().map(QdrantValue::from)
            }
        }
        Value::String(s) => Some(QdrantValue::from(s)),
        // Structured values are stored as their JSON text
        other => Some(QdrantValue::from(other.to_string())),
    }
}

fn qdrant_value_to_json(val: QdrantValue) -> Option<Value> {
    use qdrant::value::Kind;

    match val.kind {
        Some(Kind::NullValue(_)) => Some(Value::Null),
        Some(Kind::BoolValue(b)) => Some(Value::Bool(b)),
        Some(Kind::IntegerValue(i)) => Some(Value::Number(i.into())),
        Some(Kind::DoubleValue(f)) => serde_json::Number::from_f64(f).map(Value::Number),
        Some(Kind::StringValue(s)) => Some(Value::String(s)),
        _ => None,
    }
}

/// Extract vector values from VectorsOutput
#[allow(deprecated)]
fn extract_vector(vectors: &Option<qdrant::VectorsOutput>) -> Vec<f32> {
    match vectors {
        Some(qdrant::VectorsOutput {
            vectors_options: Some(opts),
        }) => match opts {
            qdrant::vectors_output::VectorsOptions::Vector(v) => v.data.clone(),
            qdrant::vectors_output::VectorsOptions::Vectors(map) => map
                .vectors
                .values()
                .next()
                .map(|v| v.data.clone())
                .unwrap_or_default(),
        },
        _ => Vec::new(),
    }
}

fn extract_dimension(config: &Option<qdrant::CollectionConfig>) -> Option<usize> {
    let vectors_config = config.as_ref()?.params.as_ref()?.vectors_config.as_ref()?;
    match vectors_config.config.as_ref()? {
        qdrant::vectors_config::Config::Params(p) => Some(p.size as usize),
        qdrant::vectors_config::Config::ParamsMap(map) => {
            map.map.values().next().map(|p| p.size as usize)
        }
    }
}

#[async_trait]
impl IndexBackend for QdrantBackend {
    async fn list_collections(&self) -> IndexResult<Vec<String>> {
        let response = self.client.list_collections().await?;
        Ok(response
            .collections
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> IndexResult<()> {
        let builder = CreateCollectionBuilder::new(&spec.name).vectors_config(
            VectorParamsBuilder::new(spec.dimension as u64, to_qdrant_distance(spec.metric)),
        );

        self.client
            .create_collection(builder)
            .await
            .map_err(|e| classify(e, &spec.name))?;
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> IndexResult<()> {
        self.client
            .delete_collection(collection)
            .await
            .map_err(|e| classify(e, collection))?;
        Ok(())
    }

    async fn describe_stats(&self, collection: &str) -> IndexResult<IndexStats> {
        let info = self
            .client
            .collection_info(collection)
            .await
            .map_err(|e| classify(e, collection))?;

        let result = info
            .result
            .ok_or_else(|| IndexError::Internal("Collection info missing result".to_string()))?;

        Ok(IndexStats {
            dimension: extract_dimension(&result.config),
            total_vector_count: result.points_count.unwrap_or_default(),
        })
    }

    async fn upsert(&self, collection: &str, record: VectorRecord) -> IndexResult<()> {
        let point = PointStruct::new(
            point_id(&record.id),
            record.values,
            metadata_to_payload(&record.id, record.metadata),
        );

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, vec![point]).wait(true))
            .await
            .map_err(|e| classify(e, collection))?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        request: QueryRequest,
    ) -> IndexResult<Vec<ScoredMatch>> {
        let filter = request
            .filter
            .as_ref()
            .filter(|f| !f.is_empty())
            .map(to_qdrant_filter)
            .transpose()?;

        // A zero vector has no direction under cosine, so filter-only lookups
        // use a scroll instead of a similarity search.
        let zero_vector = request.vector.iter().all(|v| *v == 0.0);
        if let (Some(filter), true) = (filter.clone(), zero_vector) {
            let builder = ScrollPointsBuilder::new(collection)
                .filter(filter)
                .limit(scroll_limit(request.top_k)?)
                .with_payload(true);
            let response = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| classify(e, collection))?;

            return Ok(response
                .result
                .into_iter()
                .map(|point| {
                    let (id, metadata) =
                        payload_to_metadata(point_id_to_string(point.id.as_ref()), point.payload);
                    ScoredMatch {
                        id,
                        score: 0.0,
                        metadata: request.include_metadata.then_some(metadata),
                    }
                })
                .collect());
        }

        let mut builder =
            SearchPointsBuilder::new(collection, request.vector, request.top_k as u64)
                .with_payload(true);
        if let Some(filter) = filter {
            builder = builder.filter(filter);
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| classify(e, collection))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| {
                let (id, metadata) =
                    payload_to_metadata(point_id_to_string(point.id.as_ref()), point.payload);
                ScoredMatch {
                    id,
                    score: point.score,
                    metadata: request.include_metadata.then_some(metadata),
                }
            })
            .collect())
    }

    async fn fetch(&self, collection: &str, id: &str) -> IndexResult<Option<VectorRecord>> {
        let builder = GetPointsBuilder::new(collection, vec![point_id(id)])
            .with_vectors(true)
            .with_payload(true);

        let response = self
            .client
            .get_points(builder)
            .await
            .map_err(|e| classify(e, collection))?;

        Ok(response.result.into_iter().next().map(|point| {
            let values = extract_vector(&point.vectors);
            let (id, metadata) = payload_to_metadata(id.to_string(), point.payload);
            VectorRecord {
                id,
                values,
                metadata,
            }
        }))
    }

    async fn delete_ids(&self, collection: &str, ids: &[String]) -> IndexResult<()> {
        let point_ids: Vec<PointId> = ids.iter().map(|id| point_id(id)).collect();

        self.client
            .delete_points(DeletePointsBuilder::new(collection).points(point_ids).wait(true))
            .await
            .map_err(|e| classify(e, collection))?;
        Ok(())
    }
}

/// Scroll page size for a filter-only lookup of `top_k` points.
fn scroll_limit(top_k: usize) -> IndexResult<u32> {
    u32::try_from(top_k).map_err(|_| {
        IndexError::Validation(format!(
            "result size {} exceeds the largest scroll page ({})",
            top_k,
            u32::MAX
        ))
    })
}
