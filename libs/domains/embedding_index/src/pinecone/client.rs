use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::PineconeConfig;
use crate::backend::IndexBackend;
use crate::error::{IndexError, IndexResult};
use crate::models::{
    CollectionSpec, IndexStats, Metadata, QueryRequest, ScoredMatch, VectorRecord,
};

/// Pinecone serverless backend over the REST API.
///
/// Collection management goes to the control plane. Vector operations go to
/// the per-index data-plane host, looked up once and cached.
pub struct PineconeBackend {
    client: Client,
    config: PineconeConfig,
    hosts: RwLock<HashMap<String, String>>,
}

impl PineconeBackend {
    pub fn new(config: PineconeConfig) -> IndexResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IndexError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            hosts: RwLock::new(HashMap::new()),
        })
    }

    fn control_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.controller_url.trim_end_matches('/'), path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Api-Key", &self.config.api_key)
            .header("X-Pinecone-API-Version", &self.config.api_version)
    }

    async fn data_url(&self, collection: &str, path: &str) -> IndexResult<String> {
        if let Some(host) = self.hosts.read().await.get(collection) {
            return Ok(format!("{}/{}", host, path));
        }

        let response = self
            .authed(self.client.get(self.control_url(&format!("indexes/{}", collection))))
            .send()
            .await?;
        let description: IndexDescription = check(response, collection).await?.json().await?;

        let host = normalize_host(&description.host);
        self.hosts
            .write()
            .await
            .insert(collection.to_string(), host.clone());

        tracing::debug!(collection = %collection, host = %host, "Resolved Pinecone data-plane host");
        Ok(format!("{}/{}", host, path))
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

/// Map a non-success response into the error taxonomy.
async fn check(response: Response, collection: &str) -> IndexResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, collection, body))
}

fn status_error(status: StatusCode, collection: &str, body: String) -> IndexError {
    match status {
        StatusCode::NOT_FOUND => IndexError::NotFound(format!("index '{}': {}", collection, body)),
        StatusCode::CONFLICT => IndexError::AlreadyExists(collection.to_string()),
        s if s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error() => {
            IndexError::UpstreamUnavailable(format!("Pinecone API error ({}): {}", s, body))
        }
        s => IndexError::Backend {
            status: Some(s.as_u16()),
            message: body,
        },
    }
}

// ===== Wire types =====

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    name: String,
    #[serde(default)]
    host: String,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: String,
    spec: ServerlessSpec<'a>,
}

#[derive(Debug, Serialize)]
struct ServerlessSpec<'a> {
    serverless: CloudRegion<'a>,
}

#[derive(Debug, Serialize)]
struct CloudRegion<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Debug, Serialize)]
struct UpsertRequest {
    vectors: Vec<WireVector>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireVector {
    id: String,
    #[serde(default)]
    values: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Metadata>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireQuery {
    vector: Vec<f32>,
    top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Debug, Deserialize)]
struct WireMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, WireVector>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    ids: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    total_vector_count: u64,
}

impl From<QueryRequest> for WireQuery {
    fn from(request: QueryRequest) -> Self {
        Self {
            vector: request.vector,
            top_k: request.top_k,
            filter: request
                .filter
                .filter(|f| !f.is_empty())
                .map(|f| f.to_pinecone()),
            include_metadata: request.include_metadata,
            include_values: false,
        }
    }
}

#[async_trait]
impl IndexBackend for PineconeBackend {
    async fn list_collections(&self) -> IndexResult<Vec<String>> {
        let response = self
            .authed(self.client.get(self.control_url("indexes")))
            .send()
            .await?;
        let list: IndexList = check(response, "*").await?.json().await?;

        let mut hosts = self.hosts.write().await;
        for index in &list.indexes {
            if !index.host.is_empty() {
                hosts.insert(index.name.clone(), normalize_host(&index.host));
            }
        }

        Ok(list.indexes.into_iter().map(|i| i.name).collect())
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> IndexResult<()> {
        let body = CreateIndexRequest {
            name: &spec.name,
            dimension: spec.dimension,
            metric: spec.metric.to_string(),
            spec: ServerlessSpec {
                serverless: CloudRegion {
                    cloud: &self.config.cloud,
                    region: &spec.region,
                },
            },
        };

        let response = self
            .authed(self.client.post(self.control_url("indexes")))
            .json(&body)
            .send()
            .await?;
        check(response, &spec.name).await?;
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> IndexResult<()> {
        let response = self
            .authed(
                self.client
                    .delete(self.control_url(&format!("indexes/{}", collection))),
            )
            .send()
            .await?;
        check(response, collection).await?;

        self.hosts.write().await.remove(collection);
        Ok(())
    }

    async fn describe_stats(&self, collection: &str) -> IndexResult<IndexStats> {
        let url = self.data_url(collection, "describe_index_stats").await?;
        let response = self
            .authed(self.client.post(url))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let stats: StatsResponse = check(response, collection).await?.json().await?;

        Ok(IndexStats {
            dimension: stats.dimension,
            total_vector_count: stats.total_vector_count,
        })
    }

    async fn upsert(&self, collection: &str, record: VectorRecord) -> IndexResult<()> {
        let url = self.data_url(collection, "vectors/upsert").await?;
        let body = UpsertRequest {
            vectors: vec![WireVector {
                id: record.id,
                values: record.values,
                metadata: Some(record.metadata),
            }],
        };

        let response = self.authed(self.client.post(url)).json(&body).send().await?;
        check(response, collection).await?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        request: QueryRequest,
    ) -> IndexResult<Vec<ScoredMatch>> {
        let url = self.data_url(collection, "query").await?;
        let body = WireQuery::from(request);

        let response = self.authed(self.client.post(url)).json(&body).send().await?;
        let result: QueryResponse = check(response, collection).await?.json().await?;

        Ok(result
            .matches
            .into_iter()
            .map(|m| ScoredMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata,
            })
            .collect())
    }

    async fn fetch(&self, collection: &str, id: &str) -> IndexResult<Option<VectorRecord>> {
        let url = self.data_url(collection, "vectors/fetch").await?;
        let response = self
            .authed(self.client.get(url).query(&[("ids", id)]))
            .send()
            .await?;
        let mut result: FetchResponse = check(response, collection).await?.json().await?;

        Ok(result.vectors.remove(id).map(|v| VectorRecord {
            id: v.id,
            values: v.values,
            metadata: v.metadata.unwrap_or_default(),
        }))
    }

    async fn delete_ids(&self, collection: &str, ids: &[String]) -> IndexResult<()> {
        let url = self.data_url(collection, "vectors/delete").await?;
        let response = self
            .authed(self.client.post(url))
            .json(&DeleteRequest { ids })
            .send()
            .await?;
        check(response, collection).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::MetadataFilter;
    use serde_json::json;

    #[test]
    fn test_normalize_host() {
        assert_eq!(
            normalize_host("text-abc.svc.pinecone.io"),
            "https://text-abc.svc.pinecone.io"
        );
        assert_eq!(normalize_host("http://localhost:5080/"), "http://localhost:5080");
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "text", String::new()),
            IndexError::NotFound(_)
        ));
        assert!(status_error(StatusCode::CONFLICT, "text", String::new()).indicates_already_exists());

        let err = status_error(StatusCode::SERVICE_UNAVAILABLE, "text", "down".into());
        assert!(matches!(err, IndexError::UpstreamUnavailable(_)));
        assert!(err.is_retryable());

        let err = status_error(StatusCode::UNAUTHORIZED, "text", "bad key".into());
        assert!(matches!(err, IndexError::Backend { status: Some(401), .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_query_wire_format() {
        let request = QueryRequest::new(vec![0.0, 0.0], 10)
            .with_filter(MetadataFilter::workspace("ws1"))
            .ids_only();

        let wire = serde_json::to_value(WireQuery::from(request)).unwrap();
        assert_eq!(
            wire,
            json!({
                "vector": [0.0, 0.0],
                "topK": 10,
                "filter": {"workspace_name": {"$eq": "ws1"}},
                "includeMetadata": false,
                "includeValues": false
            })
        );
    }

    #[test]
    fn test_empty_filter_is_omitted() {
        let request = QueryRequest::new(vec![1.0], 3).with_filter(MetadataFilter::new());
        let wire = serde_json::to_value(WireQuery::from(request)).unwrap();
        assert!(wire.get("filter").is_none());
    }

    #[test]
    fn test_create_request_wire_format() {
        let body = CreateIndexRequest {
            name: "text",
            dimension: 768,
            metric: "cosine".into(),
            spec: ServerlessSpec {
                serverless: CloudRegion {
                    cloud: "aws",
                    region: "eu-west-1",
                },
            },
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "name": "text",
                "dimension": 768,
                "metric": "cosine",
                "spec": {"serverless": {"cloud": "aws", "region": "eu-west-1"}}
            })
        );
    }

    #[test]
    fn test_stats_and_fetch_responses_parse() {
        let stats: StatsResponse =
            serde_json::from_value(json!({"dimension": 768, "totalVectorCount": 42, "namespaces": {}}))
                .unwrap();
        assert_eq!(stats.dimension, Some(768));
        assert_eq!(stats.total_vector_count, 42);

        let fetched: FetchResponse = serde_json::from_value(json!({
            "vectors": {"d1": {"id": "d1", "values": [0.1, 0.2], "metadata": {"document": "hi"}}},
            "namespace": ""
        }))
        .unwrap();
        let v = &fetched.vectors["d1"];
        assert_eq!(v.values, vec![0.1, 0.2]);
        assert_eq!(v.metadata.as_ref().unwrap()["document"], json!("hi"));
    }

    #[tokio::test]
    async fn test_unreachable_controller_is_upstream_unavailable() {
        let backend = PineconeBackend::new(
            PineconeConfig::new("pk-test")
                .with_controller_url("http://127.0.0.1:1")
                .with_timeout(2),
        )
        .unwrap();

        let err = backend.list_collections().await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err:?}");
    }
}
