//! Idempotent creation of the configured collections.

use resilience::{CancellationToken, RetryConfig, RetryError, retry_cancellable_if};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::IndexBackend;
use crate::error::{IndexError, IndexResult};
use crate::models::{CollectionKind, CollectionSpec};
use crate::service::EmbeddingIndex;

pub const DEFAULT_REGION: &str = "us-east-1";

/// AWS regions recognised inside a legacy environment string such as
/// `us-west-2-aws`.
pub const KNOWN_REGIONS: [&str; 8] = [
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-west-2",
    "eu-central-1",
    "ap-southeast-1",
];

/// Pick the serverless region: an explicit value wins, then a known region
/// found inside the legacy environment string, then [`DEFAULT_REGION`].
pub fn resolve_region(explicit: Option<&str>, legacy_environment: Option<&str>) -> String {
    if let Some(region) = explicit.map(str::trim).filter(|r| !r.is_empty()) {
        return region.to_string();
    }

    legacy_environment
        .and_then(|env| KNOWN_REGIONS.iter().find(|region| env.contains(*region)))
        .map(|region| region.to_string())
        .unwrap_or_else(|| DEFAULT_REGION.to_string())
}

/// How a collection came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionOutcome {
    /// Listed by the backend, nothing created
    Existing,
    Created,
    /// Create lost a race with a concurrent creator
    CreatedConcurrently,
}

/// Make sure `spec.name` exists, creating it when absent.
///
/// Listing is retried; when it keeps failing the create is attempted anyway.
/// An "already exists" answer to the create counts as success. Any other
/// create failure is retried and then reported as
/// [`IndexError::Provisioning`].
pub async fn ensure_collection<B: IndexBackend + ?Sized>(
    backend: &B,
    spec: &CollectionSpec,
    retry: &RetryConfig,
    token: &CancellationToken,
) -> IndexResult<ProvisionOutcome> {
    let listed = retry_cancellable_if(
        || backend.list_collections(),
        retry,
        token,
        IndexError::is_retryable,
    )
    .await;

    match listed {
        Ok(names) if names.iter().any(|n| n == &spec.name) => {
            debug!(collection = %spec.name, "Collection already exists");
            return Ok(ProvisionOutcome::Existing);
        }
        Ok(_) => {}
        Err(RetryError::Cancelled { .. }) => return Err(cancelled(spec)),
        Err(e) => {
            warn!(
                collection = %spec.name,
                error = %e,
                "Could not list collections, attempting create"
            );
        }
    }

    info!(
        collection = %spec.name,
        dimension = spec.dimension,
        metric = %spec.metric,
        region = %spec.region,
        "Creating collection"
    );

    let created = retry_cancellable_if(
        || async move {
            match backend.create_collection(spec).await {
                Ok(()) => Ok(ProvisionOutcome::Created),
                Err(e) if e.indicates_already_exists() => {
                    Ok(ProvisionOutcome::CreatedConcurrently)
                }
                Err(e) => Err(e),
            }
        },
        retry,
        token,
        IndexError::is_retryable,
    )
    .await;

    match created {
        Ok(outcome) => {
            if outcome == ProvisionOutcome::CreatedConcurrently {
                info!(collection = %spec.name, "Collection was created concurrently");
            } else {
                info!(collection = %spec.name, "Collection created");
            }
            Ok(outcome)
        }
        Err(RetryError::Cancelled { .. }) => Err(cancelled(spec)),
        Err(e) => Err(IndexError::Provisioning {
            collection: spec.name.clone(),
            message: e.to_string(),
        }),
    }
}

fn cancelled(spec: &CollectionSpec) -> IndexError {
    IndexError::Provisioning {
        collection: spec.name.clone(),
        message: "cancelled".to_string(),
    }
}

impl<B: IndexBackend + ?Sized> EmbeddingIndex<B> {
    /// Provision both collections. Safe to call repeatedly.
    pub async fn ensure_collections(&self) -> IndexResult<()> {
        self.ensure_collections_cancellable(&CancellationToken::new())
            .await
    }

    /// [`ensure_collections`](Self::ensure_collections), abandoning retry
    /// waits as soon as `token` is cancelled.
    pub async fn ensure_collections_cancellable(&self, token: &CancellationToken) -> IndexResult<()> {
        for kind in CollectionKind::ALL {
            self.ensure_collection(kind, token).await?;
        }
        Ok(())
    }

    pub async fn ensure_collection(
        &self,
        kind: CollectionKind,
        token: &CancellationToken,
    ) -> IndexResult<ProvisionOutcome> {
        ensure_collection(
            self.backend.as_ref(),
            &self.collection(kind).spec,
            &self.settings.provisioning,
            token,
        )
        .await
    }
}
