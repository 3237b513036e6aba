use core_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Failed to provision collection '{collection}': {message}")]
    Provisioning { collection: String, message: String },

    #[error(
        "Dimension mismatch for collection '{collection}': expected {expected}, got {actual}"
    )]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Backend unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Backend answered but refused the request.
    #[error("Backend rejected request{}: {message}", status_suffix(.status))]
    Backend {
        status: Option<u16>,
        message: String,
    },

    #[error("Collection already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Deletion from '{collection}' failed after {deleted} ids were removed: {message}")]
    Deletion {
        collection: String,
        deleted: usize,
        message: String,
    },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type IndexResult<T> = Result<T, IndexError>;

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|code| format!(" ({})", code)).unwrap_or_default()
}

impl IndexError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            IndexError::UpstreamUnavailable(_) => true,
            IndexError::Backend { status, .. } => match status {
                None => true,
                Some(code) => *code == 429 || *code >= 500,
            },
            _ => false,
        }
    }

    /// Whether a create call failed only because the collection is already there.
    ///
    /// Backends report this with a dedicated status or only in the message text,
    /// depending on the vendor.
    pub fn indicates_already_exists(&self) -> bool {
        match self {
            IndexError::AlreadyExists(_) => true,
            IndexError::Backend { message, .. } | IndexError::UpstreamUnavailable(message) => {
                let message = message.to_lowercase();
                message.contains("already exists") || message.contains("already in use")
            }
            _ => false,
        }
    }

    /// Number of ids removed before a batched deletion failed.
    pub fn deleted_before_failure(&self) -> Option<usize> {
        match self {
            IndexError::Deletion { deleted, .. } => Some(*deleted),
            _ => None,
        }
    }
}

impl From<qdrant_client::QdrantError> for IndexError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        IndexError::Backend {
            status: None,
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for IndexError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            IndexError::Internal(format!("Malformed backend response: {}", err))
        } else {
            IndexError::UpstreamUnavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Internal(format!("JSON error: {}", err))
    }
}

impl From<ConfigError> for IndexError {
    fn from(err: ConfigError) -> Self {
        IndexError::Config(err.to_string())
    }
}
