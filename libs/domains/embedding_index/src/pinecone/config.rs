use core_config::{ConfigError, FromEnv, env_or_default, env_parse, env_required};

/// Pinecone control-plane connection settings
#[derive(Debug, Clone)]
pub struct PineconeConfig {
    pub api_key: String,
    /// Control plane base URL. Data-plane hosts are discovered per index.
    pub controller_url: String,
    pub api_version: String,
    /// Serverless cloud provider for newly created indexes
    pub cloud: String,
    pub timeout_secs: u64,
}

impl PineconeConfig {
    pub const DEFAULT_CONTROLLER_URL: &'static str = "https://api.pinecone.io";
    pub const DEFAULT_API_VERSION: &'static str = "2024-07";

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            controller_url: Self::DEFAULT_CONTROLLER_URL.to_string(),
            api_version: Self::DEFAULT_API_VERSION.to_string(),
            cloud: "aws".to_string(),
            timeout_secs: 30,
        }
    }

    pub fn with_controller_url(mut self, url: impl Into<String>) -> Self {
        self.controller_url = url.into();
        self
    }

    pub fn with_cloud(mut self, cloud: impl Into<String>) -> Self {
        self.cloud = cloud.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl FromEnv for PineconeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: env_required("PINECONE_API_KEY")?,
            controller_url: env_or_default("PINECONE_CONTROLLER_URL", Self::DEFAULT_CONTROLLER_URL),
            api_version: env_or_default("PINECONE_API_VERSION", Self::DEFAULT_API_VERSION),
            cloud: env_or_default("PINECONE_CLOUD", "aws"),
            timeout_secs: env_parse("PINECONE_TIMEOUT_SECS", 30)?,
        })
    }
}
