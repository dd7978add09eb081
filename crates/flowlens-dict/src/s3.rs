//! S3-compatible dictionary source
//!
//! Dictionaries stored in a bucket are read through an [`ObjectGateway`],
//! which resolves a named storage configuration to an object store. The
//! gateway is shared by every S3 dictionary source of the process.
//! [`ObjectStorage`] is the gateway backed by the `object_store` crate; it
//! supports AWS S3, MinIO and other S3-compatible services.

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::{ByteStream, DictSource};
use crate::error::DictError;

/// S3 storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// S3 region (e.g., "us-east-1")
    #[serde(default = "default_region")]
    pub region: String,
    /// S3 endpoint URL (for MinIO or other S3-compatible services)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// AWS access key ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    /// AWS secret access key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
    /// Prefix for all keys (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Allow HTTP (not HTTPS) connections
    #[serde(default)]
    pub allow_http: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: "flowlens".to_string(),
            region: default_region(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            prefix: None,
            allow_http: false,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Access to objects stored in named storage configurations
///
/// Implementations must be safe to share between concurrent fetches.
#[async_trait]
pub trait ObjectGateway: Send + Sync {
    /// Get an object from the storage configuration named `config_ref`
    async fn get_object(&self, config_ref: &str, key: &str) -> Result<ByteStream, DictError>;
}

struct Bucket {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl Bucket {
    fn object_path(&self, key: &str) -> Result<ObjectPath, DictError> {
        let path = if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix, key)
        };

        ObjectPath::parse(&path)
            .map_err(|e| DictError::Configuration(format!("Invalid object key {}: {}", key, e)))
    }
}

/// Object storage gateway over `object_store`
#[derive(Default)]
pub struct ObjectStorage {
    buckets: HashMap<String, Bucket>,
}

impl ObjectStorage {
    /// Create the gateway from named S3 configurations
    pub fn new(configs: &HashMap<String, S3Config>) -> Result<Self, DictError> {
        let mut buckets = HashMap::new();

        for (name, config) in configs {
            let mut builder = AmazonS3Builder::new()
                .with_bucket_name(&config.bucket)
                .with_region(&config.region);

            // Set endpoint for MinIO or other S3-compatible services
            if let Some(endpoint) = &config.endpoint {
                builder = builder.with_endpoint(endpoint);
            }

            if let Some(access_key) = &config.access_key_id {
                builder = builder.with_access_key_id(access_key);
            }
            if let Some(secret_key) = &config.secret_access_key {
                builder = builder.with_secret_access_key(secret_key);
            }

            if config.allow_http {
                builder = builder.with_allow_http(true);
            }

            let store = builder.build().map_err(|e| {
                DictError::Configuration(format!("Failed to create S3 client {}: {}", name, e))
            })?;

            let prefix = config.prefix.clone().unwrap_or_default();

            info!(
                "Initialized S3 storage {}: bucket={}, region={}, endpoint={:?}, prefix={}",
                name, config.bucket, config.region, config.endpoint, prefix
            );

            buckets.insert(
                name.clone(),
                Bucket {
                    store: Arc::new(store),
                    prefix,
                },
            );
        }

        Ok(Self { buckets })
    }

    /// Create the gateway from already built stores
    pub fn from_stores<I>(stores: I) -> Self
    where
        I: IntoIterator<Item = (String, Arc<dyn ObjectStore>)>,
    {
        let buckets = stores
            .into_iter()
            .map(|(name, store)| {
                (
                    name,
                    Bucket {
                        store,
                        prefix: String::new(),
                    },
                )
            })
            .collect();

        Self { buckets }
    }
}

#[async_trait]
impl ObjectGateway for ObjectStorage {
    async fn get_object(&self, config_ref: &str, key: &str) -> Result<ByteStream, DictError> {
        let bucket = self
            .buckets
            .get(config_ref)
            .ok_or_else(|| DictError::UnknownStorage(config_ref.to_string()))?;

        let path = bucket.object_path(key)?;
        debug!("Reading object from S3 storage {}: {:?}", config_ref, path);

        let result = bucket.store.get(&path).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => DictError::NotFound(key.to_string()),
            _ => DictError::S3(e.to_string()),
        })?;

        let stream = result
            .into_stream()
            .map_err(|e| DictError::S3(format!("Stream error: {}", e)));

        Ok(Box::pin(stream))
    }
}

/// Configuration of the S3 source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3DictSourceConfig {
    /// Name of the storage configuration holding the dictionaries
    pub s3_config: String,
}

impl Default for S3DictSourceConfig {
    fn default() -> Self {
        Self {
            s3_config: "default".to_string(),
        }
    }
}

/// Configuration of the mocked S3 source, reserved for tests
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct S3MockDictSourceConfig {}

/// Dictionary source reading objects through the gateway
pub struct S3DictSource {
    config_ref: String,
    gateway: Arc<dyn ObjectGateway>,
}

impl S3DictSource {
    pub fn new(config: &S3DictSourceConfig, gateway: Arc<dyn ObjectGateway>) -> Self {
        Self {
            config_ref: config.s3_config.clone(),
            gateway,
        }
    }
}

#[async_trait]
impl DictSource for S3DictSource {
    async fn fetch(&self, key: &str) -> Result<ByteStream, DictError> {
        self.gateway.get_object(&self.config_ref, key).await
    }
}
