//! Dictionary source configuration
//!
//! The source of a dictionary is selected by its `kind`:
//!
//! | kind     | fields                                   |
//! |----------|------------------------------------------|
//! | `file`   | none                                     |
//! | `http`   | `base_url`, `check_status`, `timeout_secs` |
//! | `s3`     | `s3_config`                              |
//! | `s3mock` | none (cannot be instantiated)            |

use flowlens_core::{ConfigError, Registered, Registry, RegistryBuilder};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::backend::DictSource;
use crate::error::DictError;
use crate::http::{HttpDictSource, HttpDictSourceConfig};
use crate::local::{FileDictSource, FileDictSourceConfig};
use crate::s3::{ObjectGateway, S3DictSource, S3DictSourceConfig, S3MockDictSourceConfig};

/// Configuration of a dictionary source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DictSourceConfig {
    #[serde(rename = "file")]
    File(FileDictSourceConfig),
    #[serde(rename = "http")]
    Http(HttpDictSourceConfig),
    #[serde(rename = "s3")]
    S3(S3DictSourceConfig),
    #[serde(rename = "s3mock")]
    S3Mock(S3MockDictSourceConfig),
}

impl Default for DictSourceConfig {
    fn default() -> Self {
        DictSourceConfig::File(FileDictSourceConfig::default())
    }
}

impl Registered for DictSourceConfig {
    fn registry() -> Result<&'static Registry<Self>, ConfigError> {
        static REGISTRY: OnceCell<Registry<DictSourceConfig>> = OnceCell::new();
        REGISTRY.get_or_try_init(|| {
            let mut builder = RegistryBuilder::new("dictionary source");
            builder
                .register("file", || DictSourceConfig::File(FileDictSourceConfig::default()))?
                .register("http", || DictSourceConfig::Http(HttpDictSourceConfig::default()))?
                .register("s3", || DictSourceConfig::S3(S3DictSourceConfig::default()))?
                .register("s3mock", || {
                    DictSourceConfig::S3Mock(S3MockDictSourceConfig::default())
                })?;
            Ok(builder.build())
        })
    }

    fn kind(&self) -> &'static str {
        match self {
            DictSourceConfig::File(_) => "file",
            DictSourceConfig::Http(_) => "http",
            DictSourceConfig::S3(_) => "s3",
            DictSourceConfig::S3Mock(_) => "s3mock",
        }
    }
}

impl DictSourceConfig {
    /// Instantiate the configured source
    ///
    /// The gateway is only used by S3 sources.
    pub fn build(&self, gateway: Arc<dyn ObjectGateway>) -> Result<Box<dyn DictSource>, DictError> {
        debug!("Building {} dictionary source", self.kind());

        match self {
            DictSourceConfig::File(_) => Ok(Box::new(FileDictSource::new())),
            DictSourceConfig::Http(config) => Ok(Box::new(HttpDictSource::new(config)?)),
            DictSourceConfig::S3(config) => Ok(Box::new(S3DictSource::new(config, gateway))),
            DictSourceConfig::S3Mock(_) => Err(DictError::Unimplemented("s3mock")),
        }
    }
}
