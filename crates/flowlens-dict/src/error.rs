//! Dictionary source error types

use flowlens_core::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DictError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Unknown storage configuration: {0}")]
    UnknownStorage(String),

    #[error("Unknown dictionary: {0}")]
    UnknownDictionary(String),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Dictionary source not implemented: {0}")]
    Unimplemented(&'static str),
}

impl DictError {
    /// Whether the requested dictionary does not exist in the backend
    pub fn is_not_found(&self) -> bool {
        match self {
            DictError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            DictError::NotFound(_) => true,
            _ => false,
        }
    }
}
