//! Local filesystem dictionary source

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::BufReader;
use tracing::debug;

use crate::backend::{ByteStream, DictSource};
use crate::error::DictError;

/// Configuration of the filesystem source. There is nothing to configure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileDictSourceConfig {}

/// Dictionary source reading from the local filesystem
///
/// The key is the path of the file to read.
#[derive(Debug, Default)]
pub struct FileDictSource;

impl FileDictSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DictSource for FileDictSource {
    async fn fetch(&self, key: &str) -> Result<ByteStream, DictError> {
        debug!("Opening dictionary file {}", key);

        // OS errors (not found, permission denied, ...) are surfaced verbatim
        let file = File::open(key).await?;

        let reader = BufReader::new(file);
        let stream = tokio_util::io::ReaderStream::new(reader);

        Ok(Box::pin(stream.map(|result| result.map_err(DictError::Io))))
    }
}
