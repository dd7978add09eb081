//! Dictionary source trait

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::pin::Pin;

use crate::error::DictError;

/// Type alias for a boxed stream of bytes
///
/// Dropping the stream releases the underlying file handle or connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, DictError>> + Send>>;

/// A backend able to fetch a dictionary by key
///
/// The meaning of the key depends on the backend: a local path, a URL or
/// an object key. Failures are returned as is; backends neither retry nor
/// cache.
#[async_trait]
pub trait DictSource: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<ByteStream, DictError>;
}

/// Collect a byte stream into memory
pub async fn read_to_bytes(mut stream: ByteStream) -> Result<Bytes, DictError> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer.freeze())
}
