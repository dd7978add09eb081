//! Flowlens dictionary sources
//!
//! This crate fetches enrichment dictionaries (GeoIP, ASN names, ...) as
//! byte streams from interchangeable backends: the local filesystem, an
//! HTTP endpoint or an S3-compatible bucket. The backend is selected by
//! the `kind` field of the source configuration.

pub mod backend;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod http;
pub mod local;
pub mod s3;

pub use backend::{ByteStream, DictSource, read_to_bytes};
pub use config::DictSourceConfig;
pub use dictionary::{Dictionaries, Dictionary, DictionaryConfig};
pub use error::DictError;
pub use http::{HttpDictSource, HttpDictSourceConfig};
pub use local::{FileDictSource, FileDictSourceConfig};
pub use s3::{
    ObjectGateway, ObjectStorage, S3Config, S3DictSource, S3DictSourceConfig,
    S3MockDictSourceConfig,
};
