//! HTTP dictionary source

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::{ByteStream, DictSource};
use crate::error::DictError;

/// Configuration of the HTTP source
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HttpDictSourceConfig {
    /// Base URL relative keys are resolved against. Absolute URLs used as
    /// keys are fetched as is.
    pub base_url: String,
    /// Treat a non-2xx response as an error instead of returning its body
    pub check_status: bool,
    /// Request timeout in seconds (0 = no timeout)
    pub timeout_secs: u64,
}

/// Dictionary source issuing a GET per fetch
pub struct HttpDictSource {
    client: Client,
    base_url: Option<Url>,
    check_status: bool,
}

impl HttpDictSource {
    /// Create a new HTTP dictionary source
    pub fn new(config: &HttpDictSourceConfig) -> Result<Self, DictError> {
        let mut builder = Client::builder();

        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }

        let client = builder.build()?;

        let base_url = if config.base_url.is_empty() {
            None
        } else {
            let url = Url::parse(&config.base_url)
                .map_err(|e| DictError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
            Some(url)
        };

        info!(
            "Created HTTP dictionary source (base_url: {:?}, check_status: {})",
            config.base_url, config.check_status
        );

        Ok(Self {
            client,
            base_url,
            check_status: config.check_status,
        })
    }

    fn resolve_url(&self, key: &str) -> Result<Url, DictError> {
        match Url::parse(key) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base_url {
                Some(base) => base
                    .join(key)
                    .map_err(|e| DictError::InvalidUrl(format!("{}: {}", key, e))),
                None => Err(DictError::InvalidUrl(format!(
                    "{}: relative key without base_url",
                    key
                ))),
            },
            Err(e) => Err(DictError::InvalidUrl(format!("{}: {}", key, e))),
        }
    }
}

#[async_trait]
impl DictSource for HttpDictSource {
    async fn fetch(&self, key: &str) -> Result<ByteStream, DictError> {
        let url = self.resolve_url(key)?;
        debug!("Fetching dictionary from {}", url);

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if !status.is_success() {
            if self.check_status {
                return Err(DictError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
            // The body of an error response is still handed to the caller
            warn!("{} returned HTTP {}, using response body anyway", url, status);
        }

        let stream = response.bytes_stream().map_err(DictError::Http);
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::read_to_bytes;
    use httpmock::prelude::*;

    fn source(config: HttpDictSourceConfig) -> HttpDictSource {
        HttpDictSource::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/asns.csv");
                then.status(200).body("asn,name\n64500,Example\n");
            })
            .await;

        let source = source(HttpDictSourceConfig::default());
        let stream = source.fetch(&server.url("/asns.csv")).await.unwrap();
        let data = read_to_bytes(stream).await.unwrap();

        assert_eq!(&data[..], b"asn,name\n64500,Example\n");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_ignores_status_by_default() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing.csv");
                then.status(404).body("<html>Not Found</html>");
            })
            .await;

        let source = source(HttpDictSourceConfig::default());
        let stream = source.fetch(&server.url("/missing.csv")).await.unwrap();
        let data = read_to_bytes(stream).await.unwrap();

        assert_eq!(&data[..], b"<html>Not Found</html>");
    }

    #[tokio::test]
    async fn test_fetch_checks_status_when_enabled() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing.csv");
                then.status(404).body("Not Found");
            })
            .await;

        let source = source(HttpDictSourceConfig {
            check_status: true,
            ..Default::default()
        });
        let err = source.fetch(&server.url("/missing.csv")).await.err().unwrap();

        assert!(matches!(err, DictError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_relative_key_uses_base_url() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/dicts/geo.csv");
                then.status(200).body("geo");
            })
            .await;

        let source = source(HttpDictSourceConfig {
            base_url: server.url("/dicts/"),
            ..Default::default()
        });
        let data = read_to_bytes(source.fetch("geo.csv").await.unwrap())
            .await
            .unwrap();

        assert_eq!(&data[..], b"geo");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_relative_key_without_base_url() {
        let source = source(HttpDictSourceConfig::default());
        let err = source.fetch("geo.csv").await.err().unwrap();
        assert!(matches!(err, DictError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host() {
        let source = source(HttpDictSourceConfig {
            timeout_secs: 5,
            ..Default::default()
        });
        let err = source
            .fetch("http://127.0.0.1:1/geo.csv")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DictError::Http(_)));
    }

    #[test]
    fn test_invalid_base_url() {
        let result = HttpDictSource::new(&HttpDictSourceConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(DictError::InvalidUrl(_))));
    }
}
