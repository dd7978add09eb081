//! Named dictionaries
//!
//! A dictionary is a key (path, URL or object key) fetched from a
//! configured source. [`Dictionaries`] owns one source instance per
//! configured dictionary.

use flowlens_core::{Parametrized, Registered};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::{ByteStream, DictSource};
use crate::config::DictSourceConfig;
use crate::error::DictError;
use crate::s3::ObjectGateway;

/// Configuration of a single dictionary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionaryConfig {
    /// Key of the dictionary in its source
    pub path: String,
    /// Where to fetch the dictionary from
    #[serde(default)]
    pub source: Parametrized<DictSourceConfig>,
}

/// A dictionary bound to its source
pub struct Dictionary {
    name: String,
    path: String,
    kind: &'static str,
    source: Box<dyn DictSource>,
}

impl Dictionary {
    pub fn new(
        name: &str,
        config: &DictionaryConfig,
        gateway: Arc<dyn ObjectGateway>,
    ) -> Result<Self, DictError> {
        let source = config.source.build(gateway)?;
        Ok(Self {
            name: name.to_string(),
            path: config.path.clone(),
            kind: config.source.kind(),
            source,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Kind of the backing source
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Fetch the dictionary content
    pub async fn fetch(&self) -> Result<ByteStream, DictError> {
        debug!("Fetching dictionary {} from {} source", self.name, self.kind);
        self.source.fetch(&self.path).await
    }
}

/// All configured dictionaries
#[derive(Default)]
pub struct Dictionaries {
    entries: BTreeMap<String, Dictionary>,
}

impl Dictionaries {
    /// Build a source for every configured dictionary
    ///
    /// Fails on the first dictionary whose source cannot be built.
    pub fn new(
        configs: &BTreeMap<String, DictionaryConfig>,
        gateway: Arc<dyn ObjectGateway>,
    ) -> Result<Self, DictError> {
        let mut entries = BTreeMap::new();

        for (name, config) in configs {
            let dictionary = Dictionary::new(name, config, gateway.clone())?;
            info!(
                "Loaded dictionary: {} -> {} ({} source)",
                name,
                dictionary.path(),
                dictionary.kind()
            );
            entries.insert(name.clone(), dictionary);
        }

        Ok(Self { entries })
    }

    pub fn get(&self, name: &str) -> Option<&Dictionary> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fetch a dictionary by name
    pub async fn fetch(&self, name: &str) -> Result<ByteStream, DictError> {
        self.get(name)
            .ok_or_else(|| DictError::UnknownDictionary(name.to_string()))?
            .fetch()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::read_to_bytes;
    use crate::s3::ObjectStorage;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct Settings {
        dictionaries: BTreeMap<String, DictionaryConfig>,
    }

    fn gateway() -> Arc<dyn ObjectGateway> {
        Arc::new(ObjectStorage::default())
    }

    #[tokio::test]
    async fn test_fetch_configured_dictionary() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"country\nFR\n").unwrap();
        file.flush().unwrap();

        let settings: Settings = toml::from_str(&format!(
            r#"
            [dictionaries.countries]
            path = "{}"
            "#,
            file.path().display()
        ))
        .unwrap();

        let dictionaries = Dictionaries::new(&settings.dictionaries, gateway()).unwrap();
        assert_eq!(dictionaries.names().collect::<Vec<_>>(), vec!["countries"]);
        assert_eq!(dictionaries.get("countries").unwrap().kind(), "file");

        let data = read_to_bytes(dictionaries.fetch("countries").await.unwrap())
            .await
            .unwrap();
        assert_eq!(&data[..], b"country\nFR\n");
    }

    #[tokio::test]
    async fn test_fetch_unknown_dictionary() {
        let dictionaries = Dictionaries::default();
        let err = dictionaries.fetch("asns").await.err().unwrap();
        assert!(matches!(err, DictError::UnknownDictionary(ref name) if name == "asns"));
    }

    #[test]
    fn test_s3mock_dictionary_fails_to_build() {
        let settings: Settings = toml::from_str(
            r#"
            [dictionaries.asns]
            path = "asns.csv"
            source = { kind = "s3mock" }
            "#,
        )
        .unwrap();

        let err = Dictionaries::new(&settings.dictionaries, gateway()).err().unwrap();
        assert!(matches!(err, DictError::Unimplemented(_)));
    }
}
