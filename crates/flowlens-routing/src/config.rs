//! Routing configuration
//!
//! The provider is selected by its `kind`: `bmp` (routes learnt from BMP
//! sessions) or `static` (routes listed in the configuration).

use flowlens_core::{ConfigError, Parametrized, Registered, Registry, RegistryBuilder};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::RoutingError;
use crate::provider::{
    BmpProvider, BmpProviderConfig, Dependencies, ProviderInstance, StaticProvider,
    StaticProviderConfig,
};

/// Configuration of a routing provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RoutingProviderConfig {
    #[serde(rename = "bmp")]
    Bmp(BmpProviderConfig),
    #[serde(rename = "static")]
    Static(StaticProviderConfig),
}

impl Default for RoutingProviderConfig {
    fn default() -> Self {
        RoutingProviderConfig::Bmp(BmpProviderConfig::default())
    }
}

impl Registered for RoutingProviderConfig {
    fn registry() -> Result<&'static Registry<Self>, ConfigError> {
        static REGISTRY: OnceCell<Registry<RoutingProviderConfig>> = OnceCell::new();
        REGISTRY.get_or_try_init(|| {
            let mut builder = RegistryBuilder::new("routing provider");
            builder
                .register("bmp", || RoutingProviderConfig::Bmp(BmpProviderConfig::default()))?
                .register("static", || {
                    RoutingProviderConfig::Static(StaticProviderConfig::default())
                })?;
            Ok(builder.build())
        })
    }

    fn kind(&self) -> &'static str {
        match self {
            RoutingProviderConfig::Bmp(_) => "bmp",
            RoutingProviderConfig::Static(_) => "static",
        }
    }
}

impl RoutingProviderConfig {
    /// Instantiate the configured provider
    pub fn build(&self, dependencies: &Dependencies) -> Result<ProviderInstance, RoutingError> {
        debug!("Building {} routing provider", self.kind());

        match self {
            RoutingProviderConfig::Bmp(config) => {
                let provider = Arc::new(BmpProvider::new(config, dependencies)?);
                let updates = provider.updates();
                Ok(ProviderInstance::with_lifecycle("bmp", provider).with_updates(updates))
            }
            RoutingProviderConfig::Static(config) => {
                Ok(ProviderInstance::stateless("static", StaticProvider::new(config)))
            }
        }
    }
}

fn default_lookup_timeout_ms() -> u64 {
    100
}

/// Configuration of the routing component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Upper bound of a lookup when the caller sets no earlier deadline
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
    #[serde(default)]
    pub provider: Parametrized<RoutingProviderConfig>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: default_lookup_timeout_ms(),
            provider: Parametrized::default(),
        }
    }
}

impl RoutingConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowlens_core::{KIND_FIELD, decode, encode};
    use serde_json::json;

    #[test]
    fn test_default_round_trip_for_every_kind() {
        let registry = RoutingProviderConfig::registry().unwrap();
        let kinds: Vec<_> = registry.kinds().collect();
        assert_eq!(kinds, vec!["bmp", "static"]);

        for kind in kinds {
            let default = registry.resolve(kind).unwrap();
            let encoded = encode(&default).unwrap();
            assert_eq!(encoded[KIND_FIELD], kind);
            assert_eq!(decode::<RoutingProviderConfig>(encoded).unwrap(), default);
        }
    }

    #[test]
    fn test_decode_overrides_defaults() {
        let config: RoutingProviderConfig =
            decode(json!({"kind": "bmp", "collect_communities": false})).unwrap();
        assert_eq!(
            config,
            RoutingProviderConfig::Bmp(BmpProviderConfig {
                collect_communities: false,
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_unknown_provider_kind() {
        let err = decode::<RoutingProviderConfig>(json!({"kind": "bgp"})).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBackendKind { ref kind, .. } if kind == "bgp"));
    }

    #[test]
    fn test_routing_config_from_toml() {
        let config: RoutingConfig = toml::from_str(
            r#"
            lookup_timeout_ms = 250
            provider = { kind = "static", routes = [{ prefix = "10.0.0.0/8", asn = 64500 }] }
            "#,
        )
        .unwrap();

        assert_eq!(config.lookup_timeout(), Duration::from_millis(250));
        match &*config.provider {
            RoutingProviderConfig::Static(provider) => {
                assert_eq!(provider.routes.len(), 1);
                assert_eq!(provider.routes[0].asn, 64500);
            }
            other => panic!("unexpected provider {:?}", other),
        }
    }

    #[test]
    fn test_routing_config_defaults() {
        let config: RoutingConfig = toml::from_str("").unwrap();
        assert_eq!(config, RoutingConfig::default());
        assert_eq!(config.provider.kind(), "bmp");
        assert_eq!(config.lookup_timeout_ms, 100);
    }

    #[tokio::test]
    async fn test_build_every_kind() {
        let dependencies = Dependencies::default();
        let registry = RoutingProviderConfig::registry().unwrap();

        for kind in registry.kinds() {
            let instance = registry.resolve(kind).unwrap().build(&dependencies).unwrap();
            assert_eq!(instance.kind(), kind);
        }

        let bmp = RoutingProviderConfig::default().build(&dependencies).unwrap();
        assert!(bmp.lifecycle().is_some());
        assert!(bmp.updates().is_some());

        let stat = RoutingProviderConfig::Static(StaticProviderConfig::default())
            .build(&dependencies)
            .unwrap();
        assert!(stat.lifecycle().is_none());
    }
}
