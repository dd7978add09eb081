//! Parametrized configuration registry
//!
//! A registry maps a discriminator (the `kind` field of a configuration
//! table) to the constructor of the default configuration for that kind.
//! Decoding a raw table resolves the default for its kind, overlays the
//! remaining fields onto it and yields the strongly-typed configuration.
//!
//! Configuration families are internally tagged serde enums
//! (`#[serde(tag = "kind")]`) whose variant names match the registered
//! discriminators. Each family exposes a single process-wide registry
//! through [`Registered`]; the registry is built once on first use and is
//! read-only afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

use serde::de::{self, DeserializeOwned};
use serde::ser;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ConfigError;

/// Name of the discriminator field
pub const KIND_FIELD: &str = "kind";

/// Constructor of the default configuration for one kind
pub type DefaultFactory<C> = fn() -> C;

/// Mutable registry used during initialization
pub struct RegistryBuilder<C> {
    name: &'static str,
    entries: BTreeMap<&'static str, DefaultFactory<C>>,
}

impl<C> RegistryBuilder<C> {
    /// Create an empty builder. `name` is used in error messages.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: BTreeMap::new(),
        }
    }

    /// Register the default configuration constructor for a kind
    pub fn register(
        &mut self,
        kind: &'static str,
        factory: DefaultFactory<C>,
    ) -> Result<&mut Self, ConfigError> {
        if self.entries.contains_key(kind) {
            return Err(ConfigError::DuplicateKind {
                registry: self.name,
                kind: kind.to_string(),
            });
        }
        self.entries.insert(kind, factory);
        Ok(self)
    }

    /// Freeze the registry
    pub fn build(self) -> Registry<C> {
        debug!(
            "Registered {} kinds: {:?}",
            self.name,
            self.entries.keys().collect::<Vec<_>>()
        );
        Registry {
            name: self.name,
            entries: self.entries,
        }
    }
}

/// Frozen registry of configuration kinds
pub struct Registry<C> {
    name: &'static str,
    entries: BTreeMap<&'static str, DefaultFactory<C>>,
}

impl<C> fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("kinds", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<C> Registry<C>
where
    C: Serialize + DeserializeOwned,
{
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Registered kinds, in lexical order
    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    /// Get the default configuration for a kind
    pub fn resolve(&self, kind: &str) -> Result<C, ConfigError> {
        self.entries
            .get(kind)
            .map(|factory| factory())
            .ok_or_else(|| ConfigError::UnknownBackendKind {
                registry: self.name,
                kind: kind.to_string(),
            })
    }

    /// Decode a raw configuration table
    ///
    /// Fields absent from `raw` keep the default of the selected kind.
    /// Fields the kind does not know about are rejected.
    pub fn decode(&self, raw: Value) -> Result<C, ConfigError> {
        let mut fields = match raw {
            Value::Object(fields) => fields,
            other => {
                return Err(ConfigError::InvalidShape {
                    registry: self.name,
                    found: value_type(&other),
                });
            }
        };

        let kind = match fields.remove(KIND_FIELD) {
            Some(Value::String(kind)) => kind,
            _ => return Err(ConfigError::MissingKind { registry: self.name }),
        };

        let default = self.resolve(&kind)?;
        let mut merged = self.fields_of(&default)?;

        for (field, value) in fields {
            if !merged.contains_key(&field) {
                return Err(ConfigError::UnknownField {
                    registry: self.name,
                    kind,
                    field,
                });
            }
            merged.insert(field, value);
        }

        serde_json::from_value(Value::Object(merged)).map_err(|e| ConfigError::Invalid {
            registry: self.name,
            kind,
            message: e.to_string(),
        })
    }

    /// Encode a configuration back to a raw table (`kind` plus every field)
    pub fn encode(&self, config: &C) -> Result<Value, ConfigError> {
        self.fields_of(config).map(Value::Object)
    }

    fn fields_of(&self, config: &C) -> Result<Map<String, Value>, ConfigError> {
        let value = serde_json::to_value(config).map_err(|e| ConfigError::Invalid {
            registry: self.name,
            kind: String::new(),
            message: e.to_string(),
        })?;

        let fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(ConfigError::InvalidShape {
                    registry: self.name,
                    found: value_type(&other),
                });
            }
        };

        match fields.get(KIND_FIELD) {
            Some(Value::String(kind)) if self.contains(kind) => Ok(fields),
            Some(Value::String(kind)) => Err(ConfigError::UnknownBackendKind {
                registry: self.name,
                kind: kind.clone(),
            }),
            _ => Err(ConfigError::MissingKind { registry: self.name }),
        }
    }
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a table",
    }
}

/// A configuration family with a process-wide registry
pub trait Registered: Serialize + DeserializeOwned + Sized + 'static {
    /// The registry of this family, built on first call
    fn registry() -> Result<&'static Registry<Self>, ConfigError>;

    /// Discriminator of this configuration value
    fn kind(&self) -> &'static str;
}

/// Decode a configuration through its family registry
pub fn decode<C: Registered>(raw: Value) -> Result<C, ConfigError> {
    C::registry()?.decode(raw)
}

/// Encode a configuration through its family registry
pub fn encode<C: Registered>(config: &C) -> Result<Value, ConfigError> {
    C::registry()?.encode(config)
}

/// Slot for a registered configuration inside a serde configuration tree
///
/// (De)serialization goes through the registry, so defaults are applied
/// per kind and unknown kinds fail the whole configuration load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parametrized<C>(pub C);

impl<C> Parametrized<C> {
    pub fn into_inner(self) -> C {
        self.0
    }
}

impl<C> Deref for Parametrized<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.0
    }
}

impl<C: Default> Default for Parametrized<C> {
    fn default() -> Self {
        Self(C::default())
    }
}

impl<C> From<C> for Parametrized<C> {
    fn from(config: C) -> Self {
        Self(config)
    }
}

impl<'de, C: Registered> Deserialize<'de> for Parametrized<C> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        decode(raw).map(Parametrized).map_err(de::Error::custom)
    }
}

impl<C: Registered> Serialize for Parametrized<C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        encode(&self.0)
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }
}
