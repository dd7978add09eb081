//! Flowlens core
//!
//! This crate provides the parametrized configuration registry shared by
//! the dictionary sources and the routing providers: a backend is chosen
//! by the `kind` field of its configuration table, and the remaining
//! fields are overlaid on the documented defaults for that kind.

pub mod error;
pub mod registry;

pub use error::ConfigError;
pub use registry::{KIND_FIELD, Parametrized, Registered, Registry, RegistryBuilder, decode, encode};
