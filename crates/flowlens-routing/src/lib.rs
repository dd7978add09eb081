//! Flowlens routing metadata
//!
//! This crate resolves, for a destination and next-hop address pair, the
//! AS number, AS path and communities attached to the best matching route.
//! The data comes from a provider selected by the `kind` field of the
//! routing configuration; the [`Routing`] component owns that provider for
//! the lifetime of the process, forwards its optional start/stop lifecycle
//! and guarantees that a lookup never fails: a slow, cancelled or faulty
//! provider yields an empty [`LookupResult`].

pub mod component;
pub mod config;
pub mod context;
pub mod error;
pub mod prefix;
pub mod provider;
pub mod result;
pub mod rib;

pub use component::{ComponentState, Routing};
pub use config::{RoutingConfig, RoutingProviderConfig};
pub use context::LookupContext;
pub use error::RoutingError;
pub use prefix::Prefix;
pub use provider::{Dependencies, Lifecycle, Provider, ProviderInstance};
pub use result::{LargeCommunity, LookupResult, LookupStatus};
pub use rib::{PeerKey, Rib, RibUpdate, RibUpdateSender, RouteAttributes};
