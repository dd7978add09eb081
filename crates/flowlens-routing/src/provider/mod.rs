//! Routing providers
//!
//! A provider answers lookups. Providers that keep background state also
//! implement [`Lifecycle`]; whether a provider does is recorded once, when
//! its [`ProviderInstance`] is built, instead of being probed per call.

pub mod bmp;
pub mod static_routes;

use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::RoutingError;
use crate::result::LookupResult;
use crate::rib::RibUpdateSender;

pub use bmp::{BmpProvider, BmpProviderConfig};
pub use static_routes::{StaticProvider, StaticProviderConfig, StaticRouteConfig};

/// Source of routing metadata
///
/// Lookups are infallible: a provider without an answer returns
/// [`LookupResult::empty`]. Implementations must support concurrent calls.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn lookup(&self, addr: IpAddr, next_hop: Option<IpAddr>) -> LookupResult;
}

/// Optional start/stop capability of a provider
#[async_trait]
pub trait Lifecycle: Send + Sync {
    async fn start(&self) -> Result<(), RoutingError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), RoutingError> {
        Ok(())
    }
}

/// Shared infrastructure handed to providers at construction
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
    /// Cancelled when the process shuts down
    pub shutdown: CancellationToken,
}

/// A constructed provider and the capabilities it supports
pub struct ProviderInstance {
    kind: &'static str,
    provider: Arc<dyn Provider>,
    lifecycle: Option<Arc<dyn Lifecycle>>,
    updates: Option<RibUpdateSender>,
}

impl fmt::Debug for ProviderInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderInstance")
            .field("kind", &self.kind)
            .field("lifecycle", &self.lifecycle.is_some())
            .field("updates", &self.updates.is_some())
            .finish_non_exhaustive()
    }
}

impl ProviderInstance {
    /// A provider without lifecycle
    pub fn stateless<P: Provider + 'static>(kind: &'static str, provider: P) -> Self {
        Self {
            kind,
            provider: Arc::new(provider),
            lifecycle: None,
            updates: None,
        }
    }

    /// A provider whose start/stop must be forwarded
    pub fn with_lifecycle<P: Provider + Lifecycle + 'static>(
        kind: &'static str,
        provider: Arc<P>,
    ) -> Self {
        Self {
            kind,
            provider: provider.clone(),
            lifecycle: Some(provider),
            updates: None,
        }
    }

    /// Attach the channel the provider ingests routing updates from
    pub fn with_updates(mut self, updates: RibUpdateSender) -> Self {
        self.updates = Some(updates);
        self
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn lifecycle(&self) -> Option<&Arc<dyn Lifecycle>> {
        self.lifecycle.as_ref()
    }

    pub fn updates(&self) -> Option<&RibUpdateSender> {
        self.updates.as_ref()
    }
}
