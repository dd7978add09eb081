//! Routing component
//!
//! [`Routing`] owns the process-wide provider instance. It forwards the
//! provider's start/stop lifecycle and bounds every lookup: cancellation,
//! deadlines and provider panics all turn into an empty result, so callers
//! on the packet path never handle routing errors.

use futures::FutureExt;
use metrics::counter;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::RoutingConfig;
use crate::context::LookupContext;
use crate::error::RoutingError;
use crate::provider::{Dependencies, ProviderInstance};
use crate::result::LookupResult;
use crate::rib::RibUpdateSender;

/// Lifecycle state of the routing component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Constructed,
    Starting,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
enum DegradeReason {
    Cancelled,
    Timeout,
    Panic,
}

impl DegradeReason {
    fn as_str(&self) -> &'static str {
        match self {
            DegradeReason::Cancelled => "cancelled",
            DegradeReason::Timeout => "timeout",
            DegradeReason::Panic => "panic",
        }
    }
}

/// Routing facade shared by every lookup caller
pub struct Routing {
    instance: ProviderInstance,
    lookup_timeout: Duration,
    state: Mutex<ComponentState>,
}

impl Routing {
    /// Build the configured provider
    pub fn new(config: &RoutingConfig, dependencies: Dependencies) -> Result<Self, RoutingError> {
        let instance = config.provider.build(&dependencies)?;

        info!(
            "Initializing routing component ({} provider, lookup timeout: {} ms)",
            instance.kind(),
            config.lookup_timeout_ms
        );

        Ok(Self::from_instance(instance, config.lookup_timeout()))
    }

    /// Wrap an already built provider
    pub fn from_instance(instance: ProviderInstance, lookup_timeout: Duration) -> Self {
        Self {
            instance,
            lookup_timeout,
            state: Mutex::new(ComponentState::Constructed),
        }
    }

    pub fn state(&self) -> ComponentState {
        *self.state.lock()
    }

    /// Kind of the active provider
    pub fn kind(&self) -> &'static str {
        self.instance.kind()
    }

    /// Update channel of the provider, if it ingests updates
    pub fn updates(&self) -> Option<RibUpdateSender> {
        self.instance.updates().cloned()
    }

    fn transition(&self, expected: ComponentState, next: ComponentState) -> Result<(), RoutingError> {
        let mut state = self.state.lock();
        if *state != expected {
            return Err(RoutingError::InvalidState {
                expected,
                found: *state,
            });
        }
        *state = next;
        Ok(())
    }

    /// Start the provider
    ///
    /// On failure the component stays constructed.
    pub async fn start(&self) -> Result<(), RoutingError> {
        self.transition(ComponentState::Constructed, ComponentState::Starting)?;

        let result = match self.instance.lifecycle() {
            Some(lifecycle) => lifecycle.start().await,
            None => Ok(()),
        };

        match result {
            Ok(()) => {
                *self.state.lock() = ComponentState::Running;
                info!("Routing component started ({} provider)", self.kind());
                Ok(())
            }
            Err(e) => {
                *self.state.lock() = ComponentState::Constructed;
                Err(e)
            }
        }
    }

    /// Stop the provider
    ///
    /// The component is stopped afterwards even if the provider reports an
    /// error.
    pub async fn stop(&self) -> Result<(), RoutingError> {
        self.transition(ComponentState::Running, ComponentState::Stopping)?;

        let result = match self.instance.lifecycle() {
            Some(lifecycle) => lifecycle.stop().await,
            None => Ok(()),
        };

        *self.state.lock() = ComponentState::Stopped;
        info!("Routing component stopped ({} provider)", self.kind());
        result
    }

    /// Look up the routing metadata of `addr`
    ///
    /// Never fails: when the context is cancelled, a deadline passes or the
    /// provider panics, the empty result is returned. The lookup is bounded
    /// by the earliest of the context deadline and the component timeout.
    pub async fn lookup(
        &self,
        ctx: &LookupContext,
        addr: IpAddr,
        next_hop: Option<IpAddr>,
    ) -> LookupResult {
        counter!("flowlens_routing_lookups_total").increment(1);

        if ctx.is_cancelled() {
            return degraded(DegradeReason::Cancelled, addr);
        }

        let timeout_at = Instant::now() + self.lookup_timeout;
        let deadline = ctx.deadline().map_or(timeout_at, |d| d.min(timeout_at));

        let lookup = AssertUnwindSafe(self.instance.provider().lookup(addr, next_hop)).catch_unwind();

        tokio::select! {
            biased;
            _ = ctx.cancelled() => degraded(DegradeReason::Cancelled, addr),
            _ = tokio::time::sleep_until(deadline) => degraded(DegradeReason::Timeout, addr),
            outcome = lookup => match outcome {
                Ok(result) => result,
                Err(_) => degraded(DegradeReason::Panic, addr),
            },
        }
    }
}

fn degraded(reason: DegradeReason, addr: IpAddr) -> LookupResult {
    counter!("flowlens_routing_lookup_degraded_total", "reason" => reason.as_str()).increment(1);

    match reason {
        DegradeReason::Cancelled => debug!("Routing lookup for {} cancelled", addr),
        DegradeReason::Timeout => warn!("Routing lookup for {} timed out", addr),
        DegradeReason::Panic => warn!("Routing provider panicked while looking up {}", addr),
    }

    LookupResult::empty()
}
