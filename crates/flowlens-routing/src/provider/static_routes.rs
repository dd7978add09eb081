//! Static routing provider
//!
//! Routes are read from the configuration once and never change, so the
//! provider has no lifecycle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv6Addr};
use std::sync::Arc;
use tracing::info;

use super::Provider;
use crate::prefix::Prefix;
use crate::result::{LargeCommunity, LookupResult};
use crate::rib::{PeerKey, Rib, Route, RouteAttributes};

/// A configured route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticRouteConfig {
    pub prefix: Prefix,
    #[serde(default)]
    pub asn: u32,
    #[serde(default)]
    pub as_path: Vec<u32>,
    #[serde(default)]
    pub communities: Vec<u32>,
    #[serde(default)]
    pub large_communities: Vec<LargeCommunity>,
}

/// Configuration of the static provider
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StaticProviderConfig {
    pub routes: Vec<StaticRouteConfig>,
}

const STATIC_PEER: PeerKey = PeerKey {
    address: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    asn: 0,
};

pub struct StaticProvider {
    rib: Rib,
}

impl StaticProvider {
    pub fn new(config: &StaticProviderConfig) -> Self {
        let mut rib = Rib::new();

        for route in &config.routes {
            rib.announce(
                route.prefix,
                Route {
                    peer: STATIC_PEER,
                    next_hop: None,
                    attributes: Arc::new(RouteAttributes {
                        asn: route.asn,
                        as_path: route.as_path.clone(),
                        communities: route.communities.clone(),
                        large_communities: route.large_communities.clone(),
                    }),
                },
            );
        }

        info!("Loaded {} static routes", rib.route_count());

        Self { rib }
    }
}

#[async_trait]
impl Provider for StaticProvider {
    async fn lookup(&self, addr: IpAddr, next_hop: Option<IpAddr>) -> LookupResult {
        self.rib.lookup(addr, next_hop)
    }
}
