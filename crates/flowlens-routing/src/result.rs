//! Lookup results

use serde::{Deserialize, Serialize};

use crate::prefix::Prefix;
use crate::rib::RouteAttributes;

/// RFC 8092 large community
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LargeCommunity {
    pub asn: u32,
    pub local1: u32,
    pub local2: u32,
}

/// How much of the answer the provider could resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStatus {
    /// No route covers the destination
    #[default]
    NotFound,
    /// A route was found, but not through the requested next hop
    Partial,
    /// A route was found through the requested next hop (or no next hop
    /// was requested)
    Complete,
}

/// Routing metadata for a destination
///
/// The default value is the empty result: no AS number, empty path and
/// no communities. It is what lookups return when nothing is known.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LookupResult {
    /// Origin AS number (0 when unknown)
    pub asn: u32,
    pub as_path: Vec<u32>,
    pub communities: Vec<u32>,
    pub large_communities: Vec<LargeCommunity>,
    /// Length of the matched prefix, in its address family
    pub net_mask: u8,
    pub status: LookupStatus,
}

impl LookupResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.status == LookupStatus::NotFound
    }

    pub(crate) fn from_route(prefix: Prefix, attributes: &RouteAttributes, status: LookupStatus) -> Self {
        Self {
            asn: attributes.asn,
            as_path: attributes.as_path.clone(),
            communities: attributes.communities.clone(),
            large_communities: attributes.large_communities.clone(),
            net_mask: prefix.family_len(),
            status,
        }
    }
}
