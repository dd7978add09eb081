//! Routing information base
//!
//! A [`Rib`] is a prefix table answering longest-prefix-match queries.
//! Providers never mutate a table readers can see: they apply updates to a
//! copy and publish the copy as a whole. Tables, shards and route lists are
//! reference counted, so copying a RIB copies a handful of pointers and an
//! update clones only the shard and route list it touches.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::prefix::{Prefix, mask, to_v6_bits};
use crate::result::{LargeCommunity, LookupResult, LookupStatus};

/// Identity of the peer a route was learnt from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerKey {
    pub address: IpAddr,
    pub asn: u32,
}

/// Path attributes of a route
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteAttributes {
    /// Origin AS number
    pub asn: u32,
    pub as_path: Vec<u32>,
    pub communities: Vec<u32>,
    pub large_communities: Vec<LargeCommunity>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub peer: PeerKey,
    /// Next hop of the route; `None` matches any requested next hop
    pub next_hop: Option<IpAddr>,
    pub attributes: Arc<RouteAttributes>,
}

/// Change pushed by a session decoder
#[derive(Debug, Clone)]
pub enum RibUpdate {
    Announce {
        peer: PeerKey,
        prefix: Prefix,
        next_hop: Option<IpAddr>,
        attributes: RouteAttributes,
    },
    Withdraw {
        peer: PeerKey,
        prefix: Prefix,
    },
    /// Flush every route learnt from a peer
    PeerDown {
        peer: PeerKey,
    },
}

/// Channel session decoders push updates into
pub type RibUpdateSender = mpsc::Sender<RibUpdate>;

const SHARD_BITS: u32 = 12;
const SHARDS: usize = 1 << SHARD_BITS;

type Routes = Arc<Vec<Route>>;
type Shard = HashMap<u128, Routes>;

fn shard_of(network: u128) -> usize {
    let folded = (network as u64) ^ ((network >> 64) as u64);
    (folded.wrapping_mul(0x9e37_79b9_7f4a_7c15) >> (64 - SHARD_BITS)) as usize
}

/// Networks of one prefix length
///
/// Networks are spread over reference-counted shards: a copy of the table
/// shares every shard, and a change only copies the shard it touches.
#[derive(Debug, Clone)]
struct Table {
    shards: Vec<Option<Arc<Shard>>>,
    // number of networks, never zero once published in a `Rib`
    len: usize,
}

impl Table {
    fn new() -> Self {
        Self {
            shards: vec![None; SHARDS],
            len: 0,
        }
    }

    fn get(&self, network: u128) -> Option<&Routes> {
        self.shards[shard_of(network)].as_ref()?.get(&network)
    }

    fn has_peer(&self, peer: &PeerKey) -> bool {
        self.shards
            .iter()
            .flatten()
            .any(|shard| shard.values().any(|routes| routes.iter().any(|r| &r.peer == peer)))
    }

    /// Insert or replace the route of `route.peer`
    ///
    /// Returns whether the network and the route are new.
    fn upsert(&mut self, network: u128, route: Route) -> (bool, bool) {
        let slot = &mut self.shards[shard_of(network)];
        let shard = Arc::make_mut(slot.get_or_insert_with(Default::default));

        let entry = shard.entry(network);
        let new_network = matches!(entry, Entry::Vacant(_));
        let routes = Arc::make_mut(entry.or_default());

        let new_route = match routes.iter_mut().find(|r| r.peer == route.peer) {
            Some(existing) => {
                *existing = route;
                false
            }
            None => {
                routes.push(route);
                true
            }
        };

        if new_network {
            self.len += 1;
        }
        (new_network, new_route)
    }

    /// Remove the route of `peer` for a network
    ///
    /// Returns `None` when there is no such route, otherwise whether the
    /// network is gone.
    fn remove(&mut self, network: u128, peer: &PeerKey) -> Option<bool> {
        let slot = &mut self.shards[shard_of(network)];
        let shard = Arc::make_mut(slot.as_mut()?);
        let routes = Arc::make_mut(shard.get_mut(&network)?);

        let before = routes.len();
        routes.retain(|r| &r.peer != peer);
        if routes.len() == before {
            return None;
        }

        let gone = routes.is_empty();
        if gone {
            shard.remove(&network);
            self.len -= 1;
        }
        if shard.is_empty() {
            *slot = None;
        }
        Some(gone)
    }

    /// Remove every route of `peer`
    ///
    /// Returns the number of routes and networks removed.
    fn remove_peer(&mut self, peer: &PeerKey) -> (usize, usize) {
        let mut routes_removed = 0;
        let mut networks_removed = 0;

        for slot in self.shards.iter_mut() {
            let Some(shard) = slot.as_mut() else {
                continue;
            };
            if !shard.values().any(|routes| routes.iter().any(|r| &r.peer == peer)) {
                continue;
            }

            let shard = Arc::make_mut(shard);
            shard.retain(|_, routes| {
                if routes.iter().any(|r| &r.peer == peer) {
                    let routes = Arc::make_mut(routes);
                    let before = routes.len();
                    routes.retain(|r| &r.peer != peer);
                    routes_removed += before - routes.len();
                }
                if routes.is_empty() {
                    networks_removed += 1;
                    false
                } else {
                    true
                }
            });

            if shard.is_empty() {
                *slot = None;
            }
        }

        self.len -= networks_removed;
        (routes_removed, networks_removed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Rib {
    // prefix length (IPv6 space) -> networks, never empty
    tables: BTreeMap<u8, Arc<Table>>,
    prefixes: usize,
    routes: usize,
}

impl Rib {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct prefixes
    pub fn prefix_count(&self) -> usize {
        self.prefixes
    }

    /// Number of routes over all prefixes
    pub fn route_count(&self) -> usize {
        self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes == 0
    }

    /// Add a route, replacing the one from the same peer if any
    pub fn announce(&mut self, prefix: Prefix, route: Route) {
        let table = self
            .tables
            .entry(prefix.bits())
            .or_insert_with(|| Arc::new(Table::new()));

        let (new_prefix, new_route) = Arc::make_mut(table).upsert(prefix.network_bits(), route);
        if new_prefix {
            self.prefixes += 1;
        }
        if new_route {
            self.routes += 1;
        }
    }

    /// Remove the route of a peer for a prefix
    pub fn withdraw(&mut self, prefix: Prefix, peer: &PeerKey) -> bool {
        let network = prefix.network_bits();
        let Some(table) = self.tables.get_mut(&prefix.bits()) else {
            return false;
        };

        // Leave shared shards alone when there is nothing to remove
        let present = table
            .get(network)
            .is_some_and(|routes| routes.iter().any(|r| &r.peer == peer));
        if !present {
            return false;
        }

        let table = Arc::make_mut(table);
        let Some(gone) = table.remove(network, peer) else {
            return false;
        };
        let table_empty = table.len == 0;

        self.routes -= 1;
        if gone {
            self.prefixes -= 1;
        }
        if table_empty {
            self.tables.remove(&prefix.bits());
        }
        true
    }

    /// Remove every route learnt from a peer
    pub fn remove_peer(&mut self, peer: &PeerKey) -> usize {
        let mut removed = 0;

        for table in self.tables.values_mut() {
            if !table.has_peer(peer) {
                continue;
            }
            let (routes, prefixes) = Arc::make_mut(table).remove_peer(peer);
            removed += routes;
            self.prefixes -= prefixes;
        }
        self.tables.retain(|_, table| table.len > 0);

        self.routes -= removed;
        removed
    }

    pub fn apply(&mut self, update: RibUpdate) {
        match update {
            RibUpdate::Announce {
                peer,
                prefix,
                next_hop,
                attributes,
            } => self.announce(
                prefix,
                Route {
                    peer,
                    next_hop,
                    attributes: Arc::new(attributes),
                },
            ),
            RibUpdate::Withdraw { peer, prefix } => {
                self.withdraw(prefix, &peer);
            }
            RibUpdate::PeerDown { peer } => {
                self.remove_peer(&peer);
            }
        }
    }

    /// Longest-prefix match for `addr`
    ///
    /// Among the routes of the matching prefix, the one through `next_hop`
    /// wins; otherwise the first one is used and the answer is partial.
    pub fn lookup(&self, addr: IpAddr, next_hop: Option<IpAddr>) -> LookupResult {
        let bits = to_v6_bits(addr);

        for (&len, table) in self.tables.iter().rev() {
            if let Some(routes) = table.get(bits & mask(len)) {
                if let Some((route, status)) = select_route(routes, next_hop) {
                    return LookupResult::from_route(
                        Prefix::from_raw(bits, len),
                        &route.attributes,
                        status,
                    );
                }
            }
        }

        LookupResult::empty()
    }
}

fn select_route(routes: &[Route], next_hop: Option<IpAddr>) -> Option<(&Route, LookupStatus)> {
    if let Some(wanted) = next_hop.map(to_v6_bits) {
        if let Some(route) = routes
            .iter()
            .find(|r| r.next_hop.map(to_v6_bits) == Some(wanted))
        {
            return Some((route, LookupStatus::Complete));
        }
    }

    routes.first().map(|route| {
        if next_hop.is_none() || route.next_hop.is_none() {
            (route, LookupStatus::Complete)
        } else {
            (route, LookupStatus::Partial)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(n: u8) -> PeerKey {
        PeerKey {
            address: IpAddr::from([192, 0, 2, n]),
            asn: 64500 + u32::from(n),
        }
    }

    fn attrs(asn: u32) -> RouteAttributes {
        RouteAttributes {
            asn,
            as_path: vec![64496, asn],
            communities: vec![(64496 << 16) | 100],
            large_communities: vec![],
        }
    }

    fn announce(rib: &mut Rib, prefix: &str, peer: PeerKey, next_hop: Option<&str>, asn: u32) {
        rib.apply(RibUpdate::Announce {
            peer,
            prefix: prefix.parse().unwrap(),
            next_hop: next_hop.map(|nh| nh.parse().unwrap()),
            attributes: attrs(asn),
        });
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_longest_prefix_match() {
        let mut rib = Rib::new();
        announce(&mut rib, "0.0.0.0/0", peer(1), None, 1);
        announce(&mut rib, "10.0.0.0/8", peer(1), None, 8);
        announce(&mut rib, "10.1.0.0/16", peer(1), None, 16);

        assert_eq!(rib.lookup(ip("10.1.2.3"), None).asn, 16);
        assert_eq!(rib.lookup(ip("10.1.2.3"), None).net_mask, 16);
        assert_eq!(rib.lookup(ip("10.2.0.1"), None).asn, 8);
        assert_eq!(rib.lookup(ip("192.0.2.1"), None).asn, 1);
        assert_eq!(rib.lookup(ip("192.0.2.1"), None).net_mask, 0);
        assert!(rib.lookup(ip("2001:db8::1"), None).is_empty());
    }

    #[test]
    fn test_lookup_empty_rib() {
        let rib = Rib::new();
        assert_eq!(rib.lookup(ip("10.0.0.1"), None), LookupResult::empty());
    }

    #[test]
    fn test_next_hop_selection() {
        let mut rib = Rib::new();
        announce(&mut rib, "203.0.113.0/24", peer(1), Some("198.51.100.1"), 100);
        announce(&mut rib, "203.0.113.0/24", peer(2), Some("198.51.100.2"), 200);

        let result = rib.lookup(ip("203.0.113.5"), Some(ip("198.51.100.2")));
        assert_eq!(result.asn, 200);
        assert_eq!(result.status, LookupStatus::Complete);

        let result = rib.lookup(ip("203.0.113.5"), Some(ip("198.51.100.9")));
        assert_eq!(result.asn, 100);
        assert_eq!(result.status, LookupStatus::Partial);

        let result = rib.lookup(ip("203.0.113.5"), None);
        assert_eq!(result.asn, 100);
        assert_eq!(result.status, LookupStatus::Complete);
    }

    #[test]
    fn test_announce_replaces_same_peer() {
        let mut rib = Rib::new();
        announce(&mut rib, "10.0.0.0/8", peer(1), None, 1);
        announce(&mut rib, "10.0.0.0/8", peer(1), None, 2);

        assert_eq!(rib.route_count(), 1);
        assert_eq!(rib.lookup(ip("10.0.0.1"), None).asn, 2);
    }

    #[test]
    fn test_withdraw() {
        let mut rib = Rib::new();
        announce(&mut rib, "10.0.0.0/8", peer(1), None, 1);
        announce(&mut rib, "10.0.0.0/8", peer(2), None, 2);

        assert!(rib.withdraw("10.0.0.0/8".parse().unwrap(), &peer(1)));
        assert_eq!(rib.lookup(ip("10.0.0.1"), None).asn, 2);
        assert!(!rib.withdraw("10.0.0.0/8".parse().unwrap(), &peer(1)));

        assert!(rib.withdraw("10.0.0.0/8".parse().unwrap(), &peer(2)));
        assert!(rib.is_empty());
        assert_eq!(rib.prefix_count(), 0);
        assert!(rib.lookup(ip("10.0.0.1"), None).is_empty());
    }

    #[test]
    fn test_peer_down() {
        let mut rib = Rib::new();
        announce(&mut rib, "10.0.0.0/8", peer(1), None, 1);
        announce(&mut rib, "10.0.0.0/8", peer(2), None, 2);
        announce(&mut rib, "2001:db8::/32", peer(1), None, 1);

        rib.apply(RibUpdate::PeerDown { peer: peer(1) });

        assert_eq!(rib.route_count(), 1);
        assert_eq!(rib.prefix_count(), 1);
        assert_eq!(rib.lookup(ip("10.0.0.1"), None).asn, 2);
        assert!(rib.lookup(ip("2001:db8::1"), None).is_empty());
    }

    #[test]
    fn test_copies_are_independent() {
        let mut rib = Rib::new();
        announce(&mut rib, "10.0.0.0/8", peer(1), None, 1);
        let snapshot = rib.clone();

        announce(&mut rib, "10.0.0.0/8", peer(1), None, 2);
        rib.withdraw("10.0.0.0/8".parse().unwrap(), &peer(1));

        assert!(rib.lookup(ip("10.0.0.1"), None).is_empty());
        assert_eq!(snapshot.lookup(ip("10.0.0.1"), None).asn, 1);
    }

    fn copied_shards(before: &Table, after: &Table) -> usize {
        before
            .shards
            .iter()
            .zip(after.shards.iter())
            .filter(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => !Arc::ptr_eq(a, b),
                (None, None) => false,
                _ => true,
            })
            .count()
    }

    #[test]
    fn test_update_copies_only_touched_shard() {
        let mut rib = Rib::new();
        for i in 0..20_000u32 {
            let prefix = Prefix::new(IpAddr::from([10, (i >> 8) as u8, i as u8, 0]), 24).unwrap();
            rib.apply(RibUpdate::Announce {
                peer: peer(1),
                prefix,
                next_hop: None,
                attributes: attrs(i),
            });
        }
        announce(&mut rib, "172.16.0.0/12", peer(1), None, 12);
        assert_eq!(rib.prefix_count(), 20_001);

        let snapshot = rib.clone();
        announce(&mut rib, "192.0.2.0/24", peer(2), None, 64501);
        rib.withdraw("10.0.1.0/24".parse().unwrap(), &peer(1));

        // Untouched prefix lengths are shared as a whole
        assert!(Arc::ptr_eq(&rib.tables[&108], &snapshot.tables[&108]));

        // At most the two shards holding the changed networks were copied
        let copied = copied_shards(&snapshot.tables[&120], &rib.tables[&120]);
        assert!((1..=2).contains(&copied), "{} shards copied", copied);

        assert_eq!(rib.prefix_count(), 20_001);
        assert_eq!(snapshot.prefix_count(), 20_001);
        assert_eq!(snapshot.lookup(ip("10.0.1.1"), None).asn, 1);
        assert!(snapshot.lookup(ip("192.0.2.1"), None).is_empty());
        assert!(rib.lookup(ip("10.0.1.1"), None).is_empty());
        assert_eq!(rib.lookup(ip("192.0.2.1"), None).asn, 64501);
    }

    #[test]
    fn test_noop_withdraw_copies_nothing() {
        let mut rib = Rib::new();
        announce(&mut rib, "10.0.0.0/8", peer(1), None, 1);
        let snapshot = rib.clone();

        assert!(!rib.withdraw("10.0.0.0/8".parse().unwrap(), &peer(2)));
        assert!(!rib.withdraw("10.1.0.0/16".parse().unwrap(), &peer(1)));
        assert_eq!(rib.remove_peer(&peer(3)), 0);

        assert!(Arc::ptr_eq(&rib.tables[&104], &snapshot.tables[&104]));
    }
}
