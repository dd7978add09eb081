//! IP prefixes
//!
//! Prefixes are stored in the IPv6 address space; IPv4 prefixes are kept as
//! IPv4-mapped IPv6 prefixes (`::ffff:0:0/96`), so a single table serves
//! both families.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv6Addr};
use std::str::FromStr;

use crate::error::RoutingError;

const V4_MAPPED_BITS: u8 = 96;

/// Convert an address to its position in the IPv6 space
pub fn to_v6_bits(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u128::from(v4.to_ipv6_mapped()),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

/// Network mask for a prefix length in the IPv6 space
pub fn mask(bits: u8) -> u128 {
    if bits == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(bits))
    }
}

/// An IP prefix (network address plus length)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Prefix {
    network: u128,
    bits: u8,
}

impl Prefix {
    /// Create a prefix; host bits of `addr` are cleared
    pub fn new(addr: IpAddr, len: u8) -> Result<Self, RoutingError> {
        let bits = match addr {
            IpAddr::V4(_) if len <= 32 => len + V4_MAPPED_BITS,
            IpAddr::V6(_) if len <= 128 => len,
            _ => {
                return Err(RoutingError::InvalidPrefix(format!(
                    "{}/{}: length out of range",
                    addr, len
                )));
            }
        };

        Ok(Self {
            network: to_v6_bits(addr) & mask(bits),
            bits,
        })
    }

    pub(crate) fn from_raw(network: u128, bits: u8) -> Self {
        Self {
            network: network & mask(bits),
            bits,
        }
    }

    /// Network address in the IPv6 space
    pub fn network_bits(&self) -> u128 {
        self.network
    }

    /// Prefix length in the IPv6 space
    pub fn bits(&self) -> u8 {
        self.bits
    }

    fn is_v4(&self) -> bool {
        self.bits >= V4_MAPPED_BITS && self.network & mask(V4_MAPPED_BITS) == 0xffff_0000_0000
    }

    /// Prefix length in the address family of the prefix
    pub fn family_len(&self) -> u8 {
        if self.is_v4() {
            self.bits - V4_MAPPED_BITS
        } else {
            self.bits
        }
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        to_v6_bits(addr) & mask(self.bits) == self.network
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v6 = Ipv6Addr::from(self.network);
        match v6.to_ipv4_mapped() {
            Some(v4) if self.is_v4() => write!(f, "{}/{}", v4, self.family_len()),
            _ => write!(f, "{}/{}", v6, self.bits),
        }
    }
}

impl FromStr for Prefix {
    type Err = RoutingError;

    /// Parse `address/length`; a bare address is a host prefix
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| RoutingError::InvalidPrefix(format!("{}: {}", s, reason));

        let (addr, len) = match s.split_once('/') {
            Some((addr, len)) => (addr, Some(len)),
            None => (s, None),
        };

        let addr: IpAddr = addr.trim().parse().map_err(|_| invalid("invalid address"))?;
        let len = match len {
            Some(len) => len.trim().parse::<u8>().map_err(|_| invalid("invalid length"))?,
            None if addr.is_ipv4() => 32,
            None => 128,
        };

        Prefix::new(addr, len)
    }
}

impl TryFrom<String> for Prefix {
    type Error = RoutingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Prefix> for String {
    fn from(prefix: Prefix) -> Self {
        prefix.to_string()
    }
}
