//! Address privacy classification.
//!
//! Measurements must never report results against private or reserved
//! address space. [`PrivacyClassifier`] is the seam; [`ReservedRanges`] is the
//! default table-driven implementation.

use std::net::IpAddr;
use std::sync::OnceLock;

use ipnetwork::IpNetwork;

/// Decides whether an address must not be measured.
pub trait PrivacyClassifier: Send + Sync {
    /// `true` if `address` lies in a private or reserved range.
    ///
    /// Strings that are not IP addresses are never private.
    fn is_private(&self, address: &str) -> bool;
}

/// IANA special-purpose ranges that are not globally reachable.
const RESERVED_V4: &[&str] = &[
    "0.0.0.0/8",
    "10.0.0.0/8",
    "100.64.0.0/10",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "172.16.0.0/12",
    "192.0.0.0/24",
    "192.0.2.0/24",
    "192.88.99.0/24",
    "192.168.0.0/16",
    "198.18.0.0/15",
    "198.51.100.0/24",
    "203.0.113.0/24",
    "224.0.0.0/4",
    "240.0.0.0/4",
];

const RESERVED_V6: &[&str] = &[
    "::/128",
    "::1/128",
    "64:ff9b:1::/48",
    "100::/64",
    "2001::/23",
    "2001:db8::/32",
    "2002::/16",
    "fc00::/7",
    "fe80::/10",
    "ff00::/8",
];

/// Classifier backed by a fixed table of reserved networks.
#[derive(Debug, Clone)]
pub struct ReservedRanges {
    networks: Vec<IpNetwork>,
}

impl ReservedRanges {
    /// The standard reserved ranges.
    pub fn new() -> Self {
        static NETWORKS: OnceLock<Vec<IpNetwork>> = OnceLock::new();

        let networks = NETWORKS.get_or_init(|| {
            RESERVED_V4
                .iter()
                .chain(RESERVED_V6)
                .map(|cidr| cidr.parse().expect("reserved range table is valid"))
                .collect()
        });
        Self {
            networks: networks.clone(),
        }
    }

    /// Add an extra network to treat as private.
    pub fn with_network(mut self, network: IpNetwork) -> Self {
        self.networks.push(network);
        self
    }

    /// Classify a parsed address.
    pub fn contains(&self, addr: IpAddr) -> bool {
        // IPv4-mapped IPv6 addresses are judged by their embedded IPv4 address.
        let addr = match addr {
            IpAddr::V6(v6) => v6
                .to_ipv4_mapped()
                .map(IpAddr::V4)
                .unwrap_or(IpAddr::V6(v6)),
            v4 => v4,
        };
        self.networks.iter().any(|net| net.contains(addr))
    }
}

impl Default for ReservedRanges {
    fn default() -> Self {
        Self::new()
    }
}

impl PrivacyClassifier for ReservedRanges {
    fn is_private(&self, address: &str) -> bool {
        address
            .trim()
            .parse::<IpAddr>()
            .is_ok_and(|addr| self.contains(addr))
    }
}
