//! VLAN addressing.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::db::{split_key, Table};

/// One IPv4 address configured on a VLAN interface.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VlanIp {
    /// Interface address with prefix, e.g. `192.168.0.1/21`.
    pub interface: Ipv4Net,
}

impl VlanIp {
    /// The subnet, e.g. `192.168.0.0/21`.
    pub fn network(&self) -> Ipv4Net {
        self.interface.trunc()
    }

    /// The interface's own address, used as server identifier.
    pub fn address(&self) -> Ipv4Addr {
        self.interface.addr()
    }
}

/// Addressing and membership of every VLAN.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VlanInfo {
    /// VLAN name → IPv4 interface addresses.
    pub interfaces: BTreeMap<String, Vec<VlanIp>>,
    /// `VLAN_MEMBER` keys, `<vlan>|<port>`.
    pub members: BTreeSet<String>,
}

/// Build the VLAN → IPv4 networks map from `VLAN_INTERFACE` keys of the form
/// `<vlan>|<cidr>`. Bare `<vlan>` keys, IPv6 addresses and malformed CIDRs
/// are ignored.
pub fn parse_vlan(vlan_interface: &Table, vlan_member: &Table) -> VlanInfo {
    let mut interfaces: BTreeMap<String, Vec<VlanIp>> = BTreeMap::new();
    for key in vlan_interface.keys() {
        let Some((vlan, cidr)) = split_key(key) else {
            continue;
        };
        match cidr.parse::<Ipv4Net>() {
            Ok(net) => interfaces
                .entry(vlan.to_string())
                .or_default()
                .push(VlanIp { interface: net }),
            Err(_) => tracing::debug!(key = %key, "Ignoring non-IPv4 VLAN interface"),
        }
    }
    for ips in interfaces.values_mut() {
        ips.sort();
    }

    VlanInfo {
        interfaces,
        members: vlan_member.keys().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::row;

    fn keys(keys: &[&str]) -> Table {
        keys.iter().map(|k| (k.to_string(), row([]))).collect()
    }

    #[test]
    fn test_parse_vlan() {
        let info = parse_vlan(
            &keys(&[
                "Vlan1000",
                "Vlan1000|192.168.0.1/21",
                "Vlan1000|fc02:1000::1/64",
                "Vlan2000|not-a-cidr",
                "Vlan3000|10.0.0.1/24",
            ]),
            &keys(&["Vlan1000|Ethernet24"]),
        );

        assert_eq!(info.interfaces.len(), 2);
        let v1000 = &info.interfaces["Vlan1000"];
        assert_eq!(v1000.len(), 1);
        assert_eq!(v1000[0].network().to_string(), "192.168.0.0/21");
        assert_eq!(v1000[0].address(), Ipv4Addr::new(192, 168, 0, 1));
        assert!(!info.interfaces.contains_key("Vlan2000"));
        assert!(info.members.contains("Vlan1000|Ethernet24"));
    }
}
