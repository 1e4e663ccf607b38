//! Port bindings: which addresses each port may hand out.
//!
//! # Responsibilities
//! - Translate physical port names to the aliases used in circuit IDs
//! - Resolve explicit addresses and named ranges to the VLAN subnet holding them
//! - Merge overlapping intervals per (interface, subnet, port)
//! - Keep pools of different ports in one subnet disjoint; on overlap the
//!   binding with the later key loses the range

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use crate::cfggen::range::{merge_intervals, IpRange};
use crate::cfggen::vlan::{VlanInfo, VlanIp};
use crate::db::tables::PortBinding;
use crate::db::DHCP_SERVER_IPV4_PORT;
use crate::diagnostics::Diagnostics;

/// Physical port name → alias.
pub type PortAliasMap = BTreeMap<String, String>;

/// Interface → subnet → port alias → merged ranges.
pub type PortPools = BTreeMap<String, BTreeMap<VlanIp, BTreeMap<String, Vec<IpRange>>>>;

/// Parse `<physical> <alias>` lines. Lines with any other shape are ignored.
pub fn parse_port_alias_map(content: &str) -> PortAliasMap {
    content
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            match (tokens.next(), tokens.next(), tokens.next()) {
                (Some(port), Some(alias), None) => Some((port.to_string(), alias.to_string())),
                _ => None,
            }
        })
        .collect()
}

pub fn load_port_alias_map(path: &Path) -> std::io::Result<PortAliasMap> {
    Ok(parse_port_alias_map(&fs::read_to_string(path)?))
}

/// Result of resolving every port binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPorts {
    pub pools: PortPools,
    /// Range names that exist in the range table and are referenced by a
    /// usable binding.
    pub used_ranges: BTreeSet<String>,
}

pub fn parse_port(
    bindings: &[PortBinding],
    vlan: &VlanInfo,
    ranges: &BTreeMap<String, IpRange>,
    aliases: &PortAliasMap,
    diags: &mut Diagnostics,
) -> ParsedPorts {
    let mut pools = PortPools::new();
    let mut used_ranges = BTreeSet::new();
    // (interface, alias) → binding key, for attributing cross-port overlaps.
    let mut owners: BTreeMap<(String, String), String> = BTreeMap::new();

    for binding in bindings {
        if !vlan.members.contains(&binding.key) {
            diags.skip(DHCP_SERVER_IPV4_PORT, &binding.key, "port is not a member of the VLAN");
            continue;
        }
        let Some(alias) = aliases.get(&binding.port) else {
            diags.skip(
                DHCP_SERVER_IPV4_PORT,
                &binding.key,
                format!("no alias for port {}", binding.port),
            );
            continue;
        };
        let Some(vlan_ips) = vlan.interfaces.get(&binding.vlan) else {
            diags.skip(
                DHCP_SERVER_IPV4_PORT,
                &binding.key,
                format!("{} has no IPv4 address", binding.vlan),
            );
            continue;
        };

        let mut requested: Vec<(String, IpRange)> = Vec::new();
        match (&binding.ips, &binding.ranges) {
            (Some(_), Some(_)) => {
                diags.skip(DHCP_SERVER_IPV4_PORT, &binding.key, "both ips and ranges are set");
                continue;
            }
            (None, None) => {
                diags.skip(DHCP_SERVER_IPV4_PORT, &binding.key, "neither ips nor ranges are set");
                continue;
            }
            (Some(ips), None) => {
                for ip in ips {
                    match ip.parse::<Ipv4Addr>() {
                        Ok(addr) => requested.push((format!("address {addr}"), IpRange::single(addr))),
                        Err(_) => diags.skip(
                            DHCP_SERVER_IPV4_PORT,
                            &binding.key,
                            format!("invalid address '{ip}'"),
                        ),
                    }
                }
            }
            (None, Some(names)) => {
                for name in names {
                    match ranges.get(name) {
                        Some(range) => {
                            used_ranges.insert(name.clone());
                            requested.push((format!("range {name}"), *range));
                        }
                        None => diags.skip(
                            DHCP_SERVER_IPV4_PORT,
                            &binding.key,
                            format!("range '{name}' is not in the range table"),
                        ),
                    }
                }
            }
        }

        for (label, range) in requested {
            match vlan_ips.iter().find(|ip| range.within(&ip.network())) {
                Some(ip) => {
                    owners
                        .entry((binding.vlan.clone(), alias.clone()))
                        .or_insert_with(|| binding.key.clone());
                    pools
                        .entry(binding.vlan.clone())
                        .or_default()
                        .entry(ip.clone())
                        .or_default()
                        .entry(alias.clone())
                        .or_default()
                        .push(range);
                }
                None => diags.skip(
                    DHCP_SERVER_IPV4_PORT,
                    &binding.key,
                    format!("{label} ({range}) is outside every subnet of {}", binding.vlan),
                ),
            }
        }
    }

    for (interface, subnets) in pools.iter_mut() {
        for ports in subnets.values_mut() {
            for ranges in ports.values_mut() {
                *ranges = merge_intervals(std::mem::take(ranges));
            }
            drop_cross_port_overlaps(interface, ports, &owners, diags);
        }
    }

    ParsedPorts { pools, used_ranges }
}

/// Walk the ports of one subnet in binding-key order and drop every range
/// that overlaps a range already claimed by another port.
fn drop_cross_port_overlaps(
    interface: &str,
    ports: &mut BTreeMap<String, Vec<IpRange>>,
    owners: &BTreeMap<(String, String), String>,
    diags: &mut Diagnostics,
) {
    let owner = |alias: &str| {
        owners
            .get(&(interface.to_string(), alias.to_string()))
            .cloned()
            .unwrap_or_else(|| format!("{interface}|{alias}"))
    };
    let mut order: Vec<(String, String)> = ports.keys().map(|alias| (owner(alias.as_str()), alias.clone())).collect();
    order.sort();

    let mut claimed: Vec<(IpRange, String)> = Vec::new();
    for (key, alias) in order {
        let Some(ranges) = ports.get_mut(&alias) else {
            continue;
        };
        ranges.retain(|range| match claimed.iter().find(|(other, _)| other.overlaps(range)) {
            Some((other, other_key)) => {
                diags.skip(
                    DHCP_SERVER_IPV4_PORT,
                    &key,
                    format!("{range} overlaps {other} already bound by {other_key}"),
                );
                false
            }
            None => true,
        });
        claimed.extend(ranges.iter().map(|range| (*range, key.clone())));
    }
    ports.retain(|_, ranges| !ranges.is_empty());
}
