//! Render context assembly.
//!
//! Turns the validated pieces (interfaces, pools, options) into the object
//! the renderer serializes, and works out which tables the result depends on.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::cfggen::options::CustomizedOption;
use crate::cfggen::port::PortPools;
use crate::cfggen::range::IpRange;
use crate::cfggen::vlan::VlanInfo;
use crate::db::tables::{DhcpInterface, DhcpMode};
use crate::db::DHCP_SERVER_IPV4;
use crate::diagnostics::Diagnostics;
use crate::monitor::CheckerKind;

/// Lease time used when neither the interface nor the settings give one.
pub const DEFAULT_LEASE_TIME: u32 = 900;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolObj {
    pub range: IpRange,
    pub client_class: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetObj {
    pub id: u32,
    pub interface: String,
    pub subnet: Ipv4Net,
    pub pools: Vec<PoolObj>,
    pub gateway: Option<Ipv4Addr>,
    pub server_id: Ipv4Addr,
    pub lease_time: u32,
    pub options: Vec<CustomizedOption>,
}

/// A relay circuit-ID match class, `<hostname>:<port alias>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClientClass {
    pub name: String,
}

impl ClientClass {
    pub fn new(hostname: &str, alias: &str) -> Self {
        Self {
            name: format!("{hostname}:{alias}"),
        }
    }

    /// Match on the trailing bytes of the first relay's circuit ID.
    pub fn test_expression(&self) -> String {
        let len = self.name.len();
        format!("substring(relay4[1].hex, -{len}, {len}) == '{}'", self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    pub subnets: Vec<SubnetObj>,
    pub client_classes: Vec<ClientClass>,
    /// Definitions for every customized option some subnet emits.
    pub option_defs: Vec<CustomizedOption>,
}

/// Everything the generator derives besides the rendered text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateObj {
    pub context: RenderContext,
    pub enabled_interfaces: BTreeSet<String>,
    pub used_options: BTreeSet<String>,
    pub watched_tables: BTreeSet<CheckerKind>,
}

pub fn construct_obj_for_template(
    hostname: &str,
    interfaces: &[DhcpInterface],
    vlan: &VlanInfo,
    pools: &PortPools,
    options: &BTreeMap<String, CustomizedOption>,
    default_lease_time: u32,
    diags: &mut Diagnostics,
) -> TemplateObj {
    let mut obj = TemplateObj::default();
    obj.watched_tables.insert(CheckerKind::DhcpServerCfg);

    let mut classes = BTreeSet::new();
    let mut defs: BTreeMap<String, CustomizedOption> = BTreeMap::new();

    for iface in interfaces.iter().filter(|i| i.is_enabled()) {
        obj.enabled_interfaces.insert(iface.name.clone());
        obj.watched_tables.insert(CheckerKind::Vlan);
        obj.used_options.extend(iface.customized_options.iter().cloned());
        if !iface.customized_options.is_empty() {
            obj.watched_tables.insert(CheckerKind::DhcpOption);
        }

        if iface.mode != DhcpMode::Port {
            diags.skip(DHCP_SERVER_IPV4, &iface.name, "only PORT mode is rendered");
            continue;
        }
        obj.watched_tables.extend([
            CheckerKind::DhcpPort,
            CheckerKind::DhcpRange,
            CheckerKind::VlanIntf,
            CheckerKind::VlanMember,
        ]);

        let mut subnet_options = Vec::new();
        for name in &iface.customized_options {
            match options.get(name) {
                Some(option) => {
                    subnet_options.push(option.clone());
                    defs.insert(name.clone(), option.clone());
                }
                None => diags.skip(
                    DHCP_SERVER_IPV4,
                    &iface.name,
                    format!("customized option '{name}' is unavailable"),
                ),
            }
        }

        let Some(vlan_ips) = vlan.interfaces.get(&iface.name) else {
            diags.skip(DHCP_SERVER_IPV4, &iface.name, "interface has no IPv4 address");
            continue;
        };
        let iface_pools = pools.get(&iface.name);

        for vlan_ip in vlan_ips {
            let mut subnet_pools = Vec::new();
            if let Some(ports) = iface_pools.and_then(|p| p.get(vlan_ip)) {
                for (alias, ranges) in ports {
                    if ranges.is_empty() {
                        continue;
                    }
                    let class = ClientClass::new(hostname, alias);
                    subnet_pools.extend(ranges.iter().map(|range| PoolObj {
                        range: *range,
                        client_class: class.name.clone(),
                    }));
                    classes.insert(class);
                }
            }

            obj.context.subnets.push(SubnetObj {
                id: obj.context.subnets.len() as u32 + 1,
                interface: iface.name.clone(),
                subnet: vlan_ip.network(),
                pools: subnet_pools,
                gateway: iface.gateway,
                server_id: vlan_ip.address(),
                lease_time: iface.lease_time.unwrap_or(default_lease_time),
                options: subnet_options.clone(),
            });
        }
    }

    obj.context.client_classes = classes.into_iter().collect();
    obj.context.option_defs = defs.into_values().collect();
    obj
}
