//! Typed records for the tables this crate consumes.
//!
//! # Responsibilities
//! - Decode raw rows into typed records at the read boundary
//! - Report structurally broken rows as diagnostics, never as errors
//!
//! Semantic checks (range order, subnet containment, option types) belong to
//! the generator; this module only answers "is the row shaped right".

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use crate::db::{self, split_key, Row, Table};
use crate::diagnostics::Diagnostics;

/// Name of the feature gating LEGACY vs MANAGED relay operation.
pub const DHCP_SERVER_FEATURE: &str = "dhcp_server";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpState {
    Enabled,
    Disabled,
}

/// How addresses of an interface are handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpMode {
    /// Pools are bound per port through `DHCP_SERVER_IPV4_PORT`.
    Port,
    /// Pools apply to the whole subnet.
    Subnet,
}

/// A row of `DHCP_SERVER_IPV4`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpInterface {
    pub name: String,
    pub state: DhcpState,
    pub mode: DhcpMode,
    pub gateway: Option<Ipv4Addr>,
    pub lease_time: Option<u32>,
    pub customized_options: Vec<String>,
}

impl DhcpInterface {
    pub fn is_enabled(&self) -> bool {
        self.state == DhcpState::Enabled
    }
}

/// A row of `DHCP_SERVER_IPV4_RANGE`, endpoints still textual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeEntry {
    pub name: String,
    pub endpoints: Vec<String>,
}

/// A row of `DHCP_SERVER_IPV4_PORT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    /// Full row key, `<vlan>|<physical port>`.
    pub key: String,
    pub vlan: String,
    pub port: String,
    pub ips: Option<Vec<String>>,
    pub ranges: Option<Vec<String>>,
}

/// A row of `DHCP_SERVER_IPV4_CUSTOMIZED_OPTIONS`, value still textual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomizedOptionEntry {
    pub name: String,
    pub id: String,
    pub option_type: String,
    pub value: String,
    pub always_send: String,
}

fn text<'a>(row: &'a Row, field: &str) -> Option<&'a str> {
    row.get(field).and_then(|v| v.as_str()).map(str::trim)
}

/// `DEVICE_METADATA|localhost.hostname`.
pub fn hostname(metadata: &Table) -> Option<String> {
    metadata
        .get("localhost")
        .and_then(|row| text(row, "hostname"))
        .filter(|h| !h.is_empty())
        .map(str::to_string)
}

/// Decode every row of `DHCP_SERVER_IPV4`.
pub fn dhcp_interfaces(table: &Table, diags: &mut Diagnostics) -> Vec<DhcpInterface> {
    let mut out = Vec::new();
    for (name, row) in table {
        let state = match text(row, "state") {
            Some("enabled") => DhcpState::Enabled,
            _ => DhcpState::Disabled,
        };
        let mode = match text(row, "mode") {
            None | Some("PORT") => DhcpMode::Port,
            Some("SUBNET") => DhcpMode::Subnet,
            Some(other) => {
                diags.skip(db::DHCP_SERVER_IPV4, name, format!("unsupported mode '{other}'"));
                continue;
            }
        };
        let gateway = match text(row, "gateway") {
            None | Some("") => None,
            Some(g) => match g.parse::<Ipv4Addr>() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    diags.skip(db::DHCP_SERVER_IPV4, name, format!("invalid gateway '{g}'"));
                    continue;
                }
            },
        };
        let lease_time = match text(row, "lease_time") {
            None | Some("") => None,
            Some(l) => match l.parse::<u32>() {
                Ok(secs) => Some(secs),
                Err(_) => {
                    diags.skip(db::DHCP_SERVER_IPV4, name, format!("invalid lease_time '{l}'"));
                    continue;
                }
            },
        };
        let customized_options = row
            .get("customized_options")
            .map(|v| v.to_list())
            .unwrap_or_default();

        out.push(DhcpInterface {
            name: name.clone(),
            state,
            mode,
            gateway,
            lease_time,
            customized_options,
        });
    }
    out
}

/// Keys of `DHCP_SERVER_IPV4` whose `state` is `enabled`, without decoding
/// anything else. The relay only needs this much.
pub fn enabled_interface_names(table: &Table) -> BTreeSet<String> {
    table
        .iter()
        .filter(|(_, row)| text(row, "state") == Some("enabled"))
        .map(|(name, _)| name.clone())
        .collect()
}

/// Decode every row of `DHCP_SERVER_IPV4_RANGE`.
pub fn ranges(table: &Table) -> Vec<RangeEntry> {
    table
        .iter()
        .map(|(name, row)| RangeEntry {
            name: name.clone(),
            endpoints: row.get("range").map(|v| v.to_list()).unwrap_or_default(),
        })
        .collect()
}

/// Decode every row of `DHCP_SERVER_IPV4_PORT`.
pub fn port_bindings(table: &Table, diags: &mut Diagnostics) -> Vec<PortBinding> {
    let mut out = Vec::new();
    for (key, row) in table {
        let Some((vlan, port)) = split_key(key) else {
            diags.skip(db::DHCP_SERVER_IPV4_PORT, key, "key is not '<vlan>|<port>'");
            continue;
        };
        out.push(PortBinding {
            key: key.clone(),
            vlan: vlan.to_string(),
            port: port.to_string(),
            ips: row.get("ips").map(|v| v.to_list()),
            ranges: row.get("ranges").map(|v| v.to_list()),
        });
    }
    out
}

/// Decode every row of `DHCP_SERVER_IPV4_CUSTOMIZED_OPTIONS`.
pub fn customized_options(table: &Table, diags: &mut Diagnostics) -> Vec<CustomizedOptionEntry> {
    let mut out = Vec::new();
    for (name, row) in table {
        let Some(id) = text(row, "id") else {
            diags.skip(db::DHCP_SERVER_IPV4_CUSTOMIZED_OPTIONS, name, "missing id");
            continue;
        };
        let Some(value) = row.get("value").and_then(|v| v.as_str()) else {
            diags.skip(db::DHCP_SERVER_IPV4_CUSTOMIZED_OPTIONS, name, "missing value");
            continue;
        };
        out.push(CustomizedOptionEntry {
            name: name.clone(),
            id: id.to_string(),
            option_type: text(row, "type").unwrap_or("string").to_string(),
            value: value.to_string(),
            always_send: text(row, "always_send").unwrap_or("true").to_string(),
        });
    }
    out
}

/// Whether `FEATURE|<feature>.state` is `enabled`.
pub fn feature_enabled(table: &Table, feature: &str) -> bool {
    table
        .get(feature)
        .and_then(|row| text(row, "state"))
        .map(|s| s == "enabled")
        .unwrap_or(false)
}

/// Read `<table>|<key>.ip` from the state store, tolerating a `/len` suffix.
pub fn state_ip(table: &Table, key: &str) -> Option<Ipv4Addr> {
    let raw = table.get(key).and_then(|row| text(row, "ip"))?;
    raw.split('/').next()?.parse().ok()
}
