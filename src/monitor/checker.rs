//! Per-table change checkers.
//!
//! # Responsibilities
//! - Remember the last observed contents of one table
//! - Report whether the table changed in a way the owner cares about
//!
//! A checker compares whole-table snapshots, so it cannot miss an update that
//! happened while nobody was looking; it can only fold several into one.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::db::tables::{enabled_interface_names, feature_enabled, DHCP_SERVER_FEATURE};
use crate::db::{self, split_key, Table};

/// Every table watcher the daemons know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CheckerKind {
    /// Any change to `DHCP_SERVER_IPV4`.
    DhcpServerCfg,
    /// The set of enabled `DHCP_SERVER_IPV4` interfaces changed.
    DhcpServerEnablement,
    DhcpPort,
    DhcpRange,
    DhcpOption,
    Vlan,
    VlanIntf,
    VlanMember,
    /// `FEATURE|dhcp_server` flipped.
    FeatureState,
}

impl CheckerKind {
    pub const ALL: [CheckerKind; 9] = [
        CheckerKind::DhcpServerCfg,
        CheckerKind::DhcpServerEnablement,
        CheckerKind::DhcpPort,
        CheckerKind::DhcpRange,
        CheckerKind::DhcpOption,
        CheckerKind::Vlan,
        CheckerKind::VlanIntf,
        CheckerKind::VlanMember,
        CheckerKind::FeatureState,
    ];

    /// Table this checker watches.
    pub fn table(self) -> &'static str {
        match self {
            CheckerKind::DhcpServerCfg | CheckerKind::DhcpServerEnablement => db::DHCP_SERVER_IPV4,
            CheckerKind::DhcpPort => db::DHCP_SERVER_IPV4_PORT,
            CheckerKind::DhcpRange => db::DHCP_SERVER_IPV4_RANGE,
            CheckerKind::DhcpOption => db::DHCP_SERVER_IPV4_CUSTOMIZED_OPTIONS,
            CheckerKind::Vlan => db::VLAN,
            CheckerKind::VlanIntf => db::VLAN_INTERFACE,
            CheckerKind::VlanMember => db::VLAN_MEMBER,
            CheckerKind::FeatureState => db::FEATURE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CheckerKind::DhcpServerCfg => "dhcp_server_cfg",
            CheckerKind::DhcpServerEnablement => "dhcp_server_enablement",
            CheckerKind::DhcpPort => "dhcp_port",
            CheckerKind::DhcpRange => "dhcp_range",
            CheckerKind::DhcpOption => "dhcp_option",
            CheckerKind::Vlan => "vlan",
            CheckerKind::VlanIntf => "vlan_intf",
            CheckerKind::VlanMember => "vlan_member",
            CheckerKind::FeatureState => "feature_state",
        }
    }
}

/// What the owner currently depends on. Checkers use it to ignore changes to
/// rows nobody consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckContext {
    /// DHCP interfaces whose rows matter (VLAN names).
    pub interfaces: BTreeSet<String>,
    /// Range names referenced by port bindings.
    pub used_ranges: BTreeSet<String>,
    /// Customized option names referenced by enabled interfaces.
    pub used_options: BTreeSet<String>,
}

/// A single table watcher.
#[derive(Debug, Clone)]
pub struct Checker {
    kind: CheckerKind,
    baseline: Table,
}

/// Keys added, removed or modified between two snapshots.
pub fn changed_keys(old: &Table, new: &Table) -> BTreeSet<String> {
    let mut keys: BTreeSet<String> = old
        .iter()
        .filter(|(k, row)| new.get(*k) != Some(*row))
        .map(|(k, _)| k.clone())
        .collect();
    keys.extend(new.keys().filter(|k| !old.contains_key(*k)).cloned());
    keys
}

fn vlan_of(key: &str) -> &str {
    split_key(key).map(|(vlan, _)| vlan).unwrap_or(key)
}

impl Checker {
    /// Create a checker whose baseline is `current`.
    pub fn new(kind: CheckerKind, current: Table) -> Self {
        Self {
            kind,
            baseline: current,
        }
    }

    pub fn kind(&self) -> CheckerKind {
        self.kind
    }

    /// Compare `current` against the baseline, then adopt it as the new baseline.
    pub fn check(&mut self, current: Table, ctx: &CheckContext) -> bool {
        let fired = match self.kind {
            CheckerKind::FeatureState => {
                feature_enabled(&self.baseline, DHCP_SERVER_FEATURE)
                    != feature_enabled(&current, DHCP_SERVER_FEATURE)
            }
            CheckerKind::DhcpServerEnablement => {
                enabled_interface_names(&self.baseline) != enabled_interface_names(&current)
            }
            kind => {
                let changed = changed_keys(&self.baseline, &current);
                match kind {
                    CheckerKind::DhcpServerCfg => !changed.is_empty(),
                    CheckerKind::DhcpRange => changed.iter().any(|k| ctx.used_ranges.contains(k)),
                    CheckerKind::DhcpOption => changed.iter().any(|k| ctx.used_options.contains(k)),
                    CheckerKind::Vlan => changed.iter().any(|k| ctx.interfaces.contains(k)),
                    _ => changed.iter().any(|k| ctx.interfaces.contains(vlan_of(k))),
                }
            }
        };
        if fired {
            tracing::debug!(checker = self.kind.name(), "Checker fired");
        }
        self.baseline = current;
        fired
    }
}
