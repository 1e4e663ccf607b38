//! Server configuration generator.
//!
//! # Data Flow
//! ```text
//! DbConnector snapshot
//!     → db::tables (typed rows)
//!     → range / vlan / port / options (validated, row errors → Diagnostics)
//!     → template::construct_obj_for_template (subnets, classes, watched tables)
//!     → render::render_config (Kea Dhcp4 JSON)
//!     → Generated
//! ```
//!
//! # Responsibilities
//! - Produce the whole document or nothing
//! - Report which ranges, interfaces, options and tables the result depends on
//! - Keep watching interfaces that are enabled but wait for their VLAN
//! - Hand back the exact tables it read, so checkers can start from them
//!
//! The port alias map and the option allow-list are read once, when the
//! generator is built.

pub mod options;
pub mod port;
pub mod range;
pub mod render;
pub mod template;
pub mod vlan;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::config::{FilesConfig, ServerConfig};
use crate::db::{self, tables, DbConnector, DbError, Snapshot, Table};
use crate::diagnostics::Diagnostics;
use crate::monitor::{CheckContext, CheckerKind};
use crate::observability::metrics;

pub use options::OptionAllowList;
pub use port::PortAliasMap;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("hostname is not set in DEVICE_METADATA|localhost")]
    MissingHostname,

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("failed to read {path}: {source}")]
    StaticFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render configuration: {0}")]
    Render(#[from] serde_json::Error),
}

/// One generation result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generated {
    /// Rendered server configuration.
    pub config: String,
    pub used_ranges: BTreeSet<String>,
    pub enabled_interfaces: BTreeSet<String>,
    /// Enabled in `DHCP_SERVER_IPV4` but left out because the VLAN is missing.
    pub awaiting_vlan: BTreeSet<String>,
    pub used_options: BTreeSet<String>,
    pub watched_tables: BTreeSet<CheckerKind>,
    pub diagnostics: Diagnostics,
    /// Tables as read for this result.
    pub snapshot: Snapshot,
}

impl Generated {
    /// Filter context for the checkers guarding this result.
    pub fn check_context(&self) -> CheckContext {
        CheckContext {
            interfaces: self
                .enabled_interfaces
                .union(&self.awaiting_vlan)
                .cloned()
                .collect(),
            used_ranges: self.used_ranges.clone(),
            used_options: self.used_options.clone(),
        }
    }
}

pub struct DhcpServCfgGenerator {
    db: Arc<dyn DbConnector>,
    server: ServerConfig,
    aliases: PortAliasMap,
    allow_list: OptionAllowList,
}

impl DhcpServCfgGenerator {
    /// Build a generator, loading the alias map and option allow-list.
    pub fn new(
        db: Arc<dyn DbConnector>,
        server: &ServerConfig,
        files: &FilesConfig,
    ) -> Result<Self, GenerateError> {
        let aliases = read_static(&files.port_alias_map, port::load_port_alias_map)?;
        let allow_list = read_static(&files.dhcp_option_list, OptionAllowList::load)?;
        tracing::info!(
            aliases = aliases.len(),
            customizable_codes = allow_list.allowed_codes().len(),
            "Loaded static generator inputs"
        );
        Ok(Self::with_parts(db, server.clone(), aliases, allow_list))
    }

    pub fn with_parts(
        db: Arc<dyn DbConnector>,
        server: ServerConfig,
        aliases: PortAliasMap,
        allow_list: OptionAllowList,
    ) -> Self {
        Self {
            db,
            server,
            aliases,
            allow_list,
        }
    }

    /// Render the configuration for the current database contents.
    pub fn generate(&self) -> Result<Generated, GenerateError> {
        let mut snapshot = Snapshot::new();
        let metadata = self.db.config_table(db::DEVICE_METADATA)?;
        let hostname = tables::hostname(&metadata).ok_or(GenerateError::MissingHostname)?;
        let mut diags = Diagnostics::new();

        let vlans = self.read(&mut snapshot, db::VLAN)?;
        let mut awaiting_vlan = BTreeSet::new();
        let interfaces: Vec<_> =
            tables::dhcp_interfaces(&self.read(&mut snapshot, db::DHCP_SERVER_IPV4)?, &mut diags)
                .into_iter()
                .filter(|iface| {
                    if iface.is_enabled() && !vlans.contains_key(&iface.name) {
                        diags.skip(db::DHCP_SERVER_IPV4, &iface.name, "VLAN does not exist");
                        awaiting_vlan.insert(iface.name.clone());
                        return false;
                    }
                    iface.is_enabled()
                })
                .collect();
        let port_mode: BTreeSet<&str> = interfaces
            .iter()
            .filter(|iface| iface.mode == tables::DhcpMode::Port)
            .map(|iface| iface.name.as_str())
            .collect();

        let ranges = range::parse_range(
            &tables::ranges(&self.read(&mut snapshot, db::DHCP_SERVER_IPV4_RANGE)?),
            &mut diags,
        );
        let vlan_info = vlan::parse_vlan(
            &self.read(&mut snapshot, db::VLAN_INTERFACE)?,
            &self.read(&mut snapshot, db::VLAN_MEMBER)?,
        );
        let bindings: Vec<_> =
            tables::port_bindings(&self.read(&mut snapshot, db::DHCP_SERVER_IPV4_PORT)?, &mut diags)
                .into_iter()
                .filter(|binding| port_mode.contains(binding.vlan.as_str()))
                .collect();
        let ports = port::parse_port(&bindings, &vlan_info, &ranges, &self.aliases, &mut diags);

        let option_entries = tables::customized_options(
            &self.read(&mut snapshot, db::DHCP_SERVER_IPV4_CUSTOMIZED_OPTIONS)?,
            &mut diags,
        );
        let options = options::parse_customized_options(&option_entries, &self.allow_list, &mut diags);

        let mut obj = template::construct_obj_for_template(
            &hostname,
            &interfaces,
            &vlan_info,
            &ports.pools,
            &options,
            self.server.default_lease_time,
            &mut diags,
        );
        if !awaiting_vlan.is_empty() {
            obj.watched_tables.insert(CheckerKind::Vlan);
        }
        let config = render::render_config(&obj.context, &self.server)?;

        metrics::record_generation(obj.context.subnets.len(), diags.len());
        tracing::debug!(
            subnets = obj.context.subnets.len(),
            skipped = diags.len(),
            awaiting_vlan = ?awaiting_vlan,
            "Generated server configuration"
        );

        Ok(Generated {
            config,
            used_ranges: ports.used_ranges,
            enabled_interfaces: obj.enabled_interfaces,
            awaiting_vlan,
            used_options: obj.used_options,
            watched_tables: obj.watched_tables,
            diagnostics: diags,
            snapshot,
        })
    }

    fn read(&self, snapshot: &mut Snapshot, table: &str) -> Result<Table, DbError> {
        let rows = self.db.config_table(table)?;
        snapshot.insert(table.to_string(), rows.clone());
        Ok(rows)
    }
}

fn read_static<T>(path: &str, load: impl FnOnce(&Path) -> std::io::Result<T>) -> Result<T, GenerateError> {
    load(Path::new(path)).map_err(|source| GenerateError::StaticFile {
        path: PathBuf::from(path),
        source,
    })
}
