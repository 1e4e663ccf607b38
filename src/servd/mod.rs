//! Server configuration daemon.
//!
//! # Data Flow
//! ```text
//! startup:
//!     listen interface IPv4 (getifaddrs, bounded retries)
//!     → state store DHCP_SERVER_IPV4_SERVER_IP|<iface>.ip  (read by the relay)
//!
//! every pass:
//!     DhcpServCfgGenerator::generate
//!     → enabled checkers := watched tables (new ones start from the
//!       tables this pass read)
//!     → atomic write of the Kea config (only when the text changed)
//!     → SIGHUP to kea-dhcp4
//! ```

pub mod addrs;

use std::collections::BTreeSet;
use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::Signal;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::cfggen::{DhcpServCfgGenerator, GenerateError, Generated};
use crate::config::{FilesConfig, ServerConfig};
use crate::db::file::write_atomic;
use crate::db::{self, DbConnector, DbError};
use crate::monitor::{CheckContext, CheckerKind, DbMonitor};
use crate::process::{ProcessError, ProcessTable};
use crate::resilience::RetryPolicy;

pub use addrs::{InterfaceAddrs, SystemInterfaces};

#[derive(Debug, Error)]
pub enum ServdError {
    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to list addresses of {interface}: {source}")]
    Interfaces {
        interface: String,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("no IPv4 address on {interface} after {attempts} attempts")]
    ServerIpUnavailable { interface: String, attempts: u32 },
}

pub struct DhcpServd<I, P> {
    db: Arc<dyn DbConnector>,
    generator: DhcpServCfgGenerator,
    monitor: DbMonitor,
    interfaces: I,
    processes: P,
    config: ServerConfig,
    output_path: PathBuf,
    context: CheckContext,
    last_written: Option<String>,
}

impl<I: InterfaceAddrs, P: ProcessTable> DhcpServd<I, P> {
    pub fn new(
        db: Arc<dyn DbConnector>,
        generator: DhcpServCfgGenerator,
        monitor: DbMonitor,
        interfaces: I,
        processes: P,
        config: ServerConfig,
        files: &FilesConfig,
    ) -> Self {
        Self {
            db,
            generator,
            monitor,
            interfaces,
            processes,
            config,
            output_path: PathBuf::from(&files.kea_config_output),
            context: CheckContext::default(),
            last_written: None,
        }
    }

    pub fn monitor(&self) -> &DbMonitor {
        &self.monitor
    }

    pub fn process_table(&self) -> &P {
        &self.processes
    }

    /// Publish the listen interface's IPv4 address into the state store.
    pub async fn update_dhcp_server_ip(&mut self) -> Result<Ipv4Addr, ServdError> {
        let interface = self.config.listen_interface.clone();
        let policy = RetryPolicy::fixed(
            self.config.server_ip_retries,
            Duration::from_secs(self.config.server_ip_retry_interval_secs),
        );
        let found = policy
            .poll("listen interface address", || self.interfaces.ipv4_of(&interface))
            .await?;
        let Some(ip) = found else {
            tracing::error!(interface = %interface, "Listen interface has no IPv4 address");
            return Err(ServdError::ServerIpUnavailable {
                interface,
                attempts: self.config.server_ip_retries,
            });
        };

        self.db
            .set_state_field(db::DHCP_SERVER_IPV4_SERVER_IP, &interface, "ip", &ip.to_string())?;
        tracing::info!(interface = %interface, %ip, "Published DHCP server IP");
        Ok(ip)
    }

    /// Generate, re-arm the checkers, write the config and ask the server
    /// to reload it.
    pub fn dump_dhcp4_config(&mut self) -> Result<Generated, ServdError> {
        let generated = self.generator.generate()?;
        self.monitor
            .set_checkers_from(&generated.watched_tables, &generated.snapshot)?;
        self.context = generated.check_context();

        if !generated.diagnostics.is_empty() {
            tracing::warn!(
                skipped = generated.diagnostics.len(),
                affected = ?generated.diagnostics.affected_interfaces(),
                "Configuration rendered without some rows"
            );
        }

        if self.last_written.as_deref() == Some(generated.config.as_str()) {
            tracing::debug!("Rendered configuration unchanged");
            return Ok(generated);
        }

        write_atomic(&self.output_path, generated.config.as_bytes()).map_err(|source| ServdError::Write {
            path: self.output_path.clone(),
            source,
        })?;
        self.last_written = Some(generated.config.clone());
        tracing::info!(
            path = %self.output_path.display(),
            interfaces = ?generated.enabled_interfaces,
            "Wrote server configuration"
        );
        self.notify_server()?;
        Ok(generated)
    }

    fn notify_server(&mut self) -> Result<(), ServdError> {
        let servers = self.processes.processes_named(&self.config.process_name)?;
        if servers.is_empty() {
            tracing::info!(process = %self.config.process_name, "Server not running, nothing to reload");
            return Ok(());
        }
        for server in servers {
            self.processes.signal(server.pid, Signal::SIGHUP)?;
            tracing::info!(pid = server.pid, "Sent SIGHUP to server");
        }
        Ok(())
    }

    pub fn watched_checkers(&self) -> BTreeSet<CheckerKind> {
        self.monitor.enabled_checkers()
    }

    pub async fn start(&mut self) -> Result<(), ServdError> {
        self.update_dhcp_server_ip().await?;
        self.dump_dhcp4_config()?;
        Ok(())
    }

    /// Re-render whenever a watched table changes.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServdError> {
        loop {
            let events = tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Server config daemon stopping");
                    return Ok(());
                }
                events = self.monitor.wait_for_update(&self.context) => events?,
            };
            if !events.is_empty() {
                tracing::info!(fired = ?events.fired, "Watched tables changed, regenerating");
                self.dump_dhcp4_config()?;
            }
        }
    }
}
