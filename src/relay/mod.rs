//! DHCP relay process supervisor.
//!
//! # Data Flow
//! ```text
//! FEATURE|dhcp_server ──► mode (LEGACY ⇄ MANAGED)
//!
//! LEGACY:  every wake → compare live dhcrelay/dhcpmon argv with the
//!          supervisord program table → mismatch is fatal
//!
//! MANAGED: DHCP_SERVER_IPV4 / VLAN / VLAN_INTERFACE / VLAN_MEMBER change
//!     → desired interfaces (enabled in DHCP table, minus missing VLANs)
//!     → server IP from the state store (bounded retries)
//!     → per process family: diff running interface set, replace if needed
//!     → settle, then liveness check of what was spawned
//! ```
//!
//! # Design Decisions
//! - Running processes are rediscovered from the process table every pass
//! - A VLAN_INTERFACE change forces replacement, since addresses are not
//!   visible in the command line
//! - Fatal conditions are returned as `RelayError`; the binary exits on them

pub mod legacy;

use std::collections::BTreeSet;
use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::Signal;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::{FilesConfig, RelayConfig};
use crate::db::tables::{enabled_interface_names, feature_enabled, state_ip, DHCP_SERVER_FEATURE};
use crate::db::{self, DbConnector, DbError};
use crate::monitor::{CheckContext, CheckerKind, DbMonitor, UpdateEvents};
use crate::observability::metrics;
use crate::process::{Pid, ProcessError, ProcessInfo, ProcessStatus, ProcessTable};
use crate::resilience::RetryPolicy;

pub use legacy::{parse_legacy_commands, LegacyCommands, ProgramSupervisor, Supervisorctl};

/// Checkers that drive MANAGED mode.
pub const MANAGED_CHECKERS: [CheckerKind; 4] = [
    CheckerKind::DhcpServerEnablement,
    CheckerKind::Vlan,
    CheckerKind::VlanIntf,
    CheckerKind::VlanMember,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Processes belong to the external supervisor.
    Legacy,
    /// Processes are spawned and replaced by this daemon.
    Managed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessFamily {
    Dhcrelay,
    Dhcpmon,
}

impl ProcessFamily {
    pub const ALL: [ProcessFamily; 2] = [ProcessFamily::Dhcrelay, ProcessFamily::Dhcpmon];

    pub fn name(self) -> &'static str {
        match self {
            ProcessFamily::Dhcrelay => "dhcrelay",
            ProcessFamily::Dhcpmon => "dhcpmon",
        }
    }
}

/// What one family currently looks like in the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayProcessDescriptor {
    pub family: ProcessFamily,
    pub processes: Vec<ProcessInfo>,
    /// Union of the `-id` arguments of every process.
    pub interfaces: BTreeSet<String>,
}

impl RelayProcessDescriptor {
    pub fn scan<T: ProcessTable + ?Sized>(table: &T, family: ProcessFamily) -> Result<Self, ProcessError> {
        let processes = table.processes_named(family.name())?;
        let interfaces = processes
            .iter()
            .flat_map(|p| p.flag_values("-id"))
            .map(str::to_string)
            .collect();
        Ok(Self {
            family,
            processes,
            interfaces,
        })
    }
}

/// Result of reconciling one family before spawning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// Processes were running with the wrong interfaces (or forced) and
    /// have been terminated.
    KilledOld,
    /// Processes already serve the desired interfaces.
    NotKilled,
    /// Nothing was running.
    NotFound,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("failed to read legacy program table {path}: {source}")]
    LegacyConfig {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no DHCP server IP in DHCP_SERVER_IPV4_SERVER_IP|{key} after {attempts} attempts")]
    ServerIpUnavailable { key: String, attempts: u32 },

    #[error("dhcrelay (pid {pid}) did not survive startup, status {status:?}")]
    DhcrelayDied { pid: Pid, status: ProcessStatus },

    #[error("legacy relay processes do not match the supervisor config: missing {missing:?}, unexpected {unexpected:?}")]
    LegacyMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("supervisorctl {action} {program} failed: {detail}")]
    Supervisor {
        action: &'static str,
        program: String,
        detail: String,
    },
}

pub struct DhcpRelayd<P, S> {
    db: Arc<dyn DbConnector>,
    monitor: DbMonitor,
    processes: P,
    supervisor: S,
    config: RelayConfig,
    alias_map_path: String,
    legacy_conf_path: PathBuf,
    legacy_commands: LegacyCommands,
    mode: Option<RelayMode>,
}

impl<P: ProcessTable, S: ProgramSupervisor> DhcpRelayd<P, S> {
    pub fn new(
        db: Arc<dyn DbConnector>,
        monitor: DbMonitor,
        processes: P,
        supervisor: S,
        config: RelayConfig,
        files: &FilesConfig,
    ) -> Self {
        Self {
            db,
            monitor,
            processes,
            supervisor,
            config,
            alias_map_path: files.port_alias_map.clone(),
            legacy_conf_path: PathBuf::from(&files.supervisord_conf),
            legacy_commands: LegacyCommands::new(),
            mode: None,
        }
    }

    pub fn mode(&self) -> Option<RelayMode> {
        self.mode
    }

    pub fn legacy_commands(&self) -> &LegacyCommands {
        &self.legacy_commands
    }

    pub fn monitor(&self) -> &DbMonitor {
        &self.monitor
    }

    pub fn process_table(&self) -> &P {
        &self.processes
    }

    /// Wait for the external supervisor, load the legacy program table and
    /// enter the mode the feature flag asks for.
    pub async fn start(&mut self) -> Result<(), RelayError> {
        if self.config.startup_delay_secs > 0 {
            tracing::info!(delay_secs = self.config.startup_delay_secs, "Waiting before first pass");
            tokio::time::sleep(Duration::from_secs(self.config.startup_delay_secs)).await;
        }

        self.legacy_commands = parse_legacy_commands(&self.legacy_conf_path, &self.config.legacy_program_prefixes)
            .map_err(|source| RelayError::LegacyConfig {
                path: self.legacy_conf_path.clone(),
                source,
            })?;
        tracing::info!(
            programs = self.legacy_commands.len(),
            path = %self.legacy_conf_path.display(),
            "Loaded legacy relay programs"
        );

        self.monitor.enable_checkers([CheckerKind::FeatureState])?;
        let features = self.db.config_table(db::FEATURE)?;
        if feature_enabled(&features, DHCP_SERVER_FEATURE) {
            self.enter_managed().await
        } else {
            self.enter_legacy(false).await
        }
    }

    /// Main loop. Returns on shutdown or on the first fatal error.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> Result<(), RelayError> {
        loop {
            let ctx = self.check_context()?;
            let events = tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Relay supervisor stopping");
                    return Ok(());
                }
                events = self.monitor.wait_for_update(&ctx) => events?,
            };
            self.handle_events(&events).await?;
        }
    }

    /// Checker filter context: interfaces enabled in the DHCP table, before
    /// VLAN presence is considered, so a VLAN appearing for one of them fires.
    pub fn check_context(&self) -> Result<CheckContext, RelayError> {
        Ok(CheckContext {
            interfaces: enabled_interface_names(&self.db.config_table(db::DHCP_SERVER_IPV4)?),
            ..CheckContext::default()
        })
    }

    /// Run one control-loop pass for the given wake.
    pub async fn handle_events(&mut self, events: &UpdateEvents) -> Result<(), RelayError> {
        if let Some(enabled) = events.feature_enabled {
            match (enabled, self.mode) {
                (true, Some(RelayMode::Legacy)) => return self.enter_managed().await,
                (false, Some(RelayMode::Managed)) => return self.enter_legacy(true).await,
                _ => {}
            }
        }

        match self.mode {
            Some(RelayMode::Managed) => {
                if MANAGED_CHECKERS.iter().any(|kind| events.fired(*kind)) {
                    self.refresh_dhcrelay(events.fired(CheckerKind::VlanIntf)).await?;
                }
                Ok(())
            }
            Some(RelayMode::Legacy) => self.check_legacy_processes(),
            None => Ok(()),
        }
    }

    /// Interfaces enabled in `DHCP_SERVER_IPV4`, minus those whose VLAN is
    /// missing from the VLAN table.
    pub fn desired_interfaces(&self) -> Result<BTreeSet<String>, RelayError> {
        let candidates = enabled_interface_names(&self.db.config_table(db::DHCP_SERVER_IPV4)?);
        let vlans = self.db.config_table(db::VLAN)?;
        Ok(candidates
            .into_iter()
            .filter(|name| {
                let present = vlans.contains_key(name);
                if !present {
                    tracing::warn!(interface = %name, "DHCP interface enabled but VLAN missing, not relaying it");
                }
                present
            })
            .collect())
    }

    pub async fn get_dhcp_server_ip(&self) -> Result<Ipv4Addr, RelayError> {
        let policy = RetryPolicy::fixed(
            self.config.server_ip_retries,
            Duration::from_secs(self.config.server_ip_retry_interval_secs),
        );
        let key = &self.config.server_ip_key;
        let found = policy
            .poll("dhcp server ip", || {
                let table = self.db.state_table(db::DHCP_SERVER_IPV4_SERVER_IP)?;
                Ok::<_, DbError>(state_ip(&table, key))
            })
            .await?;
        found.ok_or_else(|| {
            tracing::error!(key = %key, attempts = self.config.server_ip_retries, "DHCP server IP unavailable");
            RelayError::ServerIpUnavailable {
                key: key.clone(),
                attempts: self.config.server_ip_retries,
            }
        })
    }

    /// Bring `dhcrelay` and `dhcpmon` in line with the desired interfaces.
    /// With `force_kill`, running processes are replaced even if their
    /// interfaces already match.
    pub async fn refresh_dhcrelay(&mut self, force_kill: bool) -> Result<(), RelayError> {
        self.processes.reap_exited();
        let desired = self.desired_interfaces()?;
        let server_ip = self.get_dhcp_server_ip().await?;
        tracing::info!(interfaces = ?desired, %server_ip, force_kill, "Refreshing relay processes");

        let relay = self
            .kill_exist_relay_related_process(ProcessFamily::Dhcrelay, &desired, force_kill)
            .await?;
        if relay != KillOutcome::NotKilled && !desired.is_empty() {
            self.start_dhcrelay_process(&desired, server_ip).await?;
        }

        let monitor = self
            .kill_exist_relay_related_process(ProcessFamily::Dhcpmon, &desired, force_kill)
            .await?;
        if monitor != KillOutcome::NotKilled && !desired.is_empty() {
            self.start_dhcpmon_process(&desired).await?;
        }
        Ok(())
    }

    pub async fn kill_exist_relay_related_process(
        &mut self,
        family: ProcessFamily,
        desired: &BTreeSet<String>,
        force_kill: bool,
    ) -> Result<KillOutcome, RelayError> {
        let running = RelayProcessDescriptor::scan(&self.processes, family)?;
        if running.processes.is_empty() {
            return Ok(KillOutcome::NotFound);
        }
        if !force_kill && running.interfaces == *desired {
            tracing::debug!(process = family.name(), "Running processes already up to date");
            return Ok(KillOutcome::NotKilled);
        }

        tracing::info!(
            process = family.name(),
            running = ?running.interfaces,
            desired = ?desired,
            force_kill,
            "Replacing processes"
        );
        self.terminate_all(family, &running.processes).await?;
        Ok(KillOutcome::KilledOld)
    }

    /// SIGTERM every process, escalate to SIGKILL after the timeout, reap.
    async fn terminate_all(&mut self, family: ProcessFamily, processes: &[ProcessInfo]) -> Result<(), RelayError> {
        for process in processes {
            self.processes.signal(process.pid, Signal::SIGTERM)?;
        }

        let deadline = Instant::now() + Duration::from_millis(self.config.terminate_timeout_ms);
        loop {
            let alive: Vec<Pid> = processes
                .iter()
                .map(|p| p.pid)
                .filter(|pid| self.processes.status(*pid) == ProcessStatus::Running)
                .collect();
            if alive.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                for pid in alive {
                    tracing::warn!(pid, process = family.name(), "Process ignored SIGTERM, killing");
                    self.processes.signal(pid, Signal::SIGKILL)?;
                }
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        for process in processes {
            self.processes.reap(process.pid);
        }
        metrics::record_process_kill(family.name(), processes.len());
        Ok(())
    }

    pub fn dhcrelay_command(&self, interfaces: &BTreeSet<String>, server_ip: Ipv4Addr) -> Vec<String> {
        let mut argv: Vec<String> = [
            self.config.dhcrelay_path.as_str(),
            "-d",
            "-m",
            "discard",
            "-a",
            "%h:%p",
            "%P",
            "--name-alias-map-file",
            self.alias_map_path.as_str(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        for iface in interfaces {
            argv.push("-id".to_string());
            argv.push(iface.clone());
        }
        argv.push("-iu".to_string());
        argv.push(self.config.upstream_interface.clone());
        argv.push(server_ip.to_string());
        argv
    }

    pub fn dhcpmon_command(&self, interface: &str) -> Vec<String> {
        vec![
            self.config.dhcpmon_path.clone(),
            "-id".to_string(),
            interface.to_string(),
            "-iu".to_string(),
            self.config.upstream_interface.clone(),
            "-im".to_string(),
            self.config.monitor_interface.clone(),
        ]
    }

    pub async fn start_dhcrelay_process(
        &mut self,
        interfaces: &BTreeSet<String>,
        server_ip: Ipv4Addr,
    ) -> Result<(), RelayError> {
        let argv = self.dhcrelay_command(interfaces, server_ip);
        let pid = self.processes.spawn(&argv)?;
        metrics::record_process_start(ProcessFamily::Dhcrelay.name());
        tracing::info!(pid, cmdline = %argv.join(" "), "Started dhcrelay");

        self.settle(self.config.dhcrelay_settle_ms).await;
        match self.processes.status(pid) {
            ProcessStatus::Running => Ok(()),
            status => {
                self.clean_up(pid);
                tracing::error!(pid, ?status, "dhcrelay exited right after start");
                Err(RelayError::DhcrelayDied { pid, status })
            }
        }
    }

    /// Start one `dhcpmon` per interface. A monitor dying right after start
    /// is logged and cleaned up but does not stop the daemon.
    pub async fn start_dhcpmon_process(&mut self, interfaces: &BTreeSet<String>) -> Result<(), RelayError> {
        let mut started = Vec::new();
        for iface in interfaces {
            let argv = self.dhcpmon_command(iface);
            let pid = self.processes.spawn(&argv)?;
            metrics::record_process_start(ProcessFamily::Dhcpmon.name());
            tracing::info!(pid, cmdline = %argv.join(" "), "Started dhcpmon");
            started.push((iface, pid));
        }

        self.settle(self.config.dhcpmon_settle_ms).await;
        for (iface, pid) in started {
            let status = self.processes.status(pid);
            if status != ProcessStatus::Running {
                self.clean_up(pid);
                tracing::error!(pid, interface = %iface, ?status, "dhcpmon exited right after start");
            }
        }
        Ok(())
    }

    /// In LEGACY mode the live relay/monitor set must be exactly the
    /// programs of the supervisor config.
    pub fn check_legacy_processes(&self) -> Result<(), RelayError> {
        let expected: BTreeSet<Vec<String>> = self.legacy_commands.values().cloned().collect();
        let mut running = BTreeSet::new();
        for family in ProcessFamily::ALL {
            for process in self.processes.processes_named(family.name())? {
                running.insert(process.cmdline);
            }
        }
        if running == expected {
            tracing::debug!(processes = running.len(), "Legacy relay processes match");
            return Ok(());
        }

        let missing: Vec<String> = expected.difference(&running).map(|c| c.join(" ")).collect();
        let unexpected: Vec<String> = running.difference(&expected).map(|c| c.join(" ")).collect();
        tracing::error!(?missing, ?unexpected, "Legacy relay processes do not match");
        Err(RelayError::LegacyMismatch { missing, unexpected })
    }

    async fn enter_managed(&mut self) -> Result<(), RelayError> {
        tracing::info!("dhcp_server feature enabled, relay processes are managed here");
        let programs: Vec<String> = self.legacy_commands.keys().cloned().collect();
        for program in &programs {
            self.supervisor.stop(program)?;
        }
        for family in ProcessFamily::ALL {
            let leftover = self.processes.processes_named(family.name())?;
            if !leftover.is_empty() {
                tracing::info!(process = family.name(), count = leftover.len(), "Killing leftover legacy processes");
                self.terminate_all(family, &leftover).await?;
            }
        }

        self.monitor.enable_checkers(MANAGED_CHECKERS)?;
        self.set_mode(RelayMode::Managed);
        self.refresh_dhcrelay(false).await
    }

    /// `restart_programs` is false at startup, where the external
    /// supervisor has already started its programs.
    async fn enter_legacy(&mut self, restart_programs: bool) -> Result<(), RelayError> {
        tracing::info!("dhcp_server feature disabled, relay processes belong to supervisord");
        self.monitor.disable_checkers(MANAGED_CHECKERS);

        if restart_programs {
            for family in ProcessFamily::ALL {
                let managed = self.processes.processes_named(family.name())?;
                if !managed.is_empty() {
                    self.terminate_all(family, &managed).await?;
                }
            }
            let programs: Vec<String> = self.legacy_commands.keys().cloned().collect();
            for program in &programs {
                self.supervisor.start(program)?;
            }
        }
        self.set_mode(RelayMode::Legacy);
        Ok(())
    }

    fn set_mode(&mut self, mode: RelayMode) {
        self.mode = Some(mode);
        metrics::record_mode(mode == RelayMode::Managed);
    }

    async fn settle(&self, millis: u64) {
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    fn clean_up(&mut self, pid: Pid) {
        if let Err(e) = self.processes.signal(pid, Signal::SIGKILL) {
            tracing::warn!(pid, error = %e, "Failed to kill dead process");
        }
        self.processes.reap(pid);
    }
}
