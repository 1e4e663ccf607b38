//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::{Arc, Mutex};

use dhcp_server_mgr::config::{FilesConfig, RelayConfig};
use dhcp_server_mgr::db::memory::{row, MemoryDb};
use dhcp_server_mgr::db::{self, FieldValue};
use dhcp_server_mgr::process::{process_name, Pid, ProcessError, ProcessInfo, ProcessStatus, ProcessTable};
use dhcp_server_mgr::relay::{LegacyCommands, ProgramSupervisor, RelayError};
use dhcp_server_mgr::servd::{InterfaceAddrs, ServdError};
use nix::sys::signal::Signal;

pub const HOSTNAME: &str = "sonic-host";
pub const SERVER_IP: &str = "240.127.1.2";

// ---------------------------------------------------------------------------
// Process table
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct FakeProcess {
    cmdline: Vec<String>,
    status: ProcessStatus,
}

#[derive(Debug, Default)]
struct World {
    processes: BTreeMap<Pid, FakeProcess>,
    next_pid: Pid,
    events: Vec<String>,
    die_on_spawn: BTreeSet<String>,
    fail_supervisor: bool,
}

impl World {
    fn insert(&mut self, cmdline: Vec<String>, status: ProcessStatus) -> Pid {
        self.next_pid += 1;
        let pid = 1000 + self.next_pid;
        self.processes.insert(pid, FakeProcess { cmdline, status });
        pid
    }
}

/// In-memory process table. Clones share state, so a test can keep one
/// handle while the daemon owns another.
#[derive(Clone, Default)]
pub struct FakeProcessTable {
    world: Arc<Mutex<World>>,
}

pub fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

impl FakeProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a process that was started by someone else.
    pub fn add_running(&self, args: &[&str]) -> Pid {
        self.world.lock().unwrap().insert(argv(args), ProcessStatus::Running)
    }

    /// Processes spawned under `name` from now on die immediately.
    pub fn die_after_spawn(&self, name: &str) {
        self.world.lock().unwrap().die_on_spawn.insert(name.to_string());
    }

    pub fn fail_supervisor(&self) {
        self.world.lock().unwrap().fail_supervisor = true;
    }

    /// Command lines of live processes called `name`, ordered by pid.
    pub fn running(&self, name: &str) -> Vec<Vec<String>> {
        self.world
            .lock()
            .unwrap()
            .processes
            .values()
            .filter(|p| p.status == ProcessStatus::Running)
            .filter(|p| p.cmdline.first().map(|a| process_name(a) == name).unwrap_or(false))
            .map(|p| p.cmdline.clone())
            .collect()
    }

    pub fn pids(&self, name: &str) -> Vec<Pid> {
        self.processes_named(name)
            .unwrap()
            .into_iter()
            .map(|p| p.pid)
            .collect()
    }

    pub fn events(&self) -> Vec<String> {
        self.world.lock().unwrap().events.clone()
    }

    pub fn clear_events(&self) {
        self.world.lock().unwrap().events.clear();
    }

    pub fn count_events(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn supervisor(&self, programs: &LegacyCommands) -> FakeSupervisor {
        FakeSupervisor {
            world: self.world.clone(),
            programs: programs.clone(),
        }
    }
}

impl ProcessTable for FakeProcessTable {
    fn processes_named(&self, name: &str) -> Result<Vec<ProcessInfo>, ProcessError> {
        Ok(self
            .world
            .lock()
            .unwrap()
            .processes
            .iter()
            .filter(|(_, p)| p.cmdline.first().map(|a| process_name(a) == name).unwrap_or(false))
            .map(|(pid, p)| ProcessInfo {
                pid: *pid,
                cmdline: p.cmdline.clone(),
            })
            .collect())
    }

    fn spawn(&mut self, argv: &[String]) -> Result<Pid, ProcessError> {
        let mut world = self.world.lock().unwrap();
        let name = process_name(argv.first().ok_or(ProcessError::EmptyCommand)?).to_string();
        let status = if world.die_on_spawn.contains(&name) {
            ProcessStatus::Zombie
        } else {
            ProcessStatus::Running
        };
        world.events.push(format!("spawn {}", argv.join(" ")));
        Ok(world.insert(argv.to_vec(), status))
    }

    fn status(&self, pid: Pid) -> ProcessStatus {
        self.world
            .lock()
            .unwrap()
            .processes
            .get(&pid)
            .map(|p| p.status)
            .unwrap_or(ProcessStatus::Gone)
    }

    fn signal(&mut self, pid: Pid, signal: Signal) -> Result<(), ProcessError> {
        let mut world = self.world.lock().unwrap();
        world.events.push(format!("signal {signal:?} {pid}"));
        if matches!(signal, Signal::SIGTERM | Signal::SIGKILL) {
            if let Some(process) = world.processes.get_mut(&pid) {
                process.status = ProcessStatus::Zombie;
            }
        }
        Ok(())
    }

    fn reap(&mut self, pid: Pid) {
        let mut world = self.world.lock().unwrap();
        if world.processes.get(&pid).map(|p| p.status) == Some(ProcessStatus::Zombie) {
            world.processes.remove(&pid);
        }
    }

    fn reap_exited(&mut self) {
        self.world
            .lock()
            .unwrap()
            .processes
            .retain(|_, p| p.status != ProcessStatus::Zombie);
    }
}

/// Supervisor that starts and stops its programs in the shared fake table.
pub struct FakeSupervisor {
    world: Arc<Mutex<World>>,
    programs: LegacyCommands,
}

impl FakeSupervisor {
    fn fail(world: &World, action: &'static str, program: &str) -> Result<(), RelayError> {
        if world.fail_supervisor {
            return Err(RelayError::Supervisor {
                action,
                program: program.to_string(),
                detail: "exit status: 1".to_string(),
            });
        }
        Ok(())
    }
}

impl ProgramSupervisor for FakeSupervisor {
    fn start(&mut self, program: &str) -> Result<(), RelayError> {
        let mut world = self.world.lock().unwrap();
        Self::fail(&world, "start", program)?;
        world.events.push(format!("supervisorctl start {program}"));
        if let Some(cmdline) = self.programs.get(program) {
            world.insert(cmdline.clone(), ProcessStatus::Running);
        }
        Ok(())
    }

    fn stop(&mut self, program: &str) -> Result<(), RelayError> {
        let mut world = self.world.lock().unwrap();
        Self::fail(&world, "stop", program)?;
        world.events.push(format!("supervisorctl stop {program}"));
        if let Some(cmdline) = self.programs.get(program) {
            world.processes.retain(|_, p| &p.cmdline != cmdline);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Interface addresses
// ---------------------------------------------------------------------------

/// Reports an address only from the `appears_after`-th lookup on.
pub struct FakeInterfaces {
    pub ip: Option<Ipv4Addr>,
    pub appears_after: u32,
    calls: Mutex<u32>,
}

impl FakeInterfaces {
    pub fn new(ip: Option<Ipv4Addr>, appears_after: u32) -> Self {
        Self {
            ip,
            appears_after,
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

impl InterfaceAddrs for FakeInterfaces {
    fn ipv4_of(&self, _interface: &str) -> Result<Option<Ipv4Addr>, ServdError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        Ok(if *calls >= self.appears_after { self.ip } else { None })
    }
}

// ---------------------------------------------------------------------------
// Database scenarios
// ---------------------------------------------------------------------------

/// Database with a hostname and nothing else.
pub fn base_db() -> Arc<MemoryDb> {
    let db = Arc::new(MemoryDb::new());
    db.set_config_row(db::DEVICE_METADATA, "localhost", row([("hostname", HOSTNAME.into())]));
    db
}

/// VLAN with one IPv4 interface address and its member ports.
pub fn add_vlan(db: &MemoryDb, vlan: &str, cidr: &str, members: &[&str]) {
    db.set_config_row(db::VLAN, vlan, row([("vlanid", vlan.trim_start_matches("Vlan").into())]));
    db.set_config_row(db::VLAN_INTERFACE, vlan, row([]));
    db.set_config_row(db::VLAN_INTERFACE, &format!("{vlan}|{cidr}"), row([]));
    for member in members {
        db.set_config_row(
            db::VLAN_MEMBER,
            &format!("{vlan}|{member}"),
            row([("tagging_mode", "untagged".into())]),
        );
    }
}

pub fn enable_dhcp(db: &MemoryDb, vlan: &str, gateway: &str) {
    db.set_config_row(
        db::DHCP_SERVER_IPV4,
        vlan,
        row([
            ("gateway", gateway.into()),
            ("lease_time", "900".into()),
            ("mode", "PORT".into()),
            ("netmask", "255.255.248.0".into()),
            ("state", "enabled".into()),
        ]),
    );
}

pub fn add_range(db: &MemoryDb, name: &str, endpoints: &[&str]) {
    db.set_config_row(
        db::DHCP_SERVER_IPV4_RANGE,
        name,
        row([("range", FieldValue::from(endpoints.to_vec()))]),
    );
}

pub fn bind_ranges(db: &MemoryDb, key: &str, ranges: &[&str]) {
    db.set_config_row(
        db::DHCP_SERVER_IPV4_PORT,
        key,
        row([("ranges", FieldValue::from(ranges.to_vec()))]),
    );
}

pub fn bind_ips(db: &MemoryDb, key: &str, ips: &[&str]) {
    db.set_config_row(
        db::DHCP_SERVER_IPV4_PORT,
        key,
        row([("ips", FieldValue::from(ips.to_vec()))]),
    );
}

pub fn set_feature(db: &MemoryDb, enabled: bool) {
    let state = if enabled { "enabled" } else { "disabled" };
    db.set_config_row(db::FEATURE, "dhcp_server", row([("state", state.into())]));
}

pub fn publish_server_ip(db: &MemoryDb) {
    use dhcp_server_mgr::db::DbConnector;
    db.set_state_field(db::DHCP_SERVER_IPV4_SERVER_IP, "eth0", "ip", &format!("{SERVER_IP}/32"))
        .unwrap();
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Relay settings with every delay removed.
pub fn fast_relay_config() -> RelayConfig {
    RelayConfig {
        server_ip_retries: 3,
        server_ip_retry_interval_secs: 0,
        startup_delay_secs: 0,
        dhcrelay_settle_ms: 0,
        dhcpmon_settle_ms: 0,
        terminate_timeout_ms: 0,
        ..RelayConfig::default()
    }
}

pub const LEGACY_CONF: &str = "\
[program:isc-dhcpv4-relay-Vlan1000]
command=/usr/sbin/dhcrelay -d -m discard -a %%h:%%p %%P --name-alias-map-file /tmp/port-name-alias-map.txt -id Vlan1000 -iu PortChannel101 192.0.0.1
priority=3

[program:dhcpmon-Vlan1000]
command=/usr/sbin/dhcpmon -id Vlan1000 -iu PortChannel101 -im eth0
priority=4
";

/// Static files under `dir`: supervisor config, alias map, option list.
pub fn files_in(dir: &Path) -> FilesConfig {
    let supervisord = dir.join("docker-dhcp-relay.supervisord.conf");
    let aliases = dir.join("port-name-alias-map.txt");
    let options = dir.join("dhcp_option.csv");
    std::fs::write(&supervisord, LEGACY_CONF).unwrap();
    std::fs::write(&aliases, "Ethernet24 etp7\nEthernet28 etp8\n").unwrap();
    std::fs::write(&options, "code,type\n1,ipv4-address\n60,unassigned\n223,unassigned\n").unwrap();
    FilesConfig {
        port_alias_map: aliases.display().to_string(),
        dhcp_option_list: options.display().to_string(),
        supervisord_conf: supervisord.display().to_string(),
        kea_config_output: dir.join("kea-dhcp4.conf").display().to_string(),
    }
}
