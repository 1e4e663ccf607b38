//! Configuration schema definitions.
//!
//! This module defines the daemon settings. All types derive Serde traits for
//! deserialization from a TOML file, and every section has defaults matching
//! the stock switch image layout so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Root settings for both daemons.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DaemonConfig {
    /// Where the configuration and state stores live.
    pub database: DatabaseConfig,

    /// Static input and output files.
    pub files: FilesConfig,

    /// Rendered server configuration settings.
    pub server: ServerConfig,

    /// Relay supervisor settings.
    pub relay: RelayConfig,

    /// Change monitor settings.
    pub monitor: MonitorConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Database locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// JSON configuration store.
    pub config_db_path: String,

    /// JSON state store.
    pub state_db_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            config_db_path: "/etc/sonic/config_db.json".to_string(),
            state_db_path: "/var/run/dhcp-server/state_db.json".to_string(),
        }
    }
}

/// Static files read at startup and the rendered output path.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FilesConfig {
    /// `<physical> <alias>` per line.
    pub port_alias_map: String,

    /// `code,type` CSV; `unassigned` rows are customizable.
    pub dhcp_option_list: String,

    /// Supervisor program file holding the legacy relay command lines.
    pub supervisord_conf: String,

    /// Where the rendered server configuration is written.
    pub kea_config_output: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            port_alias_map: "/tmp/port-name-alias-map.txt".to_string(),
            dhcp_option_list: "/usr/local/etc/dhcp_option.csv".to_string(),
            supervisord_conf: "/etc/supervisor/conf.d/docker-dhcp-relay.supervisord.conf".to_string(),
            kea_config_output: "/etc/kea/kea-dhcp4.conf".to_string(),
        }
    }
}

/// Settings baked into the rendered server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Lease time used when an interface does not set one.
    pub default_lease_time: u32,

    /// Interface the server listens on (relayed traffic arrives here).
    pub listen_interface: String,

    /// Server control socket.
    pub control_socket: String,

    /// Lease file.
    pub lease_path: String,

    /// Lease file cleanup interval in seconds.
    pub lfc_interval_secs: u32,

    /// Hook library running the lease update script.
    pub run_script_library: String,

    /// Script invoked on lease events.
    pub lease_update_script: String,

    /// Server log file.
    pub log_path: String,

    /// Process name to signal after a new configuration is written.
    pub process_name: String,

    /// Number of attempts to read the listen interface address.
    pub server_ip_retries: u32,

    /// Delay between address reads in seconds.
    pub server_ip_retry_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_lease_time: 900,
            listen_interface: "eth0".to_string(),
            control_socket: "/run/kea/kea4-ctrl-socket".to_string(),
            lease_path: "/tmp/kea-lease.csv".to_string(),
            lfc_interval_secs: 3600,
            run_script_library: "/usr/local/lib/kea/hooks/libdhcp_run_script.so".to_string(),
            lease_update_script: "/etc/kea/lease_update.sh".to_string(),
            log_path: "/var/log/kea-dhcp.log".to_string(),
            process_name: "kea-dhcp4".to_string(),
            server_ip_retries: 10,
            server_ip_retry_interval_secs: 5,
        }
    }
}

/// Relay supervisor settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Relay binary.
    pub dhcrelay_path: String,

    /// Monitor binary.
    pub dhcpmon_path: String,

    /// Interface relayed traffic leaves on.
    pub upstream_interface: String,

    /// Interface `dhcpmon` watches for management traffic.
    pub monitor_interface: String,

    /// State store key the server address is published under.
    pub server_ip_key: String,

    /// Attempts to read the server address before giving up.
    pub server_ip_retries: u32,

    /// Delay between server address reads in seconds.
    pub server_ip_retry_interval_secs: u64,

    /// Delay before the first pass, letting the external supervisor settle.
    pub startup_delay_secs: u64,

    /// How long a new `dhcrelay` must survive before it counts as started.
    pub dhcrelay_settle_ms: u64,

    /// How long new `dhcpmon` processes must survive before they count as started.
    pub dhcpmon_settle_ms: u64,

    /// How long a terminated process may take to exit before it is killed.
    pub terminate_timeout_ms: u64,

    /// External supervisor control binary.
    pub supervisorctl_path: String,

    /// Program name prefixes that belong to the legacy relay set.
    pub legacy_program_prefixes: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            dhcrelay_path: "/usr/sbin/dhcrelay".to_string(),
            dhcpmon_path: "/usr/sbin/dhcpmon".to_string(),
            upstream_interface: "docker0".to_string(),
            monitor_interface: "eth0".to_string(),
            server_ip_key: "eth0".to_string(),
            server_ip_retries: 10,
            server_ip_retry_interval_secs: 10,
            startup_delay_secs: 5,
            dhcrelay_settle_ms: 1000,
            dhcpmon_settle_ms: 5000,
            terminate_timeout_ms: 3000,
            supervisorctl_path: "supervisorctl".to_string(),
            legacy_program_prefixes: vec![
                "isc-dhcpv4-relay-".to_string(),
                "dhcpmon-".to_string(),
            ],
        }
    }
}

/// Change monitor settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Upper bound on one wait for database changes, in milliseconds.
    pub select_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            select_timeout_ms: 5000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9105".to_string(),
        }
    }
}
