//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, retries > 0)
//! - Reject empty interface names and paths the daemons cannot work without
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DaemonConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::DaemonConfig;

/// A single semantic problem, named by its dotted field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn non_empty(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        errors.push(ValidationError {
            field,
            message: "must not be empty".to_string(),
        });
    }
}

fn positive(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field,
            message: "must be greater than zero".to_string(),
        });
    }
}

/// Validate a loaded configuration.
pub fn validate_config(config: &DaemonConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    non_empty(&mut errors, "database.config_db_path", &config.database.config_db_path);
    non_empty(&mut errors, "database.state_db_path", &config.database.state_db_path);
    non_empty(&mut errors, "files.kea_config_output", &config.files.kea_config_output);

    positive(&mut errors, "server.default_lease_time", config.server.default_lease_time as u64);
    positive(&mut errors, "server.server_ip_retries", config.server.server_ip_retries as u64);
    non_empty(&mut errors, "server.listen_interface", &config.server.listen_interface);
    non_empty(&mut errors, "server.process_name", &config.server.process_name);

    non_empty(&mut errors, "relay.dhcrelay_path", &config.relay.dhcrelay_path);
    non_empty(&mut errors, "relay.dhcpmon_path", &config.relay.dhcpmon_path);
    non_empty(&mut errors, "relay.upstream_interface", &config.relay.upstream_interface);
    non_empty(&mut errors, "relay.monitor_interface", &config.relay.monitor_interface);
    non_empty(&mut errors, "relay.server_ip_key", &config.relay.server_ip_key);
    positive(&mut errors, "relay.server_ip_retries", config.relay.server_ip_retries as u64);
    if config.relay.legacy_program_prefixes.iter().any(|p| p.trim().is_empty()) {
        errors.push(ValidationError {
            field: "relay.legacy_program_prefixes",
            message: "prefixes must not be empty".to_string(),
        });
    }

    positive(&mut errors, "monitor.select_timeout_ms", config.monitor.select_timeout_ms);

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError {
            field: "observability.metrics_address",
            message: format!("'{}' is not a socket address", config.observability.metrics_address),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&DaemonConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = DaemonConfig::default();
        config.relay.upstream_interface.clear();
        config.monitor.select_timeout_ms = 0;
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "nowhere".to_string();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "relay.upstream_interface",
                "monitor.select_timeout_ms",
                "observability.metrics_address"
            ]
        );
    }
}
