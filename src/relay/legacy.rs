//! LEGACY mode collaborators: the static program table and the external
//! process-group supervisor that owns those programs.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::process::Command;

use crate::relay::RelayError;

/// Program name → argv, as started by the external supervisor.
pub type LegacyCommands = BTreeMap<String, Vec<String>>;

/// Extract `[program:<name>]` / `command=<cmdline>` pairs whose program name
/// starts with one of `prefixes`. `%%` in the command line becomes `%`.
pub fn parse_supervisord_conf(content: &str, prefixes: &[String]) -> LegacyCommands {
    let mut commands = LegacyCommands::new();
    let mut program: Option<&str> = None;

    for line in content.lines().map(str::trim) {
        if line.starts_with('[') {
            program = line
                .strip_prefix("[program:")
                .and_then(|rest| rest.strip_suffix(']'))
                .map(str::trim);
            continue;
        }
        let Some(name) = program else {
            continue;
        };
        let Some(cmdline) = line.strip_prefix("command=") else {
            continue;
        };
        if prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            let argv = cmdline
                .replace("%%", "%")
                .split_whitespace()
                .map(str::to_string)
                .collect();
            commands.insert(name.to_string(), argv);
        }
    }
    commands
}

pub fn parse_legacy_commands(path: &Path, prefixes: &[String]) -> io::Result<LegacyCommands> {
    Ok(parse_supervisord_conf(&fs::read_to_string(path)?, prefixes))
}

/// Start/stop programs through the external supervisor.
pub trait ProgramSupervisor: Send {
    fn start(&mut self, program: &str) -> Result<(), RelayError>;
    fn stop(&mut self, program: &str) -> Result<(), RelayError>;
}

/// `supervisorctl` front end.
pub struct Supervisorctl {
    binary: String,
}

impl Supervisorctl {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, action: &'static str, program: &str) -> Result<(), RelayError> {
        let output = Command::new(&self.binary)
            .arg(action)
            .arg(program)
            .output()
            .map_err(|e| RelayError::Supervisor {
                action,
                program: program.to_string(),
                detail: e.to_string(),
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        // Already in the requested state is success.
        if output.status.success()
            || stdout.contains("ERROR (already started)")
            || stdout.contains("ERROR (not running)")
        {
            tracing::info!(action, program, "supervisorctl done");
            return Ok(());
        }
        Err(RelayError::Supervisor {
            action,
            program: program.to_string(),
            detail: format!(
                "{}: {}{}",
                output.status,
                stdout.trim(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        })
    }
}

impl ProgramSupervisor for Supervisorctl {
    fn start(&mut self, program: &str) -> Result<(), RelayError> {
        self.run("start", program)
    }

    fn stop(&mut self, program: &str) -> Result<(), RelayError> {
        self.run("stop", program)
    }
}
