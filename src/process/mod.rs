//! OS process table access.
//!
//! # Data Flow
//! ```text
//! OS process list (SysProcessTable, via sysinfo) or an in-test fake
//!     → ProcessTable::processes_named (pid + argv, rediscovered every pass)
//!     → relay / servd decide what to spawn, terminate or signal
//! ```
//!
//! # Design Decisions
//! - No process handle survives a pass; everything is looked up afresh
//! - Spawned children are reaped explicitly, so a child that dies right
//!   after spawning stays visible as a zombie until the settle check

pub mod system;

use std::io;
use std::path::Path;

use nix::sys::signal::Signal;
use thiserror::Error;

pub use system::SysProcessTable;

pub type Pid = i32;

/// One process as seen in the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub cmdline: Vec<String>,
}

impl ProcessInfo {
    /// Values following each occurrence of `flag` in the command line.
    pub fn flag_values(&self, flag: &str) -> Vec<&str> {
        self.cmdline
            .windows(2)
            .filter(|pair| pair[0] == flag)
            .map(|pair| pair[1].as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Zombie,
    Gone,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("refusing to spawn an empty command line")]
    EmptyCommand,

    #[error("failed to send {signal:?} to pid {pid}: {source}")]
    Signal {
        pid: Pid,
        signal: Signal,
        #[source]
        source: nix::errno::Errno,
    },
}

/// The operations the daemons need from the OS process table.
pub trait ProcessTable: Send {
    /// Live and zombie processes whose name is `name`.
    fn processes_named(&self, name: &str) -> Result<Vec<ProcessInfo>, ProcessError>;

    /// Start `argv` detached from the daemon's stdin.
    fn spawn(&mut self, argv: &[String]) -> Result<Pid, ProcessError>;

    fn status(&self, pid: Pid) -> ProcessStatus;

    /// Deliver `signal`. A process that is already gone is not an error.
    fn signal(&mut self, pid: Pid, signal: Signal) -> Result<(), ProcessError>;

    /// Collect the exit status of `pid` if it is our child and has exited.
    fn reap(&mut self, pid: Pid);

    /// Collect every exited child.
    fn reap_exited(&mut self);
}

/// Name a process is listed under: the basename of argv[0].
pub fn process_name(argv0: &str) -> &str {
    Path::new(argv0)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(argv0)
}
