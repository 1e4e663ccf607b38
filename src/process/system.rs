//! Process table backed by `sysinfo`, with signalling and reaping via `nix`.

use std::process::{Command, Stdio};
use std::sync::Mutex;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid as NixPid;
use sysinfo::System;

use crate::process::{Pid, ProcessError, ProcessInfo, ProcessStatus, ProcessTable};

pub struct SysProcessTable {
    system: Mutex<System>,
}

impl SysProcessTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

fn sys_pid(pid: Pid) -> sysinfo::Pid {
    sysinfo::Pid::from_u32(pid as u32)
}

impl ProcessTable for SysProcessTable {
    fn processes_named(&self, name: &str) -> Result<Vec<ProcessInfo>, ProcessError> {
        let mut system = self.system.lock().expect("process table mutex poisoned");
        system.refresh_processes();
        let mut found: Vec<ProcessInfo> = system
            .processes_by_exact_name(name)
            .map(|process| ProcessInfo {
                pid: process.pid().as_u32() as Pid,
                cmdline: process.cmd().to_vec(),
            })
            .collect();
        found.sort_by_key(|p| p.pid);
        Ok(found)
    }

    fn spawn(&mut self, argv: &[String]) -> Result<Pid, ProcessError> {
        let (program, args) = argv.split_first().ok_or(ProcessError::EmptyCommand)?;
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: program.clone(),
                source,
            })?;
        Ok(child.id() as Pid)
    }

    fn status(&self, pid: Pid) -> ProcessStatus {
        let mut system = self.system.lock().expect("process table mutex poisoned");
        if !system.refresh_process(sys_pid(pid)) {
            return ProcessStatus::Gone;
        }
        match system.process(sys_pid(pid)).map(|p| p.status()) {
            None | Some(sysinfo::ProcessStatus::Dead) => ProcessStatus::Gone,
            Some(sysinfo::ProcessStatus::Zombie) => ProcessStatus::Zombie,
            Some(_) => ProcessStatus::Running,
        }
    }

    fn signal(&mut self, pid: Pid, signal: Signal) -> Result<(), ProcessError> {
        match kill(NixPid::from_raw(pid), signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(source) => Err(ProcessError::Signal { pid, signal, source }),
        }
    }

    fn reap(&mut self, pid: Pid) {
        match waitpid(NixPid::from_raw(pid), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => {}
            Ok(status) => tracing::debug!(pid, ?status, "Reaped child"),
            Err(e) => tracing::warn!(pid, error = %e, "waitpid failed"),
        }
    }

    fn reap_exited(&mut self) {
        loop {
            match waitpid(NixPid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) | Err(_) => break,
                Ok(status) => tracing::debug!(?status, "Reaped exited child"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn wait_for(table: &SysProcessTable, pid: Pid, wanted: ProcessStatus) -> bool {
        for _ in 0..200 {
            if table.status(pid) == wanted {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_spawned_child_lifecycle() {
        let mut table = SysProcessTable::new();
        let argv: Vec<String> = vec!["sleep".to_string(), "30".to_string()];
        let pid = table.spawn(&argv).unwrap();

        let found = table.processes_named("sleep").unwrap();
        let ours = found.iter().find(|p| p.pid == pid).expect("spawned child not listed");
        assert_eq!(ours.cmdline, argv);
        assert_eq!(table.status(pid), ProcessStatus::Running);

        // Killed but not yet waited for: a zombie until reaped.
        table.signal(pid, Signal::SIGKILL).unwrap();
        assert!(wait_for(&table, pid, ProcessStatus::Zombie));
        table.reap(pid);
        assert!(wait_for(&table, pid, ProcessStatus::Gone));

        // Signalling a process that no longer exists is fine.
        table.signal(pid, Signal::SIGTERM).unwrap();
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let mut table = SysProcessTable::new();
        assert!(matches!(table.spawn(&[]), Err(ProcessError::EmptyCommand)));
    }
}
