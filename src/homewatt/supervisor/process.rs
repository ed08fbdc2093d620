// Homewatt - Household energy telemetry collector and process supervisor
//
// Copyright 2026 The Homewatt Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use std::error::Error;
use std::ffi::OsStr;
use std::fmt::{self, Formatter};
use std::io;
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use sysinfo::{ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};

/// A live process as seen in the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cmdline: Vec<String>,
}

impl ProcessInfo {
    /// Basename of the executable, from the command line when available since the
    /// kernel truncates process names.
    fn command(&self) -> &str {
        self.cmdline
            .first()
            .and_then(|c| c.rsplit('/').next())
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.name)
    }
}

/// The part of a process spec used to recognize it in the process table: the
/// command basename and the argument that distinguishes it from other
/// processes running the same command (`python app.py` vs `python datafetcher.py`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub command: String,
    pub token: String,
}

impl ProcessIdentity {
    pub fn new(command: &str, token: &str) -> Self {
        Self {
            command: basename(command).to_owned(),
            token: token.to_owned(),
        }
    }

    /// True if `process` runs this command with the token among its arguments.
    /// A version suffix on the command (`python3.11` for `python`) still matches.
    pub fn matches(&self, process: &ProcessInfo) -> bool {
        command_matches(&self.command, process.command())
            && process
                .cmdline
                .iter()
                .skip(1)
                .any(|arg| arg == &self.token || basename(arg) == self.token)
    }
}

impl fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.command, self.token)
    }
}

/// A process that must be running at all times and how to start it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub token: String,
}

impl ProcessSpec {
    pub fn new(program: &str, args: &[&str], token: &str) -> Self {
        Self {
            program: program.to_owned(),
            args: args.iter().map(|a| a.to_string()).collect(),
            token: token.to_owned(),
        }
    }

    pub fn identity(&self) -> ProcessIdentity {
        ProcessIdentity::new(&self.program, &self.token)
    }
}

impl fmt::Display for ProcessSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.program.fmt(f)?;
        for arg in self.args.iter() {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Error parsing a process spec from a command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSpecError(String);

impl fmt::Display for ParseSpecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "invalid process spec '{}': expected a program and at least one argument", self.0)
    }
}

impl Error for ParseSpecError {}

impl FromStr for ProcessSpec {
    type Err = ParseSpecError;

    /// Parse a whitespace separated command line. The last argument is the token
    /// identifying the process, e.g. `app.py` for `python app.py`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        match parts.as_slice() {
            [program, args @ .., token] => {
                let mut all_args: Vec<&str> = args.to_vec();
                all_args.push(*token);
                Ok(ProcessSpec::new(program, &all_args, token))
            }
            _ => Err(ParseSpecError(s.to_owned())),
        }
    }
}

/// Error enumerating, starting or signalling processes
#[derive(Debug)]
pub enum ProcessError {
    Spawn(String, io::Error),
    Signal(u32, io::Error),
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::Spawn(cmd, ref e) => write!(f, "unable to start '{}': {}", cmd, e),
            ProcessError::Signal(pid, ref e) => write!(f, "unable to signal process {}: {}", pid, e),
        }
    }
}

impl Error for ProcessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProcessError::Spawn(_, ref e) => Some(e),
            ProcessError::Signal(_, ref e) => Some(e),
        }
    }
}

/// Access to the host's processes.
pub trait ProcessTable: Send {
    /// Fresh snapshot of all live processes ordered by pid. Zombies are not included.
    fn list(&mut self) -> Result<Vec<ProcessInfo>, ProcessError>;

    /// Start a detached process for `spec`, returning its pid.
    fn spawn(&mut self, spec: &ProcessSpec) -> Result<u32, ProcessError>;

    /// Ask the process to exit with `SIGTERM`.
    fn terminate(&mut self, pid: u32) -> Result<(), ProcessError>;
}

/// `ProcessTable` for the local host backed by `sysinfo`.
///
/// Children started through `spawn` are kept so they can be reaped once they
/// exit, otherwise they would stay in the table as zombies for as long as the
/// supervisor runs.
pub struct SystemProcessTable {
    system: System,
    children: Vec<Child>,
}

impl SystemProcessTable {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            children: Vec::new(),
        }
    }

    fn reap_children(&mut self) {
        self.children.retain_mut(|child| match child.try_wait() {
            Ok(Some(status)) => {
                tracing::info!(message = "supervised process exited", pid = child.id(), status = %status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(message = "unable to check supervised process", pid = child.id(), error = %e);
                true
            }
        });
    }
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemProcessTable {
    fn list(&mut self) -> Result<Vec<ProcessInfo>, ProcessError> {
        self.reap_children();
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            ProcessRefreshKind::new().with_cmd(UpdateKind::Always),
        );

        let mut processes: Vec<ProcessInfo> = self
            .system
            .processes()
            .values()
            .filter(|p| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
            .map(|p| ProcessInfo {
                pid: p.pid().as_u32(),
                name: lossy(p.name()),
                cmdline: p.cmd().iter().map(lossy).collect(),
            })
            .collect();

        processes.sort_by_key(|p| p.pid);
        Ok(processes)
    }

    fn spawn(&mut self, spec: &ProcessSpec) -> Result<u32, ProcessError> {
        let child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| ProcessError::Spawn(spec.to_string(), e))?;

        let pid = child.id();
        self.children.push(child);
        Ok(pid)
    }

    fn terminate(&mut self, pid: u32) -> Result<(), ProcessError> {
        // SAFETY: kill has no memory safety requirements
        let res = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if res != 0 {
            return Err(ProcessError::Signal(pid, io::Error::last_os_error()));
        }

        Ok(())
    }
}

fn lossy<S: AsRef<OsStr>>(s: S) -> String {
    s.as_ref().to_string_lossy().into_owned()
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Compare command basenames allowing a version suffix on the running one.
fn command_matches(expected: &str, actual: &str) -> bool {
    match actual.strip_prefix(expected) {
        Some("") => true,
        Some(suffix) => suffix.chars().all(|c| c.is_ascii_digit() || c == '.'),
        None => false,
    }
}

#[cfg(test)]
mod test {
    use super::{command_matches, ProcessIdentity, ProcessSpec, ProcessTable, SystemProcessTable};
    use crate::testing::process;

    #[test]
    fn test_command_matches() {
        assert!(command_matches("python", "python"));
        assert!(command_matches("python", "python3"));
        assert!(command_matches("python", "python3.11"));
        assert!(!command_matches("python", "pythonw"));
        assert!(!command_matches("python3", "python"));
        assert!(!command_matches("python", "ipython"));
    }

    #[test]
    fn test_identity_matches() {
        let app = ProcessIdentity::new("python", "app.py");

        assert!(app.matches(&process(10, &["python", "app.py"])));
        assert!(app.matches(&process(11, &["/usr/bin/python3.11", "/home/pi/energy/app.py"])));
        assert!(!app.matches(&process(12, &["python", "datafetcher.py"])));
        assert!(!app.matches(&process(13, &["vim", "app.py"])));
        // The token must be an argument, not the program
        assert!(!app.matches(&process(14, &["app.py"])));
    }

    #[test]
    fn test_spec_from_str() {
        let spec: ProcessSpec = "python app.py".parse().unwrap();
        assert_eq!(ProcessSpec::new("python", &["app.py"], "app.py"), spec);
        assert_eq!(ProcessIdentity::new("python", "app.py"), spec.identity());

        let spec: ProcessSpec = "/usr/local/bin/homewatt --database /var/lib/homewatt.db collect"
            .parse()
            .unwrap();
        assert_eq!("collect", spec.token);
        assert_eq!("homewatt", spec.identity().command);
        assert_eq!(3, spec.args.len());

        assert!("".parse::<ProcessSpec>().is_err());
        assert!("python".parse::<ProcessSpec>().is_err());
    }

    #[test]
    fn test_system_table_lists_own_process() {
        let mut table = SystemProcessTable::new();
        let own = std::process::id();
        assert!(table.list().unwrap().iter().any(|p| p.pid == own));
    }

    #[test]
    fn test_system_table_spawn_and_terminate() {
        let mut table = SystemProcessTable::new();
        let spec = ProcessSpec::new("sleep", &["30"], "30");

        let pid = table.spawn(&spec).unwrap();
        assert!(table.list().unwrap().iter().any(|p| p.pid == pid && spec.identity().matches(p)));

        table.terminate(pid).unwrap();
        let mut gone = false;
        for _ in 0..50 {
            if !table.list().unwrap().iter().any(|p| p.pid == pid) {
                gone = true;
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
        assert!(gone);
    }
}
