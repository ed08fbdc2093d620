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

//! Keep the required processes of the installation running.
//!
//! On every check the supervisor takes a fresh snapshot of the process table
//! and starts each required process that has no live match. Matching is by
//! command basename plus an identifying argument, so several processes
//! running the same interpreter are told apart. The tunnel process exposing
//! the dashboard is only checked for, never started.

mod network;
mod process;
mod site;

pub use crate::supervisor::network::{BackgroundNetworkCheck, Connectivity, NetworkMonitor, DEFAULT_PING_HOST};
pub use crate::supervisor::process::{
    ParseSpecError, ProcessError, ProcessIdentity, ProcessInfo, ProcessSpec, ProcessTable, SystemProcessTable,
};
pub use crate::supervisor::site::{SiteStatus, SiteWatcher, DEFAULT_EXPECTED_TEXT};

use crate::notify::Notifier;
use crate::storage::SqliteStorage;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the tunnel process looked for on every check.
pub const DEFAULT_TUNNEL_NAME: &str = "ngrok";

/// What a single check found and did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Token and pid of every process started.
    pub started: Vec<(String, u32)>,
    /// Token of every process that couldn't be started.
    pub failed: Vec<String>,
    /// Whether the tunnel was found, `None` when not checked.
    pub tunnel_running: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    Terminated(u32),
    NotRunning,
    Failed,
}

pub struct Supervisor<P: ProcessTable> {
    table: P,
    required: Vec<ProcessSpec>,
    tunnel: Option<String>,
    notifier: Arc<dyn Notifier>,
    own_pid: u32,
}

impl<P: ProcessTable> Supervisor<P> {
    pub fn new(table: P, required: Vec<ProcessSpec>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            table,
            required,
            tunnel: Some(DEFAULT_TUNNEL_NAME.to_owned()),
            notifier,
            own_pid: std::process::id(),
        }
    }

    /// Name of the tunnel process to look for, `None` to skip the check.
    pub fn with_tunnel(mut self, tunnel: Option<String>) -> Self {
        self.tunnel = tunnel;
        self
    }

    pub fn required(&self) -> &[ProcessSpec] {
        &self.required
    }

    /// Start every required process that isn't running and check for the tunnel.
    pub async fn check(&mut self, now: NaiveDateTime) -> CheckReport {
        let mut report = CheckReport::default();
        let processes = match self.table.list() {
            Ok(processes) => processes,
            Err(e) => {
                tracing::error!(message = "unable to list processes", error = %e);
                return report;
            }
        };

        for spec in self.required.iter() {
            let identity = spec.identity();
            let running = processes
                .iter()
                .any(|p| p.pid != self.own_pid && identity.matches(p));

            if running {
                continue;
            }

            match self.table.spawn(spec) {
                Ok(pid) => {
                    tracing::info!(message = "started required process", token = %spec.token, pid = pid);
                    self.notifier
                        .notify(&format!("{} {} has been started.", now, spec.token))
                        .await;
                    report.started.push((spec.token.clone(), pid));
                }
                Err(e) => {
                    tracing::error!(message = "unable to start required process", token = %spec.token, error = %e);
                    self.notifier
                        .notify(&format!("{} Error, {} couldn't be started: {}", now, spec.token, e))
                        .await;
                    report.failed.push(spec.token.clone());
                }
            }
        }

        if let Some(ref name) = self.tunnel {
            let needle = name.to_lowercase();
            let running = processes.iter().any(|p| {
                p.name.to_lowercase().contains(&needle)
                    || p.cmdline
                        .first()
                        .map(|c| c.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            });

            if !running {
                tracing::warn!(message = "tunnel process not running", name = %name);
                self.notifier
                    .notify(&format!("{} Error, {} isn't running", now, capitalize(name)))
                    .await;
            }
            report.tunnel_running = Some(running);
        }

        report
    }

    /// Send `SIGTERM` to the first live process matching `identity`.
    pub async fn terminate(&mut self, identity: &ProcessIdentity, now: NaiveDateTime) -> TerminateOutcome {
        let processes = match self.table.list() {
            Ok(processes) => processes,
            Err(e) => {
                tracing::error!(message = "unable to list processes", error = %e);
                return TerminateOutcome::Failed;
            }
        };

        let pid = match processes
            .iter()
            .find(|p| p.pid != self.own_pid && identity.matches(p))
        {
            Some(p) => p.pid,
            None => {
                tracing::info!(message = "process to stop is not running", process = %identity);
                return TerminateOutcome::NotRunning;
            }
        };

        match self.table.terminate(pid) {
            Ok(()) => {
                tracing::info!(message = "sent SIGTERM", process = %identity, pid = pid);
                TerminateOutcome::Terminated(pid)
            }
            Err(e) => {
                tracing::error!(message = "unable to stop process", process = %identity, error = %e);
                self.notifier
                    .notify(&format!("{} Error, unable to stop {}: {}", now, identity, e))
                    .await;
                TerminateOutcome::Failed
            }
        }
    }
}

/// Copy the database into `dir` and notify the outcome.
pub async fn backup_database(
    storage: &SqliteStorage,
    dir: &Path,
    now: NaiveDateTime,
    notifier: &dyn Notifier,
) -> Option<PathBuf> {
    match storage.backup(dir, now.date()) {
        Ok(path) => {
            tracing::info!(message = "database backup written", path = %path.display());
            notifier
                .notify(&format!("{} Database backup saved to {}", now, path.display()))
                .await;
            Some(path)
        }
        Err(e) => {
            tracing::error!(message = "database backup failed", error = %e);
            notifier
                .notify(&format!("{} Error, database backup failed: {}", now, e))
                .await;
            None
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
