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

use crate::executor::{BoundedExecutor, TaskCommand, TaskOutcome};
use std::error::Error;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Host pinged to decide whether the network is up.
pub const DEFAULT_PING_HOST: &str = "8.8.8.8";

const COMMAND_CEILING: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    /// The check failed and the reconnect commands were run. `restored` is
    /// the result of checking again afterwards.
    Reconnected { restored: bool },
}

/// Checks connectivity with a single ping and brings the wireless connection
/// back up with NetworkManager when it fails.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    check: TaskCommand,
    reconnect: Vec<TaskCommand>,
    executor: BoundedExecutor,
}

impl NetworkMonitor {
    /// Monitor that pings `host` and, when given credentials, reconnects to the
    /// wireless network `ssid`.
    pub fn new(host: &str, credentials: Option<(&str, &str)>) -> Self {
        let check = TaskCommand::new("ping", vec!["-c".to_owned(), "1".to_owned(), host.to_owned()]);

        let mut reconnect = vec![TaskCommand::new(
            "nmcli",
            vec!["radio".to_owned(), "wifi".to_owned(), "on".to_owned()],
        )];
        if let Some((ssid, psk)) = credentials {
            reconnect.push(TaskCommand::new(
                "nmcli",
                vec![
                    "dev".to_owned(),
                    "wifi".to_owned(),
                    "connect".to_owned(),
                    ssid.to_owned(),
                    "password".to_owned(),
                    psk.to_owned(),
                ],
            ));
        }

        Self::with_commands(check, reconnect)
    }

    pub fn with_commands(check: TaskCommand, reconnect: Vec<TaskCommand>) -> Self {
        Self {
            check,
            reconnect,
            executor: BoundedExecutor::new(COMMAND_CEILING),
        }
    }

    /// Check connectivity and try to reconnect if the check fails. Failures are
    /// only logged.
    pub async fn ensure_connected(&self) -> Connectivity {
        if self.is_online().await {
            tracing::debug!(message = "network is up");
            return Connectivity::Online;
        }

        tracing::warn!(message = "network is down, reconnecting");
        for cmd in self.reconnect.iter() {
            if !self.run(cmd).await {
                tracing::warn!(message = "reconnect command failed", program = %cmd.program);
            }
        }

        let restored = self.is_online().await;
        if restored {
            tracing::info!(message = "network connection restored");
        } else {
            tracing::warn!(message = "network still down after reconnecting");
        }

        Connectivity::Reconnected { restored }
    }

    async fn is_online(&self) -> bool {
        self.run(&self.check).await
    }

    async fn run(&self, cmd: &TaskCommand) -> bool {
        match self.executor.run(cmd).await {
            Ok(TaskOutcome::Completed(out)) => out.status.success(),
            Ok(TaskOutcome::TimedOut) => false,
            Err(e) => {
                // Only the cause, the command line may contain the password
                let cause = e.source().map(|c| c.to_string()).unwrap_or_default();
                tracing::warn!(message = "unable to run network command", program = %cmd.program, error = %cause);
                false
            }
        }
    }
}

/// Runs connectivity checks on their own task so that a reconnect, which can take
/// minutes when every command runs into its ceiling, doesn't hold up the caller.
/// At most one check runs at a time.
#[derive(Debug)]
pub struct BackgroundNetworkCheck {
    monitor: NetworkMonitor,
    running: Option<JoinHandle<Connectivity>>,
}

impl BackgroundNetworkCheck {
    pub fn new(monitor: NetworkMonitor) -> Self {
        Self { monitor, running: None }
    }

    /// Start a check unless the previous one is still running. Returns whether a
    /// check was started.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            tracing::debug!(message = "previous network check still running");
            return false;
        }

        let monitor = self.monitor.clone();
        self.running = Some(tokio::spawn(
            async move { monitor.ensure_connected().await }.instrument(tracing::debug_span!("network_check")),
        ));
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl Drop for BackgroundNetworkCheck {
    fn drop(&mut self) {
        if let Some(h) = self.running.take() {
            h.abort();
        }
    }
}

#[cfg(test)]
mod test {
    use super::{BackgroundNetworkCheck, Connectivity, NetworkMonitor};
    use crate::executor::TaskCommand;

    fn sh(script: &str) -> TaskCommand {
        TaskCommand::new("sh", vec!["-c".to_owned(), script.to_owned()])
    }

    #[test]
    fn test_default_commands() {
        let monitor = NetworkMonitor::new("8.8.8.8", Some(("home", "secret")));
        assert_eq!("ping -c 1 8.8.8.8", monitor.check.to_string());
        assert_eq!(2, monitor.reconnect.len());
        assert_eq!("nmcli dev wifi connect home password secret", monitor.reconnect[1].to_string());

        let monitor = NetworkMonitor::new("8.8.8.8", None);
        assert_eq!(
            vec![TaskCommand::from_command_line("nmcli radio wifi on").unwrap()],
            monitor.reconnect
        );
    }

    #[tokio::test]
    async fn test_online_skips_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("reconnected");
        let monitor = NetworkMonitor::with_commands(sh("exit 0"), vec![sh(&format!("touch {}", marker.display()))]);

        assert_eq!(Connectivity::Online, monitor.ensure_connected().await);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_offline_runs_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("reconnected");
        // Online once the reconnect command has run
        let check = sh(&format!("test -f {}", marker.display()));
        let monitor = NetworkMonitor::with_commands(
            check,
            vec![
                TaskCommand::new("/nonexistent/nmcli", Vec::new()),
                sh(&format!("touch {}", marker.display())),
            ],
        );

        assert_eq!(Connectivity::Reconnected { restored: true }, monitor.ensure_connected().await);
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_offline_stays_down() {
        let monitor = NetworkMonitor::with_commands(sh("exit 1"), vec![sh("exit 1")]);
        assert_eq!(Connectivity::Reconnected { restored: false }, monitor.ensure_connected().await);
    }

    #[tokio::test]
    async fn test_background_check_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("checked");
        let monitor = NetworkMonitor::with_commands(sh(&format!("sleep 2; touch {}", marker.display())), Vec::new());
        let mut check = BackgroundNetworkCheck::new(monitor);

        let start = std::time::Instant::now();
        assert!(check.start());
        assert!(start.elapsed() < std::time::Duration::from_secs(1));

        // Still running, a second check is not started
        assert!(check.is_running());
        assert!(!check.start());

        for _ in 0..100 {
            if !check.is_running() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        assert!(!check.is_running());
        assert!(marker.exists());
        assert!(check.start());
    }
}
