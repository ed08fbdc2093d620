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

//! Run an external task under a hard wall-clock ceiling.
//!
//! The task is started as the leader of a new process group. Whatever happens
//! to the task, the whole group is sent `SIGKILL` before `run` returns and the
//! task itself is reaped, so nothing left in the group outlives the call. The
//! ceiling also bounds reading the task's output, which a descendant that
//! moved to its own session may keep open.

use std::error::Error;
use std::fmt::{self, Formatter};
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Longest a task may run before it is killed.
pub const DEFAULT_CEILING: Duration = Duration::from_secs(600);

/// Program and arguments of an external task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl TaskCommand {
    pub fn new<S: Into<String>>(program: S, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a whitespace separated command line, `None` if it is blank.
    pub fn from_command_line(cmd: &str) -> Option<Self> {
        let mut parts = cmd.split_whitespace().map(str::to_owned);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

impl fmt::Display for TaskCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.program.fmt(f)?;
        for arg in self.args.iter() {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Everything a task that ran to completion produced.
#[derive(Debug)]
pub struct TaskOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug)]
pub enum TaskOutcome {
    Completed(TaskOutput),
    TimedOut,
}

/// Error starting or waiting for a task
#[derive(Debug)]
pub enum ExecutorError {
    Spawn(String, io::Error),
    Wait(io::Error),
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorError::Spawn(cmd, ref e) => write!(f, "unable to start '{}': {}", cmd, e),
            ExecutorError::Wait(ref e) => write!(f, "unable to wait for task: {}", e),
        }
    }
}

impl Error for ExecutorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ExecutorError::Spawn(_, ref e) => Some(e),
            ExecutorError::Wait(ref e) => Some(e),
        }
    }
}

/// Runs one task at a time in its own process group, bounded by `ceiling`.
#[derive(Debug, Clone)]
pub struct BoundedExecutor {
    ceiling: Duration,
}

impl BoundedExecutor {
    pub fn new(ceiling: Duration) -> Self {
        Self { ceiling }
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Run `task` to completion or until the ceiling expires. A task that doesn't
    /// finish in time is killed along with its process group and `TimedOut` is
    /// returned. Failing to start the task is an error; no retry happens here.
    pub async fn run(&self, task: &TaskCommand) -> Result<TaskOutcome, ExecutorError> {
        let deadline = Instant::now() + self.ceiling;
        let mut child = Command::new(&task.program)
            .args(&task.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutorError::Spawn(task.to_string(), e))?;

        let pid = child.id();
        tracing::debug!(message = "started task", command = %task, pid = ?pid);

        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let waited = tokio::time::timeout_at(deadline, child.wait()).await;

        // Anything the task left behind in its group goes with it, including
        // background children that would otherwise keep the pipes open.
        if let Some(pid) = pid {
            kill_group(pid);
        }

        match waited {
            Ok(Ok(status)) => {
                let (mut stdout, mut stderr) = (stdout, stderr);
                // A descendant that left the group with setsid can hold the pipes open
                let read =
                    tokio::time::timeout_at(deadline, futures_util::future::join(&mut stdout, &mut stderr)).await;
                let (stdout, stderr) = match read {
                    Ok(output) => output,
                    Err(_) => {
                        stdout.abort();
                        stderr.abort();
                        tracing::warn!(
                            message = "task output still open at ceiling, task exited",
                            command = %task,
                            status = %status,
                            ceiling_secs = self.ceiling.as_secs_f64(),
                        );
                        return Ok(TaskOutcome::TimedOut);
                    }
                };
                tracing::debug!(message = "task finished", command = %task, status = %status);

                Ok(TaskOutcome::Completed(TaskOutput {
                    status,
                    stdout: stdout.unwrap_or_default(),
                    stderr: stderr.unwrap_or_default(),
                }))
            }
            Ok(Err(e)) => {
                stdout.abort();
                stderr.abort();
                let _ = child.kill().await;
                Err(ExecutorError::Wait(e))
            }
            Err(_) => {
                tracing::warn!(
                    message = "task exceeded ceiling, killed",
                    command = %task,
                    ceiling_secs = self.ceiling.as_secs_f64(),
                );

                // The group was already sent SIGKILL, this reaps the task
                if let Err(e) = child.kill().await {
                    tracing::warn!(message = "unable to reap timed out task", command = %task, error = %e);
                }
                stdout.abort();
                stderr.abort();
                Ok(TaskOutcome::TimedOut)
            }
        }
    }
}

impl Default for BoundedExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_CEILING)
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                tracing::debug!(message = "unable to read task output", error = %e);
            }
        }

        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Send `SIGKILL` to every process in the group led by `pid`.
fn kill_group(pid: u32) {
    // SAFETY: killpg has no memory safety requirements, an unknown group is
    // reported as ESRCH.
    let res = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if res != 0 {
        let e = io::Error::last_os_error();
        if e.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(message = "unable to kill task process group", pgid = pid, error = %e);
        }
    }
}
