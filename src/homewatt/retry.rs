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

//! Run a daily task, retrying every hour until it reports success.
//!
//! The scheduler has two modes. After a successful attempt it waits for the
//! next occurrence of the daily time (noon by default). After a failed attempt
//! (the task timed out, couldn't be started or didn't print the success marker)
//! it waits an hour and tries again. There is no terminal state.

use crate::clock::{Cadence, Clock};
use crate::executor::{BoundedExecutor, TaskCommand, TaskOutcome};
use crate::notify::Notifier;
use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, Level};

/// Text a task prints when it did its job.
pub const DEFAULT_SUCCESS_MARKER: &str = "Success";

/// Delay before trying a failed task again.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Local time of day the task normally runs at.
pub fn default_daily_at() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    AwaitingNextDay,
    AwaitingHourlyRetry,
}

/// When the task runs next and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub next_attempt_at: NaiveDateTime,
    pub mode: RetryMode,
}

impl RetryState {
    /// State at start up: the task is due immediately.
    pub fn initial(now: NaiveDateTime) -> Self {
        Self {
            next_attempt_at: now,
            mode: RetryMode::AwaitingNextDay,
        }
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        now >= self.next_attempt_at
    }

    /// State after an attempt that succeeded at `completed_at`.
    pub fn succeeded(completed_at: NaiveDateTime, daily_at: NaiveTime) -> Self {
        Self {
            next_attempt_at: Cadence::DailyAt(daily_at).next_after(completed_at),
            mode: RetryMode::AwaitingNextDay,
        }
    }

    /// State after an attempt that failed at `completed_at`.
    pub fn failed(completed_at: NaiveDateTime, retry_after: Duration) -> Self {
        Self {
            next_attempt_at: completed_at + ChronoDuration::seconds(retry_after.as_secs() as i64),
            mode: RetryMode::AwaitingHourlyRetry,
        }
    }
}

/// Runs a task through a `BoundedExecutor` whenever the current `RetryState` is due.
pub struct RetryScheduler {
    executor: BoundedExecutor,
    task: TaskCommand,
    success_marker: String,
    daily_at: NaiveTime,
    retry_after: Duration,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    state: RetryState,
}

impl RetryScheduler {
    pub fn new(
        executor: BoundedExecutor,
        task: TaskCommand,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = RetryState::initial(clock.now());
        Self {
            executor,
            task,
            success_marker: DEFAULT_SUCCESS_MARKER.to_owned(),
            daily_at: default_daily_at(),
            retry_after: DEFAULT_RETRY_AFTER,
            notifier,
            clock,
            state,
        }
    }

    pub fn with_daily_at(mut self, daily_at: NaiveTime) -> Self {
        self.daily_at = daily_at;
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn with_success_marker<S: Into<String>>(mut self, marker: S) -> Self {
        self.success_marker = marker.into();
        self
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Run the task if it is due. Returns the new state if an attempt was made,
    /// `None` if it wasn't time yet.
    pub async fn tick(&mut self) -> Option<RetryState> {
        if !self.state.is_due(self.clock.now()) {
            return None;
        }

        let succeeded = self
            .attempt()
            .instrument(tracing::span!(Level::DEBUG, "scheduled_task", command = %self.task))
            .await;

        let completed_at = self.clock.now();
        self.state = if succeeded {
            RetryState::succeeded(completed_at, self.daily_at)
        } else {
            RetryState::failed(completed_at, self.retry_after)
        };

        let label = match self.state.mode {
            RetryMode::AwaitingNextDay => "Next update time",
            RetryMode::AwaitingHourlyRetry => "Next update try time",
        };

        tracing::info!(
            message = "scheduled next attempt",
            succeeded = succeeded,
            next_attempt_at = %self.state.next_attempt_at,
        );
        self.notifier
            .notify(&format!("{} {}", self.state.next_attempt_at, label))
            .await;

        Some(self.state)
    }

    /// Run the task once and forward what it printed. True if it succeeded.
    async fn attempt(&self) -> bool {
        match self.executor.run(&self.task).await {
            Ok(TaskOutcome::Completed(out)) => {
                let stdout = out.stdout.trim();
                if !stdout.is_empty() {
                    self.notifier.notify(stdout).await;
                }

                let succeeded = out.stdout.contains(&self.success_marker);
                if !succeeded {
                    tracing::warn!(message = "task did not report success", status = %out.status);

                    let stderr = out.stderr.trim();
                    if !stderr.is_empty() {
                        self.notifier.notify(stderr).await;
                    }
                }

                succeeded
            }
            Ok(TaskOutcome::TimedOut) => {
                self.notifier.notify("Timeout occurred").await;
                false
            }
            Err(e) => {
                tracing::error!(message = "unable to run task", error = %e);
                self.notifier
                    .notify(&format!("{} Error: {}", self.clock.now(), e))
                    .await;
                false
            }
        }
    }
}
