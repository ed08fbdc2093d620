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

use crate::notify::Notifier;
use crate::source::{http_client, SourceError};
use chrono::NaiveDateTime;
use std::sync::Arc;
use std::time::Duration;

/// Heading the dashboard shows once it has loaded.
pub const DEFAULT_EXPECTED_TEXT: &str = "ELECTRICITY PRODUCTION";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteStatus {
    Online,
    Offline,
}

/// Checks from another machine that the public dashboard is reachable and
/// notifies when it goes offline or comes back.
///
/// Only changes are notified: the first check always notifies, after that a
/// message is sent when the status differs from the previous check.
pub struct SiteWatcher {
    client: reqwest::Client,
    url: String,
    expected: String,
    notifier: Arc<dyn Notifier>,
    last: Option<SiteStatus>,
}

impl SiteWatcher {
    pub fn new(url: &str, expected: &str, timeout: Duration, notifier: Arc<dyn Notifier>) -> Result<Self, SourceError> {
        Ok(Self::with_client(http_client(timeout)?, url, expected, notifier))
    }

    pub fn with_client(client: reqwest::Client, url: &str, expected: &str, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            client,
            url: url.to_owned(),
            expected: expected.to_owned(),
            notifier,
            last: None,
        }
    }

    /// Status seen by the most recent check, `None` before the first.
    pub fn last(&self) -> Option<SiteStatus> {
        self.last
    }

    pub async fn check(&mut self, now: NaiveDateTime) -> SiteStatus {
        let status = self.load_status().await;
        self.record(status, now).await;
        status
    }

    async fn load_status(&self) -> SiteStatus {
        let res = match self.client.get(&self.url).send().await {
            Ok(res) => res,
            Err(e) => {
                tracing::warn!(message = "unable to load site", url = %self.url, error = %e);
                return SiteStatus::Offline;
            }
        };

        let status = res.status();
        if !status.is_success() {
            tracing::warn!(message = "unexpected site response", url = %self.url, status = %status);
            return SiteStatus::Offline;
        }

        match res.text().await {
            Ok(body) if body.contains(&self.expected) => SiteStatus::Online,
            Ok(_) => {
                tracing::warn!(message = "site loaded without expected text", url = %self.url, expected = %self.expected);
                SiteStatus::Offline
            }
            Err(e) => {
                tracing::warn!(message = "unable to read site body", url = %self.url, error = %e);
                SiteStatus::Offline
            }
        }
    }

    /// Remember `status` and notify if it changed. Returns whether a message was sent.
    async fn record(&mut self, status: SiteStatus, now: NaiveDateTime) -> bool {
        if self.last == Some(status) {
            tracing::debug!(message = "site status unchanged", status = ?status);
            return false;
        }

        self.last = Some(status);
        let text = match status {
            SiteStatus::Online => format!("{} Raspberry online!", now),
            SiteStatus::Offline => format!("{} Raspberry offline!", now),
        };

        tracing::info!(message = "site status changed", url = %self.url, status = ?status);
        self.notifier.notify(&text).await;
        true
    }
}
