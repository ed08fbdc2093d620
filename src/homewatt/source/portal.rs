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

use crate::reading::{ReadingData, SourceKind};
use crate::source::core::{Source, SourceError, SourceErrorKind};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// Meter readings scraped from the utility provider's customer portal.
///
/// Logging in and reading the meter page requires browser automation which
/// lives in an external program. That program must print the cumulative
/// "taken" and "given" meter units as two integers on the last line of its
/// standard output, e.g. `123456780000 98765430000`.
#[derive(Debug)]
pub struct PortalClient {
    program: String,
    args: Vec<String>,
}

impl PortalClient {
    pub fn new(program: &str, args: &[String]) -> Self {
        Self {
            program: program.to_owned(),
            args: args.to_vec(),
        }
    }

    /// Build a client from a whitespace separated command line.
    pub fn from_command_line(cmd: &str) -> Option<Self> {
        let mut parts = cmd.split_whitespace().map(|s| s.to_owned());
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    fn parse(stdout: &str) -> Result<ReadingData, SourceError> {
        let line = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or(SourceError::KindMsg(SourceErrorKind::Payload, "portal scraper printed nothing"))?;

        let mut values = line.split_whitespace().map(|v| v.parse::<i64>());
        match (values.next(), values.next(), values.next()) {
            (Some(Ok(taken_units)), Some(Ok(given_units)), None) => Ok(ReadingData::Meter {
                taken_units,
                given_units,
                taken_daily: None,
                given_daily: None,
            }),
            _ => Err(SourceError::KindMsg(
                SourceErrorKind::Payload,
                "portal scraper output is not two meter values",
            )),
        }
    }
}

#[async_trait]
impl Source for PortalClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Meter
    }

    async fn fetch(&self) -> Result<ReadingData, SourceError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                SourceError::KindMsgCause(SourceErrorKind::Initialization, "unable to run portal scraper", Box::new(e))
            })?;

        if !output.status.success() {
            tracing::warn!(
                message = "portal scraper failed",
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            );
            return Err(SourceError::KindMsg(SourceErrorKind::Transport, "portal scraper exited unsuccessfully"));
        }

        Self::parse(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod test {
    use super::PortalClient;
    use crate::reading::ReadingData;
    use crate::source::{Source, SourceErrorKind};

    #[test]
    fn test_parse_last_line() {
        let out = "logging in\nreading meter\n 123456780000   98765430000 \n\n";
        assert_eq!(
            ReadingData::Meter {
                taken_units: 123456780000,
                given_units: 98765430000,
                taken_daily: None,
                given_daily: None,
            },
            PortalClient::parse(out).unwrap()
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(SourceErrorKind::Payload, PortalClient::parse("").unwrap_err().kind());
        assert_eq!(SourceErrorKind::Payload, PortalClient::parse("captcha lock").unwrap_err().kind());
        assert_eq!(SourceErrorKind::Payload, PortalClient::parse("1 2 3").unwrap_err().kind());
    }

    #[test]
    fn test_from_command_line() {
        let client = PortalClient::from_command_line("  python3 scraper.py --headless ").unwrap();
        assert_eq!("python3", client.program);
        assert_eq!(vec!["scraper.py".to_owned(), "--headless".to_owned()], client.args);

        assert!(PortalClient::from_command_line("   ").is_none());
    }

    #[tokio::test]
    async fn test_fetch_from_command() {
        let client = PortalClient::new("sh", &["-c".to_owned(), "echo 'logged in'; echo 1500 20".to_owned()]);
        let data = client.fetch().await.unwrap();
        assert_eq!(
            ReadingData::Meter {
                taken_units: 1500,
                given_units: 20,
                taken_daily: None,
                given_daily: None,
            },
            data
        );
    }

    #[tokio::test]
    async fn test_fetch_failed_command() {
        let client = PortalClient::new("sh", &["-c".to_owned(), "echo 'cannot log in' >&2; exit 3".to_owned()]);
        assert_eq!(SourceErrorKind::Transport, client.fetch().await.unwrap_err().kind());
    }
}
