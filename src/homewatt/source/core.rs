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
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{self, Formatter};
use std::time::Duration;

/// Timeout applied by source clients to a whole request/response exchange.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Potential kinds of errors that can be encountered fetching from a source
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy)]
pub enum SourceErrorKind {
    Initialization,
    Transport,
    Status,
    Payload,
}

impl SourceErrorKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            SourceErrorKind::Initialization => "initialization",
            SourceErrorKind::Transport => "transport",
            SourceErrorKind::Status => "status",
            SourceErrorKind::Payload => "payload",
        }
    }
}

/// Error fetching a reading from one of the external sources
#[derive(Debug)]
pub enum SourceError {
    Status(u16),
    KindMsg(SourceErrorKind, &'static str),
    KindMsgCause(SourceErrorKind, &'static str, Box<dyn Error + Send + Sync>),
}

impl SourceError {
    pub fn kind(&self) -> SourceErrorKind {
        match self {
            SourceError::Status(_) => SourceErrorKind::Status,
            SourceError::KindMsg(kind, _) => *kind,
            SourceError::KindMsgCause(kind, _, _) => *kind,
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Status(code) => write!(f, "unexpected response status {}", code),
            SourceError::KindMsg(_, msg) => msg.fmt(f),
            SourceError::KindMsgCause(_, msg, ref e) => write!(f, "{}: {}", msg, e),
        }
    }
}

impl Error for SourceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SourceError::KindMsgCause(_, _, ref e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            SourceError::Status(status.as_u16())
        } else if e.is_decode() {
            SourceError::KindMsgCause(SourceErrorKind::Payload, "malformed response body", Box::new(e))
        } else {
            SourceError::KindMsgCause(SourceErrorKind::Transport, "request failed", Box::new(e))
        }
    }
}

/// Client for a single external telemetry provider.
///
/// Implementations make exactly one attempt per call, bounded only by the
/// transport's own timeout. Retrying is up to the caller.
#[async_trait]
pub trait Source: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn fetch(&self) -> Result<ReadingData, SourceError>;
}

/// Build the HTTP client shared by the HTTP based sources.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("homewatt/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            SourceError::KindMsgCause(
                SourceErrorKind::Initialization,
                "unable to create HTTP client",
                Box::new(e),
            )
        })
}

/// Fail with a `Status` error for anything other than a 2xx response.
pub(crate) fn check_status(res: reqwest::Response) -> Result<reqwest::Response, SourceError> {
    let status = res.status();
    if status.is_success() {
        Ok(res)
    } else {
        Err(SourceError::Status(status.as_u16()))
    }
}

#[cfg(test)]
mod test {
    use super::{SourceError, SourceErrorKind};
    use std::error::Error;
    use std::io;

    #[test]
    fn test_error_kind_and_display() {
        let e = SourceError::Status(503);
        assert_eq!(SourceErrorKind::Status, e.kind());
        assert_eq!("unexpected response status 503", e.to_string());

        let e = SourceError::KindMsgCause(
            SourceErrorKind::Transport,
            "request failed",
            Box::new(io::Error::new(io::ErrorKind::TimedOut, "timed out")),
        );
        assert_eq!(SourceErrorKind::Transport, e.kind());
        assert_eq!("request failed: timed out", e.to_string());
        assert!(e.source().is_some());
    }
}
