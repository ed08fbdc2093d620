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

use async_trait::async_trait;
use serde::Serialize;
use std::fmt::{self, Debug, Formatter};
use std::time::Duration;

const TELEGRAM_API: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Fire-and-forget sink for human readable operator messages.
///
/// Implementations must never fail or panic: a message that can't be delivered
/// is logged and dropped.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str);
}

/// Notifier that only writes messages to the log, used when no chat is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) {
        tracing::info!(message = "notification", text = %text);
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Send messages to a chat via the Telegram Bot API.
pub struct TelegramNotifier {
    client: reqwest::Client,
    url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: format!("{}/bot{}/sendMessage", TELEGRAM_API, token),
            chat_id: chat_id.to_owned(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) {
        tracing::info!(message = "notification", text = %text);

        let body = SendMessage {
            chat_id: &self.chat_id,
            text,
        };

        match self.client.post(&self.url).json(&body).send().await {
            Ok(res) if res.status().is_success() => {}
            Ok(res) => {
                tracing::warn!(message = "notification rejected by Telegram", status = %res.status());
            }
            Err(e) => {
                tracing::warn!(message = "unable to send notification", error = %e);
            }
        }
    }
}

impl Debug for TelegramNotifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // The URL contains the bot token
        f.debug_struct("TelegramNotifier")
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::{LogNotifier, Notifier, TelegramNotifier};

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        LogNotifier.notify("2026-01-01 00:00:00 test").await;
    }

    #[tokio::test]
    async fn test_telegram_notifier_swallows_errors() {
        let mut notifier = TelegramNotifier::new("token", "42").unwrap();
        // Nothing listens on the discard port, the send fails and is only logged
        notifier.url = "http://127.0.0.1:9/sendMessage".to_owned();
        notifier.notify("unreachable").await;
    }

    #[test]
    fn test_debug_hides_token() {
        let notifier = TelegramNotifier::new("123:secret", "42").unwrap();
        assert!(!format!("{:?}", notifier).contains("secret"));
    }
}
