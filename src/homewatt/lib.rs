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

//! Collect household energy telemetry into SQLite and keep the collectors running unattended.
//!
//! ## Features
//!
//! Homewatt polls the energy related devices and services of a house and stores
//! every reading in a SQLite database that a dashboard reads from. It is meant to
//! run 24/7 on a Raspberry PI (3 or 4) without anyone watching it.
//!
//! The following sources are read:
//!
//! * Solar inverter (Solax) - today's yield in kWh and current AC power in W.
//! * Heaters and sub-meter (Tuya cloud) - cumulative energy in kWh and the temperature
//!   of every room with a heater thermostat. Energy used since local midnight is
//!   derived from the first reading of the day.
//! * Weather (OpenWeatherMap) - temperature, humidity, pressure, wind and clouds.
//! * Grid meter (utility provider portal) - cumulative taken and given units, scraped
//!   once a day by an external browser automation program.
//!
//! A single `homewatt` binary provides every long-running part of the installation
//! as a subcommand:
//!
//! * `homewatt collect` - reads the solar, heater and weather sources every `10s` and
//!   exposes collection metrics for Prometheus.
//! * `homewatt schedule` - runs the daily meter import under a `600s` ceiling, at noon
//!   after a success and every hour after a failure.
//! * `homewatt supervise` - starts any of the above (and the dashboard) that isn't
//!   running, checks the network connection and the tunnel exposing the dashboard,
//!   restarts the dashboard every night and backs up the database every Monday.
//! * `homewatt watch` - run on another machine, loads the public dashboard every `300s`
//!   and sends a message when it goes offline or comes back.
//!
//! Problems are sent as messages to a Telegram chat when a bot token and chat ID
//! are configured, and logged otherwise.
//!
//! ## Build
//!
//! `homewatt` is a Rust program and must be built from source using a [Rust toolchain](https://rustup.rs/).
//! Since it's meant to be run on a Raspberry PI, you will also likely need to cross-compile it.
//!
//! ```text
//! rustup target add armv7-unknown-linux-gnueabihf
//! cargo build --release --target armv7-unknown-linux-gnueabihf
//! ```
//!
//! ## Configure
//!
//! Credentials and endpoints are read from the environment or from a `.env` file in
//! the working directory. See `homewatt --help` for the full list.
//!
//! ```text
//! SOLAX_URL=https://www.solaxcloud.com/proxyApp/proxy/api/getRealtimeInfo.do?tokenId=...&sn=...
//! WEATHER_API_KEY=...
//! TUYA_ACCESS_ID=...
//! TUYA_ACCESS_KEY=...
//! TUYA_HEATERS=First bedroom=bf1...,Bathroom upper=bf2...
//! TUYA_METER_ID=bf3...
//! PORTAL_SCRAPE_CMD=python /home/pi/energy/scraper.py
//! TELEGRAM_TOKEN=...
//! TELEGRAM_CHAT_ID=...
//! ```
//!
//! ## Run
//!
//! Only the supervisor needs to be started, it starts everything else.
//!
//! ```text
//! homewatt --database /home/pi/energy/electricity.db supervise
//! ```
//!
//! ### Prometheus
//!
//! Collection metrics are exposed on `127.0.0.1:9782` at `/metrics` while
//! `homewatt collect` runs:
//!
//! * `homewatt_collections_total` - Total number of attempts to read each source.
//! * `homewatt_errors_total` - Total errors by source and type.
//! * `homewatt_last_read_timestamp` - UNIX timestamp of the last stored reading of each source.
//!

pub mod clock;
pub mod collector;
pub mod delta;
pub mod executor;
pub mod http;
pub mod meter;
pub mod metrics;
pub mod notify;
pub mod reading;
pub mod retry;
pub mod source;
pub mod storage;
pub mod supervisor;

#[cfg(test)]
mod testing;
