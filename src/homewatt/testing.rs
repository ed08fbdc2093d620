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

//! Fakes shared by the unit tests of the collector, scheduler and supervisor.

use crate::clock::Clock;
use crate::notify::Notifier;
use crate::reading::{ReadingData, SourceKind, SourceReading};
use crate::source::{Source, SourceError, SourceErrorKind};
use crate::storage::{Storage, StorageError};
use crate::supervisor::{ProcessError, ProcessInfo, ProcessSpec, ProcessTable};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::io;
use std::sync::Mutex;

pub fn solar_data(today_yield_kwh: f64, power_w: f64) -> ReadingData {
    ReadingData::Solar {
        today_yield_kwh,
        power_w,
    }
}

pub fn appliance_data(cumulative_energy_kwh: f64) -> ReadingData {
    let mut rooms = BTreeMap::new();
    rooms.insert("Living room".to_owned(), 21.5);

    ReadingData::Appliance {
        cumulative_energy_kwh,
        daily_energy_kwh: 0.0,
        room_temperatures: rooms,
    }
}

pub fn meter_data(taken_units: i64, given_units: i64) -> ReadingData {
    ReadingData::Meter {
        taken_units,
        given_units,
        taken_daily: None,
        given_daily: None,
    }
}

/// Some valid payload for any source.
pub fn data_for(kind: SourceKind) -> ReadingData {
    match kind {
        SourceKind::Solar => solar_data(1.5, 850.0),
        SourceKind::Appliance => appliance_data(12.0),
        SourceKind::Weather => ReadingData::Weather {
            temperature_c: 4.5,
            feels_like_c: 1.2,
            humidity_pct: 81.0,
            pressure_hpa: 1011.0,
            wind_ms: 5.1,
            wind_degrees: 240.0,
            clouds_pct: 75.0,
            description: "broken clouds".to_owned(),
        },
        SourceKind::Meter => meter_data(1_000, 10),
    }
}

/// Source that returns the same payload, or the same transport failure, on every fetch.
pub struct ScriptedSource {
    kind: SourceKind,
    data: Option<ReadingData>,
    fetches: Mutex<u32>,
}

impl ScriptedSource {
    pub fn ok(data: ReadingData) -> Self {
        Self {
            kind: data.kind(),
            data: Some(data),
            fetches: Mutex::new(0),
        }
    }

    pub fn failing(kind: SourceKind) -> Self {
        Self {
            kind,
            data: None,
            fetches: Mutex::new(0),
        }
    }

    pub fn fetches(&self) -> u32 {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl Source for ScriptedSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self) -> Result<ReadingData, SourceError> {
        *self.fetches.lock().unwrap() += 1;
        self.data.clone().ok_or_else(|| {
            SourceError::KindMsgCause(
                SourceErrorKind::Transport,
                "request failed",
                Box::new(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused")),
            )
        })
    }
}

/// Notifier that keeps every message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str) {
        self.messages.lock().unwrap().push(text.to_owned());
    }
}

/// Storage where either every query or every write fails. Successful writes are recorded.
#[derive(Debug, Default)]
pub struct FailingStorage {
    fail_queries: bool,
    fail_writes: bool,
    appended: Mutex<Vec<SourceReading>>,
}

impl FailingStorage {
    pub fn failing_queries() -> Self {
        Self {
            fail_queries: true,
            ..Default::default()
        }
    }

    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Default::default()
        }
    }

    pub fn appended(&self) -> Vec<SourceReading> {
        self.appended.lock().unwrap().clone()
    }

    fn error(msg: &'static str) -> StorageError {
        StorageError::Io(msg, io::Error::new(io::ErrorKind::Other, "disk I/O error"))
    }
}

impl Storage for FailingStorage {
    fn append(&self, reading: &SourceReading) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(Self::error("unable to insert reading"));
        }

        self.appended.lock().unwrap().push(reading.clone());
        Ok(())
    }

    fn append_backfilled(&self, reading: &SourceReading, _previous: &SourceReading) -> Result<(), StorageError> {
        self.append(reading)
    }

    fn first_of_day(&self, _kind: SourceKind, _day: NaiveDate) -> Result<Option<SourceReading>, StorageError> {
        if self.fail_queries {
            return Err(Self::error("unable to query readings"));
        }
        Ok(None)
    }

    fn latest(&self, _kind: SourceKind) -> Result<Option<SourceReading>, StorageError> {
        if self.fail_queries {
            return Err(Self::error("unable to query readings"));
        }
        Ok(None)
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap()
    }
}

/// In-memory process table. Spawned specs become live processes, terminated
/// processes disappear.
#[derive(Debug, Default)]
pub struct FakeProcessTable {
    pub processes: Vec<ProcessInfo>,
    pub spawned: Vec<ProcessSpec>,
    pub terminated: Vec<u32>,
    pub fail_spawn: bool,
    pub fail_signal: bool,
    next_pid: u32,
}

impl FakeProcessTable {
    pub fn with_processes(processes: Vec<ProcessInfo>) -> Self {
        Self {
            processes,
            next_pid: 1000,
            ..Default::default()
        }
    }
}

pub fn process(pid: u32, cmdline: &[&str]) -> ProcessInfo {
    let name = cmdline
        .first()
        .and_then(|c| c.rsplit('/').next())
        .unwrap_or_default()
        .to_owned();

    ProcessInfo {
        pid,
        name,
        cmdline: cmdline.iter().map(|s| s.to_string()).collect(),
    }
}

impl ProcessTable for FakeProcessTable {
    fn list(&mut self) -> Result<Vec<ProcessInfo>, ProcessError> {
        Ok(self.processes.clone())
    }

    fn spawn(&mut self, spec: &ProcessSpec) -> Result<u32, ProcessError> {
        if self.fail_spawn {
            return Err(ProcessError::Spawn(
                spec.program.clone(),
                io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
            ));
        }

        self.next_pid += 1;
        let mut cmdline = vec![spec.program.as_str()];
        cmdline.extend(spec.args.iter().map(String::as_str));
        self.processes.push(process(self.next_pid, &cmdline));
        self.spawned.push(spec.clone());
        Ok(self.next_pid)
    }

    fn terminate(&mut self, pid: u32) -> Result<(), ProcessError> {
        if self.fail_signal {
            return Err(ProcessError::Signal(
                pid,
                io::Error::new(io::ErrorKind::PermissionDenied, "Operation not permitted"),
            ));
        }

        self.terminated.push(pid);
        self.processes.retain(|p| p.pid != pid);
        Ok(())
    }
}
