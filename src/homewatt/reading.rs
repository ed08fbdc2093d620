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

use chrono::{NaiveDateTime, Timelike};
use std::collections::BTreeMap;
use std::fmt::{self, Formatter};

/// Name of a room with a heater thermostat, e.g. "First bedroom"
pub type RoomId = String;

/// One of the external telemetry providers readings are collected from.
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum SourceKind {
    Solar,
    Appliance,
    Weather,
    Meter,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Solar,
        SourceKind::Appliance,
        SourceKind::Weather,
        SourceKind::Meter,
    ];

    pub fn as_label(&self) -> &'static str {
        match self {
            SourceKind::Solar => "solar",
            SourceKind::Appliance => "appliance",
            SourceKind::Weather => "weather",
            SourceKind::Meter => "meter",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.as_label().fmt(f)
    }
}

/// Measurements returned by a source client, without a capture time.
///
/// Derived daily fields (`daily_energy_kwh`, `taken_daily`, `given_daily`) are
/// left empty by clients and computed from storage by the collector or the
/// meter import.
#[derive(Clone, Debug, PartialEq)]
pub enum ReadingData {
    Solar {
        today_yield_kwh: f64,
        power_w: f64,
    },
    Appliance {
        cumulative_energy_kwh: f64,
        daily_energy_kwh: f64,
        room_temperatures: BTreeMap<RoomId, f64>,
    },
    Weather {
        temperature_c: f64,
        feels_like_c: f64,
        humidity_pct: f64,
        pressure_hpa: f64,
        wind_ms: f64,
        wind_degrees: f64,
        clouds_pct: f64,
        description: String,
    },
    Meter {
        taken_units: i64,
        given_units: i64,
        taken_daily: Option<i64>,
        given_daily: Option<i64>,
    },
}

impl ReadingData {
    pub fn kind(&self) -> SourceKind {
        match self {
            ReadingData::Solar { .. } => SourceKind::Solar,
            ReadingData::Appliance { .. } => SourceKind::Appliance,
            ReadingData::Weather { .. } => SourceKind::Weather,
            ReadingData::Meter { .. } => SourceKind::Meter,
        }
    }
}

/// A reading from a single source stamped with the local time it was captured.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceReading {
    pub captured_at: NaiveDateTime,
    pub data: ReadingData,
}

impl SourceReading {
    /// Create a new reading, dropping any sub-second part of `captured_at`.
    pub fn new(captured_at: NaiveDateTime, data: ReadingData) -> Self {
        Self {
            captured_at: truncate_seconds(captured_at),
            data,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.data.kind()
    }
}

/// Drop the sub-second part of a timestamp, readings are stored with second precision.
pub fn truncate_seconds(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}

#[cfg(test)]
mod test {
    use super::{ReadingData, SourceKind, SourceReading};
    use chrono::NaiveDate;

    #[test]
    fn test_reading_truncates_subseconds() {
        let ts = NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_milli_opt(10, 15, 30, 750)
            .unwrap();
        let reading = SourceReading::new(
            ts,
            ReadingData::Solar {
                today_yield_kwh: 1.5,
                power_w: 850.0,
            },
        );

        assert_eq!(
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap().and_hms_opt(10, 15, 30).unwrap(),
            reading.captured_at
        );
        assert_eq!(SourceKind::Solar, reading.kind());
    }
}
