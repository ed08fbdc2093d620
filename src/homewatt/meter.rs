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

//! Daily import of grid meter readings from the utility provider's portal.
//!
//! The import is idempotent: once a meter reading has been stored for the
//! current day it does nothing. Otherwise it fetches the cumulative taken and
//! given units, stores them and fills in the previous row's daily consumption
//! from the difference. The summary line it produces contains the marker the
//! retry scheduler looks for only when the import succeeded.

use crate::delta::daily_delta;
use crate::reading::{ReadingData, SourceKind, SourceReading};
use crate::source::{Source, SourceError};
use crate::storage::{Storage, StorageError};
use chrono::{NaiveDate, NaiveDateTime};
use std::error::Error;
use std::fmt::{self, Formatter};

/// Meter registers count in units of 0.1 Wh.
pub const UNITS_PER_KWH: f64 = 10_000.0;

/// Error importing a meter reading
#[derive(Debug)]
pub enum MeterError {
    Storage(StorageError),
    Fetch(SourceError),
    UnexpectedPayload(SourceKind),
}

impl fmt::Display for MeterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MeterError::Storage(ref e) => write!(f, "storage error: {}", e),
            MeterError::Fetch(ref e) => write!(f, "unable to download meter data: {}", e),
            MeterError::UnexpectedPayload(kind) => write!(f, "source returned {} data instead of meter data", kind),
        }
    }
}

impl Error for MeterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MeterError::Storage(ref e) => Some(e),
            MeterError::Fetch(ref e) => Some(e),
            MeterError::UnexpectedPayload(_) => None,
        }
    }
}

impl From<StorageError> for MeterError {
    fn from(e: StorageError) -> Self {
        MeterError::Storage(e)
    }
}

impl From<SourceError> for MeterError {
    fn from(e: SourceError) -> Self {
        MeterError::Fetch(e)
    }
}

/// Result of a successful import run.
#[derive(Debug, PartialEq)]
pub enum ImportOutcome {
    /// A reading for today was already stored, nothing was fetched.
    AlreadyCurrent(NaiveDate),
    /// A new reading was stored. `previous` is the back-filled prior reading,
    /// if there was one. `reset` is set when a counter went backwards since
    /// the previous reading and its daily usage was clamped to 0.
    Imported {
        reading: SourceReading,
        previous: Option<SourceReading>,
        reset: bool,
    },
}

impl ImportOutcome {
    /// Line printed by the `meter` command.
    pub fn summary(&self) -> String {
        match self {
            ImportOutcome::AlreadyCurrent(day) => format!("{} Success, data is actual.", day),
            ImportOutcome::Imported {
                reading,
                previous,
                reset,
            } => {
                let day = reading.captured_at.date();
                let mut line = format!("{} Success, downloaded and saved data.", day);

                if let ReadingData::Meter {
                    taken_units,
                    given_units,
                    ..
                } = reading.data
                {
                    line.push_str(&format!(
                        " Taken: {}, given: {}",
                        taken_units as f64 / UNITS_PER_KWH,
                        given_units as f64 / UNITS_PER_KWH
                    ));
                }

                if let Some(ReadingData::Meter {
                    taken_daily: Some(taken),
                    given_daily: Some(given),
                    ..
                }) = previous.as_ref().map(|p| &p.data)
                {
                    line.push_str(&format!(
                        ", taken yesterday: {}, given yesterday: {}",
                        *taken as f64 / UNITS_PER_KWH,
                        *given as f64 / UNITS_PER_KWH
                    ));
                }

                if *reset {
                    line.push_str(", Warning: meter counter went backwards, daily usage set to 0");
                }

                line
            }
        }
    }
}

/// Store today's meter reading from `source` unless one is already stored.
pub async fn import(storage: &dyn Storage, source: &dyn Source, now: NaiveDateTime) -> Result<ImportOutcome, MeterError> {
    let latest = storage.latest(SourceKind::Meter)?;
    if let Some(ref latest) = latest {
        if latest.captured_at.date() == now.date() {
            tracing::info!(message = "meter data already current", captured_at = %latest.captured_at);
            return Ok(ImportOutcome::AlreadyCurrent(now.date()));
        }
    }

    let (taken_units, given_units) = match source.fetch().await? {
        ReadingData::Meter {
            taken_units,
            given_units,
            ..
        } => (taken_units, given_units),
        other => return Err(MeterError::UnexpectedPayload(other.kind())),
    };

    let reading = SourceReading::new(
        now,
        ReadingData::Meter {
            taken_units,
            given_units,
            taken_daily: None,
            given_daily: None,
        },
    );

    let mut reset = false;
    let previous = match latest {
        Some(SourceReading {
            captured_at,
            data: ReadingData::Meter {
                taken_units: prev_taken,
                given_units: prev_given,
                ..
            },
        }) => {
            let taken = daily_delta(taken_units, Some(prev_taken));
            let given = daily_delta(given_units, Some(prev_given));
            if taken.reset || given.reset {
                reset = true;
                tracing::warn!(
                    message = "meter counter went backwards, daily usage set to 0",
                    taken_units = taken_units,
                    prev_taken = prev_taken,
                    given_units = given_units,
                    prev_given = prev_given,
                );
            }

            Some(SourceReading {
                captured_at,
                data: ReadingData::Meter {
                    taken_units: prev_taken,
                    given_units: prev_given,
                    taken_daily: Some(taken.value),
                    given_daily: Some(given.value),
                },
            })
        }
        _ => None,
    };

    match previous {
        Some(ref prev) => storage.append_backfilled(&reading, prev)?,
        None => storage.append(&reading)?,
    }

    tracing::info!(
        message = "imported meter reading",
        taken_units = taken_units,
        given_units = given_units,
    );

    Ok(ImportOutcome::Imported {
        reading,
        previous,
        reset,
    })
}

#[cfg(test)]
mod test {
    use super::{import, ImportOutcome, MeterError};
    use crate::reading::{ReadingData, SourceKind, SourceReading};
    use crate::storage::{SqliteStorage, Storage};
    use crate::testing::{meter_data, solar_data, ScriptedSource};
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(day: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 4, day).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_already_current_skips_fetch() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.append(&SourceReading::new(at(2, 0), meter_data(1_000, 10))).unwrap();
        let source = ScriptedSource::ok(meter_data(2_000, 20));

        let outcome = import(&storage, &source, at(2, 12)).await.unwrap();
        assert_eq!(ImportOutcome::AlreadyCurrent(at(2, 0).date()), outcome);
        assert_eq!("2026-04-02 Success, data is actual.", outcome.summary());
        assert_eq!(0, source.fetches());
    }

    #[tokio::test]
    async fn test_backfills_previous_row() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.append(&SourceReading::new(at(1, 12), meter_data(1_000_000, 50_000))).unwrap();
        let source = ScriptedSource::ok(meter_data(1_120_000, 65_000));

        let outcome = import(&storage, &source, at(2, 12)).await.unwrap();
        assert_eq!(
            "2026-04-02 Success, downloaded and saved data. Taken: 112, given: 6.5, \
             taken yesterday: 12, given yesterday: 1.5",
            outcome.summary()
        );

        let yesterday = storage
            .first_of_day(SourceKind::Meter, at(1, 0).date())
            .unwrap()
            .unwrap();
        assert_eq!(
            ReadingData::Meter {
                taken_units: 1_000_000,
                given_units: 50_000,
                taken_daily: Some(120_000),
                given_daily: Some(15_000),
            },
            yesterday.data
        );

        let today = storage.latest(SourceKind::Meter).unwrap().unwrap();
        assert_eq!(at(2, 12), today.captured_at);
        assert_eq!(meter_data(1_120_000, 65_000), today.data);
    }

    #[tokio::test]
    async fn test_first_import_has_nothing_to_backfill() {
        let storage = SqliteStorage::in_memory().unwrap();
        let source = ScriptedSource::ok(meter_data(10_000, 0));

        let outcome = import(&storage, &source, at(3, 12)).await.unwrap();
        assert_eq!(
            "2026-04-03 Success, downloaded and saved data. Taken: 1, given: 0",
            outcome.summary()
        );
        match outcome {
            ImportOutcome::Imported { previous, reset, .. } => {
                assert_eq!(None, previous);
                assert!(!reset);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        // A second run the same day doesn't fetch again
        let failing = ScriptedSource::failing(SourceKind::Meter);
        let outcome = import(&storage, &failing, at(3, 13)).await.unwrap();
        assert_eq!(ImportOutcome::AlreadyCurrent(at(3, 0).date()), outcome);
        assert_eq!(0, failing.fetches());
    }

    #[tokio::test]
    async fn test_counter_reset_reported() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.append(&SourceReading::new(at(1, 12), meter_data(1_000_000, 50_000))).unwrap();
        // Replaced meter, the taken register starts over
        let source = ScriptedSource::ok(meter_data(20_000, 65_000));

        let outcome = import(&storage, &source, at(2, 12)).await.unwrap();
        let summary = outcome.summary();
        assert!(summary.starts_with("2026-04-02 Success, downloaded and saved data."));
        assert!(
            summary.ends_with(", Warning: meter counter went backwards, daily usage set to 0"),
            "unexpected summary {}",
            summary
        );
        assert!(matches!(outcome, ImportOutcome::Imported { reset: true, .. }));

        let yesterday = storage
            .first_of_day(SourceKind::Meter, at(1, 0).date())
            .unwrap()
            .unwrap();
        assert_eq!(
            ReadingData::Meter {
                taken_units: 1_000_000,
                given_units: 50_000,
                taken_daily: Some(0),
                given_daily: Some(15_000),
            },
            yesterday.data
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_has_no_marker() {
        let storage = SqliteStorage::in_memory().unwrap();
        let source = ScriptedSource::failing(SourceKind::Meter);

        let err = import(&storage, &source, at(3, 12)).await.unwrap_err();
        assert!(matches!(err, MeterError::Fetch(_)));
        assert!(!err.to_string().contains("Success"));
        assert_eq!(None, storage.latest(SourceKind::Meter).unwrap());
    }

    #[tokio::test]
    async fn test_wrong_payload_rejected() {
        let storage = SqliteStorage::in_memory().unwrap();
        let source = ScriptedSource::ok(solar_data(1.0, 2.0));

        let err = import(&storage, &source, at(3, 12)).await.unwrap_err();
        assert!(matches!(err, MeterError::UnexpectedPayload(SourceKind::Solar)));
    }
}
