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

//! Durable storage of readings in SQLite.
//!
//! Each source has its own table with one row per reading, keyed by capture
//! time. The dashboard reads the same database file concurrently, so the
//! database is opened in WAL mode and every write is a single transaction.

use crate::reading::{ReadingData, SourceKind, SourceReading};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{self, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use std::{fs, io};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS solar_readings (
    id INTEGER PRIMARY KEY,
    captured_at TEXT NOT NULL,
    yield_today_kwh REAL NOT NULL,
    power_w REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS solar_readings_captured_at ON solar_readings (captured_at);

CREATE TABLE IF NOT EXISTS appliance_readings (
    id INTEGER PRIMARY KEY,
    captured_at TEXT NOT NULL,
    cumulative_energy_kwh REAL NOT NULL,
    daily_energy_kwh REAL NOT NULL,
    room_temperatures TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS appliance_readings_captured_at ON appliance_readings (captured_at);

CREATE TABLE IF NOT EXISTS weather_readings (
    id INTEGER PRIMARY KEY,
    captured_at TEXT NOT NULL,
    temperature_c REAL NOT NULL,
    feels_like_c REAL NOT NULL,
    humidity_pct REAL NOT NULL,
    pressure_hpa REAL NOT NULL,
    wind_ms REAL NOT NULL,
    wind_degrees REAL NOT NULL,
    clouds_pct REAL NOT NULL,
    description TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS weather_readings_captured_at ON weather_readings (captured_at);

CREATE TABLE IF NOT EXISTS meter_readings (
    id INTEGER PRIMARY KEY,
    captured_at TEXT NOT NULL,
    taken_units INTEGER NOT NULL,
    given_units INTEGER NOT NULL,
    taken_daily INTEGER,
    given_daily INTEGER
);
CREATE INDEX IF NOT EXISTS meter_readings_captured_at ON meter_readings (captured_at);
";

/// Error reading or writing readings
#[derive(Debug)]
pub enum StorageError {
    Sqlite(&'static str, rusqlite::Error),
    Encoding(&'static str, Box<dyn Error + Send + Sync>),
    Io(&'static str, io::Error),
    Poisoned,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Sqlite(msg, ref e) => write!(f, "{}: {}", msg, e),
            StorageError::Encoding(msg, ref e) => write!(f, "{}: {}", msg, e),
            StorageError::Io(msg, ref e) => write!(f, "{}: {}", msg, e),
            StorageError::Poisoned => "database handle poisoned by a panicked writer".fmt(f),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StorageError::Sqlite(_, ref e) => Some(e),
            StorageError::Encoding(_, ref e) => Some(e.as_ref()),
            StorageError::Io(_, ref e) => Some(e),
            StorageError::Poisoned => None,
        }
    }
}

/// Append/query interface over typed reading rows.
///
/// Implementations must make each method a single atomic operation.
pub trait Storage: Send + Sync {
    /// Persist a new reading.
    fn append(&self, reading: &SourceReading) -> Result<(), StorageError>;

    /// Persist a new reading and, in the same transaction, overwrite the derived
    /// daily fields of the already stored `previous` reading (matched by source
    /// and capture time).
    fn append_backfilled(&self, reading: &SourceReading, previous: &SourceReading) -> Result<(), StorageError>;

    /// Earliest reading of a source captured on the given local calendar day.
    fn first_of_day(&self, kind: SourceKind, day: NaiveDate) -> Result<Option<SourceReading>, StorageError>;

    /// Most recently captured reading of a source.
    fn latest(&self, kind: SourceKind) -> Result<Option<SourceReading>, StorageError>;
}

/// `Storage` backed by a single SQLite connection.
///
/// The connection is guarded by a mutex which serializes writers within the
/// process. Other processes (the dashboard) are handled by SQLite locking and
/// the busy timeout.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (creating if needed) the database at `path` and make sure all tables exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StorageError::Io("unable to create database directory", e))?;
        }

        let conn = Connection::open(path).map_err(|e| StorageError::Sqlite("unable to open database", e))?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|e| StorageError::Sqlite("unable to enable WAL mode", e))?;
        tracing::debug!(message = "opened database", path = %path.display(), journal_mode = %mode);
        Self::init(conn)
    }

    /// Database that only lives as long as this value, for tests and dry runs.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::Sqlite("unable to open database", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| StorageError::Sqlite("unable to set busy timeout", e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StorageError::Sqlite("unable to create tables", e))?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Write a consistent copy of the database to `dir/electricity<YYYYMMDD>.db`,
    /// replacing a copy made earlier the same day.
    pub fn backup(&self, dir: &Path, day: NaiveDate) -> Result<PathBuf, StorageError> {
        fs::create_dir_all(dir).map_err(|e| StorageError::Io("unable to create backup directory", e))?;

        let dest = dir.join(format!("electricity{}.db", day.format("%Y%m%d")));
        if dest.exists() {
            fs::remove_file(&dest).map_err(|e| StorageError::Io("unable to replace existing backup", e))?;
        }

        let conn = self.lock()?;
        conn.execute("VACUUM INTO ?1", params![dest.to_string_lossy().into_owned()])
            .map_err(|e| StorageError::Sqlite("unable to write backup", e))?;

        Ok(dest)
    }

    fn query_one(
        &self,
        kind: SourceKind,
        filter: &str,
        order: &str,
        args: &[String],
    ) -> Result<Option<SourceReading>, StorageError> {
        let sql = format!(
            "SELECT captured_at, {} FROM {} {} ORDER BY captured_at {}, id {} LIMIT 1",
            columns(kind).join(", "),
            table(kind),
            filter,
            order,
            order,
        );

        let conn = self.lock()?;
        conn.query_row(&sql, params_from_iter(args.iter()), |row| from_row(kind, row))
            .optional()
            .map_err(|e| StorageError::Sqlite("unable to query readings", e))
    }
}

impl Storage for SqliteStorage {
    fn append(&self, reading: &SourceReading) -> Result<(), StorageError> {
        let values = to_values(reading)?;
        let conn = self.lock()?;
        conn.execute(&insert_sql(reading.kind()), params_from_iter(values.iter()))
            .map_err(|e| StorageError::Sqlite("unable to insert reading", e))?;
        Ok(())
    }

    fn append_backfilled(&self, reading: &SourceReading, previous: &SourceReading) -> Result<(), StorageError> {
        let values = to_values(reading)?;
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::Sqlite("unable to open transaction", e))?;

        if let Some(sql) = backfill_sql(previous.kind()) {
            let mut derived = derived_values(&previous.data);
            derived.push(Value::Text(format_timestamp(previous.captured_at)));

            let updated = tx
                .execute(&sql, params_from_iter(derived.iter()))
                .map_err(|e| StorageError::Sqlite("unable to back-fill previous reading", e))?;

            if updated == 0 {
                tracing::warn!(
                    message = "previous reading to back-fill not found",
                    source = %previous.kind(),
                    captured_at = %previous.captured_at,
                );
            }
        }

        tx.execute(&insert_sql(reading.kind()), params_from_iter(values.iter()))
            .map_err(|e| StorageError::Sqlite("unable to insert reading", e))?;
        tx.commit()
            .map_err(|e| StorageError::Sqlite("unable to commit transaction", e))
    }

    fn first_of_day(&self, kind: SourceKind, day: NaiveDate) -> Result<Option<SourceReading>, StorageError> {
        let start = day.and_hms_opt(0, 0, 0).map(format_timestamp);
        let end = day.succ_opt().and_then(|d| d.and_hms_opt(0, 0, 0)).map(format_timestamp);

        match (start, end) {
            (Some(start), Some(end)) => self.query_one(
                kind,
                "WHERE captured_at >= ?1 AND captured_at < ?2",
                "ASC",
                &[start, end],
            ),
            _ => Ok(None),
        }
    }

    fn latest(&self, kind: SourceKind) -> Result<Option<SourceReading>, StorageError> {
        self.query_one(kind, "", "DESC", &[])
    }
}

fn table(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Solar => "solar_readings",
        SourceKind::Appliance => "appliance_readings",
        SourceKind::Weather => "weather_readings",
        SourceKind::Meter => "meter_readings",
    }
}

fn columns(kind: SourceKind) -> &'static [&'static str] {
    match kind {
        SourceKind::Solar => &["yield_today_kwh", "power_w"],
        SourceKind::Appliance => &["cumulative_energy_kwh", "daily_energy_kwh", "room_temperatures"],
        SourceKind::Weather => &[
            "temperature_c",
            "feels_like_c",
            "humidity_pct",
            "pressure_hpa",
            "wind_ms",
            "wind_degrees",
            "clouds_pct",
            "description",
        ],
        SourceKind::Meter => &["taken_units", "given_units", "taken_daily", "given_daily"],
    }
}

fn insert_sql(kind: SourceKind) -> String {
    let cols = columns(kind);
    let placeholders: Vec<String> = (1..=cols.len() + 1).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {} (captured_at, {}) VALUES ({})",
        table(kind),
        cols.join(", "),
        placeholders.join(", ")
    )
}

/// Statement overwriting the derived daily columns of the newest row with a given
/// capture time, `None` for sources without derived columns.
fn backfill_sql(kind: SourceKind) -> Option<String> {
    let derived: &[&str] = match kind {
        SourceKind::Appliance => &["daily_energy_kwh"],
        SourceKind::Meter => &["taken_daily", "given_daily"],
        SourceKind::Solar | SourceKind::Weather => return None,
    };

    let assignments: Vec<String> = derived
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{} = ?{}", col, i + 1))
        .collect();

    Some(format!(
        "UPDATE {t} SET {} WHERE id = (SELECT id FROM {t} WHERE captured_at = ?{} ORDER BY id DESC LIMIT 1)",
        assignments.join(", "),
        derived.len() + 1,
        t = table(kind),
    ))
}

fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn opt_integer(v: Option<i64>) -> Value {
    v.map(Value::Integer).unwrap_or(Value::Null)
}

fn derived_values(data: &ReadingData) -> Vec<Value> {
    match data {
        ReadingData::Appliance { daily_energy_kwh, .. } => vec![Value::Real(*daily_energy_kwh)],
        ReadingData::Meter {
            taken_daily,
            given_daily,
            ..
        } => vec![opt_integer(*taken_daily), opt_integer(*given_daily)],
        ReadingData::Solar { .. } | ReadingData::Weather { .. } => Vec::new(),
    }
}

fn to_values(reading: &SourceReading) -> Result<Vec<Value>, StorageError> {
    let mut values = vec![Value::Text(format_timestamp(reading.captured_at))];

    match &reading.data {
        ReadingData::Solar {
            today_yield_kwh,
            power_w,
        } => {
            values.push(Value::Real(*today_yield_kwh));
            values.push(Value::Real(*power_w));
        }
        ReadingData::Appliance {
            cumulative_energy_kwh,
            daily_energy_kwh,
            room_temperatures,
        } => {
            let rooms = serde_json::to_string(room_temperatures)
                .map_err(|e| StorageError::Encoding("unable to encode room temperatures", Box::new(e)))?;
            values.push(Value::Real(*cumulative_energy_kwh));
            values.push(Value::Real(*daily_energy_kwh));
            values.push(Value::Text(rooms));
        }
        ReadingData::Weather {
            temperature_c,
            feels_like_c,
            humidity_pct,
            pressure_hpa,
            wind_ms,
            wind_degrees,
            clouds_pct,
            description,
        } => {
            for v in [
                temperature_c,
                feels_like_c,
                humidity_pct,
                pressure_hpa,
                wind_ms,
                wind_degrees,
                clouds_pct,
            ] {
                values.push(Value::Real(*v));
            }
            values.push(Value::Text(description.clone()));
        }
        ReadingData::Meter {
            taken_units,
            given_units,
            taken_daily,
            given_daily,
        } => {
            values.push(Value::Integer(*taken_units));
            values.push(Value::Integer(*given_units));
            values.push(opt_integer(*taken_daily));
            values.push(opt_integer(*given_daily));
        }
    }

    Ok(values)
}

fn from_row(kind: SourceKind, row: &Row<'_>) -> rusqlite::Result<SourceReading> {
    let captured_at: String = row.get(0)?;
    let captured_at = NaiveDateTime::parse_from_str(&captured_at, TIMESTAMP_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;

    let data = match kind {
        SourceKind::Solar => ReadingData::Solar {
            today_yield_kwh: row.get(1)?,
            power_w: row.get(2)?,
        },
        SourceKind::Appliance => {
            let rooms: String = row.get(3)?;
            ReadingData::Appliance {
                cumulative_energy_kwh: row.get(1)?,
                daily_energy_kwh: row.get(2)?,
                room_temperatures: serde_json::from_str(&rooms)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
            }
        }
        SourceKind::Weather => ReadingData::Weather {
            temperature_c: row.get(1)?,
            feels_like_c: row.get(2)?,
            humidity_pct: row.get(3)?,
            pressure_hpa: row.get(4)?,
            wind_ms: row.get(5)?,
            wind_degrees: row.get(6)?,
            clouds_pct: row.get(7)?,
            description: row.get(8)?,
        },
        SourceKind::Meter => ReadingData::Meter {
            taken_units: row.get(1)?,
            given_units: row.get(2)?,
            taken_daily: row.get(3)?,
            given_daily: row.get(4)?,
        },
    };

    Ok(SourceReading { captured_at, data })
}

#[cfg(test)]
mod test {
    use super::{SqliteStorage, Storage};
    use crate::reading::{ReadingData, SourceKind, SourceReading};
    use chrono::{NaiveDate, NaiveDateTime};
    use std::collections::BTreeMap;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, day).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn appliance(ts: NaiveDateTime, cumulative: f64) -> SourceReading {
        let mut rooms = BTreeMap::new();
        rooms.insert("First bedroom".to_owned(), 20.5);
        rooms.insert("Bathroom upper".to_owned(), 23.0);

        SourceReading::new(
            ts,
            ReadingData::Appliance {
                cumulative_energy_kwh: cumulative,
                daily_energy_kwh: 0.0,
                room_temperatures: rooms,
            },
        )
    }

    fn meter(ts: NaiveDateTime, taken: i64, given: i64) -> SourceReading {
        SourceReading::new(
            ts,
            ReadingData::Meter {
                taken_units: taken,
                given_units: given,
                taken_daily: None,
                given_daily: None,
            },
        )
    }

    #[test]
    fn test_empty_queries() {
        let storage = SqliteStorage::in_memory().unwrap();

        for kind in SourceKind::ALL {
            assert_eq!(None, storage.latest(kind).unwrap());
            assert_eq!(None, storage.first_of_day(kind, at(1, 0, 0).date()).unwrap());
        }
    }

    #[test]
    fn test_append_and_query_every_kind() {
        let storage = SqliteStorage::in_memory().unwrap();
        let readings = vec![
            SourceReading::new(
                at(2, 10, 0),
                ReadingData::Solar {
                    today_yield_kwh: 3.2,
                    power_w: 1200.0,
                },
            ),
            appliance(at(2, 10, 0), 1500.25),
            SourceReading::new(
                at(2, 10, 0),
                ReadingData::Weather {
                    temperature_c: -2.5,
                    feels_like_c: -6.1,
                    humidity_pct: 90.0,
                    pressure_hpa: 1002.0,
                    wind_ms: 7.2,
                    wind_degrees: 310.0,
                    clouds_pct: 100.0,
                    description: "light snow".to_owned(),
                },
            ),
            meter(at(2, 10, 0), 123_450_000, 5_000),
        ];

        for reading in &readings {
            storage.append(reading).unwrap();
        }

        for reading in &readings {
            assert_eq!(Some(reading), storage.latest(reading.kind()).unwrap().as_ref());
        }
    }

    #[test]
    fn test_first_of_day_bounds() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.append(&appliance(at(1, 23, 59), 39.0)).unwrap();
        storage.append(&appliance(at(2, 0, 0), 40.0)).unwrap();
        storage.append(&appliance(at(2, 12, 0), 41.0)).unwrap();
        storage.append(&appliance(at(3, 0, 0), 45.0)).unwrap();

        let first = storage
            .first_of_day(SourceKind::Appliance, at(2, 0, 0).date())
            .unwrap()
            .unwrap();
        assert_eq!(at(2, 0, 0), first.captured_at);

        let latest = storage.latest(SourceKind::Appliance).unwrap().unwrap();
        assert_eq!(at(3, 0, 0), latest.captured_at);

        // Other sources don't leak into the query
        assert_eq!(None, storage.first_of_day(SourceKind::Meter, at(2, 0, 0).date()).unwrap());
    }

    #[test]
    fn test_append_backfilled_meter() {
        let storage = SqliteStorage::in_memory().unwrap();
        let previous = meter(at(1, 12, 0), 1_000, 200);
        storage.append(&previous).unwrap();

        let mut updated = previous.clone();
        updated.data = ReadingData::Meter {
            taken_units: 1_000,
            given_units: 200,
            taken_daily: Some(55),
            given_daily: Some(7),
        };
        let current = meter(at(2, 12, 0), 1_055, 207);
        storage.append_backfilled(&current, &updated).unwrap();

        let first = storage
            .first_of_day(SourceKind::Meter, at(1, 0, 0).date())
            .unwrap()
            .unwrap();
        assert_eq!(updated, first);
        assert_eq!(Some(current), storage.latest(SourceKind::Meter).unwrap());
    }

    #[test]
    fn test_backup_copies_rows() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::open(dir.path().join("electricity.db")).unwrap();
        storage.append(&meter(at(5, 12, 0), 10, 1)).unwrap();

        let day = at(5, 0, 0).date();
        let path = storage.backup(&dir.path().join("backup"), day).unwrap();
        assert!(path.ends_with("backup/electricity20260105.db"));

        // A second backup on the same day replaces the first
        storage.append(&meter(at(5, 13, 0), 11, 1)).unwrap();
        let path = storage.backup(&dir.path().join("backup"), day).unwrap();

        let copy = SqliteStorage::open(&path).unwrap();
        let latest = copy.latest(SourceKind::Meter).unwrap().unwrap();
        assert_eq!(at(5, 13, 0), latest.captured_at);
    }
}
