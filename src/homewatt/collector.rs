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

//! Fixed-interval poll cycle over all configured sources.
//!
//! Each cycle makes exactly one attempt per source, in the order the sources
//! were configured. Every step that can fail (fetching, looking up today's
//! baseline, storing) is handled at the level of the single source: the
//! failure is logged, counted and sent to the notifier, then the cycle moves
//! on to the next source. Nothing is retried within a cycle.

use crate::clock::Clock;
use crate::delta::daily_delta;
use crate::metrics::CollectorMetrics;
use crate::notify::Notifier;
use crate::reading::{ReadingData, SourceKind, SourceReading};
use crate::source::{Source, SourceError};
use crate::storage::{Storage, StorageError};
use chrono::NaiveDateTime;
use std::error::Error;
use std::fmt::{self, Formatter};
use std::sync::Arc;
use tracing::Instrument;

/// Failure of one step of collecting a single source.
#[derive(Debug)]
pub enum CollectError {
    Fetch(SourceError),
    Baseline(StorageError),
    CounterReset { current: f64, baseline: f64 },
    Store(StorageError),
}

impl CollectError {
    pub fn as_label(&self) -> &'static str {
        match self {
            CollectError::Fetch(e) => e.kind().as_label(),
            CollectError::Baseline(_) => "baseline",
            CollectError::CounterReset { .. } => "counter_reset",
            CollectError::Store(_) => "storage",
        }
    }

    /// Operator message for this failure of the given source.
    pub fn notification(&self, source: SourceKind, now: NaiveDateTime) -> String {
        match self {
            CollectError::Fetch(e) => format!("{} Error: could not retrieve {} data: {}", now, source, e),
            CollectError::Baseline(e) => format!(
                "{} Error: could not read today's first {} reading, daily delta set to 0: {}",
                now, source, e
            ),
            CollectError::CounterReset { current, baseline } => format!(
                "{} Warning: {} counter went backwards ({} < {}), daily delta set to 0",
                now, source, current, baseline
            ),
            CollectError::Store(e) => format!("{} Error: could not save {} data: {}", now, source, e),
        }
    }
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CollectError::Fetch(e) => write!(f, "fetch failed: {}", e),
            CollectError::Baseline(e) => write!(f, "baseline query failed: {}", e),
            CollectError::CounterReset { current, baseline } => {
                write!(f, "counter reset: {} < {}", current, baseline)
            }
            CollectError::Store(e) => write!(f, "append failed: {}", e),
        }
    }
}

impl Error for CollectError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CollectError::Fetch(e) => Some(e),
            CollectError::Baseline(e) | CollectError::Store(e) => Some(e),
            CollectError::CounterReset { .. } => None,
        }
    }
}

/// Failure reported for a source during a cycle.
#[derive(Debug)]
pub struct CollectFailure {
    pub source: SourceKind,
    pub error: CollectError,
}

/// Outcome of a single poll cycle.
#[derive(Debug)]
pub struct CycleReport {
    /// Sequence number of this cycle, starting at 1.
    pub cycle: u64,
    pub persisted: Vec<SourceKind>,
    pub failures: Vec<CollectFailure>,
}

/// Polls every source once per cycle and persists what it gets.
pub struct Collector {
    sources: Vec<Box<dyn Source>>,
    storage: Arc<dyn Storage>,
    notifier: Arc<dyn Notifier>,
    metrics: Option<CollectorMetrics>,
    cycles: u64,
}

impl Collector {
    pub fn new(sources: Vec<Box<dyn Source>>, storage: Arc<dyn Storage>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            sources,
            storage,
            notifier,
            metrics: None,
            cycles: 0,
        }
    }

    pub fn with_metrics(mut self, metrics: CollectorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn sources(&self) -> impl Iterator<Item = SourceKind> + '_ {
        self.sources.iter().map(|s| s.kind())
    }

    /// Run one fetch and store attempt for every source. Never fails, failures
    /// are reported to the notifier and returned in the report. Readings are
    /// stamped with the time their fetch returned.
    pub async fn run_cycle(&mut self, clock: &dyn Clock) -> CycleReport {
        self.cycles += 1;
        let mut report = CycleReport {
            cycle: self.cycles,
            persisted: Vec::new(),
            failures: Vec::new(),
        };

        for source in self.sources.iter() {
            let kind = source.kind();
            let (stored, errors) = self
                .collect(source.as_ref(), clock)
                .instrument(tracing::span!(tracing::Level::DEBUG, "collect", source = %kind))
                .await;

            if stored {
                report.persisted.push(kind);
            }

            for error in errors {
                self.report_failure(kind, &error, clock.now()).await;
                report.failures.push(CollectFailure { source: kind, error });
            }
        }

        tracing::debug!(
            message = "finished collection cycle",
            cycle = report.cycle,
            persisted = report.persisted.len(),
            failures = report.failures.len(),
        );

        report
    }

    /// Fetch, derive and store a single reading. Returns whether the reading was
    /// persisted and every failure encountered on the way.
    async fn collect(&self, source: &dyn Source, clock: &dyn Clock) -> (bool, Vec<CollectError>) {
        let kind = source.kind();
        let mut errors = Vec::new();

        if let Some(m) = &self.metrics {
            m.attempted(kind);
        }

        let data = match source.fetch().await {
            Ok(data) => data,
            Err(e) => {
                errors.push(CollectError::Fetch(e));
                return (false, errors);
            }
        };

        let now = clock.now();
        let data = self.with_daily_delta(data, now, &mut errors);
        let reading = SourceReading::new(now, data);

        match self.storage.append(&reading) {
            Ok(()) => {
                tracing::debug!(message = "stored reading", source = %kind, captured_at = %reading.captured_at);
                if let Some(m) = &self.metrics {
                    m.stored(kind);
                }
                (true, errors)
            }
            Err(e) => {
                errors.push(CollectError::Store(e));
                (false, errors)
            }
        }
    }

    /// Fill in today's consumption for cumulative counters, relative to the first
    /// reading stored today. Other readings are returned unchanged.
    fn with_daily_delta(&self, data: ReadingData, now: NaiveDateTime, errors: &mut Vec<CollectError>) -> ReadingData {
        match data {
            ReadingData::Appliance {
                cumulative_energy_kwh,
                room_temperatures,
                ..
            } => {
                let baseline = match self.storage.first_of_day(SourceKind::Appliance, now.date()) {
                    Ok(Some(SourceReading {
                        data: ReadingData::Appliance {
                            cumulative_energy_kwh: base,
                            ..
                        },
                        ..
                    })) => Some(base),
                    Ok(_) => None,
                    Err(e) => {
                        errors.push(CollectError::Baseline(e));
                        None
                    }
                };

                let delta = daily_delta(cumulative_energy_kwh, baseline);
                if let (true, Some(base)) = (delta.reset, baseline) {
                    errors.push(CollectError::CounterReset {
                        current: cumulative_energy_kwh,
                        baseline: base,
                    });
                }

                ReadingData::Appliance {
                    cumulative_energy_kwh,
                    daily_energy_kwh: delta.value,
                    room_temperatures,
                }
            }
            other => other,
        }
    }

    async fn report_failure(&self, kind: SourceKind, error: &CollectError, now: NaiveDateTime) {
        tracing::error!(message = "collection failure", source = %kind, error = %error);

        if let Some(m) = &self.metrics {
            m.failed(kind, error.as_label());
        }

        self.notifier.notify(&error.notification(kind, now)).await;
    }
}
