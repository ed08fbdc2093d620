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

use crate::reading::SourceKind;
use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::error::Error;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Prometheus metrics updated by the collector for every attempt to read a source.
#[derive(Clone, Debug)]
pub struct CollectorMetrics {
    collections: IntCounterVec,
    errors: IntCounterVec,
    last_reading: GaugeVec,
}

impl CollectorMetrics {
    pub fn new(reg: &Registry) -> Result<Self, prometheus::Error> {
        let collections = IntCounterVec::new(
            Opts::new("homewatt_collections_total", "Number of attempted reads by source"),
            &["source"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("homewatt_errors_total", "Number of failures by source and type"),
            &["source", "kind"],
        )?;
        let last_reading = GaugeVec::new(
            Opts::new("homewatt_last_read_timestamp", "Timestamp of last stored reading by source"),
            &["source"],
        )?;

        reg.register(Box::new(collections.clone()))?;
        reg.register(Box::new(errors.clone()))?;
        reg.register(Box::new(last_reading.clone()))?;

        Ok(Self {
            collections,
            errors,
            last_reading,
        })
    }

    pub fn attempted(&self, source: SourceKind) {
        self.collections.with_label_values(&[source.as_label()]).inc();
    }

    pub fn failed(&self, source: SourceKind, kind: &str) {
        self.errors.with_label_values(&[source.as_label(), kind]).inc();
    }

    pub fn stored(&self, source: SourceKind) {
        // If we can't get the number of seconds since the epoch, skip the update
        let _ = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| self.last_reading.with_label_values(&[source.as_label()]).set(d.as_secs_f64()));
    }
}

/// Error exposing Prometheus metrics in the text exposition format.
#[derive(Debug)]
pub struct ExpositionError(prometheus::Error);

impl fmt::Display for ExpositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unable to encode Prometheus metrics: {}", self.0)
    }
}

impl Error for ExpositionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

/// Wrapper that exposes metrics from a Prometheus registry in the text exposition format.
#[derive(Debug)]
pub struct MetricsExposition {
    registry: Registry,
}

impl MetricsExposition {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Gather all metrics from the registry and encode them in the Prometheus text
    /// exposition format.
    pub fn encoded_text(&self) -> Result<Vec<u8>, ExpositionError> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        tracing::debug!(
            message = "encoding metric families to text exposition format",
            num_metrics = metric_families.len(),
        );

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(ExpositionError)
            .map(|_| buffer)
    }
}
