//! # Telemetry batch types
//!
//! ## Responsibility
//! The in-memory shapes handed to a sink: [`MetricBatch`] from the rate-limit
//! poller and [`LogBatch`] from the webhook transducer. Both are built fresh
//! per cycle/request and serialize to JSON for the line-oriented sink.
//!
//! ## Guarantees
//! - [`Attributes`] keeps insertion order; re-putting a key overwrites in place.
//! - Timestamps are nanoseconds since the Unix epoch.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Current wall-clock time in nanoseconds since the Unix epoch.
///
/// Clocks set before 1970 report `0` rather than failing.
pub fn now_unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// Ordered string key/value map with last-writer-wins `put`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `key = value`, replacing the value if `key` is already present.
    pub fn put_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Name, version and attributes of the instrumentation that produced a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InstrumentationScope {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl InstrumentationScope {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            attributes: Attributes::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// One numeric observation with its labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberDataPoint {
    pub time_unix_nano: u64,
    pub value: f64,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricData {
    Gauge { data_points: Vec<NumberDataPoint> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub name: String,
    pub unit: String,
    #[serde(flatten)]
    pub data: MetricData,
}

impl Metric {
    /// A gauge metric holding a single data point.
    pub fn gauge(name: impl Into<String>, unit: impl Into<String>, point: NumberDataPoint) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            data: MetricData::Gauge {
                data_points: vec![point],
            },
        }
    }

    pub fn data_points(&self) -> &[NumberDataPoint] {
        match &self.data {
            MetricData::Gauge { data_points } => data_points,
        }
    }
}

/// Metrics from one scope, handed to a [`MetricsSink`](crate::sink::MetricsSink).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricBatch {
    pub scope: InstrumentationScope,
    pub metrics: Vec<Metric>,
}

impl MetricBatch {
    pub fn new(scope: InstrumentationScope) -> Self {
        Self {
            scope,
            metrics: Vec::new(),
        }
    }

    /// Total number of data points across all metrics.
    pub fn data_point_count(&self) -> usize {
        self.metrics.iter().map(|m| m.data_points().len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resource {
    pub attributes: Attributes,
}

/// One captured line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub observed_time_unix_nano: u64,
    pub body: String,
}

/// Logs from one request, handed to a [`LogsSink`](crate::sink::LogsSink).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogBatch {
    pub resource: Resource,
    pub scope: InstrumentationScope,
    pub records: Vec<LogRecord>,
}

impl LogBatch {
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
