// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Metric identifiers, values, and errors.

pub mod registry;

use std::fmt::{self, Display};
use std::time::Instant;

/// A structured metric identifier: `namespace:name[k=v,...]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId {
    /// The subsystem, e.g. `"leonard"` or `"dispatch"`.
    pub namespace: String,
    /// The metric name, e.g. `"tick_time_ms"`.
    pub name: String,
    /// Dimensional labels, kept sorted by key.
    pub labels: Vec<(String, String)>,
}

impl MetricId {
    /// Creates an unlabeled id.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels: Vec::new(),
        }
    }

    /// Adds a label, keeping labels sorted by key.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self.labels.sort_by(|a, b| a.0.cmp(&b.0));
        self
    }
}

impl Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)?;
        if !self.labels.is_empty() {
            let labels: Vec<String> = self.labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
            write!(f, "[{}]", labels.join(","))?;
        }
        Ok(())
    }
}

/// The kind of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    /// Monotonic count.
    Counter,
    /// Value that moves up and down.
    Gauge,
    /// Distribution of samples over fixed buckets.
    Histogram,
}

/// The current value of a metric.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// A monotonic count.
    Counter(u64),
    /// A point-in-time value.
    Gauge(f64),
    /// Bucketed samples. `bucket_counts[i]` counts samples `<= bucket_bounds[i]`.
    Histogram {
        /// Number of recorded samples.
        count: u64,
        /// Sum of recorded samples.
        sum: f64,
        /// Upper bounds of the buckets, ascending.
        bucket_bounds: Vec<f64>,
        /// Cumulative count per bucket.
        bucket_counts: Vec<u64>,
    },
}

impl MetricValue {
    /// The [`MetricType`] of this value.
    pub fn metric_type(&self) -> MetricType {
        match self {
            MetricValue::Counter(_) => MetricType::Counter,
            MetricValue::Gauge(_) => MetricType::Gauge,
            MetricValue::Histogram { .. } => MetricType::Histogram,
        }
    }

    /// Returns the counter value, if this is a counter.
    pub fn as_counter(&self) -> Option<u64> {
        match self {
            MetricValue::Counter(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the gauge value, if this is a gauge.
    pub fn as_gauge(&self) -> Option<f64> {
        match self {
            MetricValue::Gauge(v) => Some(*v),
            _ => None,
        }
    }
}

/// A registered metric.
#[derive(Debug, Clone)]
pub struct Metric {
    /// Identity of the metric.
    pub id: MetricId,
    /// Human readable description.
    pub description: String,
    /// Unit of measurement.
    pub unit: String,
    /// Current value.
    pub value: MetricValue,
    /// Last time the value changed.
    pub last_updated: Instant,
}

impl Metric {
    /// Creates a metric with the given initial value.
    pub fn new(
        id: MetricId,
        description: impl Into<String>,
        unit: impl Into<String>,
        value: MetricValue,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            unit: unit.into(),
            value,
            last_updated: Instant::now(),
        }
    }
}

/// Result alias for metric operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Errors of the metrics system.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricsError {
    /// No metric is registered under this id.
    MetricNotFound(MetricId),
    /// The operation does not apply to this kind of metric.
    TypeMismatch {
        /// The kind the operation needs.
        expected: MetricType,
        /// The kind that is registered.
        found: MetricType,
    },
    /// The backend failed.
    StorageError(String),
}

impl Display for MetricsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricsError::MetricNotFound(id) => write!(f, "Metric not found: {id}"),
            MetricsError::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {expected:?}, found {found:?}")
            }
            MetricsError::StorageError(msg) => write!(f, "Storage error: {msg}"),
        }
    }
}

impl std::error::Error for MetricsError {}
