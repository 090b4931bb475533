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

use crate::metrics::{Metric, MetricId, MetricType, MetricValue, MetricsError, MetricsResult};
use std::fmt::Debug;
use std::time::Instant;

/// Interface of a metrics store.
///
/// Only [`MetricsBackend::put_metric`], [`MetricsBackend::update_metric`] and
/// the read methods are required; the typed helpers are built on them.
pub trait MetricsBackend: Send + Sync + Debug + 'static {
    /// Stores or replaces a metric.
    fn put_metric(&self, metric: Metric) -> MetricsResult<()>;

    /// Reads a metric by id.
    fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric>;

    /// Mutates a metric's value in place, atomically with respect to other updates.
    fn update_metric(
        &self,
        id: &MetricId,
        update: &mut dyn FnMut(&mut MetricValue) -> MetricsResult<()>,
    ) -> MetricsResult<()>;

    /// Lists every stored metric.
    fn list_all_metrics(&self) -> Vec<Metric>;

    /// Number of stored metrics.
    fn metric_count(&self) -> usize;

    /// Adds `delta` to a counter and returns the new value.
    fn increment_counter(&self, id: &MetricId, delta: u64) -> MetricsResult<u64> {
        let mut out = 0;
        self.update_metric(id, &mut |value| match value {
            MetricValue::Counter(v) => {
                *v = v.saturating_add(delta);
                out = *v;
                Ok(())
            }
            other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Counter,
                found: other.metric_type(),
            }),
        })?;
        Ok(out)
    }

    /// Sets a gauge.
    fn set_gauge(&self, id: &MetricId, new_value: f64) -> MetricsResult<()> {
        self.update_metric(id, &mut |value| match value {
            MetricValue::Gauge(v) => {
                *v = new_value;
                Ok(())
            }
            other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Gauge,
                found: other.metric_type(),
            }),
        })
    }

    /// Records one histogram sample.
    fn record_histogram_sample(&self, id: &MetricId, sample: f64) -> MetricsResult<()> {
        self.update_metric(id, &mut |value| match value {
            MetricValue::Histogram {
                count,
                sum,
                bucket_bounds,
                bucket_counts,
            } => {
                *count += 1;
                *sum += sample;
                for (bound, bucket) in bucket_bounds.iter().zip(bucket_counts.iter_mut()) {
                    if sample <= *bound {
                        *bucket += 1;
                    }
                }
                Ok(())
            }
            other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Histogram,
                found: other.metric_type(),
            }),
        })
    }
}

/// Stamps a metric as updated now.
pub(crate) fn touch(metric: &mut Metric) {
    metric.last_updated = Instant::now();
}
