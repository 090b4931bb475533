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

//! Registration and typed handles over a [`MetricsBackend`].

use super::{Metric, MetricId, MetricValue, MetricsResult};
use crate::storage::{InMemoryBackend, MetricsBackend};
use std::sync::Arc;

/// Central place where metrics are declared and updated.
///
/// Components register their metrics once, at construction, and keep the
/// returned handles; every later update goes through a handle and never
/// looks the metric up by name again. Cloning the registry shares the
/// backend, so a registry can be handed to several components and read back
/// from any clone, e.g. the scheduler records `leonard/ticks` while the
/// server binary prints it with [`MetricsRegistry::log_summary`] on exit.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    backend: Arc<dyn MetricsBackend>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    /// A registry over an [`InMemoryBackend`].
    pub fn new() -> Self {
        Self::with_backend(Arc::new(InMemoryBackend::new()))
    }

    /// A registry over a custom backend.
    pub fn with_backend(backend: Arc<dyn MetricsBackend>) -> Self {
        Self { backend }
    }

    /// Declares a counter starting at zero.
    pub fn register_counter(
        &self,
        namespace: &str,
        name: &str,
        description: &str,
    ) -> MetricsResult<CounterHandle> {
        let id = MetricId::new(namespace, name);
        self.backend.put_metric(Metric::new(
            id.clone(),
            description,
            "count",
            MetricValue::Counter(0),
        ))?;
        Ok(CounterHandle {
            id,
            backend: self.backend.clone(),
        })
    }

    /// Declares a gauge starting at zero.
    pub fn register_gauge(
        &self,
        namespace: &str,
        name: &str,
        description: &str,
        unit: &str,
    ) -> MetricsResult<GaugeHandle> {
        let id = MetricId::new(namespace, name);
        self.backend.put_metric(Metric::new(
            id.clone(),
            description,
            unit,
            MetricValue::Gauge(0.0),
        ))?;
        Ok(GaugeHandle {
            id,
            backend: self.backend.clone(),
        })
    }

    /// Declares a histogram over the given bucket upper bounds.
    ///
    /// Bounds are sorted before use, so `vec![10.0, 1.0, 5.0]` behaves like
    /// `vec![1.0, 5.0, 10.0]`. A sample lands in the first bucket whose bound
    /// is greater than or equal to it; samples above the last bound only
    /// count towards `count` and `sum`.
    pub fn register_histogram(
        &self,
        namespace: &str,
        name: &str,
        description: &str,
        unit: &str,
        mut bucket_bounds: Vec<f64>,
    ) -> MetricsResult<HistogramHandle> {
        bucket_bounds.sort_by(f64::total_cmp);
        let id = MetricId::new(namespace, name);
        let bucket_counts = vec![0; bucket_bounds.len()];
        self.backend.put_metric(Metric::new(
            id.clone(),
            description,
            unit,
            MetricValue::Histogram {
                count: 0,
                sum: 0.0,
                bucket_bounds,
                bucket_counts,
            },
        ))?;
        Ok(HistogramHandle {
            id,
            backend: self.backend.clone(),
        })
    }

    /// Reads the current value of a metric.
    pub fn value(&self, id: &MetricId) -> MetricsResult<MetricValue> {
        self.backend.get_metric(id).map(|m| m.value)
    }

    /// All metrics, sorted by id.
    pub fn all_metrics(&self) -> Vec<Metric> {
        self.backend.list_all_metrics()
    }

    /// Writes one line per metric to the `info` log.
    pub fn log_summary(&self) {
        for metric in self.all_metrics() {
            match &metric.value {
                MetricValue::Counter(v) => log::info!("{} = {}", metric.id, v),
                MetricValue::Gauge(v) => log::info!("{} = {:.3} {}", metric.id, v, metric.unit),
                MetricValue::Histogram { count, sum, .. } => {
                    let mean = if *count > 0 { sum / *count as f64 } else { 0.0 };
                    log::info!(
                        "{} = {} samples, mean {:.3} {}",
                        metric.id,
                        count,
                        mean,
                        metric.unit
                    );
                }
            }
        }
    }
}

/// Handle to a registered counter.
#[derive(Debug, Clone)]
pub struct CounterHandle {
    id: MetricId,
    backend: Arc<dyn MetricsBackend>,
}

impl CounterHandle {
    /// Adds one.
    pub fn increment(&self) -> MetricsResult<u64> {
        self.increment_by(1)
    }

    /// Adds `delta`.
    pub fn increment_by(&self, delta: u64) -> MetricsResult<u64> {
        self.backend.increment_counter(&self.id, delta)
    }

    /// The current count.
    pub fn get(&self) -> MetricsResult<u64> {
        Ok(self
            .backend
            .get_metric(&self.id)?
            .value
            .as_counter()
            .unwrap_or_default())
    }

    /// Id of the underlying metric.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

/// Handle to a registered gauge.
#[derive(Debug, Clone)]
pub struct GaugeHandle {
    id: MetricId,
    backend: Arc<dyn MetricsBackend>,
}

impl GaugeHandle {
    /// Sets the gauge.
    pub fn set(&self, value: f64) -> MetricsResult<()> {
        self.backend.set_gauge(&self.id, value)
    }

    /// The current value.
    pub fn get(&self) -> MetricsResult<f64> {
        Ok(self
            .backend
            .get_metric(&self.id)?
            .value
            .as_gauge()
            .unwrap_or_default())
    }

    /// Id of the underlying metric.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

/// Handle to a registered histogram.
#[derive(Debug, Clone)]
pub struct HistogramHandle {
    id: MetricId,
    backend: Arc<dyn MetricsBackend>,
}

impl HistogramHandle {
    /// Records a sample.
    pub fn observe(&self, sample: f64) -> MetricsResult<()> {
        self.backend.record_histogram_sample(&self.id, sample)
    }

    /// Number of recorded samples.
    pub fn count(&self) -> MetricsResult<u64> {
        match self.backend.get_metric(&self.id)?.value {
            MetricValue::Histogram { count, .. } => Ok(count),
            _ => Ok(0),
        }
    }

    /// Id of the underlying metric.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_share_backend_with_registry() {
        let registry = MetricsRegistry::new();
        let ticks = registry.register_counter("leonard", "ticks", "ticks run").unwrap();
        ticks.increment().unwrap();
        ticks.increment_by(2).unwrap();

        let clone = registry.clone();
        assert_eq!(
            clone.value(ticks.id()).unwrap(),
            MetricValue::Counter(3)
        );
    }

    #[test]
    fn test_gauge_set_and_get() {
        let registry = MetricsRegistry::new();
        let gauge = registry
            .register_gauge("leonard", "object_count", "live objects", "objects")
            .unwrap();
        gauge.set(12.0).unwrap();
        assert_eq!(gauge.get().unwrap(), 12.0);
    }

    #[test]
    fn test_histogram_buckets_are_cumulative() {
        let registry = MetricsRegistry::new();
        let hist = registry
            .register_histogram("leonard", "dispatch_ms", "dispatch time", "ms", vec![10.0, 1.0, 5.0])
            .unwrap();
        hist.observe(0.5).unwrap();
        hist.observe(4.0).unwrap();
        hist.observe(50.0).unwrap();

        match registry.value(hist.id()).unwrap() {
            MetricValue::Histogram {
                count,
                bucket_bounds,
                bucket_counts,
                ..
            } => {
                assert_eq!(count, 3);
                assert_eq!(bucket_bounds, vec![1.0, 5.0, 10.0]);
                assert_eq!(bucket_counts, vec![1, 2, 2]);
            }
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn test_all_metrics_sorted() {
        let registry = MetricsRegistry::new();
        registry.register_counter("leonard", "zeta", "").unwrap();
        registry.register_counter("leonard", "alpha", "").unwrap();
        let names: Vec<String> = registry.all_metrics().into_iter().map(|m| m.id.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
