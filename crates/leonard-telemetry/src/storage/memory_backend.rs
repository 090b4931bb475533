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

use crate::metrics::{Metric, MetricId, MetricValue, MetricsError, MetricsResult};
use crate::storage::backend::{touch, MetricsBackend};
use std::collections::HashMap;
use std::sync::RwLock;

/// Metrics kept in a `RwLock<HashMap>`: concurrent readers, one writer.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    storage: RwLock<HashMap<MetricId, Metric>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> MetricsError {
    MetricsError::StorageError("metrics lock poisoned".to_string())
}

impl MetricsBackend for InMemoryBackend {
    fn put_metric(&self, metric: Metric) -> MetricsResult<()> {
        let mut storage = self.storage.write().map_err(|_| poisoned())?;
        storage.insert(metric.id.clone(), metric);
        Ok(())
    }

    fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric> {
        let storage = self.storage.read().map_err(|_| poisoned())?;
        storage
            .get(id)
            .cloned()
            .ok_or_else(|| MetricsError::MetricNotFound(id.clone()))
    }

    fn update_metric(
        &self,
        id: &MetricId,
        update: &mut dyn FnMut(&mut MetricValue) -> MetricsResult<()>,
    ) -> MetricsResult<()> {
        let mut storage = self.storage.write().map_err(|_| poisoned())?;
        let metric = storage
            .get_mut(id)
            .ok_or_else(|| MetricsError::MetricNotFound(id.clone()))?;
        update(&mut metric.value)?;
        touch(metric);
        Ok(())
    }

    fn list_all_metrics(&self) -> Vec<Metric> {
        match self.storage.read() {
            Ok(storage) => {
                let mut all: Vec<Metric> = storage.values().cloned().collect();
                all.sort_by(|a, b| a.id.cmp(&b.id));
                all
            }
            Err(_) => Vec::new(),
        }
    }

    fn metric_count(&self) -> usize {
        self.storage.read().map(|s| s.len()).unwrap_or(0)
    }
}
