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

//! Scope timers that record into a histogram on drop.

use crate::metrics::registry::HistogramHandle;
use std::time::{Duration, Instant};

/// Measures a scope and records the elapsed milliseconds into a histogram
/// when dropped, including on early return.
pub struct ScopedMetricTimer<'a> {
    started: Instant,
    histogram: &'a HistogramHandle,
}

impl<'a> ScopedMetricTimer<'a> {
    /// Starts timing immediately.
    pub fn new(histogram: &'a HistogramHandle) -> Self {
        Self {
            started: Instant::now(),
            histogram,
        }
    }

    /// Time since the timer started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for ScopedMetricTimer<'_> {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        if let Err(e) = self.histogram.observe(elapsed_ms) {
            log::warn!("failed to record {}: {}", self.histogram.id(), e);
        }
    }
}
