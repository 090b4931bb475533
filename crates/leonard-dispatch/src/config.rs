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

use leonard_core::error::{LeonardError, Result};
use std::time::Duration;

/// Configuration of a [`WorkerPool`](crate::WorkerPool).
///
/// The defaults suit a desktop demo. A headless server with many small
/// groups would rather run more workers with a shorter timeout, e.g.
/// `workers: 16` and `timeout: Duration::from_millis(500)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Number of worker threads kept alive.
    pub workers: usize,
    /// Lower bound of the per-worker package budget.
    pub restart_min: u32,
    /// Upper bound of the per-worker package budget, inclusive.
    pub restart_max: u32,
    /// How long a worker may hold a package before it is abandoned.
    pub timeout: Duration,
    /// How many times one collision group may be abandoned within a batch
    /// before dispatch fails, e.g. `3` lets a group run at most four times
    /// (the first package plus three rebuilds).
    pub retry_ceiling: u32,
    /// Seed for budget draws. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            restart_min: 100,
            restart_max: 200,
            timeout: Duration::from_secs(5),
            retry_ceiling: 16,
            seed: None,
        }
    }
}

impl DispatchConfig {
    /// Rejects configurations the pool cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(LeonardError::validation("worker pool needs at least one worker"));
        }
        if self.restart_min == 0 || self.restart_min > self.restart_max {
            return Err(LeonardError::validation(format!(
                "restart range [{}, {}] is empty or starts at zero",
                self.restart_min, self.restart_max
            )));
        }
        if self.timeout.is_zero() {
            return Err(LeonardError::validation("dispatch timeout must be positive"));
        }
        if self.retry_ceiling == 0 {
            return Err(LeonardError::validation("retry ceiling must be at least 1"));
        }
        Ok(())
    }
}
