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

//! Per-worker restart state machine.
//!
//! ```text
//! Running(n) --complete--> Running(n - 1)      n > 1
//! Running(1) --complete--> Draining
//! Running(_) --failure---> Draining
//! Draining   --stopped---> Restarting
//! Restarting --spawned---> Running(budget)
//! ```

/// Where a worker is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerLifecycle {
    /// Accepting packages; `steps_left` more may complete before recycling.
    Running {
        /// Packages left in this lifetime.
        steps_left: u32,
    },
    /// No longer accepting work, waiting to be stopped.
    Draining,
    /// Stopped, a replacement is being brought up.
    Restarting,
}

impl WorkerLifecycle {
    /// A fresh lifetime with the given budget. A zero budget is treated as one.
    pub fn fresh(budget: u32) -> Self {
        Self::Running {
            steps_left: budget.max(1),
        }
    }

    /// Returns `true` if the worker may take a package.
    pub fn accepts_work(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    /// Records one completed package. Returns `true` once the budget is
    /// exhausted and the worker has moved to [`WorkerLifecycle::Draining`].
    pub fn complete_package(&mut self) -> bool {
        match *self {
            Self::Running { steps_left } if steps_left > 1 => {
                *self = Self::Running {
                    steps_left: steps_left - 1,
                };
                false
            }
            Self::Running { .. } => {
                *self = Self::Draining;
                true
            }
            _ => false,
        }
    }

    /// Takes the worker out of rotation after a failure.
    pub fn fail(&mut self) {
        *self = Self::Draining;
    }

    /// The worker thread has been stopped.
    pub fn stopped(&mut self) {
        if *self == Self::Draining {
            *self = Self::Restarting;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_counts_down_to_draining() {
        let mut lifecycle = WorkerLifecycle::fresh(2);
        assert!(!lifecycle.complete_package());
        assert_eq!(lifecycle, WorkerLifecycle::Running { steps_left: 1 });
        assert!(lifecycle.complete_package());
        assert_eq!(lifecycle, WorkerLifecycle::Draining);
        assert!(!lifecycle.accepts_work());

        lifecycle.stopped();
        assert_eq!(lifecycle, WorkerLifecycle::Restarting);
    }

    #[test]
    fn test_zero_budget_still_runs_one_package() {
        let mut lifecycle = WorkerLifecycle::fresh(0);
        assert!(lifecycle.accepts_work());
        assert!(lifecycle.complete_package());
    }

    #[test]
    fn test_stopped_ignored_while_running() {
        let mut lifecycle = WorkerLifecycle::fresh(3);
        lifecycle.stopped();
        assert!(lifecycle.accepts_work());
        lifecycle.fail();
        assert_eq!(lifecycle, WorkerLifecycle::Draining);
    }
}
