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

use crate::world::CommandFailure;
use std::time::Duration;

/// Phases of one tick, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPhase {
    /// Between ticks.
    #[default]
    Idle,
    /// Applying queued commands.
    DrainCommands,
    /// Partitioning objects into collision groups.
    ComputeGroups,
    /// Snapshotting groups into work packages.
    BuildPackages,
    /// Waiting for the executor.
    Dispatch,
    /// Committing results.
    Merge,
}

/// Summary of one committed tick.
#[derive(Debug, Default)]
pub struct TickReport {
    /// The tick counter after this tick.
    pub tick: u64,
    /// Commands that took effect.
    pub commands_applied: usize,
    /// Commands that were rejected.
    pub command_failures: Vec<CommandFailure>,
    /// Collision groups computed.
    pub groups: usize,
    /// Packages built, not counting rebuilt replacements.
    pub packages: usize,
    /// Packages abandoned and rebuilt.
    pub retries: u32,
    /// Workers recycled or replaced during the tick.
    pub worker_restarts: u32,
    /// Contacts published.
    pub contacts: usize,
    /// Older, undrained contact events discarded to stay within the backlog.
    pub contacts_dropped: usize,
    /// Datastore writes or deletes that failed.
    pub datastore_failures: usize,
    /// Wall time of the tick.
    pub elapsed: Duration,
}
