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

//! The authoritative tick scheduler of the Leonard physics server.
//!
//! Each call to [`Scheduler::step`] drains queued commands into the
//! [`WorldState`], partitions live objects into collision groups, snapshots
//! each group into a work package, runs the packages on the strategy's
//! executor and merges the results back. Clients interact through a
//! [`LeonardHandle`].

#![warn(missing_docs)]

mod config;
mod handle;
mod queue;
mod report;
mod scheduler;
mod strategy;
mod view;
pub mod world;

pub use config::SchedulerConfig;
pub use handle::LeonardHandle;
pub use queue::CommandQueue;
pub use report::{TickPhase, TickReport};
pub use scheduler::{Scheduler, DEFAULT_CONTACT_BACKLOG};
pub use strategy::SchedulingStrategy;
pub use view::StateView;
pub use world::{ApplyReport, CommandFailure, WorldState};
