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

//! Execution backends for work packages.
//!
//! [`InlineExecutor`] runs packages on one engine in the calling thread.
//! [`WorkerPool`] fans them out over worker threads, each owning its own
//! engine, and survives worker crashes, hangs and scheduled restarts by
//! abandoning the affected package and running a rebuilt replacement.

#![warn(missing_docs)]

mod config;
mod executor;
pub mod lifecycle;
mod pool;
mod worker;

pub use config::DispatchConfig;
pub use executor::{
    ensure_disjoint, DispatchFailure, DispatchOutcome, InlineExecutor, PackageExecutor, RebuildFn,
};
pub use lifecycle::WorkerLifecycle;
pub use pool::WorkerPool;
