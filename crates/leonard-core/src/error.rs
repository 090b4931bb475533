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

//! Error taxonomy shared by every Leonard crate.
//!
//! Per-command and per-object errors ([`LeonardError::Validation`],
//! [`LeonardError::NotFound`], [`LeonardError::AlreadyExists`]) are reported
//! individually and never abort sibling work. [`LeonardError::WorkerFailure`]
//! triggers abandonment and retry inside the dispatcher. Only
//! [`LeonardError::Fatal`] aborts a tick.

use crate::object::ObjectId;
use crate::package::PackageId;
use thiserror::Error;

/// The result type used throughout the scheduler.
pub type Result<T, E = LeonardError> = std::result::Result<T, E>;

/// All errors the scheduler and its collaborators can report.
#[derive(Debug, Error)]
pub enum LeonardError {
    /// A command or argument was malformed (non-finite floats, negative mass...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation referenced an object that does not exist.
    #[error("object {0} not found")]
    NotFound(ObjectId),

    /// A spawn used an id that is already live or already pending.
    #[error("object {0} already exists")]
    AlreadyExists(ObjectId),

    /// A worker crashed, disconnected, timed out, or its engine failed.
    #[error("worker {worker} failed on package {package}: {reason}")]
    WorkerFailure {
        /// Sequence number of the failed worker.
        worker: u64,
        /// The package that was in flight.
        package: PackageId,
        /// Human readable cause.
        reason: String,
    },

    /// A systemic failure that aborts the current tick.
    #[error(transparent)]
    Fatal(#[from] FatalError),

    /// The physics engine rejected or failed a step.
    #[error("physics engine error: {0}")]
    Engine(String),

    /// The datastore could not read, write, or decode a record.
    #[error("datastore error: {0}")]
    Datastore(String),
}

impl LeonardError {
    /// Shorthand for a [`LeonardError::Validation`] error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Returns `true` if this error must abort the current tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Pool-level failures that cannot be recovered by retrying.
#[derive(Debug, Error)]
pub enum FatalError {
    /// A collision group was abandoned more often than the configured ceiling.
    #[error("collision group {objects:?} abandoned {attempts} times (ceiling {ceiling})")]
    RetryCeilingExceeded {
        /// Objects of the group that kept failing.
        objects: Vec<ObjectId>,
        /// Number of abandoned attempts.
        attempts: u32,
        /// The configured ceiling.
        ceiling: u32,
    },

    /// No worker could be brought up to take pending work.
    #[error("worker pool exhausted: {0}")]
    PoolExhausted(String),
}
