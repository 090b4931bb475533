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

//! # Leonard Core
//!
//! The foundational crate of the Leonard tick scheduler.
//!
//! It owns the plain data that crosses every boundary of the system (rigid
//! body state, commands, constraints, work packages), the contracts
//! implemented by the outer crates ([`physics::PhysicsEngine`],
//! [`datastore::Datastore`]), the error taxonomy, and the sweep-and-prune
//! broad phase that partitions the world into independent collision groups.
//!
//! Nothing in this crate spawns threads or performs I/O.

#![warn(missing_docs)]

pub mod broadphase;
pub mod command;
pub mod constraint;
pub mod datastore;
pub mod error;
pub mod event;
pub mod math;
pub mod object;
pub mod package;
pub mod physics;

pub use command::Command;
pub use constraint::{Constraint, ConstraintKind};
pub use error::{FatalError, LeonardError, Result};
pub use object::{BodyOverride, CollisionShape, ObjectId, RigidBodyState};
pub use package::{PackageId, PackageIdAllocator, PackageResult, StagedForce, WorkPackage};
