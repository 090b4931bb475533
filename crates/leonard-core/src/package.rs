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

//! Work packages: the only data that crosses the worker boundary.
//!
//! A [`WorkPackage`] is immutable once built. When a worker abandons one, the
//! package is dropped and a fresh package with a new [`PackageId`] is built
//! for the same objects via [`WorkPackage::rebuild`]; the id of an abandoned
//! package is never issued again.

use crate::constraint::Constraint;
use crate::error::{LeonardError, Result};
use crate::math::Vec3;
use crate::object::{ObjectId, RigidBodyState};
use crate::physics::ContactPair;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A unique, monotonically increasing package identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageId(pub u64);

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wp-{}", self.0)
    }
}

/// Hands out [`PackageId`]s. One allocator per scheduler instance.
#[derive(Debug)]
pub struct PackageIdAllocator {
    next: AtomicU64,
}

impl PackageIdAllocator {
    /// Creates an allocator whose first id is `1`.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns a fresh id, strictly greater than every id returned before.
    pub fn next_id(&self) -> PackageId {
        PackageId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for PackageIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// A one-shot force and torque, already in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StagedForce {
    /// Force in newtons.
    pub force: Vec3,
    /// Torque in newton metres.
    pub torque: Vec3,
}

impl StagedForce {
    /// Returns `true` if both components are exactly zero.
    pub fn is_zero(&self) -> bool {
        self.force == Vec3::ZERO && self.torque == Vec3::ZERO
    }
}

impl std::ops::Add for StagedForce {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            force: self.force + rhs.force,
            torque: self.torque + rhs.torque,
        }
    }
}

/// A self-contained unit of simulation work for one collision group.
#[derive(Debug, Clone)]
pub struct WorkPackage {
    /// Unique id, never reused.
    pub id: PackageId,
    /// The collision group, sorted.
    pub object_ids: Vec<ObjectId>,
    /// Deep copy of every object in the group at build time.
    pub snapshot: BTreeMap<ObjectId, RigidBodyState>,
    /// One-shot forces consumed from the world when this package (or the one
    /// it replaces) was first built.
    pub forces: BTreeMap<ObjectId, StagedForce>,
    /// Constraints whose two bodies are both in the group.
    pub constraints: Vec<Constraint>,
    /// Simulated time to advance, in seconds.
    pub dt: f64,
    /// Upper bound on internal engine substeps.
    pub max_substeps: u32,
    /// When the package was built.
    pub issued_at: Instant,
    /// How many packages for this group were abandoned before this one.
    pub attempt: u32,
}

impl WorkPackage {
    /// Builds a first-attempt package.
    pub fn new(
        id: PackageId,
        snapshot: BTreeMap<ObjectId, RigidBodyState>,
        forces: BTreeMap<ObjectId, StagedForce>,
        dt: f64,
        max_substeps: u32,
    ) -> Self {
        Self {
            id,
            object_ids: snapshot.keys().copied().collect(),
            snapshot,
            forces,
            constraints: Vec::new(),
            dt,
            max_substeps,
            issued_at: Instant::now(),
            attempt: 0,
        }
    }

    /// Attaches the group's constraints.
    pub fn with_constraints(mut self, constraints: Vec<Constraint>) -> Self {
        self.constraints = constraints;
        self
    }

    /// Builds the replacement for an abandoned package.
    ///
    /// `snapshot` must be re-read from the world for exactly
    /// `abandoned.object_ids`. The staged forces, constraints and timestep
    /// carry over unchanged.
    pub fn rebuild(
        abandoned: &WorkPackage,
        id: PackageId,
        snapshot: BTreeMap<ObjectId, RigidBodyState>,
    ) -> Self {
        Self {
            id,
            object_ids: snapshot.keys().copied().collect(),
            snapshot,
            forces: abandoned.forces.clone(),
            constraints: abandoned.constraints.clone(),
            dt: abandoned.dt,
            max_substeps: abandoned.max_substeps,
            issued_at: Instant::now(),
            attempt: abandoned.attempt + 1,
        }
    }

    /// Number of objects in the package.
    pub fn len(&self) -> usize {
        self.object_ids.len()
    }

    /// Returns `true` if the package carries no objects.
    pub fn is_empty(&self) -> bool {
        self.object_ids.is_empty()
    }
}

/// What a worker hands back for a completed package.
#[derive(Debug, Clone, Default)]
pub struct PackageResult {
    /// Updated state of every object in the package.
    pub states: BTreeMap<ObjectId, RigidBodyState>,
    /// Contacts resolved during the step.
    pub contacts: Vec<ContactPair>,
}

impl PackageResult {
    /// Checks engine output against the package it was computed for.
    ///
    /// Every object of the package must come back with a finite, valid
    /// state. Orientations are re-normalized, and states for ids outside the
    /// package are dropped. Anything else is reported as
    /// [`LeonardError::Engine`], which abandons the attempt like any other
    /// engine failure, e.g. a solver that diverged to `NaN` gets its group
    /// rebuilt and retried instead of poisoning the world.
    pub fn checked(mut self, package: &WorkPackage) -> Result<Self> {
        self.states.retain(|id, _| package.snapshot.contains_key(id));
        for id in &package.object_ids {
            let state = self.states.get_mut(id).ok_or_else(|| {
                LeonardError::Engine(format!("{} came back without {id}", package.id))
            })?;
            state.validate().map_err(|e| {
                LeonardError::Engine(format!("{} returned a bad state for {id}: {e}", package.id))
            })?;
            *state = state.normalized();
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Quaternion;

    #[test]
    fn test_allocator_is_monotonic() {
        let alloc = PackageIdAllocator::new();
        let a = alloc.next_id();
        let b = alloc.next_id();
        assert!(b > a);
        assert_eq!(a, PackageId(1));
    }

    #[test]
    fn test_rebuild_keeps_forces_and_bumps_attempt() {
        let alloc = PackageIdAllocator::new();
        let mut snapshot = BTreeMap::new();
        snapshot.insert(ObjectId(2), RigidBodyState::default());
        let mut forces = BTreeMap::new();
        forces.insert(
            ObjectId(2),
            StagedForce {
                force: Vec3::X,
                torque: Vec3::ZERO,
            },
        );
        let first = WorkPackage::new(alloc.next_id(), snapshot.clone(), forces, 0.5, 4);
        let second = WorkPackage::rebuild(&first, alloc.next_id(), snapshot);

        assert_ne!(first.id, second.id);
        assert_eq!(second.attempt, 1);
        assert_eq!(second.forces, first.forces);
        assert_eq!(second.dt, 0.5);
        assert_eq!(second.object_ids, vec![ObjectId(2)]);
    }

    #[test]
    fn test_rebuild_keeps_constraints() {
        let alloc = PackageIdAllocator::new();
        let snapshot: BTreeMap<_, _> = [
            (ObjectId(1), RigidBodyState::default()),
            (ObjectId(2), RigidBodyState::default()),
        ]
        .into_iter()
        .collect();
        let joint = Constraint::point_to_point(ObjectId(1), ObjectId(2), Vec3::X, -Vec3::X);
        let first = WorkPackage::new(alloc.next_id(), snapshot.clone(), BTreeMap::new(), 0.1, 1)
            .with_constraints(vec![joint]);
        let second = WorkPackage::rebuild(&first, alloc.next_id(), snapshot);
        assert_eq!(second.constraints, vec![joint]);
    }

    fn single_body_package() -> WorkPackage {
        let snapshot = [(ObjectId(1), RigidBodyState::default())].into_iter().collect();
        WorkPackage::new(PackageId(1), snapshot, BTreeMap::new(), 0.1, 1)
    }

    #[test]
    fn test_checked_normalizes_orientation_and_drops_foreign_ids() {
        let package = single_body_package();
        let mut result = PackageResult::default();
        result.states.insert(
            ObjectId(1),
            RigidBodyState {
                orientation: Quaternion::new(0.0, 0.0, 0.0, 2.0),
                ..Default::default()
            },
        );
        result.states.insert(ObjectId(9), RigidBodyState::default());

        let checked = result.checked(&package).unwrap();

        assert_eq!(checked.states.len(), 1);
        assert_eq!(checked.states[&ObjectId(1)].orientation, Quaternion::IDENTITY);
    }

    #[test]
    fn test_checked_rejects_non_finite_and_missing_states() {
        let package = single_body_package();
        let mut diverged = PackageResult::default();
        diverged.states.insert(
            ObjectId(1),
            RigidBodyState {
                linear_velocity: Vec3::new(f64::INFINITY, 0.0, 0.0),
                ..Default::default()
            },
        );
        assert!(matches!(
            diverged.checked(&package),
            Err(LeonardError::Engine(_))
        ));
        assert!(matches!(
            PackageResult::default().checked(&package),
            Err(LeonardError::Engine(_))
        ));
    }
}
