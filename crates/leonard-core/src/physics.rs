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

//! The narrow capability every rigid-body integrator must provide.

use crate::constraint::Constraint;
use crate::error::{LeonardError, Result};
use crate::math::Vec3;
use crate::object::{ObjectId, RigidBodyState};
use crate::package::{PackageResult, WorkPackage};

/// A resolved contact between two bodies of the same package.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPair {
    /// The first body, always the smaller id.
    pub a: ObjectId,
    /// The second body.
    pub b: ObjectId,
    /// World-space contact point.
    pub point: Vec3,
    /// Contact normal pointing from `a` to `b`.
    pub normal: Vec3,
    /// Penetration depth at the time of detection.
    pub depth: f64,
}

/// A rigid-body integrator.
///
/// Engines hold bodies only between [`PhysicsEngine::reset`] calls; all
/// durable state lives in the scheduler's world. One instance is owned by
/// exactly one worker and is never shared.
pub trait PhysicsEngine: Send {
    /// A short name for logs.
    fn name(&self) -> &'static str;

    /// Drops every body and contact.
    fn reset(&mut self);

    /// Inserts or replaces a body, building its collider from the shape.
    fn set_body_state(&mut self, id: ObjectId, state: &RigidBodyState) -> Result<()>;

    /// Reads a body back.
    fn body_state(&self, id: ObjectId) -> Option<RigidBodyState>;

    /// Accumulates a force and torque acting over the next [`PhysicsEngine::step`].
    fn apply_force(&mut self, id: ObjectId, force: Vec3, torque: Vec3) -> Result<()>;

    /// Adds a joint between two loaded bodies, dropped again by
    /// [`PhysicsEngine::reset`].
    ///
    /// Engines without joint support keep the default, which refuses every
    /// constraint so that a constrained group is never stepped as if it were
    /// free.
    fn add_constraint(&mut self, constraint: &Constraint) -> Result<()> {
        Err(LeonardError::Engine(format!(
            "{} does not support constraints (between {} and {})",
            self.name(),
            constraint.a,
            constraint.b
        )))
    }

    /// Advances every body by `dt` seconds using at most `max_substeps`
    /// internal steps, then clears accumulated forces.
    fn step(&mut self, dt: f64, max_substeps: u32) -> Result<()>;

    /// Contacts resolved during the last step.
    fn contacts(&self) -> Vec<ContactPair>;

    /// Runs one package to completion.
    ///
    /// Loads the snapshot into a clean engine, adds the constraints, applies
    /// the staged forces, steps once, and reads back every object of the
    /// package.
    fn step_package(&mut self, package: &WorkPackage) -> Result<PackageResult> {
        self.reset();
        for (id, state) in &package.snapshot {
            self.set_body_state(*id, state)?;
        }
        for constraint in &package.constraints {
            self.add_constraint(constraint)?;
        }
        for (id, staged) in &package.forces {
            if package.snapshot.contains_key(id) {
                self.apply_force(*id, staged.force, staged.torque)?;
            }
        }
        self.step(package.dt, package.max_substeps)?;

        let mut states = std::collections::BTreeMap::new();
        for id in &package.object_ids {
            let state = self.body_state(*id).ok_or_else(|| {
                LeonardError::Engine(format!("{} lost body {id} during step", self.name()))
            })?;
            states.insert(*id, state);
        }
        Ok(PackageResult {
            states,
            contacts: self.contacts(),
        })
    }
}

/// Builds a fresh engine for every worker lifetime.
pub trait EngineFactory: Send + Sync {
    /// Creates a new, empty engine.
    fn create(&self) -> Box<dyn PhysicsEngine>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> Box<dyn PhysicsEngine> + Send + Sync,
{
    fn create(&self) -> Box<dyn PhysicsEngine> {
        self()
    }
}
