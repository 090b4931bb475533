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

//! A small, dependency-free rigid-body integrator.
//!
//! Each substep integrates velocities (forces, torques, gravity), resolves
//! contacts inside the loaded body set, integrates positions and
//! orientations, and finally pulls jointed bodies back together. Accumulated
//! forces act for the whole step and are cleared afterwards.

mod narrow_phase;
mod solver;

pub use narrow_phase::{ContactManifold, NarrowPhase, PlacedShape};
pub use solver::ImpulseSolver;

use leonard_core::constraint::{Constraint, ConstraintKind};
use leonard_core::error::{LeonardError, Result};
use leonard_core::math::Vec3;
use leonard_core::object::{CollisionShape, ObjectId, RigidBodyState};
use leonard_core::physics::{ContactPair, PhysicsEngine};
use std::collections::BTreeMap;

/// Tuning of the native engine.
#[derive(Debug, Clone, Copy)]
pub struct NativeEngineConfig {
    /// Constant acceleration applied to every dynamic body.
    pub gravity: Vec3,
    /// Preferred number of substeps per simulated second.
    pub substep_rate: f64,
}

impl Default for NativeEngineConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::ZERO,
            substep_rate: 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Body {
    state: RigidBodyState,
    force: Vec3,
    torque: Vec3,
}

/// The built-in [`PhysicsEngine`].
#[derive(Debug, Default)]
pub struct NativePhysicsEngine {
    config: NativeEngineConfig,
    narrow_phase: NarrowPhase,
    solver: ImpulseSolver,
    bodies: BTreeMap<ObjectId, Body>,
    constraints: Vec<Constraint>,
    contacts: BTreeMap<(ObjectId, ObjectId), ContactPair>,
}

impl NativePhysicsEngine {
    /// Creates an engine with the given configuration.
    pub fn new(config: NativeEngineConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Number of substeps used to advance `dt` seconds.
    pub fn substeps_for(&self, dt: f64, max_substeps: u32) -> u32 {
        let wanted = (dt * self.config.substep_rate).ceil();
        let wanted = if wanted.is_finite() && wanted >= 1.0 {
            wanted.min(u32::MAX as f64) as u32
        } else {
            1
        };
        wanted.clamp(1, max_substeps.max(1))
    }

    fn integrate_velocities(&mut self, h: f64) {
        let gravity = self.config.gravity;
        for body in self.bodies.values_mut() {
            let s = &mut body.state;
            if s.is_static() {
                continue;
            }
            let lin_acc = body.force * s.inverse_mass + gravity;
            s.linear_velocity += (lin_acc * h).component_mul(s.linear_lock);
            let ang_acc = body.torque * inverse_inertia(s);
            s.angular_velocity += (ang_acc * h).component_mul(s.angular_lock);
        }
    }

    fn solve_contacts(&mut self) {
        let ids: Vec<ObjectId> = self.bodies.keys().copied().collect();
        for (i, &id_a) in ids.iter().enumerate() {
            for &id_b in &ids[i + 1..] {
                let (Some(a), Some(b)) = (self.bodies.get(&id_a), self.bodies.get(&id_b)) else {
                    continue;
                };
                let (mut sa, mut sb) = (a.state, b.state);
                if sa.is_static() && sb.is_static() {
                    continue;
                }
                let pa = PlacedShape::new(sa.shape, sa.scale, sa.position, sa.orientation);
                let pb = PlacedShape::new(sb.shape, sb.scale, sb.position, sb.orientation);
                let Some(manifold) = self.narrow_phase.detect(&pa, &pb) else {
                    continue;
                };
                self.solver.resolve(&mut sa, &mut sb, &manifold);
                self.contacts.insert(
                    (id_a, id_b),
                    ContactPair {
                        a: id_a,
                        b: id_b,
                        point: manifold.point,
                        normal: manifold.normal,
                        depth: manifold.depth,
                    },
                );
                if let Some(a) = self.bodies.get_mut(&id_a) {
                    a.state = sa;
                }
                if let Some(b) = self.bodies.get_mut(&id_b) {
                    b.state = sb;
                }
            }
        }
    }

    fn solve_constraints(&mut self) {
        for constraint in &self.constraints {
            let (Some(a), Some(b)) = (self.bodies.get(&constraint.a), self.bodies.get(&constraint.b))
            else {
                continue;
            };
            let (mut sa, mut sb) = (a.state, b.state);
            match constraint.kind {
                ConstraintKind::PointToPoint { pivot_a, pivot_b } => {
                    self.solver.resolve_point_joint(&mut sa, &mut sb, pivot_a, pivot_b);
                }
            }
            if let Some(a) = self.bodies.get_mut(&constraint.a) {
                a.state = sa;
            }
            if let Some(b) = self.bodies.get_mut(&constraint.b) {
                b.state = sb;
            }
        }
    }

    fn integrate_positions(&mut self, h: f64) {
        for body in self.bodies.values_mut() {
            let s = &mut body.state;
            if s.is_static() {
                continue;
            }
            s.position += s.linear_velocity * h;
            s.orientation = s.orientation.integrate(s.angular_velocity, h);
        }
    }
}

/// Scalar inverse moment of inertia, approximated per shape.
fn inverse_inertia(state: &RigidBodyState) -> f64 {
    let im = state.inverse_mass;
    match state.shape {
        CollisionShape::Sphere { radius } if radius * state.scale > 0.0 => {
            let r = radius * state.scale;
            im * 5.0 / (2.0 * r * r)
        }
        CollisionShape::Box { half_extents } => {
            let h = half_extents * state.scale;
            // Mean of the three principal moments, m/3 * (a^2 + b^2) each.
            let mean = 2.0 * h.length_squared() / 9.0;
            if mean > 0.0 {
                im / mean
            } else {
                im
            }
        }
        _ => im,
    }
}

impl PhysicsEngine for NativePhysicsEngine {
    fn name(&self) -> &'static str {
        "native"
    }

    fn reset(&mut self) {
        self.bodies.clear();
        self.constraints.clear();
        self.contacts.clear();
    }

    fn set_body_state(&mut self, id: ObjectId, state: &RigidBodyState) -> Result<()> {
        state.validate()?;
        let state = state.normalized();
        let body = self.bodies.entry(id).or_insert(Body {
            state,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
        });
        body.state = state;
        Ok(())
    }

    fn body_state(&self, id: ObjectId) -> Option<RigidBodyState> {
        self.bodies.get(&id).map(|b| b.state)
    }

    fn add_constraint(&mut self, constraint: &Constraint) -> Result<()> {
        constraint.validate()?;
        for end in [constraint.a, constraint.b] {
            if !self.bodies.contains_key(&end) {
                return Err(LeonardError::NotFound(end));
            }
        }
        self.constraints.push(*constraint);
        Ok(())
    }

    fn apply_force(&mut self, id: ObjectId, force: Vec3, torque: Vec3) -> Result<()> {
        let body = self.bodies.get_mut(&id).ok_or(LeonardError::NotFound(id))?;
        body.force += force;
        body.torque += torque;
        Ok(())
    }

    fn step(&mut self, dt: f64, max_substeps: u32) -> Result<()> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(LeonardError::Engine(format!(
                "time step must be finite and >= 0, got {dt}"
            )));
        }
        self.contacts.clear();
        if dt > 0.0 {
            let substeps = self.substeps_for(dt, max_substeps);
            let h = dt / substeps as f64;
            for _ in 0..substeps {
                self.integrate_velocities(h);
                self.solve_contacts();
                self.integrate_positions(h);
                self.solve_constraints();
            }
        }
        for body in self.bodies.values_mut() {
            body.force = Vec3::ZERO;
            body.torque = Vec3::ZERO;
            if !body.state.position.is_finite() || !body.state.linear_velocity.is_finite() {
                return Err(LeonardError::Engine(
                    "simulation diverged to a non-finite state".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn contacts(&self) -> Vec<ContactPair> {
        self.contacts.values().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use leonard_core::package::{PackageIdAllocator, StagedForce, WorkPackage};

    fn ball(x: f64, vx: f64) -> RigidBodyState {
        RigidBodyState {
            position: Vec3::new(x, 0.0, 0.0),
            linear_velocity: Vec3::new(vx, 0.0, 0.0),
            shape: CollisionShape::Sphere { radius: 0.5 },
            restitution: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_substep_count_is_clamped() {
        let engine = NativePhysicsEngine::default();
        assert_eq!(engine.substeps_for(1.0, 60), 60);
        assert_eq!(engine.substeps_for(1.0, 10), 10);
        assert_eq!(engine.substeps_for(0.001, 60), 1);
        assert_eq!(engine.substeps_for(1.0, 0), 1);
    }

    #[test]
    fn test_force_acts_for_one_step_only() {
        let mut engine = NativePhysicsEngine::default();
        engine.set_body_state(ObjectId(1), &RigidBodyState::default()).unwrap();
        engine.apply_force(ObjectId(1), Vec3::X, Vec3::ZERO).unwrap();
        engine.step(1.0, 60).unwrap();
        let v1 = engine.body_state(ObjectId(1)).unwrap().linear_velocity;
        assert_relative_eq!(v1.x, 1.0, epsilon = 1e-9);

        engine.step(1.0, 60).unwrap();
        let v2 = engine.body_state(ObjectId(1)).unwrap().linear_velocity;
        assert_relative_eq!(v2.x, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_static_body_ignores_force_and_gravity() {
        let mut engine = NativePhysicsEngine::new(NativeEngineConfig {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            ..Default::default()
        });
        let wall = RigidBodyState {
            inverse_mass: 0.0,
            ..Default::default()
        };
        engine.set_body_state(ObjectId(1), &wall).unwrap();
        engine.apply_force(ObjectId(1), Vec3::X, Vec3::ONE).unwrap();
        engine.step(0.5, 30).unwrap();
        assert_eq!(engine.body_state(ObjectId(1)).unwrap(), wall);
    }

    #[test]
    fn test_locked_axis_does_not_accelerate() {
        let mut engine = NativePhysicsEngine::default();
        let body = RigidBodyState {
            linear_lock: Vec3::new(1.0, 0.0, 1.0),
            ..Default::default()
        };
        engine.set_body_state(ObjectId(1), &body).unwrap();
        engine
            .apply_force(ObjectId(1), Vec3::new(1.0, 1.0, 0.0), Vec3::ZERO)
            .unwrap();
        engine.step(1.0, 60).unwrap();
        let v = engine.body_state(ObjectId(1)).unwrap().linear_velocity;
        assert_relative_eq!(v.x, 1.0, epsilon = 1e-9);
        assert_eq!(v.y, 0.0);
    }

    #[test]
    fn test_head_on_spheres_bounce_and_report_contact() {
        let mut engine = NativePhysicsEngine::default();
        engine.set_body_state(ObjectId(1), &ball(-1.0, 2.0)).unwrap();
        engine.set_body_state(ObjectId(2), &ball(1.0, -2.0)).unwrap();
        engine.step(1.0, 60).unwrap();

        let a = engine.body_state(ObjectId(1)).unwrap();
        let b = engine.body_state(ObjectId(2)).unwrap();
        assert!(a.linear_velocity.x < 0.0);
        assert!(b.linear_velocity.x > 0.0);

        let contacts = engine.contacts();
        assert_eq!(contacts.len(), 1);
        assert_eq!((contacts[0].a, contacts[0].b), (ObjectId(1), ObjectId(2)));
    }

    #[test]
    fn test_spin_keeps_orientation_normalized() {
        let mut engine = NativePhysicsEngine::default();
        let body = RigidBodyState {
            angular_velocity: Vec3::new(1.0, 2.0, 3.0),
            ..Default::default()
        };
        engine.set_body_state(ObjectId(1), &body).unwrap();
        engine.step(2.0, 120).unwrap();
        let q = engine.body_state(ObjectId(1)).unwrap().orientation;
        assert_relative_eq!(q.magnitude_squared(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_step_package_reads_back_every_object() {
        let alloc = PackageIdAllocator::new();
        let mut snapshot = BTreeMap::new();
        snapshot.insert(ObjectId(4), RigidBodyState::default());
        snapshot.insert(ObjectId(9), ball(10.0, 0.0));
        let mut forces = BTreeMap::new();
        forces.insert(
            ObjectId(4),
            StagedForce {
                force: Vec3::new(0.0, 0.0, 2.0),
                torque: Vec3::ZERO,
            },
        );
        let package = WorkPackage::new(alloc.next_id(), snapshot, forces, 0.5, 30);

        let mut engine = NativePhysicsEngine::default();
        let result = engine.step_package(&package).unwrap();
        assert_eq!(result.states.len(), 2);
        assert_relative_eq!(result.states[&ObjectId(4)].linear_velocity.z, 1.0, epsilon = 1e-9);
        assert!(result.contacts.is_empty());
    }

    #[test]
    fn test_point_joint_drags_partner_and_keeps_pivots_together() {
        let mut engine = NativePhysicsEngine::default();
        engine.set_body_state(ObjectId(1), &RigidBodyState::default()).unwrap();
        engine
            .set_body_state(
                ObjectId(2),
                &RigidBodyState {
                    position: Vec3::new(2.0, 0.0, 0.0),
                    ..Default::default()
                },
            )
            .unwrap();
        engine
            .add_constraint(&Constraint::point_to_point(
                ObjectId(1),
                ObjectId(2),
                Vec3::X,
                -Vec3::X,
            ))
            .unwrap();

        engine
            .apply_force(ObjectId(2), Vec3::new(10.0, 0.0, 0.0), Vec3::ZERO)
            .unwrap();
        engine.step(1.0, 60).unwrap();

        let a = engine.body_state(ObjectId(1)).unwrap();
        let b = engine.body_state(ObjectId(2)).unwrap();
        assert_relative_eq!((b.position - a.position).x, 2.0, epsilon = 1e-9);
        assert_relative_eq!(a.linear_velocity.x, 5.0, epsilon = 1e-9);
        assert_relative_eq!(b.linear_velocity.x, 5.0, epsilon = 1e-9);
        assert!(a.position.x > 0.0);
    }

    #[test]
    fn test_constraint_on_unloaded_body_is_refused() {
        let mut engine = NativePhysicsEngine::default();
        engine.set_body_state(ObjectId(1), &RigidBodyState::default()).unwrap();
        let joint = Constraint::point_to_point(ObjectId(1), ObjectId(2), Vec3::ZERO, Vec3::ZERO);
        assert!(matches!(
            engine.add_constraint(&joint),
            Err(LeonardError::NotFound(ObjectId(2)))
        ));

        engine.reset();
        engine.set_body_state(ObjectId(1), &RigidBodyState::default()).unwrap();
        engine.step(1.0, 1).unwrap();
        assert_eq!(engine.body_state(ObjectId(1)).unwrap().position, Vec3::ZERO);
    }

    #[test]
    fn test_step_package_loads_constraints() {
        let mut snapshot = BTreeMap::new();
        snapshot.insert(ObjectId(1), RigidBodyState::default());
        snapshot.insert(
            ObjectId(2),
            RigidBodyState {
                position: Vec3::new(0.0, 4.0, 0.0),
                linear_velocity: Vec3::new(0.0, 3.0, 0.0),
                ..Default::default()
            },
        );
        let joint = Constraint::point_to_point(ObjectId(1), ObjectId(2), Vec3::ZERO, Vec3::ZERO);
        let package = WorkPackage::new(
            PackageIdAllocator::new().next_id(),
            snapshot,
            BTreeMap::new(),
            0.5,
            30,
        )
        .with_constraints(vec![joint]);

        let result = NativePhysicsEngine::default().step_package(&package).unwrap();

        let a = result.states[&ObjectId(1)].position;
        let b = result.states[&ObjectId(2)].position;
        assert_relative_eq!((b - a).length(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_negative_dt_is_an_engine_error() {
        let mut engine = NativePhysicsEngine::default();
        assert!(matches!(engine.step(-1.0, 1), Err(LeonardError::Engine(_))));
    }
}
