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

//! Rapier implementation of the [`PhysicsEngine`] contract.
//!
//! Rapier works in `f32`; states are converted at the boundary. Scale,
//! restitution, and the lock factors are kept alongside each handle so that
//! a body reads back exactly the attributes it was loaded with. Point-to-point
//! constraints become spherical impulse joints; removing a body drops its
//! joints with it.

use leonard_core::constraint::{Constraint, ConstraintKind};
use leonard_core::error::{LeonardError, Result};
use leonard_core::math::{Quaternion, Vec3};
use leonard_core::object::{CollisionShape, ObjectId, RigidBodyState};
use leonard_core::physics::{ContactPair, PhysicsEngine};
use rapier3d::prelude::*;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy)]
struct BodyRecord {
    handle: RigidBodyHandle,
    loaded: RigidBodyState,
}

/// A [`PhysicsEngine`] backed by rapier3d.
pub struct RapierPhysicsEngine {
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    gravity: Vector<Real>,
    substep_rate: f64,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    records: BTreeMap<ObjectId, BodyRecord>,
    owners: HashMap<RigidBodyHandle, ObjectId>,
    contacts: BTreeMap<(ObjectId, ObjectId), ContactPair>,
}

impl RapierPhysicsEngine {
    /// Creates an empty world with the given gravity.
    pub fn new(gravity: Vec3) -> Self {
        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            gravity: vector![gravity.x as Real, gravity.y as Real, gravity.z as Real],
            substep_rate: 60.0,
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            records: BTreeMap::new(),
            owners: HashMap::new(),
            contacts: BTreeMap::new(),
        }
    }

    fn remove_body(&mut self, id: ObjectId) {
        if let Some(record) = self.records.remove(&id) {
            self.owners.remove(&record.handle);
            self.rigid_body_set.remove(
                record.handle,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            );
        }
    }

    fn collect_contacts(&mut self) {
        for pair in self.narrow_phase.contact_pairs() {
            if !pair.has_any_active_contact {
                continue;
            }
            let owner = |collider: ColliderHandle| {
                self.collider_set
                    .get(collider)
                    .and_then(|c| c.parent())
                    .and_then(|body| self.owners.get(&body).copied())
            };
            let (Some(id1), Some(id2)) = (owner(pair.collider1), owner(pair.collider2)) else {
                continue;
            };
            let Some(manifold) = pair.manifolds.first() else {
                continue;
            };
            let n = manifold.data.normal;
            let mut normal = Vec3::new(n.x as f64, n.y as f64, n.z as f64);
            let depth = manifold
                .points
                .first()
                .map(|p| (-p.dist).max(0.0) as f64)
                .unwrap_or(0.0);
            let (a, b) = if id1 <= id2 {
                (id1, id2)
            } else {
                normal = -normal;
                (id2, id1)
            };
            let pa = self.records.get(&a).map(|r| r.handle);
            let pb = self.records.get(&b).map(|r| r.handle);
            let point = match (pa, pb) {
                (Some(ha), Some(hb)) => {
                    let ta = self.rigid_body_set[ha].translation();
                    let tb = self.rigid_body_set[hb].translation();
                    Vec3::new(
                        (ta.x + tb.x) as f64 * 0.5,
                        (ta.y + tb.y) as f64 * 0.5,
                        (ta.z + tb.z) as f64 * 0.5,
                    )
                }
                _ => Vec3::ZERO,
            };
            self.contacts.insert(
                (a, b),
                ContactPair {
                    a,
                    b,
                    point,
                    normal,
                    depth,
                },
            );
        }
    }
}

impl Default for RapierPhysicsEngine {
    fn default() -> Self {
        Self::new(Vec3::ZERO)
    }
}

fn to_rapier_rotation(q: Quaternion) -> AngVector<Real> {
    rapier3d::na::UnitQuaternion::from_quaternion(rapier3d::na::Quaternion::new(
        q.w as Real,
        q.x as Real,
        q.y as Real,
        q.z as Real,
    ))
    .scaled_axis()
}

fn vec(v: Vec3) -> Vector<Real> {
    vector![v.x as Real, v.y as Real, v.z as Real]
}

impl PhysicsEngine for RapierPhysicsEngine {
    fn name(&self) -> &'static str {
        "rapier"
    }

    fn reset(&mut self) {
        let ids: Vec<ObjectId> = self.records.keys().copied().collect();
        for id in ids {
            self.remove_body(id);
        }
        self.contacts.clear();
    }

    fn set_body_state(&mut self, id: ObjectId, state: &RigidBodyState) -> Result<()> {
        state.validate()?;
        let state = state.normalized();
        self.remove_body(id);

        let rb_type = if state.is_static() {
            RigidBodyType::Fixed
        } else {
            RigidBodyType::Dynamic
        };
        let lock = |v: f64| v != 0.0;
        let mut builder = RigidBodyBuilder::new(rb_type)
            .translation(vec(state.position))
            .rotation(to_rapier_rotation(state.orientation))
            .linvel(vec(state.linear_velocity))
            .angvel(vec(state.angular_velocity))
            .enabled_translations(
                lock(state.linear_lock.x),
                lock(state.linear_lock.y),
                lock(state.linear_lock.z),
            )
            .enabled_rotations(
                lock(state.angular_lock.x),
                lock(state.angular_lock.y),
                lock(state.angular_lock.z),
            );
        let mass = if state.is_static() {
            0.0
        } else {
            (1.0 / state.inverse_mass) as Real
        };
        let shape = match state.shape {
            CollisionShape::None => None,
            CollisionShape::Sphere { radius } => {
                Some(SharedShape::ball((radius * state.scale) as Real))
            }
            CollisionShape::Box { half_extents } => {
                let h = half_extents * state.scale;
                Some(SharedShape::cuboid(h.x as Real, h.y as Real, h.z as Real))
            }
        };
        if shape.is_none() && !state.is_static() {
            builder = builder.additional_mass(mass);
        }
        let handle = self.rigid_body_set.insert(builder.build());

        if let Some(shape) = shape {
            let collider = ColliderBuilder::new(shape)
                .restitution(state.restitution as Real)
                .restitution_combine_rule(CoefficientCombineRule::Multiply)
                .mass(mass)
                .build();
            self.collider_set
                .insert_with_parent(collider, handle, &mut self.rigid_body_set);
        }

        self.owners.insert(handle, id);
        self.records.insert(
            id,
            BodyRecord {
                handle,
                loaded: state,
            },
        );
        Ok(())
    }

    fn body_state(&self, id: ObjectId) -> Option<RigidBodyState> {
        let record = self.records.get(&id)?;
        let rb = self.rigid_body_set.get(record.handle)?;
        let t = rb.translation();
        let r = rb.rotation();
        let lv = rb.linvel();
        let av = rb.angvel();
        Some(RigidBodyState {
            position: Vec3::new(t.x as f64, t.y as f64, t.z as f64),
            orientation: Quaternion::new(r.i as f64, r.j as f64, r.k as f64, r.w as f64)
                .normalize(),
            linear_velocity: Vec3::new(lv.x as f64, lv.y as f64, lv.z as f64),
            angular_velocity: Vec3::new(av.x as f64, av.y as f64, av.z as f64),
            ..record.loaded
        })
    }

    fn add_constraint(&mut self, constraint: &Constraint) -> Result<()> {
        constraint.validate()?;
        let handle = |id: ObjectId| {
            self.records
                .get(&id)
                .map(|r| r.handle)
                .ok_or(LeonardError::NotFound(id))
        };
        let (h1, h2) = (handle(constraint.a)?, handle(constraint.b)?);
        match constraint.kind {
            ConstraintKind::PointToPoint { pivot_a, pivot_b } => {
                let joint = SphericalJointBuilder::new()
                    .local_anchor1(point![pivot_a.x as Real, pivot_a.y as Real, pivot_a.z as Real])
                    .local_anchor2(point![pivot_b.x as Real, pivot_b.y as Real, pivot_b.z as Real])
                    .build();
                self.impulse_joint_set.insert(h1, h2, joint, true);
            }
        }
        Ok(())
    }

    fn apply_force(&mut self, id: ObjectId, force: Vec3, torque: Vec3) -> Result<()> {
        let record = self.records.get(&id).ok_or(LeonardError::NotFound(id))?;
        let rb = self
            .rigid_body_set
            .get_mut(record.handle)
            .ok_or(LeonardError::NotFound(id))?;
        rb.add_force(vec(force), true);
        rb.add_torque(vec(torque), true);
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
            let substeps = ((dt * self.substep_rate).ceil() as u32).clamp(1, max_substeps.max(1));
            self.integration_parameters.dt = (dt / substeps as f64) as Real;
            for _ in 0..substeps {
                self.physics_pipeline.step(
                    &self.gravity,
                    &self.integration_parameters,
                    &mut self.island_manager,
                    &mut self.broad_phase,
                    &mut self.narrow_phase,
                    &mut self.rigid_body_set,
                    &mut self.collider_set,
                    &mut self.impulse_joint_set,
                    &mut self.multibody_joint_set,
                    &mut self.ccd_solver,
                    None,
                    &(),
                    &(),
                );
                self.collect_contacts();
            }
        }
        for (_, rb) in self.rigid_body_set.iter_mut() {
            rb.reset_forces(false);
            rb.reset_torques(false);
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

    #[test]
    fn test_spherical_joint_keeps_bodies_close() {
        let mut engine = RapierPhysicsEngine::default();
        let body = |x: f64| RigidBodyState {
            position: Vec3::new(x, 0.0, 0.0),
            shape: CollisionShape::Sphere { radius: 0.25 },
            ..Default::default()
        };
        engine.set_body_state(ObjectId(1), &body(0.0)).unwrap();
        engine.set_body_state(ObjectId(2), &body(1.0)).unwrap();
        engine
            .add_constraint(&Constraint::point_to_point(
                ObjectId(1),
                ObjectId(2),
                Vec3::new(0.5, 0.0, 0.0),
                Vec3::new(-0.5, 0.0, 0.0),
            ))
            .unwrap();

        engine
            .apply_force(ObjectId(2), Vec3::new(20.0, 0.0, 0.0), Vec3::ZERO)
            .unwrap();
        engine.step(0.5, 30).unwrap();

        let a = engine.body_state(ObjectId(1)).unwrap();
        let b = engine.body_state(ObjectId(2)).unwrap();
        assert!(a.position.x > 0.0);
        assert!((b.position - a.position).length() < 1.1);
    }

    #[test]
    fn test_joint_to_unknown_body_is_refused() {
        let mut engine = RapierPhysicsEngine::default();
        engine
            .set_body_state(ObjectId(1), &RigidBodyState::default())
            .unwrap();
        let joint = Constraint::point_to_point(ObjectId(1), ObjectId(9), Vec3::ZERO, Vec3::ZERO);
        assert!(matches!(
            engine.add_constraint(&joint),
            Err(LeonardError::NotFound(ObjectId(9)))
        ));
    }
}
