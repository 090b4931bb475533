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

//! The authoritative set of live objects.
//!
//! Only the tick thread mutates a [`WorldState`]: while draining commands and
//! while merging results. Work packages carry deep copies, so workers never
//! see this structure.

use leonard_core::command::Command;
use leonard_core::constraint::{pair_key, Constraint};
use leonard_core::error::{LeonardError, Result};
use leonard_core::math::Aabb;
use leonard_core::object::{ObjectId, RigidBodyState};
use leonard_core::package::{PackageId, StagedForce, WorkPackage};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
struct Entry {
    state: RigidBodyState,
    /// Explicit half-width set by a spawn or override; wins over the shape.
    aabb_radius: Option<f64>,
    aabb: Option<Aabb>,
    /// One-shot force in world space.
    direct: StagedForce,
    /// One-shot force in the body frame.
    booster: StagedForce,
}

impl Entry {
    fn new(state: RigidBodyState, aabb_radius: Option<f64>) -> Self {
        let mut entry = Self {
            state: state.normalized(),
            aabb_radius,
            aabb: None,
            direct: StagedForce::default(),
            booster: StagedForce::default(),
        };
        entry.refresh_aabb();
        entry
    }

    fn refresh_aabb(&mut self) {
        self.aabb = self
            .aabb_radius
            .or_else(|| self.state.shape_radius())
            .map(|radius| self.state.aabb_with_radius(radius));
    }

    /// Consumes the staged forces, expressed in world space.
    fn take_force(&mut self) -> StagedForce {
        let booster = std::mem::take(&mut self.booster);
        let rotation = self.state.orientation;
        let world_booster = StagedForce {
            force: rotation.rotate_vec3(booster.force),
            torque: rotation.rotate_vec3(booster.torque),
        };
        std::mem::take(&mut self.direct) + world_booster
    }
}

/// A command that could not be applied.
#[derive(Debug)]
pub struct CommandFailure {
    /// Position of the command in its drain batch.
    pub index: usize,
    /// The command kind, see [`Command::kind`].
    pub kind: &'static str,
    /// The targeted object.
    pub id: ObjectId,
    /// Why it failed.
    pub error: LeonardError,
}

/// Outcome of applying one drain batch.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Commands that took effect, including no-op removes.
    pub applied: usize,
    /// Commands that were rejected. Siblings were still applied.
    pub failures: Vec<CommandFailure>,
    /// Objects that existed and were removed.
    pub removed: Vec<ObjectId>,
}

/// Live objects plus their cached boxes, staged one-shot forces and the
/// constraints between them.
#[derive(Debug, Clone, Default)]
pub struct WorldState {
    objects: BTreeMap<ObjectId, Entry>,
    /// Keyed by the ordered id pair; both ends are always live.
    constraints: BTreeMap<(ObjectId, ObjectId), Constraint>,
}

impl WorldState {
    /// An empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if no object is live.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Returns `true` if `id` is live.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Live ids, ascending.
    pub fn ids(&self) -> Vec<ObjectId> {
        self.objects.keys().copied().collect()
    }

    /// The current state of one object.
    pub fn get(&self, id: ObjectId) -> Option<&RigidBodyState> {
        self.objects.get(&id).map(|e| &e.state)
    }

    /// The cached box of one object, if it has one.
    pub fn aabb(&self, id: ObjectId) -> Option<Aabb> {
        self.objects.get(&id).and_then(|e| e.aabb)
    }

    /// Number of stored constraints.
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// The constraint between `a` and `b`, in either order.
    pub fn constraint(&self, a: ObjectId, b: ObjectId) -> Option<&Constraint> {
        self.constraints.get(&pair_key(a, b))
    }

    /// Every constrained pair, smaller id first, in ascending order.
    pub fn constraint_pairs(&self) -> Vec<(ObjectId, ObjectId)> {
        self.constraints.keys().copied().collect()
    }

    /// Constraints whose two ends are both in `group`.
    pub fn constraints_within(&self, group: &[ObjectId]) -> Vec<Constraint> {
        let members: BTreeSet<ObjectId> = group.iter().copied().collect();
        self.constraints
            .values()
            .filter(|c| members.contains(&c.a) && members.contains(&c.b))
            .copied()
            .collect()
    }

    /// Applies a drain batch in order.
    ///
    /// Every command is attempted. Failures are collected per command and
    /// never stop the rest of the batch.
    pub fn apply_commands(&mut self, commands: Vec<Command>) -> ApplyReport {
        let mut report = ApplyReport::default();
        for (index, command) in commands.into_iter().enumerate() {
            let kind = command.kind();
            let id = command.id();
            match self.apply(command) {
                Ok(removed) => {
                    report.applied += 1;
                    if removed {
                        report.removed.push(id);
                    }
                }
                Err(error) => {
                    log::warn!("{kind} on {id} rejected: {error}");
                    report.failures.push(CommandFailure {
                        index,
                        kind,
                        id,
                        error,
                    });
                }
            }
        }
        report
    }

    /// Applies one command. Returns `true` if it removed a live object.
    fn apply(&mut self, command: Command) -> Result<bool> {
        command.validate()?;
        match command {
            Command::Spawn {
                id,
                state,
                aabb_radius,
            } => {
                if self.objects.contains_key(&id) {
                    return Err(LeonardError::AlreadyExists(id));
                }
                self.objects.insert(id, Entry::new(state, aabb_radius));
                Ok(false)
            }
            Command::Remove { id } => {
                let removed = self.objects.remove(&id).is_some();
                if removed {
                    self.constraints.retain(|_, c| !c.involves(id));
                }
                Ok(removed)
            }
            Command::Override { id, partial } => {
                let entry = self.entry_mut(id)?;
                partial.apply_to(&mut entry.state);
                if let Some(radius) = partial.aabb_radius {
                    entry.aabb_radius = Some(radius);
                }
                entry.refresh_aabb();
                Ok(false)
            }
            Command::ApplyForce { id, force, torque } => {
                let entry = self.entry_mut(id)?;
                entry.direct = entry.direct + StagedForce { force, torque };
                Ok(false)
            }
            Command::ApplyForceAtPosition {
                id,
                force,
                relative_position,
            } => {
                let entry = self.entry_mut(id)?;
                entry.direct = entry.direct
                    + StagedForce {
                        force,
                        torque: relative_position.cross(force),
                    };
                Ok(false)
            }
            Command::ApplyBoosterForce { id, force, torque } => {
                let entry = self.entry_mut(id)?;
                entry.booster = entry.booster + StagedForce { force, torque };
                Ok(false)
            }
            Command::AddConstraint { constraint } => {
                let constraint = constraint.canonical();
                for end in [constraint.a, constraint.b] {
                    let state = self.get(end).ok_or(LeonardError::NotFound(end))?;
                    if state.is_static() {
                        log::warn!(
                            "constraint {} - {} is attached to static body {end}",
                            constraint.a,
                            constraint.b
                        );
                    }
                }
                self.constraints.insert(constraint.key(), constraint);
                Ok(false)
            }
            Command::RemoveConstraint { a, b } => {
                self.constraints.remove(&pair_key(a, b));
                Ok(false)
            }
        }
    }

    fn entry_mut(&mut self, id: ObjectId) -> Result<&mut Entry> {
        self.objects.get_mut(&id).ok_or(LeonardError::NotFound(id))
    }

    /// Deep copies of the requested objects. Unknown ids are skipped.
    pub fn snapshot(&self, ids: &[ObjectId]) -> BTreeMap<ObjectId, RigidBodyState> {
        ids.iter()
            .filter_map(|id| self.objects.get(id).map(|e| (*id, e.state)))
            .collect()
    }

    /// Deep copies of every live object.
    pub fn states(&self) -> BTreeMap<ObjectId, RigidBodyState> {
        self.objects
            .iter()
            .map(|(id, e)| (*id, e.state))
            .collect()
    }

    /// Overwrites objects with computed states, last writer wins.
    ///
    /// Ids that are no longer live are skipped, and so are states that fail
    /// [`RigidBodyState::validate`]; the object keeps its previous state.
    /// Orientations are stored normalized. Returns how many objects were
    /// updated.
    pub fn merge(&mut self, updates: BTreeMap<ObjectId, RigidBodyState>) -> usize {
        let mut merged = 0;
        for (id, state) in updates {
            if let Err(e) = state.validate() {
                log::error!("rejecting computed state for {id}: {e}");
                continue;
            }
            match self.objects.get_mut(&id) {
                Some(entry) => {
                    entry.state = state.normalized();
                    entry.refresh_aabb();
                    merged += 1;
                }
                None => log::warn!("dropping update for {id}, object is gone"),
            }
        }
        merged
    }

    /// Boxes for the broad phase, plus the ids that must form singleton
    /// groups because they have no box or a zero-width one.
    pub fn broad_phase_input(&self) -> (BTreeMap<ObjectId, Aabb>, Vec<ObjectId>) {
        let mut boxes = BTreeMap::new();
        let mut singletons = Vec::new();
        for (id, entry) in &self.objects {
            match entry.aabb {
                Some(aabb) if !aabb.is_degenerate() => {
                    boxes.insert(*id, aabb);
                }
                _ => singletons.push(*id),
            }
        }
        (boxes, singletons)
    }

    /// Builds the first package for a group, consuming the group's staged
    /// forces and attaching the constraints inside it.
    pub fn build_package(
        &mut self,
        id: PackageId,
        group: &[ObjectId],
        dt: f64,
        max_substeps: u32,
    ) -> Result<WorkPackage> {
        let mut snapshot = BTreeMap::new();
        let mut forces = BTreeMap::new();
        for object in group {
            let entry = self.entry_mut(*object)?;
            let staged = entry.take_force();
            if !staged.is_zero() {
                forces.insert(*object, staged);
            }
            snapshot.insert(*object, entry.state);
        }
        Ok(WorkPackage::new(id, snapshot, forces, dt, max_substeps)
            .with_constraints(self.constraints_within(group)))
    }

    /// Builds the replacement for an abandoned package.
    ///
    /// Only the abandoned group is re-read. Staged forces are taken from the
    /// abandoned package, never from the world, so they apply exactly once.
    pub fn rebuild_package(&self, abandoned: &WorkPackage, id: PackageId) -> Result<WorkPackage> {
        if let Some(missing) = abandoned
            .object_ids
            .iter()
            .find(|o| !self.objects.contains_key(o))
        {
            return Err(LeonardError::NotFound(*missing));
        }
        Ok(WorkPackage::rebuild(
            abandoned,
            id,
            self.snapshot(&abandoned.object_ids),
        ))
    }

    /// Inserts or replaces an object outside the command path, e.g. when
    /// restoring from a datastore.
    pub fn restore(&mut self, id: ObjectId, state: RigidBodyState) {
        self.objects.insert(id, Entry::new(state, None));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use leonard_core::math::{Quaternion, Vec3};
    use leonard_core::object::{BodyOverride, CollisionShape};

    fn sphere_at(x: f64) -> RigidBodyState {
        RigidBodyState {
            position: Vec3::new(x, 0.0, 0.0),
            shape: CollisionShape::Sphere { radius: 0.5 },
            ..Default::default()
        }
    }

    fn spawn(id: u64, state: RigidBodyState) -> Command {
        Command::Spawn {
            id: ObjectId(id),
            state,
            aabb_radius: None,
        }
    }

    #[test]
    fn test_spawn_then_override_in_one_batch() {
        let mut world = WorldState::new();
        let report = world.apply_commands(vec![
            spawn(1, sphere_at(0.0)),
            Command::Override {
                id: ObjectId(1),
                partial: BodyOverride {
                    position: Some(Vec3::new(5.0, 0.0, 0.0)),
                    inverse_mass: Some(0.25),
                    ..Default::default()
                },
            },
        ]);
        assert_eq!(report.applied, 2);
        let state = world.get(ObjectId(1)).unwrap();
        assert_eq!(state.position, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(state.inverse_mass, 0.25);
        assert_eq!(world.aabb(ObjectId(1)).unwrap().min.x, 4.5);
    }

    #[test]
    fn test_duplicate_spawn_and_unknown_targets() {
        let mut world = WorldState::new();
        let report = world.apply_commands(vec![
            spawn(1, sphere_at(0.0)),
            spawn(1, sphere_at(3.0)),
            Command::Remove { id: ObjectId(9) },
            Command::ApplyForce {
                id: ObjectId(9),
                force: Vec3::X,
                torque: Vec3::ZERO,
            },
            spawn(2, sphere_at(1.0)),
        ]);
        assert_eq!(report.applied, 3);
        assert_eq!(report.failures.len(), 2);
        assert!(matches!(report.failures[0].error, LeonardError::AlreadyExists(_)));
        assert_eq!(report.failures[1].index, 3);
        assert!(matches!(report.failures[1].error, LeonardError::NotFound(ObjectId(9))));
        assert!(report.removed.is_empty());
        assert_eq!(world.get(ObjectId(1)).unwrap().position.x, 0.0);
        assert!(world.contains(ObjectId(2)));
    }

    #[test]
    fn test_merge_then_snapshot_round_trip() {
        let mut world = WorldState::new();
        world.apply_commands(vec![spawn(1, sphere_at(0.0)), spawn(2, sphere_at(2.0))]);
        let mut updates = BTreeMap::new();
        updates.insert(ObjectId(1), sphere_at(10.0));
        updates.insert(ObjectId(2), sphere_at(-4.0));

        world.merge(updates.clone());

        assert_eq!(world.snapshot(&[ObjectId(1), ObjectId(2)]), updates);
        assert_eq!(world.aabb(ObjectId(1)).unwrap().max.x, 10.5);
    }

    #[test]
    fn test_merge_skips_removed_objects() {
        let mut world = WorldState::new();
        world.apply_commands(vec![spawn(1, sphere_at(0.0))]);
        let mut updates = BTreeMap::new();
        updates.insert(ObjectId(7), sphere_at(1.0));
        assert_eq!(world.merge(updates), 0);
        assert!(!world.contains(ObjectId(7)));
    }

    #[test]
    fn test_build_package_consumes_forces_once() {
        let mut world = WorldState::new();
        world.apply_commands(vec![
            spawn(1, sphere_at(0.0)),
            Command::ApplyForce {
                id: ObjectId(1),
                force: Vec3::X,
                torque: Vec3::ZERO,
            },
            Command::ApplyForceAtPosition {
                id: ObjectId(1),
                force: Vec3::Y,
                relative_position: Vec3::X,
            },
        ]);

        let first = world
            .build_package(PackageId(1), &[ObjectId(1)], 1.0, 60)
            .unwrap();
        let staged = first.forces[&ObjectId(1)];
        assert_eq!(staged.force, Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(staged.torque, Vec3::Z);

        let second = world
            .build_package(PackageId(2), &[ObjectId(1)], 1.0, 60)
            .unwrap();
        assert!(second.forces.is_empty());

        let rebuilt = world.rebuild_package(&first, PackageId(3)).unwrap();
        assert_eq!(rebuilt.forces, first.forces);
        assert_eq!(rebuilt.attempt, 1);
    }

    #[test]
    fn test_booster_rotated_by_orientation() {
        let mut world = WorldState::new();
        let turned = RigidBodyState {
            orientation: Quaternion::from_axis_angle(Vec3::Z, std::f64::consts::FRAC_PI_2),
            ..sphere_at(0.0)
        };
        world.apply_commands(vec![
            spawn(1, turned),
            Command::ApplyBoosterForce {
                id: ObjectId(1),
                force: Vec3::X,
                torque: Vec3::ZERO,
            },
        ]);
        let package = world
            .build_package(PackageId(1), &[ObjectId(1)], 1.0, 1)
            .unwrap();
        let force = package.forces[&ObjectId(1)].force;
        assert_relative_eq!(force.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(force.y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_shapeless_and_explicit_radius_boxes() {
        let mut world = WorldState::new();
        world.apply_commands(vec![
            spawn(1, RigidBodyState::default()),
            Command::Spawn {
                id: ObjectId(2),
                state: sphere_at(0.0),
                aabb_radius: Some(3.0),
            },
        ]);
        let (boxes, singletons) = world.broad_phase_input();
        assert_eq!(singletons, vec![ObjectId(1)]);
        assert_eq!(boxes[&ObjectId(2)].max.x, 3.0);

        world.apply_commands(vec![Command::Override {
            id: ObjectId(2),
            partial: BodyOverride {
                scale: Some(10.0),
                ..Default::default()
            },
        }]);
        assert_eq!(world.aabb(ObjectId(2)).unwrap().max.x, 3.0);
    }

    fn joint(a: u64, b: u64) -> Command {
        Command::AddConstraint {
            constraint: Constraint::point_to_point(ObjectId(a), ObjectId(b), Vec3::X, -Vec3::X),
        }
    }

    #[test]
    fn test_constraints_need_live_ends_and_die_with_them() {
        let mut world = WorldState::new();
        let report = world.apply_commands(vec![
            spawn(1, sphere_at(0.0)),
            spawn(2, sphere_at(5.0)),
            spawn(3, sphere_at(9.0)),
            joint(2, 1),
            joint(1, 7),
            joint(3, 2),
        ]);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0].error, LeonardError::NotFound(ObjectId(7))));
        assert_eq!(
            world.constraint_pairs(),
            vec![(ObjectId(1), ObjectId(2)), (ObjectId(2), ObjectId(3))]
        );
        // Stored with the smaller id first, pivots swapped along with the ids.
        let stored = world.constraint(ObjectId(2), ObjectId(1)).unwrap();
        assert_eq!(stored.a, ObjectId(1));

        world.apply_commands(vec![Command::Remove { id: ObjectId(2) }]);
        assert_eq!(world.constraint_count(), 0);
    }

    #[test]
    fn test_remove_constraint_in_either_order() {
        let mut world = WorldState::new();
        world.apply_commands(vec![
            spawn(1, sphere_at(0.0)),
            spawn(2, sphere_at(5.0)),
            joint(1, 2),
        ]);
        let report = world.apply_commands(vec![
            Command::RemoveConstraint {
                a: ObjectId(2),
                b: ObjectId(1),
            },
            Command::RemoveConstraint {
                a: ObjectId(1),
                b: ObjectId(2),
            },
        ]);
        assert_eq!(report.applied, 2);
        assert_eq!(world.constraint_count(), 0);
        assert!(world.contains(ObjectId(1)));
    }

    #[test]
    fn test_package_carries_only_constraints_inside_its_group() {
        let mut world = WorldState::new();
        world.apply_commands(vec![
            spawn(1, sphere_at(0.0)),
            spawn(2, sphere_at(5.0)),
            spawn(3, sphere_at(9.0)),
            joint(1, 2),
            joint(2, 3),
        ]);
        let package = world
            .build_package(PackageId(1), &[ObjectId(1), ObjectId(2)], 0.1, 1)
            .unwrap();
        assert_eq!(package.constraints.len(), 1);
        assert_eq!(package.constraints[0].key(), (ObjectId(1), ObjectId(2)));

        let rebuilt = world.rebuild_package(&package, PackageId(2)).unwrap();
        assert_eq!(rebuilt.constraints, package.constraints);
    }

    #[test]
    fn test_merge_normalizes_and_rejects_invalid_states() {
        let mut world = WorldState::new();
        world.apply_commands(vec![spawn(1, sphere_at(0.0)), spawn(2, sphere_at(3.0))]);
        let mut updates = BTreeMap::new();
        updates.insert(
            ObjectId(1),
            RigidBodyState {
                orientation: Quaternion::new(0.0, 0.0, 0.0, 2.0),
                ..sphere_at(1.0)
            },
        );
        updates.insert(
            ObjectId(2),
            RigidBodyState {
                position: Vec3::new(f64::NAN, 0.0, 0.0),
                ..sphere_at(3.0)
            },
        );

        assert_eq!(world.merge(updates), 1);
        let first = world.get(ObjectId(1)).unwrap();
        assert_eq!(first.orientation, Quaternion::IDENTITY);
        assert_eq!(first.position.x, 1.0);
        assert_eq!(world.get(ObjectId(2)).unwrap().position.x, 3.0);
    }

    #[test]
    fn test_rebuild_fails_for_vanished_object() {
        let mut world = WorldState::new();
        world.apply_commands(vec![spawn(1, sphere_at(0.0))]);
        let package = world
            .build_package(PackageId(1), &[ObjectId(1)], 1.0, 1)
            .unwrap();
        world.apply_commands(vec![Command::Remove { id: ObjectId(1) }]);
        assert!(matches!(
            world.rebuild_package(&package, PackageId(2)),
            Err(LeonardError::NotFound(ObjectId(1)))
        ));
    }
}
