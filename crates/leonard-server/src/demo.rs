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

//! A small scene to watch the scheduler work without a client.
//!
//! A ring of spheres converges on a static platform while a booster cube
//! spins up above it and a jointed dumbbell drifts off to the side.

use leonard_core::constraint::Constraint;
use leonard_core::error::Result;
use leonard_core::math::Vec3;
use leonard_core::object::{CollisionShape, ObjectId, RigidBodyState};
use leonard_scheduler::LeonardHandle;
use std::f64::consts::TAU;

/// Id of the static platform.
pub const PLATFORM: ObjectId = ObjectId(1);
/// Id of the booster cube.
pub const BOOSTER_CUBE: ObjectId = ObjectId(2);
/// Ids of the two dumbbell ends.
pub const DUMBBELL: [ObjectId; 2] = [ObjectId(3), ObjectId(4)];
/// First id handed to ring spheres.
pub const FIRST_SPHERE: u64 = 100;

const RING_RADIUS: f64 = 8.0;
const SPHERE_SPEED: f64 = 2.0;
const DUMBBELL_HALF_LENGTH: f64 = 1.5;

/// Queues the demo scene. Returns the number of objects spawned.
pub fn populate(handle: &LeonardHandle, spheres: usize) -> Result<usize> {
    handle.spawn(
        PLATFORM,
        RigidBodyState {
            position: Vec3::new(0.0, -2.0, 0.0),
            inverse_mass: 0.0,
            shape: CollisionShape::Box {
                half_extents: Vec3::new(10.0, 0.5, 10.0),
            },
            ..Default::default()
        },
        None,
    )?;

    handle.spawn(
        BOOSTER_CUBE,
        RigidBodyState {
            position: Vec3::new(0.0, 4.0, 0.0),
            shape: CollisionShape::Box {
                half_extents: Vec3::splat(0.5),
            },
            ..Default::default()
        },
        None,
    )?;
    handle.apply_booster_force(BOOSTER_CUBE, Vec3::ZERO, Vec3::new(0.0, 5.0, 0.0))?;

    for (end, side) in DUMBBELL.into_iter().zip([-1.0, 1.0]) {
        handle.spawn(
            end,
            RigidBodyState {
                position: Vec3::new(-14.0 + side * DUMBBELL_HALF_LENGTH, 3.0, 0.0),
                linear_velocity: Vec3::new(0.0, 0.0, 1.5),
                shape: CollisionShape::Sphere { radius: 0.4 },
                ..Default::default()
            },
            None,
        )?;
    }
    let offset = Vec3::new(DUMBBELL_HALF_LENGTH, 0.0, 0.0);
    handle.add_constraint(Constraint::point_to_point(
        DUMBBELL[0],
        DUMBBELL[1],
        offset,
        -offset,
    ))?;

    for i in 0..spheres {
        let angle = TAU * i as f64 / spheres as f64;
        let (sin, cos) = angle.sin_cos();
        let position = Vec3::new(RING_RADIUS * cos, 0.0, RING_RADIUS * sin);
        handle.spawn(
            ObjectId(FIRST_SPHERE + i as u64),
            RigidBodyState {
                position,
                linear_velocity: position * (-SPHERE_SPEED / RING_RADIUS),
                restitution: 0.8,
                shape: CollisionShape::Sphere { radius: 0.5 },
                ..Default::default()
            },
            None,
        )?;
    }

    let spawned = spheres + 4;
    log::info!("demo scene queued with {spawned} objects");
    Ok(spawned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use leonard_core::physics::{EngineFactory, PhysicsEngine};
    use leonard_infra::physics::{NativeEngineConfig, NativePhysicsEngine};
    use leonard_scheduler::{Scheduler, SchedulerConfig, SchedulingStrategy};
    use std::sync::Arc;

    #[test]
    fn test_demo_scene_spawns_and_steps() {
        let factory: Arc<dyn EngineFactory> = Arc::new(|| -> Box<dyn PhysicsEngine> {
            Box::new(NativePhysicsEngine::new(NativeEngineConfig::default()))
        });
        let config = SchedulerConfig {
            strategy: SchedulingStrategy::SweepAndPrune,
            ..Default::default()
        };
        let mut scheduler = Scheduler::new(config, factory).unwrap();
        let handle = scheduler.handle();

        let spawned = populate(&handle, 6).unwrap();
        let report = scheduler.step(1.0 / 60.0, 4).unwrap();

        assert_eq!(spawned, 10);
        assert_eq!(report.commands_applied, 12);
        assert!(report.command_failures.is_empty());
        let states = handle.get_object_states(None);
        assert_eq!(states.len(), 10);
        let [left, right] = DUMBBELL.map(|id| states[&id].position);
        assert!((right - left).length() > 2.0 * DUMBBELL_HALF_LENGTH - 1e-6);
        assert_eq!(states[&PLATFORM].position, Vec3::new(0.0, -2.0, 0.0));
        assert!(states[&BOOSTER_CUBE].angular_velocity.y > 0.0);
        assert!(states[&ObjectId(FIRST_SPHERE)].position.x < RING_RADIUS);
    }
}
