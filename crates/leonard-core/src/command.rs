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

//! Mutation commands submitted by API callers and consumed once per tick.

use crate::constraint::Constraint;
use crate::error::{LeonardError, Result};
use crate::math::Vec3;
use crate::object::{BodyOverride, ObjectId, RigidBodyState};
use serde::{Deserialize, Serialize};

/// A pending mutation of the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Creates a new object. Fails if `id` is already live.
    Spawn {
        /// The caller chosen id.
        id: ObjectId,
        /// The initial state of the body.
        state: RigidBodyState,
        /// Overrides the bounding cube half-width derived from the shape.
        aabb_radius: Option<f64>,
    },
    /// Deletes an object. Unknown ids are ignored.
    Remove {
        /// The object to delete.
        id: ObjectId,
    },
    /// Overwrites some fields of an object once.
    Override {
        /// The object to modify.
        id: ObjectId,
        /// The fields to replace.
        partial: BodyOverride,
    },
    /// Adds a one-shot force and torque in world space, acting over the next step.
    ApplyForce {
        /// The target object.
        id: ObjectId,
        /// Force in newtons.
        force: Vec3,
        /// Torque in newton metres.
        torque: Vec3,
    },
    /// Adds a one-shot force applied at an offset from the center of mass.
    ApplyForceAtPosition {
        /// The target object.
        id: ObjectId,
        /// Force in newtons, world space.
        force: Vec3,
        /// Application point relative to the center of mass, world space.
        relative_position: Vec3,
    },
    /// Adds a one-shot force and torque expressed in the body frame.
    ///
    /// Rotated into world space by the body's orientation when the force is
    /// staged into a work package.
    ApplyBoosterForce {
        /// The target object.
        id: ObjectId,
        /// Force in the body frame.
        force: Vec3,
        /// Torque in the body frame.
        torque: Vec3,
    },
    /// Joins two live bodies, replacing any constraint already stored for
    /// the same pair.
    AddConstraint {
        /// The joint to add.
        constraint: Constraint,
    },
    /// Deletes the constraint between `a` and `b`, in either order. Unknown
    /// pairs are ignored.
    RemoveConstraint {
        /// One end of the joint.
        a: ObjectId,
        /// The other end.
        b: ObjectId,
    },
}

impl Command {
    /// The object this command targets. Constraint commands report their
    /// first body.
    pub fn id(&self) -> ObjectId {
        match self {
            Command::AddConstraint { constraint } => constraint.a,
            Command::RemoveConstraint { a, .. } => *a,
            Command::Spawn { id, .. }
            | Command::Remove { id }
            | Command::Override { id, .. }
            | Command::ApplyForce { id, .. }
            | Command::ApplyForceAtPosition { id, .. }
            | Command::ApplyBoosterForce { id, .. } => *id,
        }
    }

    /// A short name for logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Spawn { .. } => "spawn",
            Command::Remove { .. } => "remove",
            Command::Override { .. } => "override",
            Command::ApplyForce { .. } => "apply_force",
            Command::ApplyForceAtPosition { .. } => "apply_force_at_position",
            Command::ApplyBoosterForce { .. } => "apply_booster_force",
            Command::AddConstraint { .. } => "add_constraint",
            Command::RemoveConstraint { .. } => "remove_constraint",
        }
    }

    /// Rejects malformed payloads. Called at enqueue time.
    pub fn validate(&self) -> Result<()> {
        match self {
            Command::Spawn {
                state, aabb_radius, ..
            } => {
                state.validate()?;
                match aabb_radius {
                    Some(r) if !r.is_finite() || *r < 0.0 => Err(LeonardError::validation(
                        format!("aabb_radius must be finite and >= 0, got {r}"),
                    )),
                    _ => Ok(()),
                }
            }
            Command::Remove { .. } => Ok(()),
            Command::Override { partial, .. } => partial.validate(),
            Command::ApplyForce { force, torque, .. }
            | Command::ApplyBoosterForce { force, torque, .. } => {
                finite("force", *force)?;
                finite("torque", *torque)
            }
            Command::ApplyForceAtPosition {
                force,
                relative_position,
                ..
            } => {
                finite("force", *force)?;
                finite("relative_position", *relative_position)
            }
            Command::AddConstraint { constraint } => constraint.validate(),
            Command::RemoveConstraint { a, b } => {
                if a == b {
                    Err(LeonardError::validation(format!(
                        "a constraint needs two distinct bodies, got {a} twice"
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }
}

fn finite(name: &str, v: Vec3) -> Result<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(LeonardError::validation(format!(
            "{name} must be finite, got {v:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_and_kind() {
        let cmd = Command::Remove { id: ObjectId(9) };
        assert_eq!(cmd.id(), ObjectId(9));
        assert_eq!(cmd.kind(), "remove");
    }

    #[test]
    fn test_nan_force_is_rejected() {
        let cmd = Command::ApplyForce {
            id: ObjectId(1),
            force: Vec3::new(f64::NAN, 0.0, 0.0),
            torque: Vec3::ZERO,
        };
        assert!(matches!(cmd.validate(), Err(LeonardError::Validation(_))));
    }

    #[test]
    fn test_spawn_with_negative_radius_is_rejected() {
        let cmd = Command::Spawn {
            id: ObjectId(1),
            state: RigidBodyState::default(),
            aabb_radius: Some(-1.0),
        };
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn test_constraint_commands_report_first_body() {
        let add = Command::AddConstraint {
            constraint: Constraint::point_to_point(ObjectId(3), ObjectId(8), Vec3::X, -Vec3::X),
        };
        assert_eq!(add.id(), ObjectId(3));
        assert_eq!(add.kind(), "add_constraint");
        assert!(add.validate().is_ok());

        let remove = Command::RemoveConstraint {
            a: ObjectId(4),
            b: ObjectId(4),
        };
        assert_eq!(remove.kind(), "remove_constraint");
        assert!(matches!(remove.validate(), Err(LeonardError::Validation(_))));
    }

    #[test]
    fn test_override_with_infinite_position_is_rejected() {
        let cmd = Command::Override {
            id: ObjectId(1),
            partial: BodyOverride {
                position: Some(Vec3::new(0.0, f64::INFINITY, 0.0)),
                ..Default::default()
            },
        };
        assert!(cmd.validate().is_err());
    }
}
