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

//! The rigid body object model.

use crate::error::{LeonardError, Result};
use crate::math::{Aabb, Quaternion, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Box AABBs use `sqrt(3.1) * max(half_extents)` so that the cube still covers
/// the box under any rotation, with a small margin.
const BOX_AABB_FACTOR_SQ: f64 = 3.1;

/// An opaque, externally assigned object identifier.
///
/// Stable for the lifetime of the object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The collision geometry attached to a body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum CollisionShape {
    /// The body never collides.
    #[default]
    None,
    /// A sphere centered on the body's position.
    Sphere {
        /// The radius before scaling.
        radius: f64,
    },
    /// An oriented box centered on the body's position.
    Box {
        /// Half the edge length on each local axis, before scaling.
        half_extents: Vec3,
    },
}

impl CollisionShape {
    /// Checks that the shape parameters are finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        match *self {
            CollisionShape::None => Ok(()),
            CollisionShape::Sphere { radius } => {
                if radius.is_finite() && radius >= 0.0 {
                    Ok(())
                } else {
                    Err(LeonardError::validation(format!(
                        "sphere radius must be finite and >= 0, got {radius}"
                    )))
                }
            }
            CollisionShape::Box { half_extents } => {
                let ok = half_extents.is_finite()
                    && half_extents.x >= 0.0
                    && half_extents.y >= 0.0
                    && half_extents.z >= 0.0;
                if ok {
                    Ok(())
                } else {
                    Err(LeonardError::validation(format!(
                        "box half extents must be finite and >= 0, got {half_extents:?}"
                    )))
                }
            }
        }
    }

    /// Returns the half-width of a conservative bounding cube for this shape,
    /// or `None` if the shape never collides.
    pub fn bounding_radius(&self, scale: f64) -> Option<f64> {
        match *self {
            CollisionShape::None => None,
            CollisionShape::Sphere { radius } => Some(radius * scale),
            CollisionShape::Box { half_extents } => {
                Some(BOX_AABB_FACTOR_SQ.sqrt() * half_extents.max_element() * scale)
            }
        }
    }
}

/// The complete physical state of one rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyState {
    /// World-space position of the center of mass.
    pub position: Vec3,
    /// World-space orientation, always normalized.
    pub orientation: Quaternion,
    /// Linear velocity in m/s.
    pub linear_velocity: Vec3,
    /// Angular velocity in rad/s, world space.
    pub angular_velocity: Vec3,
    /// `1 / mass`; zero marks a static body.
    pub inverse_mass: f64,
    /// Bounciness, combined multiplicatively with the other body on contact.
    pub restitution: f64,
    /// The collision geometry.
    pub shape: CollisionShape,
    /// Uniform scale applied to the shape.
    pub scale: f64,
    /// Per-axis multiplier on linear velocity changes (0 = frozen, 1 = free).
    pub linear_lock: Vec3,
    /// Per-axis multiplier on angular velocity changes (0 = frozen, 1 = free).
    pub angular_lock: Vec3,
}

impl Default for RigidBodyState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quaternion::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            inverse_mass: 1.0,
            restitution: 0.9,
            shape: CollisionShape::None,
            scale: 1.0,
            linear_lock: Vec3::ONE,
            angular_lock: Vec3::ONE,
        }
    }
}

impl RigidBodyState {
    /// Returns `true` for bodies with infinite mass.
    pub fn is_static(&self) -> bool {
        self.inverse_mass == 0.0
    }

    /// Checks every invariant of a body state.
    ///
    /// The orientation must be finite and non-degenerate; it does not have to
    /// be normalized yet, see [`RigidBodyState::normalized`].
    pub fn validate(&self) -> Result<()> {
        check_vec("position", self.position)?;
        check_vec("linear_velocity", self.linear_velocity)?;
        check_vec("angular_velocity", self.angular_velocity)?;
        check_vec("linear_lock", self.linear_lock)?;
        check_vec("angular_lock", self.angular_lock)?;
        check_orientation(self.orientation)?;
        check_non_negative("inverse_mass", self.inverse_mass)?;
        check_non_negative("restitution", self.restitution)?;
        check_non_negative("scale", self.scale)?;
        self.shape.validate()
    }

    /// Returns a copy with a unit orientation.
    pub fn normalized(mut self) -> Self {
        self.orientation = self.orientation.normalize();
        self
    }

    /// The half-width of this body's bounding cube, if it collides at all.
    pub fn shape_radius(&self) -> Option<f64> {
        self.shape.bounding_radius(self.scale)
    }

    /// Builds the bounding cube of half-width `radius` around the position.
    pub fn aabb_with_radius(&self, radius: f64) -> Aabb {
        Aabb::cube(self.position, radius)
    }
}

/// A partial state update. `None` fields keep their current value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BodyOverride {
    /// New world position.
    pub position: Option<Vec3>,
    /// New orientation; normalized on apply.
    pub orientation: Option<Quaternion>,
    /// New linear velocity.
    pub linear_velocity: Option<Vec3>,
    /// New angular velocity.
    pub angular_velocity: Option<Vec3>,
    /// New inverse mass.
    pub inverse_mass: Option<f64>,
    /// New restitution.
    pub restitution: Option<f64>,
    /// New collision shape.
    pub shape: Option<CollisionShape>,
    /// New shape scale.
    pub scale: Option<f64>,
    /// New linear lock factors.
    pub linear_lock: Option<Vec3>,
    /// New angular lock factors.
    pub angular_lock: Option<Vec3>,
    /// Replaces the bounding cube half-width derived from the shape.
    pub aabb_radius: Option<f64>,
}

impl BodyOverride {
    /// Checks every provided field with the same rules as a full state.
    pub fn validate(&self) -> Result<()> {
        let vecs = [
            ("position", self.position),
            ("linear_velocity", self.linear_velocity),
            ("angular_velocity", self.angular_velocity),
            ("linear_lock", self.linear_lock),
            ("angular_lock", self.angular_lock),
        ];
        for (name, v) in vecs {
            if let Some(v) = v {
                check_vec(name, v)?;
            }
        }
        let scalars = [
            ("inverse_mass", self.inverse_mass),
            ("restitution", self.restitution),
            ("scale", self.scale),
            ("aabb_radius", self.aabb_radius),
        ];
        for (name, s) in scalars {
            if let Some(s) = s {
                check_non_negative(name, s)?;
            }
        }
        if let Some(q) = self.orientation {
            check_orientation(q)?;
        }
        if let Some(shape) = self.shape {
            shape.validate()?;
        }
        Ok(())
    }

    /// Writes every provided field into `state`.
    pub fn apply_to(&self, state: &mut RigidBodyState) {
        if let Some(v) = self.position {
            state.position = v;
        }
        if let Some(q) = self.orientation {
            state.orientation = q.normalize();
        }
        if let Some(v) = self.linear_velocity {
            state.linear_velocity = v;
        }
        if let Some(v) = self.angular_velocity {
            state.angular_velocity = v;
        }
        if let Some(m) = self.inverse_mass {
            state.inverse_mass = m;
        }
        if let Some(r) = self.restitution {
            state.restitution = r;
        }
        if let Some(shape) = self.shape {
            state.shape = shape;
        }
        if let Some(s) = self.scale {
            state.scale = s;
        }
        if let Some(v) = self.linear_lock {
            state.linear_lock = v;
        }
        if let Some(v) = self.angular_lock {
            state.angular_lock = v;
        }
    }
}

fn check_vec(name: &str, v: Vec3) -> Result<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(LeonardError::validation(format!(
            "{name} must be finite, got {v:?}"
        )))
    }
}

fn check_non_negative(name: &str, s: f64) -> Result<()> {
    if s.is_finite() && s >= 0.0 {
        Ok(())
    } else {
        Err(LeonardError::validation(format!(
            "{name} must be finite and >= 0, got {s}"
        )))
    }
}

fn check_orientation(q: Quaternion) -> Result<()> {
    if !q.is_finite() || q.magnitude_squared() < 1e-12 {
        return Err(LeonardError::validation(format!(
            "orientation must be a finite, non-zero quaternion, got {q:?}"
        )));
    }
    Ok(())
}
