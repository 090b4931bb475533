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

//! Provides a Quaternion type for body orientations.

use super::{Vec3, EPSILON};
use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// Represents a rotation in 3D space using a quaternion.
///
/// Stored as `(x, y, z, w)` where `w` is the scalar part. Orientations held by
/// a [`RigidBodyState`](crate::object::RigidBodyState) are always normalized.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    /// The x component of the vector part.
    pub x: f64,
    /// The y component of the vector part.
    pub y: f64,
    /// The z component of the vector part.
    pub z: f64,
    /// The scalar (real) part.
    pub w: f64,
}

impl Quaternion {
    /// The identity quaternion, representing no rotation.
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Creates a new quaternion from its raw components.
    ///
    /// Note: This does not guarantee a unit quaternion.
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// Creates a quaternion representing a rotation around a given axis by a given angle.
    ///
    /// The `axis` is normalized internally.
    #[inline]
    pub fn from_axis_angle(axis: Vec3, angle_radians: f64) -> Self {
        let normalized_axis = axis.normalize();
        let half_angle = angle_radians * 0.5;
        let s = half_angle.sin();
        let c = half_angle.cos();
        Self {
            x: normalized_axis.x * s,
            y: normalized_axis.y * s,
            z: normalized_axis.z * s,
            w: c,
        }
    }

    /// Computes the squared length (magnitude) of the quaternion.
    #[inline]
    pub fn magnitude_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    /// Returns `true` if every component is neither infinite nor NaN.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.w.is_finite()
    }

    /// Returns a normalized version of the quaternion with a length of 1.
    /// A degenerate quaternion normalizes to [`Quaternion::IDENTITY`].
    #[inline]
    pub fn normalize(&self) -> Self {
        let mag_sq = self.magnitude_squared();
        if mag_sq > EPSILON * EPSILON {
            let inv_mag = 1.0 / mag_sq.sqrt();
            Self::new(
                self.x * inv_mag,
                self.y * inv_mag,
                self.z * inv_mag,
                self.w * inv_mag,
            )
        } else {
            Self::IDENTITY
        }
    }

    /// Computes the conjugate, which for a unit quaternion is its inverse.
    #[inline]
    pub fn conjugate(&self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Rotates a 3D vector by this quaternion.
    #[inline]
    pub fn rotate_vec3(&self, v: Vec3) -> Vec3 {
        let u = Vec3::new(self.x, self.y, self.z);
        let s = self.w;
        2.0 * u.dot(v) * u + (s * s - u.dot(u)) * v + 2.0 * s * u.cross(v)
    }

    /// Advances an orientation by an angular velocity over `dt` seconds.
    ///
    /// The rotation is applied in world space and the result is renormalized.
    pub fn integrate(&self, angular_velocity: Vec3, dt: f64) -> Self {
        let w_mag = angular_velocity.length();
        if w_mag <= EPSILON {
            return *self;
        }
        let delta = Self::from_axis_angle(angular_velocity, w_mag * dt);
        (delta * *self).normalize()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul<Quaternion> for Quaternion {
    type Output = Self;
    /// Combines two rotations. `a * b` applies `b` first, then `a`.
    #[inline]
    fn mul(self, rhs: Self) -> Self::Output {
        Self::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }
}
