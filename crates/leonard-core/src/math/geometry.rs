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

//! Provides the axis-aligned bounding box used by the broad phase.

use super::Vec3;
use serde::{Deserialize, Serialize};

/// An Axis-Aligned Bounding Box (AABB).
///
/// Represented by its minimum and maximum corner points. Bounds are treated as
/// closed intervals: touching boxes overlap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// The corner of the box with the smallest coordinates on all axes.
    pub min: Vec3,
    /// The corner of the box with the largest coordinates on all axes.
    pub max: Vec3,
}

impl Aabb {
    /// Creates a new `Aabb` from two corner points, sorting the components.
    #[inline]
    pub fn from_min_max(min_pt: Vec3, max_pt: Vec3) -> Self {
        Self {
            min: min_pt.min(max_pt),
            max: min_pt.max(max_pt),
        }
    }

    /// Creates a new `Aabb` from a center point and its half-extents.
    #[inline]
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self::from_min_max(center - half_extents, center + half_extents)
    }

    /// Creates a cube of half-width `radius` around `center`.
    #[inline]
    pub fn cube(center: Vec3, radius: f64) -> Self {
        Self::from_center_half_extents(center, Vec3::splat(radius))
    }

    /// Returns the lower and upper bound of the box on `axis` (0 = x, 1 = y, 2 = z).
    #[inline]
    pub fn interval(&self, axis: usize) -> (f64, f64) {
        (self.min[axis], self.max[axis])
    }

    /// Checks that both corners are finite and `min <= max` on every axis.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite()
            && self.max.is_finite()
            && self.min.x <= self.max.x
            && self.min.y <= self.max.y
            && self.min.z <= self.max.z
    }

    /// Returns `true` if the box has zero width on at least one axis.
    pub fn is_degenerate(&self) -> bool {
        (0..3).any(|axis| {
            let (lo, hi) = self.interval(axis);
            lo >= hi
        })
    }

    /// Checks if this AABB intersects with another one, closed on both ends.
    #[inline]
    pub fn intersects_aabb(&self, other: &Aabb) -> bool {
        (self.min.x <= other.max.x && self.max.x >= other.min.x)
            && (self.min.y <= other.max.y && self.max.y >= other.min.y)
            && (self.min.z <= other.max.z && self.max.z >= other.min.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touching_boxes_intersect() {
        let a = Aabb::from_min_max(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::from_min_max(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        assert!(a.intersects_aabb(&b));
    }

    #[test]
    fn test_from_min_max_sorts_corners() {
        let a = Aabb::from_min_max(Vec3::ONE, Vec3::ZERO);
        assert_eq!(a.min, Vec3::ZERO);
        assert!(a.is_valid());
    }

    #[test]
    fn test_degenerate_and_invalid() {
        assert!(Aabb::cube(Vec3::ZERO, 0.0).is_degenerate());
        let bad = Aabb {
            min: Vec3::new(f64::NAN, 0.0, 0.0),
            max: Vec3::ONE,
        };
        assert!(!bad.is_valid());
    }
}
