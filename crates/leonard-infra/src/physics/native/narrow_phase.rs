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

//! Exact contact tests between pairs of collision shapes.

use leonard_core::math::{Quaternion, Vec3};
use leonard_core::object::CollisionShape;

/// Minimum separation below which a contact normal is considered undefined.
const NORMAL_EPSILON: f64 = 1e-6;

/// Geometric data describing one contact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactManifold {
    /// Contact normal pointing from the first shape to the second.
    pub normal: Vec3,
    /// How far the shapes interpenetrate along `normal`.
    pub depth: f64,
    /// World-space contact point.
    pub point: Vec3,
}

impl ContactManifold {
    /// Returns the same contact seen from the other shape.
    pub fn inverted(self) -> Self {
        Self {
            normal: -self.normal,
            ..self
        }
    }
}

/// A collision shape placed in the world, with its scale already applied.
#[derive(Debug, Clone, Copy)]
pub struct PlacedShape {
    /// The shape, scaled.
    pub shape: CollisionShape,
    /// World position of the shape center.
    pub position: Vec3,
    /// World orientation.
    pub orientation: Quaternion,
}

impl PlacedShape {
    /// Places `shape` scaled by `scale` at the given pose.
    pub fn new(shape: CollisionShape, scale: f64, position: Vec3, orientation: Quaternion) -> Self {
        let shape = match shape {
            CollisionShape::None => CollisionShape::None,
            CollisionShape::Sphere { radius } => CollisionShape::Sphere {
                radius: radius * scale,
            },
            CollisionShape::Box { half_extents } => CollisionShape::Box {
                half_extents: half_extents * scale,
            },
        };
        Self {
            shape,
            position,
            orientation,
        }
    }

    /// World-space half extents of the axis aligned box enclosing an oriented box.
    fn world_half_extents(&self, half: Vec3) -> Vec3 {
        let ax = self.orientation.rotate_vec3(Vec3::X * half.x);
        let ay = self.orientation.rotate_vec3(Vec3::Y * half.y);
        let az = self.orientation.rotate_vec3(Vec3::Z * half.z);
        Vec3::new(
            ax.x.abs() + ay.x.abs() + az.x.abs(),
            ax.y.abs() + ay.y.abs() + az.y.abs(),
            ax.z.abs() + ay.z.abs() + az.z.abs(),
        )
    }
}

/// Stateless pairwise contact detection.
#[derive(Debug, Default, Clone, Copy)]
pub struct NarrowPhase;

impl NarrowPhase {
    /// Creates a new `NarrowPhase` instance.
    pub fn new() -> Self {
        Self
    }

    /// Detects a contact between two placed shapes.
    ///
    /// Box-box contacts use the axis aligned hulls of both boxes, which is
    /// exact for unrotated boxes and conservative otherwise.
    pub fn detect(&self, a: &PlacedShape, b: &PlacedShape) -> Option<ContactManifold> {
        match (a.shape, b.shape) {
            (CollisionShape::Sphere { radius: ra }, CollisionShape::Sphere { radius: rb }) => {
                let delta = b.position - a.position;
                let dist_sq = delta.length_squared();
                let total_r = ra + rb;
                if dist_sq > total_r * total_r {
                    return None;
                }
                let dist = dist_sq.sqrt();
                let normal = if dist > NORMAL_EPSILON {
                    delta / dist
                } else {
                    Vec3::Y
                };
                Some(ContactManifold {
                    normal,
                    depth: total_r - dist,
                    point: a.position + normal * ra,
                })
            }
            (CollisionShape::Sphere { radius }, CollisionShape::Box { half_extents }) => {
                // Sphere center in box local space.
                let inv_rot = b.orientation.conjugate();
                let local = inv_rot.rotate_vec3(a.position - b.position);
                let closest = Vec3::new(
                    local.x.clamp(-half_extents.x, half_extents.x),
                    local.y.clamp(-half_extents.y, half_extents.y),
                    local.z.clamp(-half_extents.z, half_extents.z),
                );
                let delta = local - closest;
                let dist_sq = delta.length_squared();
                if dist_sq > radius * radius {
                    return None;
                }
                let dist = dist_sq.sqrt();
                // Outward normal of the box, pointing at the sphere.
                let local_normal = if dist > NORMAL_EPSILON {
                    delta / dist
                } else {
                    Vec3::Y
                };
                let box_to_sphere = b.orientation.rotate_vec3(local_normal);
                Some(ContactManifold {
                    normal: -box_to_sphere,
                    depth: radius - dist,
                    point: b.position + b.orientation.rotate_vec3(closest),
                })
            }
            (CollisionShape::Box { .. }, CollisionShape::Sphere { .. }) => {
                self.detect(b, a).map(ContactManifold::inverted)
            }
            (CollisionShape::Box { half_extents: ha }, CollisionShape::Box { half_extents: hb }) => {
                let ea = a.world_half_extents(ha);
                let eb = b.world_half_extents(hb);
                let delta = b.position - a.position;

                let mut best: Option<(usize, f64)> = None;
                for axis in 0..3 {
                    let overlap = ea[axis] + eb[axis] - delta[axis].abs();
                    if overlap < 0.0 {
                        return None;
                    }
                    if best.map_or(true, |(_, depth)| overlap < depth) {
                        best = Some((axis, overlap));
                    }
                }
                let (axis, depth) = best?;
                let sign = if delta[axis] < 0.0 { -1.0 } else { 1.0 };
                let normal = match axis {
                    0 => Vec3::X,
                    1 => Vec3::Y,
                    _ => Vec3::Z,
                } * sign;
                Some(ContactManifold {
                    normal,
                    depth,
                    point: a.position + delta * 0.5,
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sphere(r: f64, at: Vec3) -> PlacedShape {
        PlacedShape::new(CollisionShape::Sphere { radius: r }, 1.0, at, Quaternion::IDENTITY)
    }

    fn cube(h: f64, at: Vec3) -> PlacedShape {
        PlacedShape::new(
            CollisionShape::Box {
                half_extents: Vec3::splat(h),
            },
            1.0,
            at,
            Quaternion::IDENTITY,
        )
    }

    #[test]
    fn test_sphere_sphere_collision() {
        let m = NarrowPhase::new()
            .detect(&sphere(1.0, Vec3::ZERO), &sphere(1.0, Vec3::new(1.5, 0.0, 0.0)))
            .unwrap();
        assert_relative_eq!(m.normal.x, 1.0);
        assert_relative_eq!(m.depth, 0.5);
    }

    #[test]
    fn test_separated_spheres_do_not_collide() {
        let np = NarrowPhase::new();
        assert!(np
            .detect(&sphere(1.0, Vec3::ZERO), &sphere(1.0, Vec3::new(3.0, 0.0, 0.0)))
            .is_none());
    }

    #[test]
    fn test_sphere_box_normal_points_from_sphere_to_box() {
        let m = NarrowPhase::new()
            .detect(&sphere(1.0, Vec3::new(0.0, 1.5, 0.0)), &cube(1.0, Vec3::ZERO))
            .unwrap();
        assert_relative_eq!(m.normal.y, -1.0);
        assert_relative_eq!(m.depth, 0.5);

        let flipped = NarrowPhase::new()
            .detect(&cube(1.0, Vec3::ZERO), &sphere(1.0, Vec3::new(0.0, 1.5, 0.0)))
            .unwrap();
        assert_relative_eq!(flipped.normal.y, 1.0);
    }

    #[test]
    fn test_box_box_uses_axis_of_least_penetration() {
        let m = NarrowPhase::new()
            .detect(&cube(1.0, Vec3::ZERO), &cube(1.0, Vec3::new(1.8, 0.5, 0.0)))
            .unwrap();
        assert_eq!(m.normal, Vec3::X);
        assert_relative_eq!(m.depth, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_shapeless_bodies_never_touch() {
        let none = PlacedShape::new(CollisionShape::None, 1.0, Vec3::ZERO, Quaternion::IDENTITY);
        assert!(NarrowPhase::new().detect(&none, &sphere(5.0, Vec3::ZERO)).is_none());
    }
}
