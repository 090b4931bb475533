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

//! Impulse-based contact resolution.

use super::narrow_phase::ContactManifold;
use leonard_core::math::Vec3;
use leonard_core::object::RigidBodyState;

/// Resolves contacts by exchanging linear impulses along the contact normal.
#[derive(Debug, Clone, Copy)]
pub struct ImpulseSolver {
    /// Percentage of penetration to resolve per substep (Baumgarte stabilization).
    pub baumgarte_percent: f64,
    /// Penetration allowance to avoid jitter.
    pub slop: f64,
}

impl ImpulseSolver {
    /// Creates a new `ImpulseSolver` with default constants.
    pub fn new() -> Self {
        Self {
            baumgarte_percent: 0.2,
            slop: 0.005,
        }
    }

    /// Resolves a contact between `a` and `b`, where `manifold.normal` points
    /// from `a` to `b`.
    ///
    /// The restitution of the pair is the product of both bodies'
    /// restitutions. Velocity changes are filtered through each body's linear
    /// lock; static bodies are never touched.
    pub fn resolve(&self, a: &mut RigidBodyState, b: &mut RigidBodyState, manifold: &ContactManifold) {
        let inv_mass_a = a.inverse_mass;
        let inv_mass_b = b.inverse_mass;
        let total_inv_mass = inv_mass_a + inv_mass_b;
        if total_inv_mass <= 0.0 {
            return;
        }

        // Positional correction runs even for separating bodies so that
        // resting contacts do not sink.
        let correction_mag =
            (manifold.depth - self.slop).max(0.0) / total_inv_mass * self.baumgarte_percent;
        let correction = manifold.normal * correction_mag;
        a.position -= (correction * inv_mass_a).component_mul(a.linear_lock);
        b.position += (correction * inv_mass_b).component_mul(b.linear_lock);

        let rv = b.linear_velocity - a.linear_velocity;
        let vel_along_normal = rv.dot(manifold.normal);
        if vel_along_normal > 0.0 {
            return;
        }

        let restitution = a.restitution * b.restitution;
        let j = -(1.0 + restitution) * vel_along_normal / total_inv_mass;
        let impulse: Vec3 = manifold.normal * j;

        a.linear_velocity -= (impulse * inv_mass_a).component_mul(a.linear_lock);
        b.linear_velocity += (impulse * inv_mass_b).component_mul(b.linear_lock);
    }
}

impl ImpulseSolver {
    /// Enforces a ball joint after positions were integrated.
    ///
    /// `pivot_a` and `pivot_b` are in the local frames of `a` and `b`. The
    /// gap between the two world pivots is closed in full, split by inverse
    /// mass, and the relative velocity that would widen it again is removed.
    /// Rotation is left free.
    pub fn resolve_point_joint(
        &self,
        a: &mut RigidBodyState,
        b: &mut RigidBodyState,
        pivot_a: Vec3,
        pivot_b: Vec3,
    ) {
        let inv_mass_a = a.inverse_mass;
        let inv_mass_b = b.inverse_mass;
        let total_inv_mass = inv_mass_a + inv_mass_b;
        if total_inv_mass <= 0.0 {
            return;
        }

        let world_a = a.position + a.orientation.rotate_vec3(pivot_a);
        let world_b = b.position + b.orientation.rotate_vec3(pivot_b);
        let gap = world_b - world_a;
        let distance = gap.length();
        if distance <= f64::EPSILON {
            return;
        }
        let normal = gap / distance;

        let vel_along_gap = (b.linear_velocity - a.linear_velocity).dot(normal);
        if vel_along_gap > 0.0 {
            let impulse = normal * (vel_along_gap / total_inv_mass);
            a.linear_velocity += (impulse * inv_mass_a).component_mul(a.linear_lock);
            b.linear_velocity -= (impulse * inv_mass_b).component_mul(b.linear_lock);
        }

        let correction = gap / total_inv_mass;
        a.position += (correction * inv_mass_a).component_mul(a.linear_lock);
        b.position -= (correction * inv_mass_b).component_mul(b.linear_lock);
    }
}

impl Default for ImpulseSolver {
    fn default() -> Self {
        Self::new()
    }
}
