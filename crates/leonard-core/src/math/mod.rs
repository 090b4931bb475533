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

//! Double precision math primitives for the simulation.
//!
//! Positions and velocities are kept in `f64` so that long running worlds do
//! not drift between ticks. All angular quantities are in **radians**.

// --- Fundamental Constants ---

/// A small constant for floating-point comparisons.
pub const EPSILON: f64 = 1e-9;

// --- Declare Sub-Modules ---

pub mod geometry;
pub mod quaternion;
pub mod vector;

// --- Re-export Principal Types ---

pub use self::geometry::Aabb;
pub use self::quaternion::Quaternion;
pub use self::vector::Vec3;

/// Performs an approximate equality comparison between two floats with a custom tolerance.
///
/// # Examples
///
/// ```
/// use leonard_core::math::approx_eq_eps;
/// assert!(approx_eq_eps(0.001, 0.002, 1e-2));
/// assert!(!approx_eq_eps(0.001, 0.002, 1e-4));
/// ```
#[inline]
pub fn approx_eq_eps(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}
