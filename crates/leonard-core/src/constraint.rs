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

//! Joints that tie two bodies together.
//!
//! A constraint is stored once per unordered pair of bodies. Besides being
//! solved by the engine, it changes how the world is partitioned: two bodies
//! joined by a constraint always end up in the same collision group, e.g. a
//! pendulum bob and its anchor are stepped in one package even when their
//! boxes are metres apart.

use crate::error::{LeonardError, Result};
use crate::math::Vec3;
use crate::object::ObjectId;
use serde::{Deserialize, Serialize};

/// The joint type and its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// A ball joint. The two pivots, each given in its body's local frame,
    /// are held at the same world point while both bodies rotate freely.
    PointToPoint {
        /// Pivot on body `a`, relative to its center of mass.
        pivot_a: Vec3,
        /// Pivot on body `b`, relative to its center of mass.
        pivot_b: Vec3,
    },
}

/// A joint between bodies `a` and `b`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// The first body.
    pub a: ObjectId,
    /// The second body.
    pub b: ObjectId,
    /// What the joint enforces.
    pub kind: ConstraintKind,
}

impl Constraint {
    /// A ball joint between `a` and `b`.
    pub fn point_to_point(a: ObjectId, b: ObjectId, pivot_a: Vec3, pivot_b: Vec3) -> Self {
        Self {
            a,
            b,
            kind: ConstraintKind::PointToPoint { pivot_a, pivot_b },
        }
    }

    /// The unordered pair this constraint is stored under, smaller id first.
    pub fn key(&self) -> (ObjectId, ObjectId) {
        pair_key(self.a, self.b)
    }

    /// Returns `true` if either end is `id`.
    pub fn involves(&self, id: ObjectId) -> bool {
        self.a == id || self.b == id
    }

    /// The same joint with `a < b`, swapping the per-body parameters if needed.
    pub fn canonical(self) -> Self {
        if self.a <= self.b {
            return self;
        }
        let kind = match self.kind {
            ConstraintKind::PointToPoint { pivot_a, pivot_b } => ConstraintKind::PointToPoint {
                pivot_a: pivot_b,
                pivot_b: pivot_a,
            },
        };
        Self {
            a: self.b,
            b: self.a,
            kind,
        }
    }

    /// Rejects self-joints and non-finite parameters.
    pub fn validate(&self) -> Result<()> {
        if self.a == self.b {
            return Err(LeonardError::validation(format!(
                "a constraint needs two distinct bodies, got {} twice",
                self.a
            )));
        }
        match self.kind {
            ConstraintKind::PointToPoint { pivot_a, pivot_b } => {
                if pivot_a.is_finite() && pivot_b.is_finite() {
                    Ok(())
                } else {
                    Err(LeonardError::validation(format!(
                        "constraint pivots must be finite, got {pivot_a:?} and {pivot_b:?}"
                    )))
                }
            }
        }
    }
}

/// Orders two ids into the key a constraint between them is stored under.
pub fn pair_key(a: ObjectId, b: ObjectId) -> (ObjectId, ObjectId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_swaps_pivots_with_ids() {
        let joint = Constraint::point_to_point(ObjectId(5), ObjectId(2), Vec3::X, Vec3::Y);
        let canonical = joint.canonical();
        assert_eq!((canonical.a, canonical.b), (ObjectId(2), ObjectId(5)));
        assert_eq!(
            canonical.kind,
            ConstraintKind::PointToPoint {
                pivot_a: Vec3::Y,
                pivot_b: Vec3::X,
            }
        );
        assert_eq!(joint.key(), canonical.key());
    }

    #[test]
    fn test_self_joint_and_nan_pivot_are_rejected() {
        let looped = Constraint::point_to_point(ObjectId(1), ObjectId(1), Vec3::ZERO, Vec3::ZERO);
        assert!(matches!(looped.validate(), Err(LeonardError::Validation(_))));

        let nan = Constraint::point_to_point(
            ObjectId(1),
            ObjectId(2),
            Vec3::new(f64::NAN, 0.0, 0.0),
            Vec3::ZERO,
        );
        assert!(nan.validate().is_err());
        assert!(nan.involves(ObjectId(2)));
        assert!(!nan.involves(ObjectId(3)));
    }
}
