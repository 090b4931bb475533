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

//! The executor abstraction shared by the in-process and threaded backends.

use leonard_core::error::{FatalError, LeonardError, Result};
use leonard_core::object::{ObjectId, RigidBodyState};
use leonard_core::package::WorkPackage;
use leonard_core::physics::{ContactPair, PhysicsEngine};
use leonard_core::PackageResult;
use std::collections::{BTreeMap, HashSet};

/// Builds the replacement for an abandoned package from current world state.
pub type RebuildFn<'a> = dyn FnMut(&WorkPackage) -> Result<WorkPackage> + 'a;

/// Everything a batch produced.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    /// Updated state per object, only for objects that were dispatched.
    pub states: BTreeMap<ObjectId, RigidBodyState>,
    /// Contacts reported by completed packages.
    pub contacts: Vec<ContactPair>,
    /// Packages that completed and were merged into `states`.
    pub completed: usize,
    /// Packages abandoned and rebuilt.
    pub retries: u32,
    /// Workers recycled or replaced while running the batch.
    pub restarts: u32,
}

impl DispatchOutcome {
    /// Folds one completed package into the outcome. Each object is merged exactly once.
    pub(crate) fn absorb(&mut self, package: &WorkPackage, result: PackageResult) {
        for id in &package.object_ids {
            if let Some(state) = result.states.get(id) {
                self.states.insert(*id, *state);
            }
        }
        self.contacts.extend(result.contacts);
        self.completed += 1;
    }
}

/// A batch that stopped on a fatal error.
///
/// `completed` holds everything that finished before the failure; callers
/// are expected to commit it.
#[derive(Debug)]
pub struct DispatchFailure {
    /// The error that stopped the batch.
    pub error: LeonardError,
    /// Work completed before the failure.
    pub completed: DispatchOutcome,
}

/// Runs batches of work packages to completion.
pub trait PackageExecutor: Send {
    /// A short name for logs.
    fn name(&self) -> &'static str;

    /// Runs every package, retrying abandoned ones through `rebuild`.
    ///
    /// Blocks until every package has completed or the batch failed. Packages
    /// of one batch must cover disjoint object sets.
    fn execute(
        &mut self,
        packages: Vec<WorkPackage>,
        rebuild: &mut RebuildFn<'_>,
    ) -> std::result::Result<DispatchOutcome, DispatchFailure>;

    /// Releases workers. Executors are unusable afterwards.
    fn shutdown(&mut self) {}
}

/// Fails if any object appears in more than one package of the batch.
pub fn ensure_disjoint(packages: &[WorkPackage]) -> Result<()> {
    let mut seen = HashSet::new();
    for package in packages {
        for id in &package.object_ids {
            if !seen.insert(*id) {
                return Err(LeonardError::validation(format!(
                    "object {id} appears in more than one package of the batch ({})",
                    package.id
                )));
            }
        }
    }
    Ok(())
}

/// Error for a group that was abandoned more often than allowed.
pub(crate) fn ceiling_check(abandoned: &WorkPackage, ceiling: u32) -> Result<()> {
    let attempts = abandoned.attempt + 1;
    if attempts > ceiling {
        return Err(FatalError::RetryCeilingExceeded {
            objects: abandoned.object_ids.clone(),
            attempts,
            ceiling,
        }
        .into());
    }
    Ok(())
}

/// Runs packages one after another on a single engine in the calling thread.
///
/// Used by the serial and sweep-and-prune strategies. An engine error, or a
/// result that fails [`PackageResult::checked`], abandons the package exactly
/// like a worker failure would.
pub struct InlineExecutor {
    engine: Box<dyn PhysicsEngine>,
    retry_ceiling: u32,
}

impl InlineExecutor {
    /// Wraps an engine.
    pub fn new(engine: Box<dyn PhysicsEngine>, retry_ceiling: u32) -> Self {
        Self {
            engine,
            retry_ceiling: retry_ceiling.max(1),
        }
    }

    fn run_batch(
        &mut self,
        packages: Vec<WorkPackage>,
        rebuild: &mut RebuildFn<'_>,
        outcome: &mut DispatchOutcome,
    ) -> Result<()> {
        ensure_disjoint(&packages)?;
        for mut package in packages {
            loop {
                let result = self
                    .engine
                    .step_package(&package)
                    .and_then(|result| result.checked(&package));
                match result {
                    Ok(result) => {
                        log::debug!(
                            "{} completed {} ({} objects)",
                            self.engine.name(),
                            package.id,
                            package.len()
                        );
                        outcome.absorb(&package, result);
                        break;
                    }
                    Err(e) => {
                        log::warn!("abandoning {} after engine error: {e}", package.id);
                        ceiling_check(&package, self.retry_ceiling)?;
                        outcome.retries += 1;
                        package = rebuild(&package)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl PackageExecutor for InlineExecutor {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn execute(
        &mut self,
        packages: Vec<WorkPackage>,
        rebuild: &mut RebuildFn<'_>,
    ) -> std::result::Result<DispatchOutcome, DispatchFailure> {
        let mut outcome = DispatchOutcome::default();
        match self.run_batch(packages, rebuild, &mut outcome) {
            Ok(()) => Ok(outcome),
            Err(error) => Err(DispatchFailure {
                error,
                completed: outcome,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leonard_core::math::Vec3;
    use leonard_core::package::{PackageId, PackageIdAllocator};
    use std::collections::BTreeMap;

    /// Moves every body one unit along x per step; fails the first `failures`
    /// steps, then turns positions to `NaN` for the next `corrupt` steps.
    struct ShiftEngine {
        bodies: BTreeMap<ObjectId, RigidBodyState>,
        failures: u32,
        corrupt: u32,
    }

    impl PhysicsEngine for ShiftEngine {
        fn name(&self) -> &'static str {
            "shift"
        }
        fn reset(&mut self) {
            self.bodies.clear();
        }
        fn set_body_state(&mut self, id: ObjectId, state: &RigidBodyState) -> Result<()> {
            self.bodies.insert(id, *state);
            Ok(())
        }
        fn body_state(&self, id: ObjectId) -> Option<RigidBodyState> {
            self.bodies.get(&id).copied()
        }
        fn apply_force(&mut self, _: ObjectId, _: Vec3, _: Vec3) -> Result<()> {
            Ok(())
        }
        fn step(&mut self, _: f64, _: u32) -> Result<()> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(LeonardError::Engine("injected".into()));
            }
            let shift = if self.corrupt > 0 {
                self.corrupt -= 1;
                Vec3::new(f64::NAN, 0.0, 0.0)
            } else {
                Vec3::X
            };
            for body in self.bodies.values_mut() {
                body.position += shift;
            }
            Ok(())
        }
        fn contacts(&self) -> Vec<ContactPair> {
            Vec::new()
        }
    }

    fn package(id: u64, objects: &[u64]) -> WorkPackage {
        let snapshot = objects
            .iter()
            .map(|o| (ObjectId(*o), RigidBodyState::default()))
            .collect();
        WorkPackage::new(PackageId(id), snapshot, BTreeMap::new(), 0.1, 4)
    }

    #[test]
    fn test_inline_runs_every_package() {
        let mut executor = InlineExecutor::new(
            Box::new(ShiftEngine {
                bodies: BTreeMap::new(),
                failures: 0,
                corrupt: 0,
            }),
            3,
        );
        let mut rebuild = |_: &WorkPackage| -> Result<WorkPackage> { unreachable!() };
        let outcome = executor
            .execute(vec![package(1, &[1, 2]), package(2, &[3])], &mut rebuild)
            .unwrap();
        assert_eq!(outcome.completed, 2);
        assert_eq!(outcome.states.len(), 3);
        assert_eq!(outcome.states[&ObjectId(3)].position, Vec3::X);
    }

    #[test]
    fn test_inline_retries_with_fresh_id() {
        let alloc = PackageIdAllocator::new();
        let first = WorkPackage::new(
            alloc.next_id(),
            [(ObjectId(1), RigidBodyState::default())].into_iter().collect(),
            BTreeMap::new(),
            0.1,
            4,
        );
        let first_id = first.id;
        let mut seen = Vec::new();
        let mut rebuild = |old: &WorkPackage| -> Result<WorkPackage> {
            seen.push(old.id);
            Ok(WorkPackage::rebuild(old, alloc.next_id(), old.snapshot.clone()))
        };
        let mut executor = InlineExecutor::new(
            Box::new(ShiftEngine {
                bodies: BTreeMap::new(),
                failures: 2,
                corrupt: 0,
            }),
            3,
        );
        let outcome = executor.execute(vec![first], &mut rebuild).unwrap();
        assert_eq!(outcome.retries, 2);
        assert_eq!(outcome.states[&ObjectId(1)].position, Vec3::X);
        assert_eq!(seen[0], first_id);
        assert_ne!(seen[1], first_id);
    }

    #[test]
    fn test_inline_ceiling_is_fatal() {
        let alloc = PackageIdAllocator::new();
        let mut rebuild = |old: &WorkPackage| -> Result<WorkPackage> {
            Ok(WorkPackage::rebuild(old, alloc.next_id(), old.snapshot.clone()))
        };
        let mut executor = InlineExecutor::new(
            Box::new(ShiftEngine {
                bodies: BTreeMap::new(),
                failures: u32::MAX,
                corrupt: 0,
            }),
            2,
        );
        let failure = executor
            .execute(vec![package(100, &[7]), package(101, &[8])], &mut rebuild)
            .unwrap_err();
        assert!(failure.error.is_fatal());
        assert_eq!(failure.completed.completed, 0);
    }

    #[test]
    fn test_inline_retries_non_finite_result() {
        let alloc = PackageIdAllocator::new();
        let mut rebuild = |old: &WorkPackage| -> Result<WorkPackage> {
            Ok(WorkPackage::rebuild(old, alloc.next_id(), old.snapshot.clone()))
        };
        let mut executor = InlineExecutor::new(
            Box::new(ShiftEngine {
                bodies: BTreeMap::new(),
                failures: 0,
                corrupt: 1,
            }),
            3,
        );
        let outcome = executor
            .execute(vec![package(50, &[4])], &mut rebuild)
            .unwrap();
        assert_eq!(outcome.retries, 1);
        assert_eq!(outcome.states[&ObjectId(4)].position, Vec3::X);
    }

    #[test]
    fn test_overlapping_batch_is_refused() {
        let batch = vec![package(1, &[1, 2]), package(2, &[2, 3])];
        assert!(matches!(
            ensure_disjoint(&batch),
            Err(LeonardError::Validation(_))
        ));
    }
}
