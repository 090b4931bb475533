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

//! The threaded dispatcher.
//!
//! Each worker owns one engine and one package at a time. The pool fans a
//! batch out over idle workers, then waits on every outstanding reply channel
//! at once with a deadline. A closed channel means the worker crashed; a
//! missed deadline means it hung. Either way its package is abandoned, a
//! replacement package is rebuilt from current world state and queued again,
//! and the worker is replaced.

use crate::config::DispatchConfig;
use crate::executor::{
    ceiling_check, ensure_disjoint, DispatchFailure, DispatchOutcome, PackageExecutor, RebuildFn,
};
use crate::worker::{Reply, WorkerHandle};
use crossbeam_channel::Select;
use leonard_core::error::{FatalError, LeonardError, Result};
use leonard_core::object::ObjectId;
use leonard_core::package::WorkPackage;
use leonard_core::physics::EngineFactory;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

enum PoolEvent {
    Replied(usize, Reply),
    Crashed(usize),
    TimedOut(usize),
}

/// A fixed-size pool of physics worker threads.
///
/// Each worker owns one engine built by the factory and runs at most one
/// package at a time. A worker is replaced when it crashes (its thread
/// panicked or exited), when it misses the package deadline (the thread is
/// detached and left to finish on its own), and when its randomly drawn
/// package budget runs out, e.g. with `restart_min = 100` and
/// `restart_max = 200` every worker is recycled after 100 to 200 packages.
/// Packages owned by a failed worker are rebuilt with a fresh id and queued
/// ahead of untouched ones.
pub struct WorkerPool {
    config: DispatchConfig,
    factory: Arc<dyn EngineFactory>,
    workers: Vec<WorkerHandle>,
    rng: StdRng,
    next_seq: u64,
    in_flight: HashSet<ObjectId>,
    restarts_total: u64,
}

impl WorkerPool {
    /// Validates the configuration and brings up every worker.
    pub fn new(config: DispatchConfig, factory: Arc<dyn EngineFactory>) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut pool = Self {
            workers: Vec::with_capacity(config.workers),
            config,
            factory,
            rng,
            next_seq: 0,
            in_flight: HashSet::new(),
            restarts_total: 0,
        };
        for _ in 0..pool.config.workers {
            let worker = pool.spawn_worker()?;
            pool.workers.push(worker);
        }
        log::info!("worker pool up with {} workers", pool.workers.len());
        Ok(pool)
    }

    /// Number of live workers.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Workers recycled or replaced since the pool was created.
    pub fn restarts_total(&self) -> u64 {
        self.restarts_total
    }

    /// Objects whose package is currently held by a worker.
    pub fn in_flight(&self) -> &HashSet<ObjectId> {
        &self.in_flight
    }

    /// Stops every worker and joins the ones that are idle.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        for worker in self.workers.drain(..) {
            if worker.assignment.is_some() {
                worker.detach();
            } else {
                worker.stop();
            }
        }
        self.in_flight.clear();
        log::info!("worker pool stopped");
    }

    fn spawn_worker(&mut self) -> Result<WorkerHandle> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let budget = self
            .rng
            .gen_range(self.config.restart_min..=self.config.restart_max);
        WorkerHandle::spawn(seq, Arc::clone(&self.factory), budget)
    }

    /// Swaps the worker at `slot` for a new one and disposes of the old one.
    fn replace(&mut self, slot: usize, dispose: fn(WorkerHandle)) -> Result<u32> {
        let fresh = self.spawn_worker()?;
        let old = std::mem::replace(&mut self.workers[slot], fresh);
        let old_seq = old.seq;
        dispose(old);
        self.restarts_total += 1;
        log::info!("worker {old_seq} replaced by {}", self.workers[slot].seq);
        Ok(1)
    }

    fn recycle(&mut self, slot: usize) -> Result<u32> {
        self.replace(slot, WorkerHandle::stop)
    }

    fn release(&mut self, package: &WorkPackage) {
        for id in &package.object_ids {
            self.in_flight.remove(id);
        }
    }

    fn assign(&mut self, slot: usize, package: WorkPackage) -> Result<bool> {
        if let Some(id) = package.object_ids.iter().find(|id| self.in_flight.contains(id)) {
            return Err(LeonardError::validation(format!(
                "object {id} is already in flight, refusing {}",
                package.id
            )));
        }
        self.in_flight.extend(package.object_ids.iter().copied());
        let deadline = Instant::now() + self.config.timeout;
        log::debug!(
            "{} ({} objects, attempt {}) -> worker {}",
            package.id,
            package.len(),
            package.attempt,
            self.workers[slot].seq
        );
        Ok(self.workers[slot].assign(package, deadline))
    }

    fn wait(&self) -> Option<PoolEvent> {
        let mut select = Select::new();
        let mut slots = Vec::new();
        let mut earliest: Option<Instant> = None;
        for (slot, worker) in self.workers.iter().enumerate() {
            if let Some(assignment) = &worker.assignment {
                select.recv(&worker.replies);
                slots.push(slot);
                earliest = Some(match earliest {
                    Some(t) => t.min(assignment.deadline),
                    None => assignment.deadline,
                });
            }
        }
        let earliest = earliest?;
        let timeout = earliest.saturating_duration_since(Instant::now());

        match select.select_timeout(timeout) {
            Ok(op) => {
                let slot = slots[op.index()];
                Some(match op.recv(&self.workers[slot].replies) {
                    Ok(reply) => PoolEvent::Replied(slot, reply),
                    Err(_) => PoolEvent::Crashed(slot),
                })
            }
            // The wait was bounded by the earliest deadline, so that worker is the late one.
            Err(_) => slots
                .into_iter()
                .filter_map(|slot| {
                    let deadline = self.workers[slot].assignment.as_ref()?.deadline;
                    Some((deadline, slot))
                })
                .min()
                .map(|(_, slot)| PoolEvent::TimedOut(slot)),
        }
    }

    /// Abandons a package and queues its replacement at the front.
    fn abandon(
        &mut self,
        worker: u64,
        package: WorkPackage,
        reason: String,
        rebuild: &mut RebuildFn<'_>,
        pending: &mut VecDeque<WorkPackage>,
        outcome: &mut DispatchOutcome,
    ) -> Result<()> {
        let failure = LeonardError::WorkerFailure {
            worker,
            package: package.id,
            reason,
        };
        log::warn!(
            "{failure} (attempt {}, objects {:?})",
            package.attempt,
            package.object_ids
        );
        ceiling_check(&package, self.config.retry_ceiling)?;
        let replacement = rebuild(&package)?;
        outcome.retries += 1;
        pending.push_front(replacement);
        Ok(())
    }

    fn run_batch(
        &mut self,
        packages: Vec<WorkPackage>,
        rebuild: &mut RebuildFn<'_>,
        outcome: &mut DispatchOutcome,
    ) -> Result<()> {
        ensure_disjoint(&packages)?;
        let mut pending: VecDeque<WorkPackage> = packages.into_iter().collect();

        loop {
            // Fan out.
            while !pending.is_empty() {
                let Some(slot) = self.workers.iter().position(WorkerHandle::is_idle) else {
                    break;
                };
                let Some(package) = pending.pop_front() else {
                    break;
                };
                if !self.assign(slot, package)? {
                    // The thread died between packages; its channel is closed.
                    if let Some(lost) = self.workers[slot].assignment.take() {
                        let seq = self.workers[slot].seq;
                        self.release(&lost.package);
                        outcome.restarts += self.replace(slot, WorkerHandle::reap)?;
                        let reason = "worker exited before taking the package".to_string();
                        self.abandon(seq, lost.package, reason, rebuild, &mut pending, outcome)?;
                    }
                }
            }

            let Some(event) = self.wait() else {
                if pending.is_empty() {
                    return Ok(());
                }
                if !self.workers.iter().any(WorkerHandle::is_idle) {
                    return Err(FatalError::PoolExhausted(format!(
                        "{} packages pending and no worker can take them",
                        pending.len()
                    ))
                    .into());
                }
                continue;
            };

            match event {
                PoolEvent::Replied(slot, reply) => {
                    let expected = self.workers[slot].assignment.as_ref().map(|a| a.package.id);
                    if expected != Some(reply.package) {
                        log::warn!(
                            "worker {} sent a reply for stale package {}, ignoring",
                            self.workers[slot].seq,
                            reply.package
                        );
                        continue;
                    }
                    let Some(done) = self.workers[slot].assignment.take() else {
                        continue;
                    };
                    self.release(&done.package);
                    match reply.result {
                        Ok(result) => {
                            log::debug!(
                                "{} completed by worker {}",
                                done.package.id,
                                self.workers[slot].seq
                            );
                            outcome.absorb(&done.package, result);
                            if self.workers[slot].lifecycle.complete_package() {
                                outcome.restarts += self.recycle(slot)?;
                            }
                        }
                        Err(e) => {
                            let seq = self.workers[slot].seq;
                            self.workers[slot].lifecycle.fail();
                            outcome.restarts += self.recycle(slot)?;
                            let reason = format!("engine error: {e}");
                            self.abandon(seq, done.package, reason, rebuild, &mut pending, outcome)?;
                        }
                    }
                }
                PoolEvent::Crashed(slot) => {
                    if let Some(lost) = self.workers[slot].assignment.take() {
                        let seq = self.workers[slot].seq;
                        self.release(&lost.package);
                        self.workers[slot].lifecycle.fail();
                        outcome.restarts += self.replace(slot, WorkerHandle::reap)?;
                        let reason = "worker crashed".to_string();
                        self.abandon(seq, lost.package, reason, rebuild, &mut pending, outcome)?;
                    }
                }
                PoolEvent::TimedOut(slot) => {
                    if let Some(lost) = self.workers[slot].assignment.take() {
                        let seq = self.workers[slot].seq;
                        self.release(&lost.package);
                        self.workers[slot].lifecycle.fail();
                        outcome.restarts += self.replace(slot, WorkerHandle::detach)?;
                        let reason = format!("no reply within {:?}", self.config.timeout);
                        self.abandon(seq, lost.package, reason, rebuild, &mut pending, outcome)?;
                    }
                }
            }
        }
    }

    /// After a failed batch, replaces every worker still holding a package so
    /// the next batch starts from idle workers.
    fn discard_in_flight(&mut self) {
        for slot in 0..self.workers.len() {
            let Some(lost) = self.workers[slot].assignment.take() else {
                continue;
            };
            log::warn!("discarding in-flight {} after a failed batch", lost.package.id);
            self.release(&lost.package);
            if let Err(e) = self.replace(slot, WorkerHandle::detach) {
                log::error!("could not replace worker in slot {slot}: {e}");
            }
        }
        self.in_flight.clear();
    }
}

impl PackageExecutor for WorkerPool {
    fn name(&self) -> &'static str {
        "worker-pool"
    }

    fn execute(
        &mut self,
        packages: Vec<WorkPackage>,
        rebuild: &mut RebuildFn<'_>,
    ) -> std::result::Result<DispatchOutcome, DispatchFailure> {
        let mut outcome = DispatchOutcome::default();
        if self.workers.is_empty() {
            return Err(DispatchFailure {
                error: FatalError::PoolExhausted("pool is shut down".into()).into(),
                completed: outcome,
            });
        }
        match self.run_batch(packages, rebuild, &mut outcome) {
            Ok(()) => Ok(outcome),
            Err(error) => {
                self.discard_in_flight();
                Err(DispatchFailure {
                    error,
                    completed: outcome,
                })
            }
        }
    }

    fn shutdown(&mut self) {
        WorkerPool::shutdown(self);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
