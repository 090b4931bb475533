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

//! The tick driver.

use crate::config::SchedulerConfig;
use crate::handle::LeonardHandle;
use crate::queue::CommandQueue;
use crate::report::{TickPhase, TickReport};
use crate::strategy::SchedulingStrategy;
use crate::view::StateView;
use crate::world::WorldState;
use leonard_core::broadphase::{compute_collision_groups, merge_linked_groups, CollisionGroup};
use leonard_core::datastore::Datastore;
use leonard_core::error::{LeonardError, Result};
use leonard_core::event::{ContactEvent, EventBus};
use leonard_core::object::ObjectId;
use leonard_core::package::{PackageIdAllocator, WorkPackage};
use leonard_core::physics::EngineFactory;
use leonard_dispatch::{DispatchOutcome, InlineExecutor, PackageExecutor, WorkerPool};
use leonard_telemetry::{
    CounterHandle, GaugeHandle, HistogramHandle, MetricsRegistry, MetricsResult,
    ScopedMetricTimer,
};
use std::sync::Arc;
use std::time::Instant;

/// Contact events kept for consumers before the oldest ones are dropped.
pub const DEFAULT_CONTACT_BACKLOG: usize = 4096;

/// Telemetry handles of the scheduler.
struct SchedulerMetrics {
    object_count: GaugeHandle,
    group_count: GaugeHandle,
    tick_time_ms: GaugeHandle,
    ticks: CounterHandle,
    package_retries: CounterHandle,
    command_failures: CounterHandle,
    worker_restarts: CounterHandle,
    dispatch_ms: HistogramHandle,
}

impl SchedulerMetrics {
    fn register(registry: &MetricsRegistry) -> MetricsResult<Self> {
        const NS: &str = "leonard";
        Ok(Self {
            object_count: registry.register_gauge(NS, "object_count", "Live objects", "count")?,
            group_count: registry.register_gauge(
                NS,
                "group_count",
                "Collision groups in the last tick",
                "count",
            )?,
            tick_time_ms: registry.register_gauge(
                NS,
                "tick_time_ms",
                "Wall time of the last tick",
                "ms",
            )?,
            ticks: registry.register_counter(NS, "ticks", "Committed ticks")?,
            package_retries: registry.register_counter(
                NS,
                "package_retries",
                "Abandoned and rebuilt packages",
            )?,
            command_failures: registry.register_counter(
                NS,
                "command_failures",
                "Rejected commands",
            )?,
            worker_restarts: registry.register_counter(
                NS,
                "worker_restarts",
                "Recycled or replaced workers",
            )?,
            dispatch_ms: registry.register_histogram(
                NS,
                "dispatch_ms",
                "Time spent waiting for packages",
                "ms",
                vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0],
            )?,
        })
    }

    fn record(&self, report: &TickReport, objects: usize) -> MetricsResult<()> {
        self.object_count.set(objects as f64)?;
        self.group_count.set(report.groups as f64)?;
        self.tick_time_ms.set(report.elapsed.as_secs_f64() * 1000.0)?;
        self.ticks.increment()?;
        self.package_retries.increment_by(report.retries as u64)?;
        self.command_failures
            .increment_by(report.command_failures.len() as u64)?;
        self.worker_restarts
            .increment_by(report.worker_restarts as u64)?;
        Ok(())
    }
}

/// Owns the world and advances it one tick at a time.
///
/// One tick runs `IDLE -> DRAIN_COMMANDS -> COMPUTE_GROUPS -> BUILD_PACKAGES
/// -> DISPATCH -> MERGE -> IDLE` on the calling thread. Other threads talk
/// to the scheduler only through a [`LeonardHandle`].
pub struct Scheduler {
    strategy: SchedulingStrategy,
    queue: Arc<CommandQueue>,
    world: WorldState,
    executor: Box<dyn PackageExecutor>,
    package_ids: PackageIdAllocator,
    view: StateView,
    contacts: Arc<EventBus<ContactEvent>>,
    datastore: Option<Arc<dyn Datastore>>,
    tick: u64,
    phase: TickPhase,
    metrics: Option<SchedulerMetrics>,
}

impl Scheduler {
    /// Builds a scheduler whose executor matches the configured strategy:
    /// one inline engine for `Serial` and `SweepAndPrune`, a worker pool for
    /// `Distributed`.
    pub fn new(config: SchedulerConfig, factory: Arc<dyn EngineFactory>) -> Result<Self> {
        let executor: Box<dyn PackageExecutor> = if config.strategy.is_distributed() {
            Box::new(WorkerPool::new(config.dispatch, factory)?)
        } else {
            config.dispatch.validate()?;
            Box::new(InlineExecutor::new(
                factory.create(),
                config.dispatch.retry_ceiling,
            ))
        };
        Ok(Self::with_executor(config.strategy, executor))
    }

    /// Builds a scheduler around a caller-provided executor.
    pub fn with_executor(strategy: SchedulingStrategy, executor: Box<dyn PackageExecutor>) -> Self {
        log::info!(
            "scheduler created: strategy {strategy}, executor {}",
            executor.name()
        );
        Self {
            strategy,
            queue: Arc::new(CommandQueue::new()),
            world: WorldState::new(),
            executor,
            package_ids: PackageIdAllocator::new(),
            view: StateView::new(),
            contacts: Arc::new(EventBus::bounded(DEFAULT_CONTACT_BACKLOG)),
            datastore: None,
            tick: 0,
            phase: TickPhase::Idle,
            metrics: None,
        }
    }

    /// Attaches a metrics registry.
    pub fn with_telemetry(mut self, registry: &MetricsRegistry) -> Self {
        match SchedulerMetrics::register(registry) {
            Ok(metrics) => self.metrics = Some(metrics),
            Err(e) => log::warn!("scheduler telemetry disabled: {e}"),
        }
        self
    }

    /// Mirrors every committed tick into `datastore`.
    pub fn with_datastore(mut self, datastore: Arc<dyn Datastore>) -> Self {
        self.datastore = Some(datastore);
        self
    }

    /// Replaces the contact bus with one that keeps at most `capacity`
    /// undrained events.
    ///
    /// Handles taken before this call keep the old bus, so call it first.
    pub fn with_contact_backlog(mut self, capacity: usize) -> Self {
        self.contacts = Arc::new(EventBus::bounded(capacity));
        self
    }

    /// A cloneable handle for submitting commands and reading state.
    pub fn handle(&self) -> LeonardHandle {
        LeonardHandle::new(
            Arc::clone(&self.queue),
            self.view.clone(),
            Arc::clone(&self.contacts),
        )
    }

    /// The shared command queue.
    pub fn queue(&self) -> &Arc<CommandQueue> {
        &self.queue
    }

    /// The authoritative world. Only readable between ticks.
    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// Contact events published after each commit.
    pub fn contacts(&self) -> &EventBus<ContactEvent> {
        &self.contacts
    }

    /// The active strategy.
    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Committed ticks so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// The phase the scheduler is in. `Idle` outside of [`Scheduler::step`].
    pub fn phase(&self) -> TickPhase {
        self.phase
    }

    /// Seeds the world from the attached datastore, replacing objects with
    /// the same id. Returns how many objects were loaded.
    pub fn restore_from_datastore(&mut self) -> Result<usize> {
        let Some(store) = self.datastore.clone() else {
            return Ok(0);
        };
        let mut loaded = 0;
        for id in store.ids()? {
            if let Some(state) = store.get(id)? {
                state.validate()?;
                self.world.restore(id, state);
                loaded += 1;
            }
        }
        self.view.publish(self.world.states(), self.tick);
        log::info!("restored {loaded} objects from the datastore");
        Ok(loaded)
    }

    fn enter(&mut self, phase: TickPhase) {
        log::trace!("tick {}: {:?} -> {:?}", self.tick + 1, self.phase, phase);
        self.phase = phase;
    }

    /// Runs exactly one tick.
    ///
    /// Returns once every package has completed, including retries. On a
    /// fatal error the groups that completed before it are still committed,
    /// so a failed step may have applied some work.
    pub fn step(&mut self, dt: f64, max_substeps: u32) -> Result<TickReport> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(LeonardError::validation(format!(
                "dt must be finite and positive, got {dt}"
            )));
        }
        if max_substeps == 0 {
            return Err(LeonardError::validation("max_substeps must be at least 1"));
        }
        let started = Instant::now();
        let mut report = TickReport::default();

        self.enter(TickPhase::DrainCommands);
        let applied = self.world.apply_commands(self.queue.drain_all());
        report.commands_applied = applied.applied;
        report.command_failures = applied.failures;

        self.enter(TickPhase::ComputeGroups);
        let groups = match self.compute_groups() {
            Ok(groups) => groups,
            Err(e) => return Err(self.abort(e)),
        };
        report.groups = groups.len();

        self.enter(TickPhase::BuildPackages);
        let mut packages = Vec::with_capacity(groups.len());
        for group in &groups {
            let id = self.package_ids.next_id();
            match self.world.build_package(id, group, dt, max_substeps) {
                Ok(package) => packages.push(package),
                Err(e) => return Err(self.abort(e)),
            }
        }
        report.packages = packages.len();

        self.enter(TickPhase::Dispatch);
        let result = {
            let world = &self.world;
            let package_ids = &self.package_ids;
            let mut rebuild =
                |abandoned: &WorkPackage| world.rebuild_package(abandoned, package_ids.next_id());
            let _timer = self
                .metrics
                .as_ref()
                .map(|m| ScopedMetricTimer::new(&m.dispatch_ms));
            self.executor.execute(packages, &mut rebuild)
        };

        self.enter(TickPhase::Merge);
        let (outcome, fatal) = match result {
            Ok(outcome) => (outcome, None),
            Err(failure) => (failure.completed, Some(failure.error)),
        };
        let completed = outcome.completed;
        self.commit(outcome, &applied.removed, &mut report);

        if let Some(error) = fatal {
            log::error!(
                "tick {} aborted after {completed} completed packages: {error}",
                self.tick + 1
            );
            return Err(self.abort(error));
        }

        self.tick += 1;
        self.enter(TickPhase::Idle);
        report.tick = self.tick;
        report.elapsed = started.elapsed();
        self.view.publish(self.world.states(), self.tick);
        if let Some(metrics) = &self.metrics {
            if let Err(e) = metrics.record(&report, self.world.len()) {
                log::warn!("failed to record tick metrics: {e}");
            }
        }
        log::debug!(
            "tick {} done in {:?}: {} groups, {} packages, {} retries",
            report.tick,
            report.elapsed,
            report.groups,
            report.packages,
            report.retries
        );
        Ok(report)
    }

    /// Leaves the tick early. Whatever was already applied stays applied and
    /// becomes visible to readers.
    fn abort(&mut self, error: LeonardError) -> LeonardError {
        self.enter(TickPhase::Idle);
        self.view.publish(self.world.states(), self.tick);
        error
    }

    /// One group for `Serial`; otherwise the broad-phase groups plus
    /// singletons, joined wherever a constraint links two of them.
    fn compute_groups(&self) -> Result<Vec<CollisionGroup>> {
        if self.world.is_empty() {
            return Ok(Vec::new());
        }
        if !self.strategy.uses_broad_phase() {
            return Ok(vec![self.world.ids()]);
        }
        let (boxes, singletons) = self.world.broad_phase_input();
        let mut groups = compute_collision_groups(&boxes)?;
        groups.extend(singletons.into_iter().map(|id| vec![id]));
        // Shapeless bodies can be jointed too, so links are merged last.
        Ok(merge_linked_groups(groups, &self.world.constraint_pairs()))
    }

    /// Merges completed work, publishes contacts and mirrors the world into
    /// the datastore.
    fn commit(&mut self, outcome: DispatchOutcome, removed: &[ObjectId], report: &mut TickReport) {
        report.retries = outcome.retries;
        report.worker_restarts = outcome.restarts;
        self.world.merge(outcome.states);

        let tick = self.tick + 1;
        report.contacts = outcome.contacts.len();
        for contact in outcome.contacts {
            report.contacts_dropped += self.contacts.publish(ContactEvent { tick, contact });
        }
        if report.contacts_dropped > 0 {
            log::debug!(
                "contact backlog full, dropped {} undrained events",
                report.contacts_dropped
            );
        }
        report.datastore_failures = self.sync_datastore(removed);
    }

    fn sync_datastore(&self, removed: &[ObjectId]) -> usize {
        let Some(store) = &self.datastore else {
            return 0;
        };
        let mut failures = 0;
        // A removed id may have been spawned again in the same batch.
        for id in removed.iter().filter(|id| !self.world.contains(**id)) {
            if let Err(e) = store.delete(*id) {
                log::warn!("datastore delete of {id} failed: {e}");
                failures += 1;
            }
        }
        for id in self.world.ids() {
            if let Some(state) = self.world.get(id) {
                if let Err(e) = store.put(id, state) {
                    log::warn!("datastore write of {id} failed: {e}");
                    failures += 1;
                }
            }
        }
        failures
    }

    /// Stops the executor's workers.
    pub fn shutdown(&mut self) {
        self.executor.shutdown();
    }
}
