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

//! A single worker thread and the handle the pool keeps for it.

use crate::lifecycle::WorkerLifecycle;
use crossbeam_channel::{Receiver, Sender};
use leonard_core::error::{FatalError, Result};
use leonard_core::package::{PackageId, PackageResult, WorkPackage};
use leonard_core::physics::EngineFactory;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Message from the pool to a worker.
pub(crate) enum Job {
    Run(WorkPackage),
    Shutdown,
}

/// Message from a worker back to the pool.
pub(crate) struct Reply {
    pub package: PackageId,
    pub result: Result<PackageResult>,
}

/// A package currently owned by a worker.
pub(crate) struct Assignment {
    pub package: WorkPackage,
    pub deadline: Instant,
}

/// The pool's side of one worker thread.
pub(crate) struct WorkerHandle {
    pub seq: u64,
    pub lifecycle: WorkerLifecycle,
    pub assignment: Option<Assignment>,
    pub replies: Receiver<Reply>,
    jobs: Sender<Job>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawns a worker thread with its own engine and a fresh budget.
    pub fn spawn(seq: u64, factory: Arc<dyn EngineFactory>, budget: u32) -> Result<Self> {
        let (job_tx, job_rx) = crossbeam_channel::bounded::<Job>(1);
        let (reply_tx, reply_rx) = crossbeam_channel::bounded::<Reply>(1);

        let thread = thread::Builder::new()
            .name(format!("leonard-worker-{seq}"))
            .spawn(move || run(seq, factory, job_rx, reply_tx))
            .map_err(|e| FatalError::PoolExhausted(format!("cannot spawn worker {seq}: {e}")))?;

        log::info!("worker {seq} started with a budget of {budget} packages");
        Ok(Self {
            seq,
            lifecycle: WorkerLifecycle::fresh(budget),
            assignment: None,
            replies: reply_rx,
            jobs: job_tx,
            thread: Some(thread),
        })
    }

    /// Returns `true` if the worker is running and holds no package.
    pub fn is_idle(&self) -> bool {
        self.assignment.is_none() && self.lifecycle.accepts_work()
    }

    /// Hands a copy of the package to the worker and records the assignment.
    /// Returns `false` if the worker thread is gone.
    pub fn assign(&mut self, package: WorkPackage, deadline: Instant) -> bool {
        let delivered = self.jobs.send(Job::Run(package.clone())).is_ok();
        self.assignment = Some(Assignment { package, deadline });
        delivered
    }

    /// Asks an idle worker to exit and waits for it.
    pub fn stop(mut self) {
        self.lifecycle.stopped();
        let _ = self.jobs.send(Job::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("worker {} panicked while stopping", self.seq);
            }
        }
    }

    /// Reaps a worker whose thread has already died.
    pub fn reap(mut self) {
        if let Some(thread) = self.thread.take() {
            // A crashed worker's join returns the panic payload; nothing to do with it.
            let _ = thread.join();
        }
    }

    /// Lets go of a worker that stopped responding. Its thread is not joined;
    /// any reply it sends later goes nowhere.
    pub fn detach(mut self) {
        self.thread.take();
        log::warn!("worker {} detached", self.seq);
    }
}

fn run(seq: u64, factory: Arc<dyn EngineFactory>, jobs: Receiver<Job>, replies: Sender<Reply>) {
    let mut engine = factory.create();
    log::debug!("worker {seq} running engine '{}'", engine.name());

    while let Ok(job) = jobs.recv() {
        match job {
            Job::Run(package) => {
                let result = engine
                    .step_package(&package)
                    .and_then(|result| result.checked(&package));
                let reply = Reply {
                    package: package.id,
                    result,
                };
                if replies.send(reply).is_err() {
                    // Detached by the pool.
                    break;
                }
            }
            Job::Shutdown => break,
        }
    }
    log::debug!("worker {seq} exiting");
}
