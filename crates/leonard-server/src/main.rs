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

//! The Leonard server binary.
//!
//! Loads the configuration, builds the scheduler around the selected engine
//! and drives it at a fixed tick interval.

mod cli;
mod config;
mod demo;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use config::{EngineKind, LeonardConfig};
use leonard_core::physics::{EngineFactory, PhysicsEngine};
use leonard_infra::datastore::InMemoryDatastore;
use leonard_infra::physics::NativePhysicsEngine;
use leonard_scheduler::Scheduler;
use leonard_telemetry::MetricsRegistry;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How often the loop logs a progress line at info level.
const PROGRESS_EVERY: u64 = 600;

fn engine_factory(config: &LeonardConfig) -> Result<Arc<dyn EngineFactory>> {
    match config.engine.kind {
        EngineKind::Native => {
            let native = config.native_engine_config();
            Ok(Arc::new(move || -> Box<dyn PhysicsEngine> {
                Box::new(NativePhysicsEngine::new(native))
            }))
        }
        #[cfg(feature = "rapier")]
        EngineKind::Rapier => {
            let gravity = config.gravity();
            Ok(Arc::new(move || -> Box<dyn PhysicsEngine> {
                Box::new(leonard_infra::physics::RapierPhysicsEngine::new(gravity))
            }))
        }
        #[cfg(not(feature = "rapier"))]
        EngineKind::Rapier => {
            anyhow::bail!("engine 'rapier' requested but the server was built without the `rapier` feature")
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = LeonardConfig::load(cli.config.as_deref())?;
    config
        .apply_env(|key| std::env::var(key).ok())
        .context("Failed to apply environment overrides")?;
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    log::debug!("effective configuration: {config:?}");

    let registry = MetricsRegistry::new();
    let datastore = Arc::new(InMemoryDatastore::new());
    let mut scheduler = Scheduler::new(config.scheduler_config(), engine_factory(&config)?)
        .context("Failed to start the scheduler")?
        .with_contact_backlog(config.scheduler.contact_backlog)
        .with_telemetry(&registry)
        .with_datastore(datastore);
    let handle = scheduler.handle();

    if let Some(spheres) = cli.demo {
        demo::populate(&handle, spheres).context("Failed to queue the demo scene")?;
    }

    let dt = config.scheduler.dt;
    let max_substeps = config.scheduler.max_substeps;
    let interval = Duration::from_millis(config.scheduler.tick_interval_ms);
    log::info!(
        "tick loop starting: strategy={}, dt={dt}, max_substeps={max_substeps}, interval={interval:?}",
        scheduler.strategy()
    );

    let mut contacts_seen = 0usize;
    let outcome = loop {
        if cli.ticks.is_some_and(|limit| scheduler.tick() >= limit) {
            break Ok(());
        }
        let started = Instant::now();
        let report = match scheduler.step(dt, max_substeps) {
            Ok(report) => report,
            Err(e) => break Err(e).context(format!("tick {} failed", scheduler.tick() + 1)),
        };
        for failure in &report.command_failures {
            log::warn!(
                "command #{} ({} on {}) rejected: {}",
                failure.index,
                failure.kind,
                failure.id,
                failure.error
            );
        }
        contacts_seen += handle.take_contacts().len();
        log::debug!("{report:?}");
        if report.tick % PROGRESS_EVERY == 0 {
            log::info!(
                "tick {}: {} objects, {} contacts so far, {} commands queued",
                report.tick,
                scheduler.world().len(),
                contacts_seen,
                handle.pending_commands()
            );
        }
        if let Some(rest) = interval.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    };

    scheduler.shutdown();
    log::info!(
        "tick loop stopped at tick {} with {} objects",
        scheduler.tick(),
        scheduler.world().len()
    );
    registry.log_summary();
    outcome
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();
    run(Cli::parse())
}
