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

use crate::config::{EngineKind, LeonardConfig};
use clap::Parser;
use leonard_scheduler::SchedulingStrategy;
use std::path::PathBuf;

/// Runs the Leonard physics scheduler.
#[derive(Debug, Parser)]
#[command(name = "leonard", version, about)]
pub struct Cli {
    /// TOML configuration file. Defaults to `Leonard.toml` if present.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Stop after this many ticks. Runs until interrupted if omitted.
    #[arg(short, long)]
    pub ticks: Option<u64>,

    /// serial, sweep_and_prune or distributed.
    #[arg(short, long)]
    pub strategy: Option<SchedulingStrategy>,

    /// Size of the worker pool.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Simulated seconds per tick.
    #[arg(long)]
    pub dt: Option<f64>,

    /// Upper bound on engine substeps per tick.
    #[arg(long)]
    pub max_substeps: Option<u32>,

    /// Pause between tick starts, in milliseconds.
    #[arg(long)]
    pub tick_interval_ms: Option<u64>,

    /// native or rapier.
    #[arg(long)]
    pub engine: Option<EngineKind>,

    /// Populate the world with a demo scene of this many spheres.
    #[arg(long, value_name = "SPHERES")]
    pub demo: Option<usize>,
}

impl Cli {
    /// Writes every flag that was given over the loaded configuration.
    pub fn apply(&self, config: &mut LeonardConfig) {
        if let Some(strategy) = self.strategy {
            config.scheduler.strategy = strategy;
        }
        if let Some(workers) = self.workers {
            config.workers.count = workers;
        }
        if let Some(dt) = self.dt {
            config.scheduler.dt = dt;
        }
        if let Some(max_substeps) = self.max_substeps {
            config.scheduler.max_substeps = max_substeps;
        }
        if let Some(interval) = self.tick_interval_ms {
            config.scheduler.tick_interval_ms = interval;
        }
        if let Some(engine) = self.engine {
            config.engine.kind = engine;
        }
    }
}
