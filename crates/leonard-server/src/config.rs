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

//! Server configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `LEONARD_*` environment variables, then command line flags.

use anyhow::{anyhow, bail, Context, Result};
use leonard_core::math::Vec3;
use leonard_dispatch::DispatchConfig;
use leonard_infra::physics::NativeEngineConfig;
use leonard_scheduler::{SchedulerConfig, SchedulingStrategy, DEFAULT_CONTACT_BACKLOG};
use serde::Deserialize;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Loaded when no `--config` is given and the file exists.
pub const DEFAULT_CONFIG_FILE: &str = "Leonard.toml";

/// Which engine the workers run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// The built-in impulse engine.
    #[default]
    Native,
    /// rapier3d, available with the `rapier` feature.
    Rapier,
}

impl FromStr for EngineKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "rapier" => Ok(Self::Rapier),
            other => bail!("unknown engine '{other}', expected 'native' or 'rapier'"),
        }
    }
}

/// The `[scheduler]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSection {
    /// Partitioning and execution strategy.
    pub strategy: SchedulingStrategy,
    /// Simulated seconds per tick.
    pub dt: f64,
    /// Upper bound on engine substeps per tick.
    pub max_substeps: u32,
    /// Wall-clock pause between tick starts. Zero runs ticks back to back.
    pub tick_interval_ms: u64,
    /// Undrained contact events kept before the oldest are dropped.
    pub contact_backlog: usize,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            strategy: SchedulingStrategy::default(),
            dt: 1.0 / 60.0,
            max_substeps: 10,
            tick_interval_ms: 16,
            contact_backlog: DEFAULT_CONTACT_BACKLOG,
        }
    }
}

/// The `[workers]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerSection {
    /// Size of the worker pool.
    pub count: usize,
    /// Lower bound of a worker's package budget.
    pub restart_min: u32,
    /// Upper bound of a worker's package budget.
    pub restart_max: u32,
    /// How long a package may run before its worker is given up on.
    pub timeout_ms: u64,
    /// Attempts per group before the tick fails.
    pub retry_ceiling: u32,
    /// Fixed seed for restart budgets.
    pub seed: Option<u64>,
}

impl Default for WorkerSection {
    fn default() -> Self {
        let d = DispatchConfig::default();
        Self {
            count: d.workers,
            restart_min: d.restart_min,
            restart_max: d.restart_max,
            timeout_ms: d.timeout.as_millis() as u64,
            retry_ceiling: d.retry_ceiling,
            seed: d.seed,
        }
    }
}

/// The `[engine]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    /// Engine implementation.
    pub kind: EngineKind,
    /// Gravity as `[x, y, z]`.
    pub gravity: [f64; 3],
    /// Preferred substeps per simulated second.
    pub substep_rate: f64,
}

impl Default for EngineSection {
    fn default() -> Self {
        let d = NativeEngineConfig::default();
        Self {
            kind: EngineKind::Native,
            gravity: [d.gravity.x, d.gravity.y, d.gravity.z],
            substep_rate: d.substep_rate,
        }
    }
}

/// Everything the server needs to start.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LeonardConfig {
    /// Tick settings.
    pub scheduler: SchedulerSection,
    /// Worker pool settings.
    pub workers: WorkerSection,
    /// Engine settings.
    pub engine: EngineSection,
}

impl LeonardConfig {
    /// Loads the given file, or [`DEFAULT_CONFIG_FILE`] if it exists, or
    /// falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    log::info!("no '{DEFAULT_CONFIG_FILE}' found, using default configuration");
                    return Ok(Self::default());
                }
                fallback
            }
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{}'", path.display()))?;
        let config = Self::from_toml_str(&text)
            .with_context(|| format!("Failed to parse TOML from '{}'", path.display()))?;
        log::info!("loaded configuration from '{}'", path.display());
        Ok(config)
    }

    /// Parses a TOML document. Missing tables and keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Applies `LEONARD_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let s = &mut self.scheduler;
        let w = &mut self.workers;
        override_from(&lookup, "LEONARD_STRATEGY", &mut s.strategy)?;
        override_from(&lookup, "LEONARD_DT", &mut s.dt)?;
        override_from(&lookup, "LEONARD_MAX_SUBSTEPS", &mut s.max_substeps)?;
        override_from(&lookup, "LEONARD_TICK_INTERVAL_MS", &mut s.tick_interval_ms)?;
        override_from(&lookup, "LEONARD_CONTACT_BACKLOG", &mut s.contact_backlog)?;
        override_from(&lookup, "LEONARD_WORKERS", &mut w.count)?;
        override_from(&lookup, "LEONARD_RESTART_MIN", &mut w.restart_min)?;
        override_from(&lookup, "LEONARD_RESTART_MAX", &mut w.restart_max)?;
        override_from(&lookup, "LEONARD_DISPATCH_TIMEOUT_MS", &mut w.timeout_ms)?;
        override_from(&lookup, "LEONARD_RETRY_CEILING", &mut w.retry_ceiling)?;
        override_from(&lookup, "LEONARD_ENGINE", &mut self.engine.kind)?;
        if let Some(raw) = lookup("LEONARD_SEED") {
            let seed = raw
                .trim()
                .parse()
                .map_err(|e| anyhow!("invalid LEONARD_SEED='{raw}': {e}"))?;
            w.seed = Some(seed);
        }
        Ok(())
    }

    /// Rejects settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        if !s.dt.is_finite() || s.dt <= 0.0 {
            bail!("scheduler.dt must be finite and positive, got {}", s.dt);
        }
        if s.max_substeps == 0 {
            bail!("scheduler.max_substeps must be at least 1");
        }
        if s.contact_backlog == 0 {
            bail!("scheduler.contact_backlog must be at least 1");
        }
        if !self.engine.substep_rate.is_finite() || self.engine.substep_rate <= 0.0 {
            bail!(
                "engine.substep_rate must be finite and positive, got {}",
                self.engine.substep_rate
            );
        }
        if self.engine.gravity.iter().any(|g| !g.is_finite()) {
            bail!("engine.gravity must be finite");
        }
        self.dispatch_config()
            .validate()
            .context("invalid [workers] table")?;
        Ok(())
    }

    /// Worker pool settings.
    pub fn dispatch_config(&self) -> DispatchConfig {
        let w = &self.workers;
        DispatchConfig {
            workers: w.count,
            restart_min: w.restart_min,
            restart_max: w.restart_max,
            timeout: Duration::from_millis(w.timeout_ms),
            retry_ceiling: w.retry_ceiling,
            seed: w.seed,
        }
    }

    /// Scheduler settings.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            strategy: self.scheduler.strategy,
            dispatch: self.dispatch_config(),
        }
    }

    /// Settings of the native engine.
    pub fn native_engine_config(&self) -> NativeEngineConfig {
        NativeEngineConfig {
            gravity: self.gravity(),
            substep_rate: self.engine.substep_rate,
        }
    }

    /// Gravity as a vector.
    pub fn gravity(&self) -> Vec3 {
        let [x, y, z] = self.engine.gravity;
        Vec3::new(x, y, z)
    }
}

fn override_from<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {key}='{raw}': {e}"))?;
        log::debug!("{key} overrides the configured value");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = LeonardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatch_config(), DispatchConfig::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LeonardConfig::from_toml_str(
            r#"
            [scheduler]
            strategy = "sweep_and_prune"
            dt = 0.05

            [engine]
            gravity = [0.0, -9.81, 0.0]
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.strategy, SchedulingStrategy::SweepAndPrune);
        assert_eq!(config.scheduler.dt, 0.05);
        assert_eq!(config.scheduler.max_substeps, SchedulerSection::default().max_substeps);
        assert_eq!(config.workers, WorkerSection::default());
        assert_eq!(config.gravity(), Vec3::new(0.0, -9.81, 0.0));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let result = LeonardConfig::from_toml_str("[workers]\nthreads = 3\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = LeonardConfig::from_toml_str("[workers]\ncount = 2\n").unwrap();
        config
            .apply_env(env(&[
                ("LEONARD_WORKERS", "8"),
                ("LEONARD_STRATEGY", "serial"),
                ("LEONARD_DISPATCH_TIMEOUT_MS", "250"),
                ("LEONARD_SEED", "42"),
                ("LEONARD_CONTACT_BACKLOG", "64"),
            ]))
            .unwrap();

        assert_eq!(config.workers.count, 8);
        assert_eq!(config.scheduler.strategy, SchedulingStrategy::Serial);
        assert_eq!(config.dispatch_config().timeout, Duration::from_millis(250));
        assert_eq!(config.workers.seed, Some(42));
        assert_eq!(config.scheduler.contact_backlog, 64);
    }

    #[test]
    fn test_malformed_env_value_is_an_error() {
        let mut config = LeonardConfig::default();
        let err = config
            .apply_env(env(&[("LEONARD_RETRY_CEILING", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("LEONARD_RETRY_CEILING"));
    }

    #[test]
    fn test_validation_catches_bad_values() {
        let mut config = LeonardConfig::default();
        config.scheduler.dt = 0.0;
        assert!(config.validate().is_err());

        let mut config = LeonardConfig::default();
        config.workers.restart_min = 10;
        config.workers.restart_max = 5;
        assert!(config.validate().is_err());

        let mut config = LeonardConfig::default();
        config.workers.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = LeonardConfig::default();
        config.scheduler.contact_backlog = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_engine_kind_parses() {
        assert_eq!("Rapier".parse::<EngineKind>().unwrap(), EngineKind::Rapier);
        assert!("bullet".parse::<EngineKind>().is_err());
    }
}
