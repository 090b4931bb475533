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

use leonard_core::error::LeonardError;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// How a tick partitions the world and where packages run.
///
/// All three strategies produce the same trajectories for isolated bodies.
/// They differ in cost: `serial` never runs the broad phase, while the other
/// two split the world so that, e.g., ten far-apart stacks become ten
/// independent packages. Parsed case-insensitively from config or the
/// command line, with `-` accepted for `_` (`sweep-and-prune`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingStrategy {
    /// One package holding every live object, run in the tick thread.
    Serial,
    /// One package per collision group, run in the tick thread.
    SweepAndPrune,
    /// One package per collision group, run on the worker pool.
    #[default]
    Distributed,
}

impl SchedulingStrategy {
    /// Returns `true` if groups come from the broad phase.
    pub fn uses_broad_phase(&self) -> bool {
        !matches!(self, Self::Serial)
    }

    /// Returns `true` if packages run on worker threads.
    pub fn is_distributed(&self) -> bool {
        matches!(self, Self::Distributed)
    }
}

impl fmt::Display for SchedulingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Serial => "serial",
            Self::SweepAndPrune => "sweep_and_prune",
            Self::Distributed => "distributed",
        })
    }
}

impl FromStr for SchedulingStrategy {
    type Err = LeonardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "serial" => Ok(Self::Serial),
            "sweep_and_prune" | "sap" => Ok(Self::SweepAndPrune),
            "distributed" => Ok(Self::Distributed),
            other => Err(LeonardError::validation(format!(
                "unknown scheduling strategy '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_display_form() {
        for strategy in [
            SchedulingStrategy::Serial,
            SchedulingStrategy::SweepAndPrune,
            SchedulingStrategy::Distributed,
        ] {
            assert_eq!(strategy.to_string().parse::<SchedulingStrategy>().unwrap(), strategy);
        }
        assert_eq!(
            "Sweep-And-Prune".parse::<SchedulingStrategy>().unwrap(),
            SchedulingStrategy::SweepAndPrune
        );
        assert!("quantum".parse::<SchedulingStrategy>().is_err());
    }
}
