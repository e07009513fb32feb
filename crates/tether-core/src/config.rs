//! Run configuration.
//!
//! Every field is optional in the JSON form; missing fields take the
//! values from [`RunConfig::default`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_explore::MachineConfig;
use tether_ir::OperationId;

use crate::limits::RunLimits;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Settings for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Scenarios generated per suite.
    pub scenarios_per_suite: usize,
    /// Upper bound on steps per scenario.
    pub max_steps: usize,
    /// Worker threads. With one worker scenarios run in order on the run thread.
    pub workers: usize,
    /// Run seed. A random one is drawn when absent.
    pub seed: Option<u64>,
    /// Observations kept per operation.
    pub bundle_capacity: usize,
    /// Wall-clock budget of a single scenario.
    pub scenario_budget_secs: u64,
    /// Safety cap on suites per run.
    pub max_suites: u32,
    /// Stop once this many confirmed failures are known.
    pub max_failures: Option<usize>,
    /// Stop once the run has been going for this long.
    pub max_wall_secs: Option<u64>,
    /// Weight multiplier for operations a scenario suppresses, in `(0, 1]`.
    /// `1.0` turns suppression off.
    pub swarm_factor: f64,
    /// Probability of generating a negative case, in `[0, 1]`.
    pub negative_probability: f64,
    /// Operations every scenario starts with.
    pub initializers: Vec<OperationId>,
    /// Capacity of the event channel.
    pub event_buffer: usize,
    /// Replay new failures to detect flakiness.
    pub replay_failures: bool,
    /// Send each distinct case at most once per scenario; repeats reuse the
    /// first outcome.
    pub unique_inputs: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            scenarios_per_suite: 100,
            max_steps: 6,
            workers: 1,
            seed: None,
            bundle_capacity: 100,
            scenario_budget_secs: 30,
            max_suites: 10,
            max_failures: None,
            max_wall_secs: None,
            swarm_factor: 0.1,
            negative_probability: 0.0,
            initializers: Vec::new(),
            event_buffer: 1024,
            replay_failures: true,
            unique_inputs: false,
        }
    }
}

impl RunConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Check value ranges. All problems are reported, not just the first.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();
        let mut positive = |field: &'static str, value: u64| {
            if value == 0 {
                errors.push(ConfigError::Invalid {
                    field,
                    reason: "must be at least 1".into(),
                });
            }
        };
        positive("scenarios_per_suite", self.scenarios_per_suite as u64);
        positive("max_steps", self.max_steps as u64);
        positive("workers", self.workers as u64);
        positive("bundle_capacity", self.bundle_capacity as u64);
        positive("scenario_budget_secs", self.scenario_budget_secs);
        positive("max_suites", u64::from(self.max_suites));
        positive("event_buffer", self.event_buffer as u64);

        if !(self.swarm_factor > 0.0 && self.swarm_factor <= 1.0) {
            errors.push(ConfigError::Invalid {
                field: "swarm_factor",
                reason: format!("{} is outside (0, 1]", self.swarm_factor),
            });
        }
        if !(0.0..=1.0).contains(&self.negative_probability) {
            errors.push(ConfigError::Invalid {
                field: "negative_probability",
                reason: format!("{} is outside [0, 1]", self.negative_probability),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn machine_config(&self) -> MachineConfig {
        MachineConfig {
            max_steps: self.max_steps,
            swarm_factor: self.swarm_factor,
            negative_probability: self.negative_probability,
            initializers: self.initializers.clone(),
        }
    }

    pub fn limits(&self) -> RunLimits {
        RunLimits {
            max_suites: self.max_suites,
            max_failures: self.max_failures,
            max_wall_secs: self.max_wall_secs,
        }
    }

    pub fn scenario_budget(&self) -> Duration {
        Duration::from_secs(self.scenario_budget_secs)
    }
}
