use tether_explore::{ScenarioId, Unsatisfiable};

use crate::config::ConfigError;

/// Errors that prevent a run from starting or end it early.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Invalid run configuration ({} problems)", .errors.len())]
    InvalidConfig { errors: Vec<ConfigError> },

    #[error(transparent)]
    Unsatisfiable(#[from] Unsatisfiable),

    #[error("Scenario {scenario} panicked: {reason}")]
    Panicked { scenario: ScenarioId, reason: String },

    #[error("Failed to build worker pool: {reason}")]
    WorkerPool { reason: String },

    #[error("Failed to spawn run thread: {0}")]
    Spawn(#[source] std::io::Error),
}
