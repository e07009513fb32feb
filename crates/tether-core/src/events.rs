//! Events emitted by a run, in the order they happen.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_explore::{ScenarioError, ScenarioId, ScenarioStatus};
use tether_ir::OperationId;

use crate::classify::{Failure, Signature};
use crate::error::RunError;
use crate::limits::StopReason;
use crate::statistic::LinkStatistic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failure,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteStatus {
    Success,
    Failure,
    Interrupted,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No failures found.
    Success,
    /// At least one failure found.
    Failure,
    Interrupted,
    Errored,
}

#[derive(Debug)]
pub enum Event {
    RunStarted {
        seed: u64,
        operations: usize,
        links: usize,
    },
    SuiteStarted {
        suite: u32,
    },
    ScenarioStarted {
        suite: u32,
        scenario: ScenarioId,
    },
    StepStarted {
        suite: u32,
        scenario: ScenarioId,
        index: usize,
        target: OperationId,
        /// `source -> [status] link -> target` for link-driven steps.
        transition: Option<String>,
    },
    StepFinished {
        suite: u32,
        scenario: ScenarioId,
        index: usize,
        target: OperationId,
        transition: Option<String>,
        status: StepStatus,
        response_status: Option<u16>,
    },
    ScenarioFinished {
        suite: u32,
        scenario: ScenarioId,
        status: ScenarioStatus,
        steps: usize,
        elapsed: Duration,
        error: Option<ScenarioError>,
    },
    SuiteFinished {
        suite: u32,
        status: SuiteStatus,
        scenarios: usize,
        /// Signatures first seen in this suite.
        new_failures: Vec<Signature>,
    },
    Interrupted,
    Errored {
        error: RunError,
    },
    RunFinished {
        status: RunStatus,
        suites: u32,
        failures: Vec<Failure>,
        stop_reason: StopReason,
        link_statistics: LinkStatistic,
        elapsed: Duration,
    },
}

impl Event {
    /// Short name for logging and filtering.
    pub fn name(&self) -> &'static str {
        match self {
            Event::RunStarted { .. } => "RunStarted",
            Event::SuiteStarted { .. } => "SuiteStarted",
            Event::ScenarioStarted { .. } => "ScenarioStarted",
            Event::StepStarted { .. } => "StepStarted",
            Event::StepFinished { .. } => "StepFinished",
            Event::ScenarioFinished { .. } => "ScenarioFinished",
            Event::SuiteFinished { .. } => "SuiteFinished",
            Event::Interrupted => "Interrupted",
            Event::Errored { .. } => "Errored",
            Event::RunFinished { .. } => "RunFinished",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::RunFinished { .. })
    }
}
