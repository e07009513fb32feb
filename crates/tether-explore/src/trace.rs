use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tether_graph::ExtractionFailure;
use tether_ir::{Case, OperationId};

use crate::bundle::Observation;
use crate::validator::CheckFailure;

/// Run-unique scenario number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(pub u64);

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scenario-{}", self.0)
    }
}

/// One executed step, in the order it ran.
#[derive(Debug, Clone)]
pub struct TraceStep {
    pub index: usize,
    pub operation: OperationId,
    /// The case as sent, after `before_call` hooks.
    pub case: Arc<Case>,
    /// Present once the transport returned a response.
    pub observation: Option<Observation>,
    /// Transition id of the link that produced the case.
    pub transition: Option<String>,
    pub extraction_failures: Vec<ExtractionFailure>,
    pub check_failures: Vec<CheckFailure>,
}

impl TraceStep {
    pub fn status_code(&self) -> Option<u16> {
        self.observation.as_ref().map(|o| o.status_code)
    }
}

/// Every step a scenario executed.
#[derive(Debug, Clone, Default)]
pub struct ScenarioTrace {
    steps: Vec<TraceStep>,
}

impl ScenarioTrace {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn record(&mut self, step: TraceStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<&TraceStep> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
