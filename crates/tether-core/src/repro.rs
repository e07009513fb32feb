//! Serializable reproduction of a failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_explore::ReplayStep;
use tether_ir::{Case, OperationId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReproductionStep {
    pub operation: OperationId,
    pub case: Case,
    /// Name of the link that produced this step's case.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub status_code: u16,
    /// Response body as observed, when it was JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<Value>,
}

/// The calls that led to a failure, oldest first. The last step is the
/// failing one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReproductionTrace {
    pub steps: Vec<ReproductionStep>,
}

impl ReproductionTrace {
    pub fn from_steps(replayed: &[ReplayStep]) -> Self {
        let steps = replayed
            .iter()
            .map(|step| ReproductionStep {
                operation: step.operation.clone(),
                case: Case::clone(&step.case),
                link: step.link.as_ref().map(|link| link.name.clone()),
                status_code: step.response.status_code,
                response_body: step.response.json_body().ok(),
            })
            .collect();
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&ReproductionStep> {
        self.steps.last()
    }
}
