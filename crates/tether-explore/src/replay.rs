//! Re-executing the calls behind a failure without the state machine.
//!
//! Each link-driven step re-extracts its values from the replayed response
//! of the step it was derived from, so server-assigned ids stay consistent.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tether_graph::Link;
use tether_ir::{Case, OperationId, Response};

use crate::bundle::{Observation, ObservationOrigin};
use crate::hooks::HookLayers;
use crate::trace::ScenarioTrace;
use crate::transport::{Transport, TransportError};
use crate::validator::{CheckFailure, Validator};

/// A step of a reproduction: what was called and which link fed it.
#[derive(Debug, Clone)]
pub struct ReplayStep {
    pub origin: ObservationOrigin,
    pub operation: OperationId,
    pub case: Arc<Case>,
    pub response: Arc<Response>,
    pub link: Option<Arc<Link>>,
    /// Where the observation `link` extracted from was made.
    pub source: Option<ObservationOrigin>,
}

impl From<&Observation> for ReplayStep {
    fn from(observation: &Observation) -> Self {
        Self {
            origin: observation.origin,
            operation: observation.operation().clone(),
            case: Arc::clone(&observation.case),
            response: Arc::clone(&observation.response),
            link: observation.link.clone(),
            source: observation.parent.as_ref().map(|parent| parent.origin),
        }
    }
}

/// The link chain that produced `observation`, oldest first. The last
/// entry is `observation` itself.
pub fn lineage(observation: &Observation) -> Vec<ReplayStep> {
    observation.lineage().into_iter().map(ReplayStep::from).collect()
}

/// Every step `trace` executed before `observation`, then `observation`.
/// Observations from other scenarios that a link extracted from come
/// first, each after its own sources, since they were made before this
/// scenario began.
pub fn scenario_prefix(trace: &ScenarioTrace, observation: &Observation) -> Vec<ReplayStep> {
    let scenario = observation.origin.scenario;
    let mut seen = HashSet::new();
    let mut foreign = Vec::new();
    let mut own = Vec::new();
    let earlier = trace
        .steps()
        .iter()
        .take_while(|step| step.index < observation.origin.step)
        .filter_map(|step| step.observation.as_ref());
    for executed in earlier.chain(std::iter::once(observation)) {
        for ancestor in executed.lineage() {
            if !seen.insert(ancestor.origin) {
                continue;
            }
            if ancestor.origin.scenario == scenario {
                own.push(ReplayStep::from(ancestor));
            } else {
                foreign.push(ReplayStep::from(ancestor));
            }
        }
    }
    foreign.extend(own);
    foreign
}

pub struct Replayer<'a> {
    transport: &'a dyn Transport,
    validators: &'a [Arc<dyn Validator>],
    hooks: &'a HookLayers,
}

impl<'a> Replayer<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        validators: &'a [Arc<dyn Validator>],
        hooks: &'a HookLayers,
    ) -> Self {
        Self {
            transport,
            validators,
            hooks,
        }
    }

    /// Replay `steps` in order and return the failures the last step raises.
    pub fn replay(&self, steps: &[ReplayStep]) -> Result<Vec<CheckFailure>, TransportError> {
        let mut replayed: HashMap<ObservationOrigin, (Case, Response)> = HashMap::new();
        let mut failures = Vec::new();
        for (i, step) in steps.iter().enumerate() {
            let mut case = Case::clone(&step.case).renumbered();
            if let (Some(link), Some(source)) = (&step.link, step.source) {
                if let Some((source_case, source_response)) = replayed.get(&source) {
                    case = link.apply(case, source_case, source_response).0;
                }
            }
            let case = self.hooks.before_call(case);
            let response = self.transport.call(&case)?;
            self.hooks.after_call(&case, &response);
            if i + 1 == steps.len() {
                failures = self
                    .validators
                    .iter()
                    .flat_map(|v| v.validate(&response, &case))
                    .collect();
            }
            replayed.insert(step.origin, (case, response));
        }
        Ok(failures)
    }

    /// Whether replaying `steps` raises a failure of the same check and title.
    pub fn reproduces(&self, steps: &[ReplayStep], failure: &CheckFailure) -> bool {
        match self.replay(steps) {
            Ok(failures) => failures
                .iter()
                .any(|f| f.check == failure.check && f.title == failure.title),
            Err(error) => {
                tracing::debug!(%error, "replay hit a transport error");
                false
            }
        }
    }
}
