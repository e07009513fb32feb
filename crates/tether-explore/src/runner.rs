use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tether_ir::Response;

use crate::bundle::{BundleStore, Observation, ObservationOrigin};
use crate::hooks::HookLayers;
use crate::machine::{NextStep, StateMachine, Step, Unsatisfiable};
use crate::trace::{ScenarioId, ScenarioTrace, TraceStep};
use crate::transport::{Transport, TransportError};
use crate::validator::{CheckFailure, Validator};

/// Cloneable cancellation flag shared between a run and its scenarios.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Errors that end a scenario early. None of them stop the suite, except
/// `Unsatisfiable`, which the orchestrator escalates.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScenarioError {
    #[error("Transport error at step {step}: {source}")]
    Transport {
        step: usize,
        #[source]
        source: TransportError,
    },

    #[error("Scenario exceeded its {budget:?} budget after {steps} steps")]
    BudgetExhausted { budget: Duration, steps: usize },

    #[error(transparent)]
    Unsatisfiable(#[from] Unsatisfiable),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Success,
    Failure,
    Error,
    Interrupted,
}

/// A check failure together with the observation it was raised on.
#[derive(Debug, Clone)]
pub struct StepFailure {
    pub step: usize,
    pub failure: CheckFailure,
    pub observation: Observation,
}

#[derive(Debug)]
pub struct ScenarioResult {
    pub scenario: ScenarioId,
    pub status: ScenarioStatus,
    pub trace: ScenarioTrace,
    pub failures: Vec<StepFailure>,
    pub error: Option<ScenarioError>,
    pub elapsed: Duration,
}

/// Receives step notifications while a scenario runs.
pub trait StepObserver {
    fn step_started(&mut self, _scenario: ScenarioId, _step: &Step) {}

    fn step_finished(
        &mut self,
        _scenario: ScenarioId,
        _step: &TraceStep,
        _error: Option<&TransportError>,
    ) {
    }
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl StepObserver for NoopObserver {}

/// Runs `teardown` hooks when dropped, including during unwinding.
struct TeardownGuard<'a> {
    hooks: &'a HookLayers,
    scenario: ScenarioId,
}

impl Drop for TeardownGuard<'_> {
    fn drop(&mut self) {
        self.hooks.teardown(self.scenario);
    }
}

/// What a step produced, kept for later steps that send the same case.
#[derive(Debug, Clone)]
struct CachedOutcome {
    observation: Observation,
    check_failures: Vec<CheckFailure>,
}

/// Step outcomes of one scenario keyed by case content.
type OutcomeCache = HashMap<String, CachedOutcome>;

/// Executes the steps of one scenario: hooks, transport, validation,
/// bundle recording, trace.
pub struct ScenarioRunner<'a> {
    transport: &'a dyn Transport,
    validators: &'a [Arc<dyn Validator>],
    hooks: &'a HookLayers,
    budget: Option<Duration>,
    cancel: Option<CancelToken>,
    unique_inputs: bool,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        validators: &'a [Arc<dyn Validator>],
        hooks: &'a HookLayers,
    ) -> Self {
        Self {
            transport,
            validators,
            hooks,
            budget: None,
            cancel: None,
            unique_inputs: false,
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Send each distinct case at most once per scenario. A repeated case
    /// gets the first call's outcome, failures included.
    pub fn with_unique_inputs(mut self, unique_inputs: bool) -> Self {
        self.unique_inputs = unique_inputs;
        self
    }

    pub fn run(
        &self,
        scenario: ScenarioId,
        machine: &mut StateMachine<'_>,
        bundles: &mut BundleStore,
        observer: &mut dyn StepObserver,
    ) -> ScenarioResult {
        let started = Instant::now();
        let mut trace = ScenarioTrace::new();
        let mut failures = Vec::new();
        let mut error = None;
        let mut interrupted = false;
        let mut outcomes = OutcomeCache::new();

        let _teardown = TeardownGuard {
            hooks: self.hooks,
            scenario,
        };
        self.hooks.setup(scenario);

        loop {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                interrupted = true;
                break;
            }
            if let Some(budget) = self.budget {
                if started.elapsed() >= budget {
                    error = Some(ScenarioError::BudgetExhausted {
                        budget,
                        steps: trace.len(),
                    });
                    break;
                }
            }

            let step = match machine.next_step(bundles) {
                Ok(NextStep::Step(step)) => step,
                Ok(NextStep::EndOfScenario) => break,
                Err(unsatisfiable) => {
                    error = Some(unsatisfiable.into());
                    break;
                }
            };
            observer.step_started(scenario, &step);

            match self.execute(scenario, step, bundles, &mut outcomes) {
                Ok(executed) => {
                    if let Some(observation) = &executed.observation {
                        failures.extend(executed.check_failures.iter().map(|failure| StepFailure {
                            step: executed.index,
                            failure: failure.clone(),
                            observation: observation.clone(),
                        }));
                    }
                    observer.step_finished(scenario, &executed, None);
                    trace.record(executed);
                }
                Err((executed, transport_error)) => {
                    tracing::warn!(
                        %scenario,
                        step = executed.index,
                        error = %transport_error,
                        timeout = transport_error.is_timeout(),
                        "transport error, skipping remaining steps"
                    );
                    observer.step_finished(scenario, &executed, Some(&transport_error));
                    let step = executed.index;
                    trace.record(executed);
                    error = Some(ScenarioError::Transport {
                        step,
                        source: transport_error,
                    });
                    break;
                }
            }
        }

        let status = if error.is_some() {
            ScenarioStatus::Error
        } else if interrupted {
            ScenarioStatus::Interrupted
        } else if failures.is_empty() {
            ScenarioStatus::Success
        } else {
            ScenarioStatus::Failure
        };

        ScenarioResult {
            scenario,
            status,
            trace,
            failures,
            error,
            elapsed: started.elapsed(),
        }
    }

    /// One step through the pipeline. Observations are recorded whatever
    /// the validators say.
    fn execute(
        &self,
        scenario: ScenarioId,
        step: Step,
        bundles: &mut BundleStore,
        outcomes: &mut OutcomeCache,
    ) -> Result<TraceStep, (TraceStep, TransportError)> {
        let transition = step.transition_id();
        let key = self.unique_inputs.then(|| step.case.content_key());
        if let Some(cached) = key.as_ref().and_then(|key| outcomes.get(key)) {
            tracing::debug!(%scenario, step = step.index, "repeated case, reusing its outcome");
            return Ok(Self::reuse(step, transition, cached));
        }

        let case = self.hooks.before_call(step.case);
        let mut executed = TraceStep {
            index: step.index,
            operation: step.operation,
            case: Arc::new(case),
            observation: None,
            transition,
            extraction_failures: step.extraction_failures,
            check_failures: Vec::new(),
        };

        let response: Response = match self.transport.call(&executed.case) {
            Ok(response) => response,
            Err(error) => return Err((executed, error)),
        };
        self.hooks.after_call(&executed.case, &response);

        executed.check_failures = self
            .validators
            .iter()
            .flat_map(|v| v.validate(&response, &executed.case))
            .collect();

        let observation = Observation {
            status_code: response.status_code,
            case: Arc::clone(&executed.case),
            response: Arc::new(response),
            origin: ObservationOrigin {
                scenario,
                step: executed.index,
            },
            link: None,
            parent: None,
        }
        .with_source(step.link, step.source);
        bundles.record(observation.clone());
        if let Some(key) = key {
            outcomes.insert(
                key,
                CachedOutcome {
                    observation: observation.clone(),
                    check_failures: executed.check_failures.clone(),
                },
            );
        }
        executed.observation = Some(observation);
        Ok(executed)
    }

    /// A step answered from the cache: nothing is sent or recorded.
    fn reuse(step: Step, transition: Option<String>, cached: &CachedOutcome) -> TraceStep {
        TraceStep {
            index: step.index,
            operation: step.operation,
            case: Arc::clone(&cached.observation.case),
            observation: Some(cached.observation.clone()),
            transition,
            extraction_failures: step.extraction_failures,
            check_failures: cached.check_failures.clone(),
        }
    }

}
