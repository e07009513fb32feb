//! Runs suites of scenarios until a suite finds nothing new.
//!
//! The run loop lives on its own thread and reports through a bounded
//! channel. Scenarios of a suite run either in order on that thread or on
//! a rayon pool; each works on a snapshot of the shared bundle store and
//! merges what it observed when it ends.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use rayon::prelude::*;
use tether_explore::{
    scenario_prefix, scenario_rng, CancelToken, Generator, HookLayers, ReplayStep, Replayer,
    ScenarioError, ScenarioId, ScenarioResult, ScenarioRunner, ScenarioStatus, SharedBundleStore,
    StateMachine, Step, StepObserver, TraceStep, Transport, TransportError, Validator,
};
use tether_graph::{Link, LinkGraph};

use crate::classify::{Failure, FailureClassifier, Signature};
use crate::config::RunConfig;
use crate::error::RunError;
use crate::events::{Event, RunStatus, StepStatus, SuiteStatus};
use crate::limits::{ResourceChecker, StopReason};
use crate::repro::ReproductionTrace;
use crate::statistic::LinkStatistic;

/// Entry point: collaborators plus configuration, consumed by
/// [`Orchestrator::execute`].
pub struct Orchestrator {
    graph: Arc<LinkGraph>,
    generator: Arc<dyn Generator>,
    transport: Arc<dyn Transport>,
    validators: Vec<Arc<dyn Validator>>,
    hooks: HookLayers,
    config: RunConfig,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn new(
        graph: impl Into<Arc<LinkGraph>>,
        generator: Arc<dyn Generator>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            graph: graph.into(),
            generator,
            transport,
            validators: Vec::new(),
            hooks: HookLayers::new(),
            config: RunConfig::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn with_hooks(mut self, hooks: HookLayers) -> Self {
        self.hooks = hooks;
        self
    }

    /// Token that stops the run after the current step.
    pub fn cancel_handle(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Start the run. Events arrive on the returned stream, which ends
    /// after `RunFinished`.
    pub fn execute(self) -> Result<EventStream, RunError> {
        self.config
            .validate()
            .map_err(|errors| RunError::InvalidConfig { errors })?;

        let pool = if self.config.workers > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.workers)
                .thread_name(|i| format!("tether-worker-{i}"))
                .build()
                .map_err(|err| RunError::WorkerPool {
                    reason: err.to_string(),
                })?;
            Some(pool)
        } else {
            None
        };

        let (sender, receiver) = channel::bounded(self.config.event_buffer);
        let seed = self.config.seed.unwrap_or_else(rand::random::<u64>);
        let run = Run {
            bundles: SharedBundleStore::new(self.config.bundle_capacity),
            emitter: Emitter {
                sender,
                cancel: self.cancel.clone(),
            },
            graph: self.graph,
            generator: self.generator,
            transport: self.transport,
            validators: self.validators,
            hooks: self.hooks,
            config: self.config,
            seed,
            cancel: self.cancel.clone(),
            pool,
            halted: AtomicBool::new(false),
            classifier: FailureClassifier::new(),
            failures: Vec::new(),
            statistic: LinkStatistic::new(),
            suites: 0,
        };

        std::thread::Builder::new()
            .name("tether-run".into())
            .spawn(move || run.run())
            .map_err(RunError::Spawn)?;

        Ok(EventStream {
            receiver,
            cancel: self.cancel,
            finished: false,
        })
    }
}

/// Events of one run. Dropping the stream cancels the run.
pub struct EventStream {
    receiver: Receiver<Event>,
    cancel: CancelToken,
    finished: bool,
}

impl EventStream {
    pub fn cancel_handle(&self) -> CancelToken {
        self.cancel.clone()
    }
}

impl Iterator for EventStream {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        if self.finished {
            return None;
        }
        let event = self.receiver.recv().ok()?;
        self.finished = event.is_terminal();
        Some(event)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Sends events; a closed channel means nobody is listening, so the run
/// is cancelled.
struct Emitter {
    sender: Sender<Event>,
    cancel: CancelToken,
}

impl Emitter {
    fn emit(&self, event: Event) {
        if self.sender.send(event).is_err() {
            self.cancel.cancel();
        }
    }
}

enum ScenarioOutcome {
    Finished {
        result: ScenarioResult,
        statistic: LinkStatistic,
    },
    Panicked {
        scenario: ScenarioId,
        reason: String,
    },
}

struct Run {
    graph: Arc<LinkGraph>,
    generator: Arc<dyn Generator>,
    transport: Arc<dyn Transport>,
    validators: Vec<Arc<dyn Validator>>,
    hooks: HookLayers,
    config: RunConfig,
    seed: u64,
    emitter: Emitter,
    cancel: CancelToken,
    pool: Option<rayon::ThreadPool>,
    bundles: SharedBundleStore,
    /// Set when a scenario hits a run-fatal condition; pending scenarios
    /// of the suite are skipped.
    halted: AtomicBool,
    classifier: FailureClassifier,
    failures: Vec<Failure>,
    statistic: LinkStatistic,
    suites: u32,
}

impl Run {
    fn run(mut self) {
        let started = Instant::now();
        let checker = ResourceChecker::new(self.config.limits());
        self.bundles.reset();

        tracing::info!(
            seed = self.seed,
            operations = self.graph.all_operations().len(),
            links = self.graph.link_count(),
            workers = self.config.workers,
            "run started"
        );
        self.emitter.emit(Event::RunStarted {
            seed: self.seed,
            operations: self.graph.all_operations().len(),
            links: self.graph.link_count(),
        });

        let (status, stop_reason) = self.run_suites(&checker);

        tracing::info!(
            ?status,
            ?stop_reason,
            suites = self.suites,
            failures = self.failures.len(),
            "run finished"
        );
        self.emitter.emit(Event::RunFinished {
            status,
            suites: self.suites,
            failures: std::mem::take(&mut self.failures),
            stop_reason,
            link_statistics: std::mem::take(&mut self.statistic),
            elapsed: started.elapsed(),
        });
    }

    fn run_suites(&mut self, checker: &ResourceChecker) -> (RunStatus, StopReason) {
        loop {
            if self.cancel.is_cancelled() {
                return self.interrupted();
            }
            self.suites += 1;
            let new_failures = match self.run_suite(self.suites) {
                Ok(n) => n,
                Err(error) => {
                    let reason = match error {
                        RunError::Unsatisfiable(_) => StopReason::Unsatisfiable,
                        _ => StopReason::InternalError,
                    };
                    tracing::error!(%error, "run aborted");
                    self.emitter.emit(Event::Errored { error });
                    return (RunStatus::Errored, reason);
                }
            };
            if self.cancel.is_cancelled() {
                return self.interrupted();
            }
            if new_failures == 0 {
                return (self.outcome(), StopReason::Complete);
            }
            let confirmed = self.failures.iter().filter(|f| !f.flaky).count();
            if let Some(reason) = checker.check(self.suites, confirmed) {
                tracing::info!(
                    ?reason,
                    suites = self.suites,
                    confirmed,
                    elapsed_secs = checker.elapsed_secs(),
                    "run limit reached"
                );
                return (self.outcome(), reason);
            }
        }
    }

    fn interrupted(&self) -> (RunStatus, StopReason) {
        tracing::warn!(suites = self.suites, "run interrupted");
        self.emitter.emit(Event::Interrupted);
        (RunStatus::Interrupted, StopReason::UserAborted)
    }

    fn outcome(&self) -> RunStatus {
        if self.failures.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::Failure
        }
    }

    /// Run one suite and return how many new signatures it found.
    fn run_suite(&mut self, suite: u32) -> Result<usize, RunError> {
        tracing::info!(suite, "suite started");
        self.emitter.emit(Event::SuiteStarted { suite });
        self.classifier.start_suite();

        let count = self.config.scenarios_per_suite;
        let outcomes: Vec<ScenarioOutcome> = match &self.pool {
            Some(pool) => pool.install(|| {
                (0..count)
                    .into_par_iter()
                    .filter_map(|i| self.scenario(suite, i))
                    .collect()
            }),
            None => (0..count).map_while(|i| self.scenario(suite, i)).collect(),
        };

        let scenarios = outcomes.len();
        let mut new_failures = Vec::new();
        let mut fatal = None;
        for outcome in outcomes {
            match outcome {
                ScenarioOutcome::Finished { result, statistic } => {
                    self.statistic.merge(statistic);
                    if let Some(ScenarioError::Unsatisfiable(unsatisfiable)) = &result.error {
                        fatal.get_or_insert(RunError::Unsatisfiable(unsatisfiable.clone()));
                    }
                    let (found, error) = self.classify(suite, result);
                    new_failures.extend(found);
                    if let Some(error) = error {
                        fatal.get_or_insert(error);
                    }
                }
                ScenarioOutcome::Panicked { scenario, reason } => {
                    fatal.get_or_insert(RunError::Panicked { scenario, reason });
                }
            }
        }

        let status = if fatal.is_some() {
            SuiteStatus::Errored
        } else if self.cancel.is_cancelled() {
            SuiteStatus::Interrupted
        } else if new_failures.is_empty() {
            SuiteStatus::Success
        } else {
            SuiteStatus::Failure
        };
        tracing::info!(
            suite,
            scenarios,
            new_failures = new_failures.len(),
            "suite finished"
        );
        let found = new_failures.len();
        self.emitter.emit(Event::SuiteFinished {
            suite,
            status,
            scenarios,
            new_failures,
        });

        match fatal {
            Some(error) => Err(error),
            None => Ok(found),
        }
    }

    /// Run one scenario, or nothing if the run is cancelled or halted.
    fn scenario(&self, suite: u32, index: usize) -> Option<ScenarioOutcome> {
        if self.cancel.is_cancelled() || self.halted.load(Ordering::SeqCst) {
            return None;
        }
        let per_suite = self.config.scenarios_per_suite as u64;
        let scenario = ScenarioId(u64::from(suite - 1) * per_suite + index as u64 + 1);
        self.emitter.emit(Event::ScenarioStarted { suite, scenario });

        match panic::catch_unwind(AssertUnwindSafe(|| self.run_scenario(suite, scenario))) {
            Ok((result, statistic)) => {
                if let Some(error) = &result.error {
                    tracing::warn!(%scenario, %error, "scenario ended with an error");
                    if matches!(error, ScenarioError::Unsatisfiable(_)) {
                        self.halted.store(true, Ordering::SeqCst);
                    }
                }
                self.emitter.emit(Event::ScenarioFinished {
                    suite,
                    scenario,
                    status: result.status,
                    steps: result.trace.len(),
                    elapsed: result.elapsed,
                    error: result.error.clone(),
                });
                Some(ScenarioOutcome::Finished { result, statistic })
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                tracing::error!(%scenario, %reason, "scenario panicked");
                self.halted.store(true, Ordering::SeqCst);
                self.emitter.emit(Event::ScenarioFinished {
                    suite,
                    scenario,
                    status: ScenarioStatus::Error,
                    steps: 0,
                    elapsed: Duration::ZERO,
                    error: None,
                });
                Some(ScenarioOutcome::Panicked { scenario, reason })
            }
        }
    }

    fn run_scenario(&self, suite: u32, scenario: ScenarioId) -> (ScenarioResult, LinkStatistic) {
        let rng = scenario_rng(self.seed, suite, scenario.0);
        let mut machine = StateMachine::new(
            &self.graph,
            self.generator.as_ref(),
            self.config.machine_config(),
            rng,
        );
        let mut bundles = self.bundles.snapshot();
        let runner = ScenarioRunner::new(self.transport.as_ref(), &self.validators, &self.hooks)
            .with_budget(self.config.scenario_budget())
            .with_cancel(self.cancel.clone())
            .with_unique_inputs(self.config.unique_inputs);
        let mut observer = EventObserver {
            emitter: &self.emitter,
            suite,
            pending: None,
            statistic: LinkStatistic::new(),
        };
        let result = runner.run(scenario, &mut machine, &mut bundles, &mut observer);
        self.bundles.merge(bundles.take_new());
        (result, observer.statistic)
    }

    /// Deduplicate a scenario's failures and keep the new ones. Returns
    /// their signatures, and the error if a collaborator panicked during a
    /// replay; failures after that one are not classified.
    fn classify(&mut self, suite: u32, result: ScenarioResult) -> (Vec<Signature>, Option<RunError>) {
        let replayer = Replayer::new(self.transport.as_ref(), &self.validators, &self.hooks);
        let replay = self.config.replay_failures;
        let scenario = result.scenario;
        let mut found = Vec::new();
        let mut panicked = None;

        for step_failure in result.failures {
            let steps = scenario_prefix(&result.trace, &step_failure.observation);
            let operation = step_failure.observation.operation().clone();
            let classification = self.classifier.classify(&step_failure.failure, &operation, || {
                if !replay {
                    return true;
                }
                let attempt = AssertUnwindSafe(|| replayer.reproduces(&steps, &step_failure.failure));
                match panic::catch_unwind(attempt) {
                    Ok(reproduced) => reproduced,
                    Err(payload) => {
                        panicked = Some(panic_message(payload.as_ref()));
                        true
                    }
                }
            });

            if classification.is_confirmed {
                confirm(&mut self.failures, &classification.signature, &steps);
            }
            if classification.is_new && !classification.is_duplicate {
                let failure = step_failure.failure;
                if classification.is_flaky {
                    tracing::warn!(
                        signature = %classification.signature,
                        check = %failure.check,
                        %operation,
                        "failure did not reproduce on replay"
                    );
                } else {
                    tracing::info!(
                        signature = %classification.signature,
                        check = %failure.check,
                        %operation,
                        "new failure"
                    );
                }
                found.push(classification.signature.clone());
                self.failures.push(Failure {
                    signature: classification.signature,
                    check: failure.check,
                    title: failure.title,
                    message: failure.message,
                    operation,
                    suite,
                    scenario,
                    step: step_failure.step,
                    flaky: classification.is_flaky,
                    reproduction: ReproductionTrace::from_steps(&steps),
                });
            }

            if let Some(reason) = panicked.take() {
                tracing::error!(%scenario, %reason, "replay panicked");
                return (found, Some(RunError::Panicked { scenario, reason }));
            }
        }
        (found, None)
    }
}

/// A failure earlier marked flaky reproduced: report it as confirmed, with
/// the trace that reproduced it.
fn confirm(failures: &mut [Failure], signature: &Signature, steps: &[ReplayStep]) {
    if let Some(failure) = failures.iter_mut().find(|f| &f.signature == signature) {
        tracing::info!(%signature, check = %failure.check, "flaky failure reproduced");
        failure.flaky = false;
        failure.reproduction = ReproductionTrace::from_steps(steps);
    }
}

/// Forwards step notifications as events and counts link traversals.
struct EventObserver<'a> {
    emitter: &'a Emitter,
    suite: u32,
    pending: Option<Arc<Link>>,
    statistic: LinkStatistic,
}

impl StepObserver for EventObserver<'_> {
    fn step_started(&mut self, scenario: ScenarioId, step: &Step) {
        let transition = step.transition_id();
        tracing::debug!(
            %scenario,
            index = step.index,
            operation = %step.operation,
            transition = transition.as_deref().unwrap_or("fresh"),
            "step started"
        );
        self.pending = step.link.clone();
        self.emitter.emit(Event::StepStarted {
            suite: self.suite,
            scenario,
            index: step.index,
            target: step.operation.clone(),
            transition,
        });
    }

    fn step_finished(
        &mut self,
        scenario: ScenarioId,
        step: &TraceStep,
        error: Option<&TransportError>,
    ) {
        let response_status = step.status_code();
        if let Some(link) = self.pending.take() {
            self.statistic.record(&link, response_status);
        }
        let status = if error.is_some() {
            StepStatus::Error
        } else if step.check_failures.is_empty() {
            StepStatus::Success
        } else {
            StepStatus::Failure
        };
        self.emitter.emit(Event::StepFinished {
            suite: self.suite,
            scenario,
            index: step.index,
            target: step.operation.clone(),
            transition: step.transition.clone(),
            status,
            response_status,
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
