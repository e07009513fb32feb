//! Rule-based state machine that sequences the calls of one scenario.
//!
//! Candidates at every step are a fresh call to each operation plus every
//! link whose source bundle holds a matching observation. The strategy
//! picks one by weight.

use std::collections::VecDeque;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tether_graph::{ExtractionFailure, Link, LinkGraph};
use tether_ir::{Case, GenerationMode, Operation, OperationId};

use crate::bundle::{BundleStore, Observation};
use crate::generator::Generator;
use crate::strategy::{PseudoRandomStrategy, Strategy, WeightTable};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Unsatisfiable: {reason}")]
pub struct Unsatisfiable {
    pub reason: String,
}

/// Per-scenario knobs.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub max_steps: usize,
    /// Weight multiplier for swarm-suppressed operations.
    pub swarm_factor: f64,
    /// Probability that a generated case is negative.
    pub negative_probability: f64,
    /// Operations called once each at scenario start.
    pub initializers: Vec<OperationId>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            max_steps: 6,
            swarm_factor: 0.1,
            negative_probability: 0.0,
            initializers: Vec::new(),
        }
    }
}

/// A possible next move.
#[derive(Debug, Clone)]
pub enum Transition {
    Fresh(OperationId),
    Link(Arc<Link>),
}

impl Transition {
    /// Operation the resulting step calls.
    pub fn target(&self) -> &OperationId {
        match self {
            Transition::Fresh(op) => op,
            Transition::Link(link) => &link.target,
        }
    }
}

/// A planned call, not yet executed.
#[derive(Debug, Clone)]
pub struct Step {
    pub index: usize,
    pub operation: OperationId,
    pub case: Case,
    /// Observation the case was derived from. `None` for fresh steps.
    pub source: Option<Observation>,
    pub link: Option<Arc<Link>>,
    pub extraction_failures: Vec<ExtractionFailure>,
}

impl Step {
    pub fn transition_id(&self) -> Option<String> {
        self.link.as_ref().map(|l| l.transition_id())
    }

    pub fn is_fresh(&self) -> bool {
        self.source.is_none()
    }
}

#[derive(Debug)]
pub enum NextStep {
    Step(Step),
    EndOfScenario,
}

pub struct StateMachine<'a> {
    graph: &'a LinkGraph,
    generator: &'a dyn Generator,
    config: MachineConfig,
    strategy: Box<dyn Strategy + 'a>,
    weights: WeightTable,
    initializers: VecDeque<OperationId>,
    steps_taken: usize,
}

impl<'a> StateMachine<'a> {
    pub fn new(
        graph: &'a LinkGraph,
        generator: &'a dyn Generator,
        config: MachineConfig,
        mut rng: ChaCha8Rng,
    ) -> Self {
        let operations = graph.all_operations().iter().map(|op| &op.id);
        let weights = WeightTable::swarm(operations, config.swarm_factor, &mut rng);
        let mut initializers = config.initializers.clone();
        initializers.shuffle(&mut rng);
        Self {
            graph,
            generator,
            strategy: Box::new(PseudoRandomStrategy::new(rng)),
            weights,
            initializers: initializers.into(),
            config,
            steps_taken: 0,
        }
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    /// Every transition available given what `bundles` has observed.
    pub fn candidates(&self, bundles: &BundleStore) -> Vec<Transition> {
        let fresh = self
            .graph
            .all_operations()
            .iter()
            .map(|op| Transition::Fresh(op.id.clone()));
        let linked = self
            .graph
            .links()
            .iter()
            .filter(|link| bundles.has_matching(&link.source, &link.status))
            .map(|link| Transition::Link(Arc::clone(link)));
        fresh.chain(linked).collect()
    }

    /// Plan the next step. Initializers come first, then weighted choices
    /// until the step bound is reached.
    pub fn next_step(&mut self, bundles: &BundleStore) -> Result<NextStep, Unsatisfiable> {
        if self.graph.is_empty() {
            return Err(Unsatisfiable {
                reason: "the API has no operations to call".to_string(),
            });
        }

        if let Some(operation) = self.initializers.pop_front() {
            let Some(op) = self.graph.operation(&operation) else {
                return Err(Unsatisfiable {
                    reason: format!("initializer '{operation}' is not an operation of the API"),
                });
            };
            tracing::debug!(operation = %op.id, "initializer step");
            let step = self.fresh_step(op);
            return Ok(NextStep::Step(step));
        }

        if self.steps_taken >= self.config.max_steps {
            return Ok(NextStep::EndOfScenario);
        }

        let candidates = self.candidates(bundles);
        let weights: Vec<f64> = candidates
            .iter()
            .map(|t| self.weights.get(t.target()))
            .collect();
        let Some(choice) = self.strategy.choose(&weights) else {
            return Err(Unsatisfiable {
                reason: "no transition is available".to_string(),
            });
        };

        let step = match &candidates[choice] {
            Transition::Fresh(operation) => {
                let op = self.operation(operation)?;
                self.fresh_step(op)
            }
            Transition::Link(link) => self.link_step(link, bundles)?,
        };
        tracing::debug!(
            step = step.index,
            operation = %step.operation,
            link = step.link.as_ref().map(|l| l.name.as_str()),
            candidates = candidates.len(),
            "step chosen"
        );
        Ok(NextStep::Step(step))
    }

    fn operation(&self, id: &OperationId) -> Result<&'a Operation, Unsatisfiable> {
        self.graph.operation(id).ok_or_else(|| Unsatisfiable {
            reason: format!("operation '{id}' disappeared from the graph"),
        })
    }

    fn mode(&mut self) -> GenerationMode {
        let p = self.config.negative_probability;
        if p > 0.0 && self.strategy.rng().gen_bool(p.min(1.0)) {
            GenerationMode::Negative
        } else {
            GenerationMode::Positive
        }
    }

    fn generate(&mut self, op: &Operation) -> Case {
        let mode = self.mode();
        self.generator.generate(op, mode, self.strategy.rng())
    }

    fn fresh_step(&mut self, op: &Operation) -> Step {
        let case = self.generate(op);
        self.advance(Step {
            index: 0,
            operation: op.id.clone(),
            case,
            source: None,
            link: None,
            extraction_failures: Vec::new(),
        })
    }

    fn link_step(&mut self, link: &Arc<Link>, bundles: &BundleStore) -> Result<Step, Unsatisfiable> {
        let source = bundles
            .sample_matching(&link.source, &link.status, self.strategy.rng())
            .cloned()
            .ok_or_else(|| Unsatisfiable {
                reason: format!("link '{}' has no matching observation", link.name),
            })?;
        let target = self.operation(&link.target)?;
        let generated = self.generate(target);
        let (case, failures) = link.apply(generated, &source.case, &source.response);
        for failure in &failures {
            tracing::debug!(
                link = %link.name,
                target = %failure.target,
                error = %failure.error,
                "extraction failed, parameter omitted"
            );
        }
        Ok(self.advance(Step {
            index: 0,
            operation: target.id.clone(),
            case,
            source: Some(source),
            link: Some(Arc::clone(link)),
            extraction_failures: failures,
        }))
    }

    fn advance(&mut self, mut step: Step) -> Step {
        step.index = self.steps_taken;
        self.steps_taken += 1;
        step
    }
}
