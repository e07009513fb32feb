//! Scenario exploration: bundles of observed responses, the state machine
//! that turns them into call sequences, and the runner that executes them.

pub mod bundle;
pub mod generator;
pub mod hooks;
pub mod machine;
pub mod replay;
pub mod rng;
pub mod runner;
pub mod strategy;
pub mod trace;
pub mod transport;
pub mod validator;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bundle::{BundleStore, Observation, ObservationOrigin, SharedBundleStore};
pub use generator::{EmptyGenerator, Generator};
pub use hooks::{Hook, HookLayers};
pub use machine::{MachineConfig, NextStep, StateMachine, Step, Transition, Unsatisfiable};
pub use replay::{lineage, scenario_prefix, ReplayStep, Replayer};
pub use rng::scenario_rng;
pub use runner::{
    CancelToken, NoopObserver, ScenarioError, ScenarioResult, ScenarioRunner, ScenarioStatus,
    StepFailure, StepObserver,
};
pub use strategy::{PseudoRandomStrategy, Strategy, WeightTable};
pub use trace::{ScenarioId, ScenarioTrace, TraceStep};
pub use transport::{Transport, TransportError};
pub use validator::{CheckFailure, CompositeValidator, NotAServerError, Validator};
