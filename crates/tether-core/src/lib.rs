//! Run orchestration: suites of scenarios, failure classification, the
//! event stream, configuration and stop conditions.

pub mod classify;
pub mod config;
pub mod error;
pub mod events;
pub mod limits;
pub mod logging;
pub mod orchestrator;
pub mod repro;
pub mod statistic;

pub use classify::{normalize_context, Classification, Failure, FailureClassifier, Signature};
pub use config::{ConfigError, RunConfig};
pub use error::RunError;
pub use events::{Event, RunStatus, StepStatus, SuiteStatus};
pub use limits::{ResourceChecker, RunLimits, StopReason};
pub use logging::{init_tracing, LoggingError};
pub use orchestrator::{EventStream, Orchestrator};
pub use repro::{ReproductionStep, ReproductionTrace};
pub use statistic::{LinkCounts, LinkStatistic};
