//! Run-level stop conditions.
//!
//! A run normally ends when a suite finds nothing new. These limits end
//! it earlier and record why.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Caps on a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLimits {
    /// Maximum suites before forced stop.
    pub max_suites: u32,
    /// Maximum confirmed failures before stopping.
    pub max_failures: Option<usize>,
    /// Maximum wall-clock seconds before forced stop.
    pub max_wall_secs: Option<u64>,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_suites: 10,
            max_failures: None,
            max_wall_secs: None,
        }
    }
}

/// Reason a run was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A suite found no new failures.
    Complete,
    /// Suite cap reached while failures were still being found.
    SuiteLimitReached,
    /// Confirmed failure cap reached.
    FailureLimitReached,
    /// Wall-clock time limit exceeded.
    WallTimeExceeded,
    /// Cancelled from outside.
    UserAborted,
    /// No operation could start a scenario.
    Unsatisfiable,
    /// A collaborator panicked or the run could not continue.
    InternalError,
}

/// Check run progress against limits.
pub struct ResourceChecker {
    limits: RunLimits,
    start_time: Instant,
}

impl ResourceChecker {
    pub fn new(limits: RunLimits) -> Self {
        Self {
            limits,
            start_time: Instant::now(),
        }
    }

    /// Returns the reason to stop after `suites` suites with `failures`
    /// confirmed failures, or `None` to keep going.
    pub fn check(&self, suites: u32, failures: usize) -> Option<StopReason> {
        if self.wall_time_exceeded() {
            return Some(StopReason::WallTimeExceeded);
        }
        if self.limits.max_failures.is_some_and(|max| failures >= max) {
            return Some(StopReason::FailureLimitReached);
        }
        if suites >= self.limits.max_suites {
            return Some(StopReason::SuiteLimitReached);
        }
        None
    }

    pub fn wall_time_exceeded(&self) -> bool {
        self.limits
            .max_wall_secs
            .is_some_and(|max| self.start_time.elapsed().as_secs() >= max)
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    pub fn limits(&self) -> &RunLimits {
        &self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_ok() {
        let checker = ResourceChecker::new(RunLimits::default());
        assert!(checker.check(3, 50).is_none());
    }

    #[test]
    fn test_suite_limit() {
        let checker = ResourceChecker::new(RunLimits {
            max_suites: 2,
            ..Default::default()
        });
        assert_eq!(checker.check(2, 0), Some(StopReason::SuiteLimitReached));
    }

    #[test]
    fn test_failure_limit_wins_over_suite_limit() {
        let checker = ResourceChecker::new(RunLimits {
            max_suites: 1,
            max_failures: Some(1),
            max_wall_secs: None,
        });
        assert_eq!(checker.check(1, 1), Some(StopReason::FailureLimitReached));
    }

    #[test]
    fn test_zero_wall_time_is_exceeded() {
        let checker = ResourceChecker::new(RunLimits {
            max_wall_secs: Some(0),
            ..Default::default()
        });
        assert!(checker.wall_time_exceeded());
        assert_eq!(checker.check(0, 0), Some(StopReason::WallTimeExceeded));
    }

    #[test]
    fn test_elapsed_secs() {
        let checker = ResourceChecker::new(RunLimits::default());
        assert!(checker.elapsed_secs() < 1.0);
    }
}
