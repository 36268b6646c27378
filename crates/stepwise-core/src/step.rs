//! Step codes
//!
//! Every resumable function dispatches on a small step code. Codes 1..=100
//! belong to the operation; two codes are reserved as terminal markers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A step code of a resumable function
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Step(u8);

impl Step {
    /// No step (fresh engine, or no pending next step)
    pub const IDLE: Step = Step(0);

    /// Terminal: the function completed successfully
    pub const SUCCESS: Step = Step(101);

    /// Terminal: the function failed
    pub const FAILURE: Step = Step(102);

    /// Highest code available to operations
    pub const MAX_DOMAIN: u8 = 100;

    /// Create a step from a raw code
    pub const fn new(code: u8) -> Self {
        Step(code)
    }

    /// Raw code
    pub const fn code(self) -> u8 {
        self.0
    }

    /// Check for Success or Failure
    pub fn is_terminal(self) -> bool {
        self == Self::SUCCESS || self == Self::FAILURE
    }

    /// Check for the idle code
    pub fn is_idle(self) -> bool {
        self == Self::IDLE
    }
}

impl From<u8> for Step {
    fn from(code: u8) -> Self {
        Step(code)
    }
}

impl From<Step> for u8 {
    fn from(step: Step) -> Self {
        step.0
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::IDLE => write!(f, "Step(idle)"),
            Self::SUCCESS => write!(f, "Step(success)"),
            Self::FAILURE => write!(f, "Step(failure)"),
            Step(code) => write!(f, "Step({})", code),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::IDLE => write!(f, "idle"),
            Self::SUCCESS => write!(f, "success"),
            Self::FAILURE => write!(f, "failure"),
            Step(code) => write!(f, "{}", code),
        }
    }
}

/// What the driver sees once the chain has unwound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// No root frame exists
    Idle,
    /// Root is paused at this step
    Running(Step),
    /// Root ended with success
    Succeeded,
    /// Root ended with failure
    Failed,
}

impl Outcome {
    /// Check for Succeeded or Failed
    pub fn is_finished(&self) -> bool {
        matches!(self, Outcome::Succeeded | Outcome::Failed)
    }
}

impl From<Step> for Outcome {
    fn from(step: Step) -> Self {
        match step {
            Step::IDLE => Outcome::Idle,
            Step::SUCCESS => Outcome::Succeeded,
            Step::FAILURE => Outcome::Failed,
            other => Outcome::Running(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_codes() {
        assert!(Step::SUCCESS.is_terminal());
        assert!(Step::FAILURE.is_terminal());
        assert!(!Step::new(7).is_terminal());
        assert!(!Step::IDLE.is_terminal());
    }

    #[test]
    fn test_outcome_from_step() {
        assert_eq!(Outcome::from(Step::IDLE), Outcome::Idle);
        assert_eq!(Outcome::from(Step::new(3)), Outcome::Running(Step::new(3)));
        assert_eq!(Outcome::from(Step::FAILURE), Outcome::Failed);
        assert!(Outcome::from(Step::SUCCESS).is_finished());
    }

    #[test]
    fn test_display() {
        assert_eq!(Step::new(42).to_string(), "42");
        assert_eq!(Step::FAILURE.to_string(), "failure");
    }
}
