//! Per-call dispatch state machine
//!
//! Every interception path records the stages it passes through in a
//! [`Trace`]. The relation below is the only way to move between stages and
//! no stage is entered twice within one call.

use crate::error::StateMachineError;
use serde::{Deserialize, Serialize};

/// Dispatch stage of one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Start,
    CacheCheck,
    Synthesize,
    Validate,
    Critique,
    Execute,
    Fallback,
    Done,
    Raised,
}

impl Stage {
    /// Done and Raised end a call
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Raised)
    }
}

/// Validates a stage transition
///
/// # Errors
/// Returns [`StateMachineError::InvalidTransition`] when `to` is not
/// reachable from `from`
pub fn validate_transition(from: Stage, to: Stage) -> Result<(), StateMachineError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StateMachineError::InvalidTransition { from, to })
    }
}

/// Stages reachable from `from`
#[must_use]
pub fn allowed_transitions(from: Stage) -> Vec<Stage> {
    use Stage::*;
    match from {
        Start => vec![CacheCheck, Synthesize, Validate, Fallback, Done, Raised],
        CacheCheck => vec![Synthesize, Validate, Fallback],
        Synthesize => vec![Validate, Fallback, Raised],
        Validate => vec![Critique, Execute, Fallback, Raised],
        Critique => vec![Execute, Fallback, Raised],
        Execute => vec![Done, Fallback, Raised],
        Fallback => vec![Done, Raised],
        Done | Raised => vec![],
    }
}

/// Stages visited by one call, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    unit: String,
    path: Vec<Stage>,
}

impl Trace {
    /// Fresh trace positioned at [`Stage::Start`]
    #[must_use]
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            path: vec![Stage::Start],
        }
    }

    /// Move to `to`
    ///
    /// # Errors
    /// Returns [`StateMachineError`] when the move is not in the relation or
    /// `to` was already visited
    pub fn advance(&mut self, to: Stage) -> Result<(), StateMachineError> {
        let from = self.current();
        validate_transition(from, to)?;
        if self.path.contains(&to) {
            return Err(StateMachineError::Revisited(to));
        }
        tracing::debug!("{}: {:?} -> {:?}", self.unit, from, to);
        self.path.push(to);
        Ok(())
    }

    /// Move to `to`, logging an illegal move instead of failing
    ///
    /// Used for [`Stage::Fallback`] and the terminal stages, which a call
    /// must reach whatever happened before.
    pub fn record(&mut self, to: Stage) {
        if let Err(e) = self.advance(to) {
            tracing::error!("{}: {}", self.unit, e);
            self.path.push(to);
        }
    }

    /// Most recent stage
    #[inline]
    #[must_use]
    pub fn current(&self) -> Stage {
        self.path.last().copied().unwrap_or(Stage::Start)
    }

    /// Whether `stage` was entered during this call
    #[inline]
    #[must_use]
    pub fn visited(&self, stage: Stage) -> bool {
        self.path.contains(&stage)
    }

    /// Stages in visiting order
    #[inline]
    #[must_use]
    pub fn path(&self) -> &[Stage] {
        &self.path
    }

    /// Consume the trace, keeping the path
    #[must_use]
    pub fn into_path(self) -> Vec<Stage> {
        self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Stage::*;

    #[test]
    fn synthesis_path_is_legal() {
        let mut trace = Trace::new("add");
        for stage in [CacheCheck, Synthesize, Validate, Critique, Execute, Done] {
            trace.advance(stage).unwrap();
        }
        assert_eq!(trace.current(), Done);
        assert!(trace.current().is_terminal());
        assert_eq!(trace.path().len(), 7);
    }

    #[test]
    fn terminal_stages_have_no_exits() {
        assert!(allowed_transitions(Done).is_empty());
        assert!(allowed_transitions(Raised).is_empty());
        assert_eq!(
            validate_transition(Done, Fallback),
            Err(StateMachineError::InvalidTransition { from: Done, to: Fallback })
        );
    }

    #[test]
    fn execute_requires_validation() {
        assert!(validate_transition(Start, Execute).is_err());
        assert!(validate_transition(Synthesize, Execute).is_err());
        assert!(validate_transition(CacheCheck, Critique).is_err());
    }

    #[test]
    fn every_path_from_start_terminates() {
        fn walk(stage: Stage, seen: &mut Vec<Stage>) {
            let next = allowed_transitions(stage);
            if next.is_empty() {
                assert!(stage.is_terminal(), "{stage:?} is a dead end");
                return;
            }
            for to in next {
                assert!(!seen.contains(&to), "cycle through {to:?}");
                seen.push(to);
                walk(to, seen);
                seen.pop();
            }
        }
        walk(Start, &mut vec![Start]);
    }

    #[test]
    fn stages_are_not_revisited() {
        let mut trace = Trace::new("f");
        trace.advance(Fallback).unwrap();
        assert!(trace.visited(Fallback));
        assert!(trace.advance(Fallback).is_err());
    }
}
