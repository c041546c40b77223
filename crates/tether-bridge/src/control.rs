//! Execution-control state machine.
//!
//! The module and the host share one call stack, so the module can never
//! block on host input. An operation that needs input suspends instead:
//! it returns to the host with its state preserved inside module memory,
//! and the host later calls resume to continue. This module tracks which
//! of those protocol steps are currently legal; the actual boundary calls
//! live in [`crate::Bridge`].

use crate::{BridgeError, BridgeResult};

/// Externally observable controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    /// No evaluation in progress.
    Idle,
    /// A boundary call is in flight. Observed from outside only after a
    /// call failed mid-flight, in which case `reset` is the sole way out.
    Running,
    /// The module voluntarily yielded (e.g. awaiting console input) and
    /// is waiting for `resume`.
    Suspended,
}

/// Outcome of submitting source text for evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalOutcome {
    /// The evaluation ran to completion; this is its result text.
    /// Evaluation-level errors are carried in the text — the bridge does
    /// not interpret it.
    Complete(String),
    /// The module yielded; call `resume` to continue.
    Suspended,
}

/// Transition gate for the Idle → Running → {Idle, Suspended} protocol.
///
/// Illegal transitions are contract violations, not recoverable errors.
/// Keeping the gate separate from the boundary calls makes the protocol
/// decisions testable without a module.
#[derive(Debug)]
pub(crate) struct ExecGate {
    state: ExecState,
}

impl ExecGate {
    pub fn new() -> Self {
        Self {
            state: ExecState::Idle,
        }
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    /// Idle → Running. `evaluate` is valid only when nothing is in flight;
    /// this is also what keeps the single scratch slot single-use — there
    /// can never be two host-initiated calls with unread results.
    pub fn begin_evaluate(&mut self) -> BridgeResult<()> {
        match self.state {
            ExecState::Idle => {
                self.state = ExecState::Running;
                Ok(())
            }
            state => Err(BridgeError::InvalidState {
                op: "evaluate",
                state,
            }),
        }
    }

    /// Suspended → Running.
    pub fn begin_resume(&mut self) -> BridgeResult<()> {
        match self.state {
            ExecState::Suspended => {
                self.state = ExecState::Running;
                Ok(())
            }
            state => Err(BridgeError::InvalidState {
                op: "resume",
                state,
            }),
        }
    }

    /// Running → Idle (the computation completed).
    pub fn settle_idle(&mut self) {
        self.state = ExecState::Idle;
    }

    /// Running → Suspended (the module yielded).
    pub fn settle_suspended(&mut self) {
        self.state = ExecState::Suspended;
    }

    /// Any state → Idle. Unconditional; discards suspended work.
    pub fn reset(&mut self) {
        self.state = ExecState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_only_from_idle() {
        let mut gate = ExecGate::new();
        gate.begin_evaluate().unwrap();
        assert_eq!(gate.state(), ExecState::Running);
        assert!(matches!(
            gate.begin_evaluate(),
            Err(BridgeError::InvalidState {
                op: "evaluate",
                state: ExecState::Running
            })
        ));
    }

    #[test]
    fn resume_only_from_suspended() {
        let mut gate = ExecGate::new();
        assert!(matches!(
            gate.begin_resume(),
            Err(BridgeError::InvalidState {
                op: "resume",
                state: ExecState::Idle
            })
        ));

        gate.begin_evaluate().unwrap();
        gate.settle_suspended();
        gate.begin_resume().unwrap();
        assert_eq!(gate.state(), ExecState::Running);
    }

    #[test]
    fn completion_returns_to_idle() {
        let mut gate = ExecGate::new();
        gate.begin_evaluate().unwrap();
        gate.settle_idle();
        assert_eq!(gate.state(), ExecState::Idle);
        gate.begin_evaluate().unwrap();
    }

    #[test]
    fn reset_from_any_state() {
        let mut gate = ExecGate::new();
        gate.reset();
        assert_eq!(gate.state(), ExecState::Idle);

        gate.begin_evaluate().unwrap();
        gate.reset();
        assert_eq!(gate.state(), ExecState::Idle);

        gate.begin_evaluate().unwrap();
        gate.settle_suspended();
        gate.reset();
        assert_eq!(gate.state(), ExecState::Idle);
        // Suspended work is gone: resume is now a contract violation.
        assert!(gate.begin_resume().is_err());
    }
}
