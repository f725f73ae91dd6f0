//! Supervisor lifecycle state machine (§4.7 "State machine").
//!
//! ```text
//! idle --start--> running
//! running --policy-violation--> killed --auto--> restarting --ready--> running
//! running --crash | stop--> stopped
//! restarting --fail--> stopped
//! ```

use buntime_shared::errors::{BuntimeError, BuntimeResult};
use serde::{Deserialize, Serialize};

/// Worker lifecycle state, as observed by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Idle,
    Starting,
    Running,
    Restarting,
    Stopped,
    Killed,
}

/// Why the worker was killed, carried alongside `WorkerState::Killed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KillReason {
    PolicyViolation,
    Crash,
    Requested,
}

impl WorkerState {
    /// Check if transition to `target` is legal per the state diagram above.
    pub fn can_transition_to(&self, target: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, target),
            (Idle, Starting)
                | (Starting, Running)
                | (Starting, Stopped)
                | (Running, Killed)
                | (Running, Stopped)
                | (Killed, Restarting)
                | (Restarting, Running)
                | (Restarting, Stopped)
        )
    }
}

/// The supervisor's full dynamic state: worker lifecycle plus the reason it
/// was last killed, if any.
#[derive(Debug, Clone)]
pub struct SupervisorState {
    pub worker: WorkerState,
    pub kill_reason: Option<KillReason>,
}

impl SupervisorState {
    pub fn new() -> Self {
        Self {
            worker: WorkerState::Idle,
            kill_reason: None,
        }
    }

    /// Attempt a validated transition; `kill_reason` is set when
    /// transitioning into `Killed` and cleared on any transition out of
    /// `Killed`/`Restarting` back into `Running`.
    pub fn transition_to(&mut self, target: WorkerState) -> BuntimeResult<()> {
        self.transition_to_with_reason(target, None)
    }

    pub fn transition_to_with_reason(
        &mut self,
        target: WorkerState,
        reason: Option<KillReason>,
    ) -> BuntimeResult<()> {
        if !self.worker.can_transition_to(target) {
            return Err(BuntimeError::InvalidState(format!(
                "cannot transition from {:?} to {:?}",
                self.worker, target
            )));
        }
        self.worker = target;
        if target == WorkerState::Killed {
            self.kill_reason = reason;
        } else if target == WorkerState::Running {
            self.kill_reason = None;
        }
        Ok(())
    }
}

impl Default for SupervisorState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_starts_then_runs() {
        let mut state = SupervisorState::new();
        assert!(state.transition_to(WorkerState::Starting).is_ok());
        assert!(state.transition_to(WorkerState::Running).is_ok());
        assert_eq!(state.worker, WorkerState::Running);
    }

    #[test]
    fn policy_violation_kills_then_auto_restarts() {
        let mut state = SupervisorState::new();
        state.transition_to(WorkerState::Starting).unwrap();
        state.transition_to(WorkerState::Running).unwrap();
        state
            .transition_to_with_reason(WorkerState::Killed, Some(KillReason::PolicyViolation))
            .unwrap();
        assert_eq!(state.kill_reason, Some(KillReason::PolicyViolation));
        state.transition_to(WorkerState::Restarting).unwrap();
        state.transition_to(WorkerState::Running).unwrap();
        assert_eq!(state.kill_reason, None);
    }

    #[test]
    fn restart_failure_goes_to_stopped() {
        let mut state = SupervisorState::new();
        state.transition_to(WorkerState::Starting).unwrap();
        state.transition_to(WorkerState::Running).unwrap();
        state
            .transition_to_with_reason(WorkerState::Killed, Some(KillReason::PolicyViolation))
            .unwrap();
        state.transition_to(WorkerState::Restarting).unwrap();
        assert!(state.transition_to(WorkerState::Stopped).is_ok());
    }

    #[test]
    fn cannot_skip_starting() {
        let mut state = SupervisorState::new();
        assert!(state.transition_to(WorkerState::Running).is_err());
    }

    #[test]
    fn cannot_leave_stopped() {
        let mut state = SupervisorState::new();
        state.transition_to(WorkerState::Starting).unwrap();
        state.transition_to(WorkerState::Stopped).unwrap();
        assert!(state.transition_to(WorkerState::Running).is_err());
    }
}
