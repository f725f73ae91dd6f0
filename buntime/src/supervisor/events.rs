//! Tagged, order-preserving events the supervisor broadcasts to subscribers
//! (§4.7 "Events emitted"). Consumers must tolerate unknown event kinds, so
//! this enum is `#[non_exhaustive]` and serializes with an explicit `kind`
//! discriminant rather than relying on variant order.

use std::collections::HashMap;

use serde::Serialize;

use crate::supervisor::state::WorkerState;

/// Restart/worker-death signal carried by a `state` event, beyond the bare
/// `WorkerState` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateSignal {
    Restarted,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
#[non_exhaustive]
pub enum SupervisorEvent {
    PolicyLoaded,
    PolicySetLoaded { meta: serde_json::Value },
    State {
        worker: WorkerState,
        #[serde(skip_serializing_if = "Option::is_none")]
        signal: Option<StateSignal>,
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
    Output { bytes: Vec<u8> },
    Error { message: String },
    Memory { used_s2w: u32, used_w2s: u32, capacity: u32 },
    Syscalls { heatmap: HashMap<String, u64> },
    AuditEvents { batch: Vec<serde_json::Value> },
    AuditReset,
}

impl SupervisorEvent {
    pub fn state(worker: WorkerState) -> Self {
        SupervisorEvent::State { worker, signal: None, exit_code: None }
    }

    pub fn state_with_signal(worker: WorkerState, signal: StateSignal) -> Self {
        SupervisorEvent::State { worker, signal: Some(signal), exit_code: None }
    }

    pub fn state_with_exit_code(worker: WorkerState, exit_code: i32) -> Self {
        SupervisorEvent::State { worker, signal: None, exit_code: Some(exit_code) }
    }

    pub fn error(message: impl Into<String>) -> Self {
        SupervisorEvent::Error { message: message.into() }
    }
}
