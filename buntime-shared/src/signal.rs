//! Newline-terminated control-plane signals sent worker→supervisor over the
//! Unix domain socket (§4.2). These only ever say "something is available
//! in `w2s`" or report a lifecycle event; the actual payload always lives in
//! the ring buffer.

use serde::{Deserialize, Serialize};

/// One line of the control channel, worker→supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// The worker has connected and is ready to receive code.
    Ready,
    /// One or more `STDOUT` frames are available in `w2s`.
    Data,
    /// One or more permission-check frames are available in `w2s`.
    Check,
    /// A lifecycle event, e.g. `exec_start`, `exec_end`, `exception`.
    State(StateEvent),
}

/// Structured lifecycle event carried by a `{"type":"state",...}` signal
/// line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEvent {
    #[serde(rename = "type")]
    pub kind: StateEventKind,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateEventKind {
    State,
}

impl Signal {
    /// Serialize to the exact newline-terminated line sent on the wire
    /// (including the trailing `\n`).
    pub fn to_line(&self) -> String {
        let body = match self {
            Signal::Ready => "READY".to_string(),
            Signal::Data => "DATA".to_string(),
            Signal::Check => "CHECK".to_string(),
            Signal::State(event) => {
                serde_json::to_string(event).unwrap_or_else(|_| "READY".to_string())
            }
        };
        format!("{body}\n")
    }

    /// Parse one line (without its trailing newline) received on the
    /// control socket.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\n', '\r']);
        match line {
            "READY" => Some(Signal::Ready),
            "DATA" => Some(Signal::Data),
            "CHECK" => Some(Signal::Check),
            other if other.starts_with('{') => {
                serde_json::from_str::<StateEvent>(other).ok().map(Signal::State)
            }
            _ => None,
        }
    }
}

impl StateEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            kind: StateEventKind::State,
            event: event.into(),
            data: None,
        }
    }

    pub fn with_data(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: StateEventKind::State,
            event: event.into(),
            data: Some(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_tokens_round_trip() {
        for signal in [Signal::Ready, Signal::Data, Signal::Check] {
            let line = signal.to_line();
            assert_eq!(Signal::parse(line.trim_end()), Some(signal));
        }
    }

    #[test]
    fn state_event_round_trips_through_json() {
        let event = Signal::State(StateEvent::new("exec_start"));
        let line = event.to_line();
        assert_eq!(Signal::parse(line.trim_end()), Some(event));
    }

    #[test]
    fn state_event_carries_optional_data() {
        let event = StateEvent::with_data("exec_end", serde_json::json!({"exitCode": 0}));
        let signal = Signal::State(event.clone());
        let parsed = Signal::parse(signal.to_line().trim_end()).unwrap();
        assert_eq!(parsed, Signal::State(event));
    }

    #[test]
    fn unknown_line_does_not_parse() {
        assert_eq!(Signal::parse("GARBAGE"), None);
    }
}
