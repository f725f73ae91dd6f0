//! Shared fixtures for buntime's integration test suite: a scratch workdir,
//! a policy builder, and an event-waiting helper over the Supervisor's
//! broadcast channel.
//!
//! This crate deliberately does not resolve a path to the `buntime-worker`
//! fixture binary itself: `CARGO_BIN_EXE_*`/`CARGO_BIN_FILE_*` env vars are
//! only defined while Cargo builds a test/bench of the package that
//! depends on that binary artifact, which is `buntime`, not this library.
//! Callers pass the worker's entry path in.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use buntime::policy::model::{Action, Defaults, Policy};
use buntime::{SupervisorConfig, SupervisorEvent};
use tokio::sync::broadcast;

/// A fresh temporary directory the caller owns for the duration of a test.
pub fn temp_workdir() -> tempfile::TempDir {
    tempfile::tempdir().expect("failed to create temp workdir")
}

/// An "open" policy with every domain defaulted the same way, for tests
/// that only care about one domain's behavior.
pub fn policy_with_defaults(fs: Action, net: Action, exec: Action) -> Policy {
    let mut policy = Policy::open();
    policy.defaults = Defaults { fs, net, exec };
    policy
}

/// A [`SupervisorConfig`] that runs `entry` with sensible defaults for
/// tests (small shm region, short ready timeout, no sandboxing).
pub fn test_config(workdir: &Path, entry: PathBuf) -> SupervisorConfig {
    SupervisorConfig {
        entry,
        args: Vec::new(),
        workdir: workdir.to_path_buf(),
        shm_size: 64 * 1024,
        sandboxed: false,
        ready_timeout: Duration::from_secs(5),
        env: BTreeMap::new(),
    }
}

/// Await the next event on `events` matching `predicate`, or `None` once
/// `timeout` elapses without a match.
pub async fn recv_until<F>(
    events: &mut broadcast::Receiver<SupervisorEvent>,
    timeout: Duration,
    predicate: F,
) -> Option<SupervisorEvent>
where
    F: Fn(&SupervisorEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return None;
        }
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(event)) if predicate(&event) => return Some(event),
            Ok(Ok(_)) => continue,
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_with_defaults_sets_all_three_domains() {
        let policy = policy_with_defaults(Action::Deny, Action::Allow, Action::Warn);
        assert_eq!(policy.defaults.fs, Action::Deny);
        assert_eq!(policy.defaults.net, Action::Allow);
        assert_eq!(policy.defaults.exec, Action::Warn);
    }
}
