//! End-to-end scenarios driving a real `buntime-worker` child process
//! through the supervisor, covering §8's testable properties: optimistic
//! vs. synchronous checks, policy composition priority, and restart on
//! policy violation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use buntime::launcher::ProcessLauncher;
use buntime::policy::model::{Action, ExecRule, FsPerm, FsRule};
use buntime::supervisor::{KillReason, SupervisorEvent, WorkerState};
use buntime::{start_supervisor, Policy, SupervisorConfig};
use buntime_test_utils::{policy_with_defaults, recv_until, temp_workdir, test_config};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Path to the `buntime-worker` fixture binary, resolved via the
/// artifact-dependency env var Cargo defines only for this crate's own
/// tests (the binary is a dev-dependency of `buntime`, not of
/// `buntime-test-utils`).
fn worker_binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_FILE_BUNTIME_WORKER"))
}

fn config(workdir: &Path) -> SupervisorConfig {
    test_config(workdir, worker_binary_path())
}

fn output_text(event: &SupervisorEvent) -> Option<String> {
    match event {
        SupervisorEvent::Output { bytes } => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

#[tokio::test]
async fn hello_world_prints_to_stdout() {
    let workdir = temp_workdir();
    let policy = policy_with_defaults(Action::Allow, Action::Allow, Action::Allow);
    let handle = start_supervisor(Box::new(ProcessLauncher), policy, config(workdir.path()))
        .await
        .expect("supervisor should start");

    let mut events = handle.subscribe();
    handle.send_code(b"PRINT hello world".to_vec()).await.unwrap();

    let event = recv_until(&mut events, EVENT_TIMEOUT, |e| {
        output_text(e).map(|s| s.contains("hello world")).unwrap_or(false)
    })
    .await;
    assert!(event.is_some(), "expected a stdout event containing \"hello world\"");

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn optimistic_deny_kills_worker_and_auto_restarts() {
    let workdir = temp_workdir();
    let policy = policy_with_defaults(Action::Deny, Action::Allow, Action::Allow);
    let handle = start_supervisor(Box::new(ProcessLauncher), policy, config(workdir.path()))
        .await
        .expect("supervisor should start");

    let mut events = handle.subscribe();
    handle.send_code(b"READ /etc/shadow".to_vec()).await.unwrap();

    let killed = recv_until(&mut events, EVENT_TIMEOUT, |e| {
        matches!(e, SupervisorEvent::State { worker: WorkerState::Killed, .. })
    })
    .await;
    assert!(killed.is_some(), "a denied optimistic read should kill the worker");

    let restarted = recv_until(&mut events, EVENT_TIMEOUT, |e| {
        matches!(
            e,
            SupervisorEvent::State { worker: WorkerState::Running, signal: Some(_), .. }
        )
    })
    .await;
    assert!(restarted.is_some(), "the supervisor should auto-restart after a policy-violation kill");

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn synchronous_write_deny_responds_without_killing() {
    let workdir = temp_workdir();
    let policy = policy_with_defaults(Action::Deny, Action::Allow, Action::Allow);
    let handle = start_supervisor(Box::new(ProcessLauncher), policy, config(workdir.path()))
        .await
        .expect("supervisor should start");

    let mut events = handle.subscribe();
    handle.send_code(b"WRITE /etc/passwd".to_vec()).await.unwrap();

    let note = recv_until(&mut events, EVENT_TIMEOUT, |e| {
        output_text(e).map(|s| s.contains("denied")).unwrap_or(false)
    })
    .await;
    assert!(note.is_some(), "a synchronous write denial should be reported, not kill the worker");

    // The worker must still be alive: a second, allowed instruction should
    // still produce output.
    handle.send_code(b"PRINT still alive".to_vec()).await.unwrap();
    let alive = recv_until(&mut events, EVENT_TIMEOUT, |e| {
        output_text(e).map(|s| s.contains("still alive")).unwrap_or(false)
    })
    .await;
    assert!(alive.is_some(), "worker should survive a synchronous deny");

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn synchronous_exec_allow_rule_overrides_deny_default() {
    let workdir = temp_workdir();
    let mut policy = policy_with_defaults(Action::Allow, Action::Allow, Action::Deny);
    policy.exec_rules.push(ExecRule {
        action: Action::Allow,
        path: "/usr/bin/true".into(),
        sha256: None,
    });
    let handle = start_supervisor(Box::new(ProcessLauncher), policy, config(workdir.path()))
        .await
        .expect("supervisor should start");

    let mut events = handle.subscribe();
    handle.send_code(b"EXEC /usr/bin/true".to_vec()).await.unwrap();
    let allowed = recv_until(&mut events, EVENT_TIMEOUT, |e| {
        output_text(e).map(|s| s.contains("exec: allowed")).unwrap_or(false)
    })
    .await;
    assert!(allowed.is_some(), "an exec rule should override the domain default");

    handle.send_code(b"EXEC /usr/bin/evil".to_vec()).await.unwrap();
    let denied = recv_until(&mut events, EVENT_TIMEOUT, |e| {
        output_text(e).map(|s| s.contains("exec: denied")).unwrap_or(false)
    })
    .await;
    assert!(denied.is_some(), "a path with no matching rule should fall through to the deny default");

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn stop_is_idempotent_with_subscriber_observing_final_state() {
    let workdir = temp_workdir();
    let policy = Policy::open();
    let handle = start_supervisor(Box::new(ProcessLauncher), policy, config(workdir.path()))
        .await
        .expect("supervisor should start");

    let mut events = handle.subscribe();
    handle.stop().await.unwrap();

    let stopped = recv_until(&mut events, EVENT_TIMEOUT, |e| {
        matches!(e, SupervisorEvent::State { worker: WorkerState::Stopped, .. })
    })
    .await;
    assert!(stopped.is_some(), "stop() should broadcast a final Stopped state event");
}

#[tokio::test]
async fn warn_rule_permits_the_write_like_allow() {
    let workdir = temp_workdir();
    let mut policy = policy_with_defaults(Action::Deny, Action::Allow, Action::Allow);
    policy.fs_rules.push(FsRule {
        action: Action::Warn,
        path: "/data".into(),
        perms: [FsPerm::WriteFile].into_iter().collect(),
    });
    let handle = start_supervisor(Box::new(ProcessLauncher), policy, config(workdir.path()))
        .await
        .expect("supervisor should start");

    let mut events = handle.subscribe();
    handle.send_code(b"WRITE /data/out.txt".to_vec()).await.unwrap();
    let allowed = recv_until(&mut events, EVENT_TIMEOUT, |e| {
        output_text(e).map(|s| s.contains("write: allowed")).unwrap_or(false)
    })
    .await;
    assert!(allowed.is_some(), "warn should behave like allow for a synchronous check");

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn restart_preserves_the_active_policy() {
    let workdir = temp_workdir();
    let policy = policy_with_defaults(Action::Deny, Action::Allow, Action::Allow);
    let handle = start_supervisor(Box::new(ProcessLauncher), policy, config(workdir.path()))
        .await
        .expect("supervisor should start");

    let mut events = handle.subscribe();
    // Trigger one restart via a denied optimistic read.
    handle.send_code(b"READ /etc/shadow".to_vec()).await.unwrap();
    recv_until(&mut events, EVENT_TIMEOUT, |e| {
        matches!(
            e,
            SupervisorEvent::State { worker: WorkerState::Running, signal: Some(_), .. }
        )
    })
    .await
    .expect("worker should restart");

    // The restarted worker must still be running under the same (still
    // fs-deny) policy, so a second denied read kills it again.
    handle.send_code(b"READ /etc/shadow".to_vec()).await.unwrap();
    let killed_again = recv_until(&mut events, EVENT_TIMEOUT, |e| {
        matches!(
            e,
            SupervisorEvent::State { worker: WorkerState::Killed, .. }
        )
    })
    .await;
    assert!(killed_again.is_some(), "the restarted worker should still be governed by the original policy");

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn kill_reason_is_policy_violation_for_optimistic_denies() {
    use buntime::supervisor::state::SupervisorState;
    let mut state = SupervisorState::new();
    state.transition_to(WorkerState::Starting).unwrap();
    state.transition_to(WorkerState::Running).unwrap();
    state
        .transition_to_with_reason(WorkerState::Killed, Some(KillReason::PolicyViolation))
        .unwrap();
    assert_eq!(state.kill_reason, Some(KillReason::PolicyViolation));
}
