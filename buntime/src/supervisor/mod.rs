//! Binds the transport, evaluator, and worker launcher into the lifecycle
//! state machine described by §4.7.

pub mod checks;
pub mod events;
pub mod state;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use buntime_shared::errors::{BuntimeError, BuntimeResult};
use buntime_shared::message::{Message, MessageType};
use buntime_shared::signal::Signal;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::env;
use crate::launcher::{LaunchSpec, LaunchedWorker, WorkerLauncher};
use crate::policy::{Evaluator, Policy};
use crate::transport::Transport;

pub use checks::Outcome as CheckOutcome;
pub use events::{StateSignal, SupervisorEvent};
pub use state::{KillReason, SupervisorState, WorkerState};

/// Static configuration for one supervised worker run. The same config is
/// reused verbatim across an automatic restart.
pub struct SupervisorConfig {
    pub entry: PathBuf,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    pub shm_size: usize,
    pub sandboxed: bool,
    pub ready_timeout: Duration,
    pub env: BTreeMap<String, String>,
}

enum Command {
    SendCode { bytes: Vec<u8>, reply: oneshot::Sender<bool> },
    Interrupt,
    Stop { reply: oneshot::Sender<()> },
    ApplyPolicySet {
        policies: Vec<Policy>,
        source: String,
        reply: oneshot::Sender<BuntimeResult<serde_json::Value>>,
    },
}

/// Caller-facing handle to a running supervisor: a command channel plus an
/// event subscription. Dropping the handle does not stop the worker —
/// call [`SupervisorHandle::stop`] explicitly.
pub struct SupervisorHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SupervisorEvent>,
    join: JoinHandle<()>,
}

impl SupervisorHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    /// §4.7 `sendCode`: returns `false` if the ring rejected the frame or
    /// the supervisor is not `Running`.
    pub async fn send_code(&self, bytes: Vec<u8>) -> BuntimeResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::SendCode { bytes, reply })
            .await
            .map_err(|_| BuntimeError::InvalidState("supervisor loop is gone".into()))?;
        rx.await.map_err(|_| BuntimeError::InvalidState("supervisor dropped the reply".into()))
    }

    pub async fn interrupt(&self) -> BuntimeResult<()> {
        self.commands
            .send(Command::Interrupt)
            .await
            .map_err(|_| BuntimeError::InvalidState("supervisor loop is gone".into()))
    }

    pub async fn stop(self) -> BuntimeResult<()> {
        let (reply, rx) = oneshot::channel();
        let _ = self.commands.send(Command::Stop { reply }).await;
        let _ = rx.await;
        let _ = self.join.await;
        Ok(())
    }

    pub async fn apply_policy_set(
        &self,
        policies: Vec<Policy>,
        source: impl Into<String>,
    ) -> BuntimeResult<serde_json::Value> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::ApplyPolicySet { policies, source: source.into(), reply })
            .await
            .map_err(|_| BuntimeError::InvalidState("supervisor loop is gone".into()))?;
        rx.await.map_err(|_| BuntimeError::InvalidState("supervisor dropped the reply".into()))?
    }
}

/// Start a supervised worker run: opens the transport, launches the worker,
/// waits for `READY`, then hands back a [`SupervisorHandle`] bound to the
/// steady-state event loop spawned as a background task (§4.7 "Start
/// sequence").
pub async fn start(
    launcher: Box<dyn WorkerLauncher>,
    policy: Policy,
    config: SupervisorConfig,
) -> BuntimeResult<SupervisorHandle> {
    Supervisor::start(launcher, policy, config).await
}

/// Owns transport, policy, worker handle, and state. Runs entirely inside
/// the task spawned by [`Supervisor::start`]; never touched concurrently.
struct Supervisor {
    state: SupervisorState,
    policy: Policy,
    config: SupervisorConfig,
    launcher: Box<dyn WorkerLauncher>,
    transport: Option<Transport>,
    worker: Option<LaunchedWorker>,
    events_tx: broadcast::Sender<SupervisorEvent>,
}

impl Supervisor {
    /// §4.7 "Start sequence": open transport, launch worker, wait for
    /// `READY`. On failure the transport is torn down and `start` spawns
    /// nothing — the caller never receives a handle for a supervisor that
    /// never got running.
    pub async fn start(
        launcher: Box<dyn WorkerLauncher>,
        policy: Policy,
        config: SupervisorConfig,
    ) -> BuntimeResult<SupervisorHandle> {
        let (events_tx, _) = broadcast::channel(256);
        let mut supervisor = Supervisor {
            state: SupervisorState::new(),
            policy,
            config,
            launcher,
            transport: None,
            worker: None,
            events_tx: events_tx.clone(),
        };

        info!(entry = %supervisor.config.entry.display(), "starting supervisor");
        supervisor.state.transition_to(WorkerState::Starting)?;
        supervisor.launch_and_await_ready().await?;
        supervisor.state.transition_to(WorkerState::Running)?;
        supervisor.emit(SupervisorEvent::state(WorkerState::Running));
        info!("worker running");

        let (commands_tx, commands_rx) = mpsc::channel(32);
        let join = tokio::spawn(supervisor.run(commands_rx));

        Ok(SupervisorHandle { commands: commands_tx, events: events_tx, join })
    }

    /// Opens a fresh transport, launches the worker, and blocks until
    /// `READY` or `config.ready_timeout` elapses. On any failure the
    /// transport is torn down before returning the error.
    async fn launch_and_await_ready(&mut self) -> BuntimeResult<()> {
        let shm_name = format!("/buntime-{}", std::process::id());
        let mut transport = Transport::open(&shm_name, self.config.shm_size, &self.config.workdir)?;

        let env = env::worker_env(self.config.env.clone(), BTreeMap::new());
        let spec = LaunchSpec {
            entry: self.config.entry.clone(),
            args: self.config.args.clone(),
            socket_path: transport.socket_path().to_path_buf(),
            shm_name: shm_name.clone(),
            shm_size: self.config.shm_size,
            env,
            sandboxed: self.config.sandboxed,
        };

        let launch_result = self.launcher.launch(spec).await;
        let worker = match launch_result {
            Ok(worker) => worker,
            Err(e) => {
                transport.teardown();
                return Err(e);
            }
        };
        self.worker = Some(worker);

        let wait_result = tokio::time::timeout(self.config.ready_timeout, async {
            transport.accept().await?;
            loop {
                match transport.recv_signal().await? {
                    Some(Signal::Ready) => return Ok(()),
                    Some(_) => continue,
                    None => {
                        return Err(BuntimeError::Transport("worker closed control socket before READY".into()))
                    }
                }
            }
        })
        .await;

        match wait_result {
            Ok(Ok(())) => {
                self.transport = Some(transport);
                Ok(())
            }
            Ok(Err(e)) => {
                transport.teardown();
                self.kill_worker();
                Err(e)
            }
            Err(_) => {
                transport.teardown();
                self.kill_worker();
                warn!(waited_ms = self.config.ready_timeout.as_millis() as u64, "worker did not signal READY in time");
                Err(BuntimeError::StartupTimeout { waited_ms: self.config.ready_timeout.as_millis() as u64 })
            }
        }
    }

    fn kill_worker(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            let _ = worker.child.start_kill();
        }
    }

    fn emit(&self, event: SupervisorEvent) {
        let _ = self.events_tx.send(event);
    }

    fn emit_memory(&self) {
        if let Some(transport) = self.transport.as_ref() {
            let stats = crate::metrics::ring_stats(&transport.s2w(), &transport.w2s());
            self.emit(SupervisorEvent::Memory {
                used_s2w: stats.used_s2w,
                used_w2s: stats.used_w2s,
                capacity: stats.capacity,
            });
        }
    }

    /// Steady-state loop: drain control-plane signals and service external
    /// commands until stopped (§5 "Scheduling model"). A ~10 Hz tick emits
    /// `memory` ring-occupancy events alongside whichever of the two
    /// happens first.
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut memory_tick = tokio::time::interval(Duration::from_millis(100));
        loop {
            if self.state.worker != WorkerState::Running {
                break;
            }
            let signal = {
                let transport = match self.transport.as_mut() {
                    Some(t) => t,
                    None => break,
                };
                tokio::select! {
                    signal = transport.recv_signal() => Some(signal),
                    command = commands.recv() => {
                        match command {
                            Some(cmd) => {
                                self.handle_command(cmd).await;
                                None
                            }
                            None => return,
                        }
                    }
                    _ = memory_tick.tick() => {
                        self.emit_memory();
                        None
                    }
                }
            };

            let Some(signal) = signal else { continue };
            match signal {
                Ok(Some(sig)) => self.handle_signal(sig).await,
                Ok(None) => {
                    let exit_code = self
                        .worker
                        .as_mut()
                        .and_then(|w| w.child.try_wait().ok().flatten())
                        .and_then(|status| status.code())
                        .unwrap_or(-1);
                    self.emit(SupervisorEvent::state_with_exit_code(WorkerState::Killed, exit_code));
                    let _ = self
                        .state
                        .transition_to_with_reason(WorkerState::Killed, Some(KillReason::Crash));
                    let _ = self.state.transition_to(WorkerState::Stopped);
                    self.emit(SupervisorEvent::state(WorkerState::Stopped));
                }
                Err(e) => self.emit(SupervisorEvent::error(e.to_string())),
            }
        }
    }

    async fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Ready => {}
            Signal::Data | Signal::Check => self.drain_w2s().await,
            Signal::State(event) if event.event == "exception" => {
                let message = event
                    .data
                    .as_ref()
                    .and_then(|d| d.as_str().map(str::to_string))
                    .unwrap_or_else(|| "worker reported an exception".to_string());
                self.emit(SupervisorEvent::error(message));
            }
            Signal::State(_) => {}
        }
    }

    async fn drain_w2s(&mut self) {
        let policy = self.policy.clone();
        let evaluator = Evaluator::new(&policy);
        let mut pending_kill = false;
        let mut pending_responses = Vec::new();
        let mut pending_outputs = Vec::new();

        if let Some(transport) = self.transport.as_ref() {
            let ring = transport.w2s();
            while let Some(frame) = ring.read() {
                let message = match Message::decode(&frame) {
                    Ok(m) => m,
                    Err(e) => {
                        debug!(error = %e, "dropping malformed frame");
                        pending_outputs.push(SupervisorEvent::error(e.to_string()));
                        continue;
                    }
                };
                match checks::arbitrate(&message, &evaluator) {
                    Ok(CheckOutcome::Forward(bytes)) => pending_outputs.push(SupervisorEvent::Output { bytes }),
                    Ok(CheckOutcome::NoResponse) => {}
                    Ok(CheckOutcome::Kill) => pending_kill = true,
                    Ok(CheckOutcome::Respond { request_id, allow }) => {
                        pending_responses.push((request_id, allow));
                    }
                    Err(e) => pending_outputs.push(SupervisorEvent::error(e.to_string())),
                }
            }
        }

        for event in pending_outputs {
            self.emit(event);
        }

        if let Some(transport) = self.transport.as_ref() {
            let ring = transport.s2w();
            for (request_id, allow) in pending_responses {
                let msg_type = if allow { MessageType::Allow } else { MessageType::Deny };
                let response = Message::new(msg_type, request_id, Vec::new());
                ring.write(&response.encode());
            }
        }

        if pending_kill {
            self.kill_and_restart(KillReason::PolicyViolation).await;
        }
    }

    async fn kill_and_restart(&mut self, reason: KillReason) {
        warn!(?reason, "killing worker");
        self.kill_worker();
        if let Some(transport) = self.transport.take() {
            drop(transport);
        }
        if self.state.transition_to_with_reason(WorkerState::Killed, Some(reason)).is_err() {
            return;
        }
        self.emit(SupervisorEvent::state(WorkerState::Killed));

        if reason != KillReason::PolicyViolation {
            let _ = self.state.transition_to(WorkerState::Stopped);
            self.emit(SupervisorEvent::state(WorkerState::Stopped));
            return;
        }

        if self.state.transition_to(WorkerState::Restarting).is_err() {
            return;
        }
        self.emit(SupervisorEvent::state(WorkerState::Restarting));

        match self.launch_and_await_ready().await {
            Ok(()) => {
                let _ = self.state.transition_to(WorkerState::Running);
                info!("worker restarted");
                self.emit(SupervisorEvent::state_with_signal(WorkerState::Running, StateSignal::Restarted));
            }
            Err(e) => {
                let _ = self.state.transition_to(WorkerState::Stopped);
                self.emit(SupervisorEvent::error(format!("restart failed: {e}")));
                self.emit(SupervisorEvent::state(WorkerState::Stopped));
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SendCode { bytes, reply } => {
                let accepted = self.state.worker == WorkerState::Running
                    && self
                        .transport
                        .as_ref()
                        .map(|t| {
                            let msg = Message::fire_and_forget(MessageType::Code, bytes);
                            t.s2w().write(&msg.encode()) > 0
                        })
                        .unwrap_or(false);
                if !accepted {
                    let reason = if self.state.worker == WorkerState::Restarting {
                        "worker is restarting"
                    } else {
                        "ring buffer rejected code frame"
                    };
                    self.emit(SupervisorEvent::error(reason));
                }
                let _ = reply.send(accepted);
            }
            Command::Interrupt => {
                self.kill_worker();
            }
            Command::Stop { reply } => {
                self.kill_worker();
                if let Some(transport) = self.transport.take() {
                    drop(transport);
                }
                let _ = self
                    .state
                    .transition_to_with_reason(WorkerState::Killed, Some(KillReason::Requested));
                let _ = self.state.transition_to(WorkerState::Stopped);
                self.emit(SupervisorEvent::state(WorkerState::Stopped));
                let _ = reply.send(());
            }
            Command::ApplyPolicySet { policies, source, reply } => {
                let composite = crate::policy::compose(&policies);
                self.policy = composite;
                self.emit(SupervisorEvent::PolicySetLoaded {
                    meta: serde_json::json!({ "source": source, "policyCount": policies.len() }),
                });
                let _ = reply.send(Ok(serde_json::json!({ "source": source })));
            }
        }
    }
}
