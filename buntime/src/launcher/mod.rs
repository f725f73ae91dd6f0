//! Worker launcher: spawns the worker process and, on Linux with
//! sandboxing enabled, wires its namespace/chroot isolation. Opaque to the
//! supervisor beyond this trait (§2 "Worker Launcher (collaborator)",
//! SPEC addendum on `WorkerLauncher`).

#[cfg(target_os = "linux")]
pub mod linux;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use buntime_shared::errors::BuntimeResult;
use tokio::process::Child;

/// Arguments the launcher needs to start a worker connected to an already
/// open [`crate::transport::Transport`].
pub struct LaunchSpec {
    pub entry: PathBuf,
    pub args: Vec<String>,
    pub socket_path: PathBuf,
    pub shm_name: String,
    pub shm_size: usize,
    pub env: BTreeMap<String, String>,
    pub sandboxed: bool,
}

/// A started worker process, returned by every [`WorkerLauncher`]
/// implementation.
pub struct LaunchedWorker {
    pub child: Child,
}

impl LaunchedWorker {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Collaborator the supervisor delegates process creation to. Kept
/// object-safe so the supervisor can hold a `Box<dyn WorkerLauncher>` and
/// remain agnostic to platform-specific isolation details.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, spec: LaunchSpec) -> BuntimeResult<LaunchedWorker>;
}

/// Plain, unsandboxed launcher: spawns the worker entry as a direct child
/// process. Used when `--no-sandbox` is set or on non-Linux platforms.
pub struct ProcessLauncher;

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, spec: LaunchSpec) -> BuntimeResult<LaunchedWorker> {
        let mut command = tokio::process::Command::new(&spec.entry);
        command
            .args(&spec.args)
            .arg(&spec.socket_path)
            .arg(&spec.shm_name)
            .arg(spec.shm_size.to_string())
            .env_clear()
            .envs(&spec.env)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| {
            buntime_shared::errors::BuntimeError::Transport(format!(
                "failed to spawn worker {}: {e}",
                spec.entry.display()
            ))
        })?;

        Ok(LaunchedWorker { child })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn process_launcher_spawns_and_forwards_argv() {
        let launcher = ProcessLauncher;
        let spec = LaunchSpec {
            entry: PathBuf::from("/bin/true"),
            args: Vec::new(),
            socket_path: PathBuf::from("/tmp/sock"),
            shm_name: "/buntime-test".into(),
            shm_size: 4096,
            env: BTreeMap::new(),
            sandboxed: false,
        };
        let mut launched = launcher.launch(spec).await.unwrap();
        let status = launched.child.wait().await.unwrap();
        assert!(status.success());
    }
}
