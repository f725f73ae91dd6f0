use std::collections::BTreeMap;
use std::time::Duration;

use buntime::policy::{compose, normalize, Policy, RawPolicy};
use buntime::{start_supervisor, SupervisorConfig, SupervisorEvent, WorkerState};
use buntime_shared::constants::{POLICY_JSON_ENV, PROXY_HOST_ADDR, PROXY_PORT, WORKER_ENV_PREFIX};
use buntime_shared::errors::BuntimeError;

use crate::cli::RunArgs;
use crate::flags::{parse_shm_size, policy_from_flags};

pub async fn execute(args: RunArgs) -> anyhow::Result<i32> {
    let workdir = args
        .workdir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default().join(".buntime"));
    std::fs::create_dir_all(&workdir)?;

    let policy = build_policy(&args)?;
    let shm_size = parse_shm_size(&args.shm_size)?;

    let vars: Vec<(String, String)> = std::env::vars().collect();
    let mut defaults: BTreeMap<String, String> = buntime::env::scrub_supervisor_vars(vars.clone())
        .into_iter()
        .filter(|(key, _)| !key.starts_with(WORKER_ENV_PREFIX))
        .collect();

    let sandboxed = !args.no_sandbox && cfg!(target_os = "linux");
    if sandboxed {
        defaults.insert("HTTP_PROXY".into(), format!("http://{PROXY_HOST_ADDR}:{PROXY_PORT}"));
        defaults.insert("HTTPS_PROXY".into(), format!("http://{PROXY_HOST_ADDR}:{PROXY_PORT}"));
        defaults.insert("NO_PROXY".into(), "localhost,127.0.0.1".into());
    }
    let env = buntime::env::worker_env(vars, defaults);

    let entry_path = args.entry.display().to_string();
    let mut worker_args = vec![entry_path];
    worker_args.extend(args.args.clone());

    let config = SupervisorConfig {
        entry: std::path::PathBuf::from(args.worker.interpreter_binary()),
        args: worker_args,
        workdir: workdir.clone(),
        shm_size,
        sandboxed,
        ready_timeout: Duration::from_secs(10),
        env,
    };

    let launcher = launcher_for(&args, &workdir);
    let handle = start_supervisor(launcher, policy.clone(), config).await?;

    buntime::active_policy::persist(
        &workdir,
        &policy,
        Vec::new(),
        buntime::active_policy::PolicySource::Run,
        chrono::Utc::now(),
    )?;

    let mut events = handle.subscribe();
    let mut exit_code = 0;
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(SupervisorEvent::Output { bytes }) => {
                        use std::io::Write;
                        std::io::stdout().write_all(&bytes).ok();
                    }
                    Ok(SupervisorEvent::Error { message }) => {
                        eprintln!("buntime: {message}");
                    }
                    Ok(SupervisorEvent::State { worker, exit_code: Some(code), .. }) => {
                        exit_code = code;
                        if worker == WorkerState::Stopped {
                            break;
                        }
                    }
                    Ok(SupervisorEvent::State { worker: WorkerState::Stopped, .. }) => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = handle.interrupt().await;
            }
        }
    }

    Ok(exit_code)
}

fn build_policy(args: &RunArgs) -> anyhow::Result<Policy> {
    let mut policies = Vec::new();

    if let Some(path) = &args.policy {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BuntimeError::Config(format!("failed to read {}: {e}", path.display())))?;
        let raw: RawPolicy = serde_json::from_str(&contents)?;
        policies.push(normalize(raw)?);
    }

    if let Ok(encoded) = std::env::var(POLICY_JSON_ENV) {
        use base64::Engine;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| BuntimeError::Config(format!("invalid {POLICY_JSON_ENV}: {e}")))?;
        let raw: RawPolicy = serde_json::from_slice(&decoded)?;
        policies.push(normalize(raw)?);
    }

    policies.push(policy_from_flags(&args.policy_flags)?);

    Ok(compose(&policies))
}

fn launcher_for(args: &RunArgs, workdir: &std::path::Path) -> Box<dyn buntime::launcher::WorkerLauncher> {
    #[cfg(target_os = "linux")]
    {
        if !args.no_sandbox {
            return Box::new(buntime::launcher::linux::NamespaceLauncher {
                chroot_dir: workdir.join("root"),
            });
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = workdir;
    }
    let _ = args;
    Box::new(buntime::launcher::ProcessLauncher)
}
