use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::flags::PolicyFlags;

#[derive(Parser, Debug)]
#[command(name = "buntime", version, about = "Supervisor/worker sandbox runtime")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Launch `entry` under a supervised, policy-enforced worker.
    Run(RunArgs),
    /// Emit a policy document derived from allow/deny flags.
    InitPolicy(InitPolicyArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[value(rename_all = "lowercase")]
pub enum WorkerKind {
    Python,
    Bun,
}

impl WorkerKind {
    pub fn interpreter_binary(self) -> &'static str {
        match self {
            WorkerKind::Python => "python3",
            WorkerKind::Bun => "bun",
        }
    }
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Script or executable the worker runs.
    pub entry: PathBuf,
    /// Arguments forwarded to `entry`.
    pub args: Vec<String>,

    #[command(flatten)]
    pub policy_flags: PolicyFlags,

    /// Path to a policy document (§4.4 schema); composed with any
    /// allow/deny flags given alongside it.
    #[arg(long)]
    pub policy: Option<PathBuf>,

    /// Shared-memory region size per direction, e.g. `64kb`, `16mb`.
    #[arg(long, default_value = "1mb")]
    pub shm_size: String,

    /// Interpreter that runs `entry`.
    #[arg(long, value_enum, default_value = "python")]
    pub worker: WorkerKind,

    /// Run the worker as a direct child process, skipping namespace
    /// isolation even on Linux.
    #[arg(long)]
    pub no_sandbox: bool,

    /// Reserved for the debug web UI (§1 Out of scope); accepted for flag
    /// parity but currently a no-op.
    #[arg(long)]
    pub debug_ui: bool,

    /// Working directory for the policy sidecar and control socket.
    #[arg(long)]
    pub workdir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct InitPolicyArgs {
    #[command(flatten)]
    pub policy_flags: PolicyFlags,

    /// Write the policy document here instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,
}
