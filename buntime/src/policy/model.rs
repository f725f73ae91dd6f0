//! Normalized policy types (§3 "Policy (normalized)", §4.4).
//!
//! These are the canonical, post-validation, post-normalization shapes.
//! Nothing downstream of [`crate::policy::normalizer`] should need to
//! re-check schema-level invariants — a [`Policy`] in hand is already known
//! to have `version == 1`, valid CIDRs, in-range ports, and canonicalized
//! fs paths.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Action a matching rule (or a domain default) resolves to.
///
/// Ordered `Deny > Warn > Allow` for the "highest-priority action wins"
/// rule in the evaluator (§4.6); the derived `Ord` relies on declaration
/// order below, so do not reorder these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Allow,
    Warn,
    Deny,
}

/// Filesystem permission a `fs` rule may grant or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsPerm {
    ReadFile,
    WriteFile,
    ReadDir,
    WriteDir,
    Execute,
    RemoveFile,
    RemoveDir,
    MakeFile,
    MakeDir,
}

/// Transport protocol a `net` rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proto {
    Tcp,
    Udp,
}

/// An inclusive port interval, `from <= to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub from: u16,
    pub to: u16,
}

impl PortRange {
    pub fn contains(&self, port: u16) -> bool {
        self.from <= port && port <= self.to
    }
}

/// One filesystem rule: `canonical(path)` prefix plus the permission set it
/// covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsRule {
    pub action: Action,
    /// Normalized absolute path prefix (no trailing separator except at
    /// root).
    pub path: String,
    pub perms: BTreeSet<FsPerm>,
}

/// One network rule: protocol, CIDR, and the ports it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetRule {
    pub action: Action,
    pub proto: Proto,
    /// Syntactically validated CIDR string, e.g. `10.0.0.0/8` or
    /// `0.0.0.0/0` (universal).
    pub cidr: String,
    pub ports: Vec<PortRange>,
}

/// One exec rule: an exact executable path, with an advisory (unenforced)
/// hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRule {
    pub action: Action,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Default action applied to each domain when no rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defaults {
    pub fs: Action,
    pub net: Action,
    pub exec: Action,
}

/// Advisory launcher flags: enabling any of these asks the launcher
/// collaborator to wire the corresponding isolation mechanism. The
/// evaluator itself never reads these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Plugins {
    #[serde(default)]
    pub namespaces: bool,
    #[serde(default)]
    pub landlock: bool,
    #[serde(default)]
    pub seccomp: bool,
}

/// Syscall names to deny at the launcher's anti-escape layer (advisory;
/// enforcement lives outside the core, see §1 Out of scope).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AntiEscape {
    #[serde(default)]
    pub deny_syscalls: BTreeSet<String>,
}

/// Audit event kinds the supervisor batches into `audit-events`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    Connect,
    Openat,
    Execve,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Audit {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub events: BTreeSet<AuditEvent>,
}

/// A fully validated and normalized policy document (§3, §4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub version: u32,
    #[serde(default)]
    pub plugins: Plugins,
    pub defaults: Defaults,
    #[serde(default)]
    pub fs_rules: Vec<FsRule>,
    #[serde(default)]
    pub net_rules: Vec<NetRule>,
    #[serde(default)]
    pub exec_rules: Vec<ExecRule>,
    #[serde(default)]
    pub anti_escape: AntiEscape,
    #[serde(default)]
    pub audit: Audit,
}

impl Policy {
    /// The "open" policy: every domain defaults to `allow`, no rules, no
    /// audit. This is what [`crate::policy::composer::compose`] returns for
    /// an empty input list, and what the supervisor starts from before any
    /// on-disk policy is loaded.
    pub fn open() -> Self {
        Self {
            version: 1,
            plugins: Plugins::default(),
            defaults: Defaults {
                fs: Action::Allow,
                net: Action::Allow,
                exec: Action::Allow,
            },
            fs_rules: Vec::new(),
            net_rules: Vec::new(),
            exec_rules: Vec::new(),
            anti_escape: AntiEscape::default(),
            audit: Audit::default(),
        }
    }
}
