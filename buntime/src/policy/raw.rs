//! The on-disk / over-the-CLI policy document shape, before validation or
//! normalization (§4.4). Structurally permissive: optional sections are
//! `None`, paths are unverified strings, port specs are a single
//! comma-separated string rather than a parsed list.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::policy::model::{Action, AuditEvent, FsPerm, Proto};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPolicy {
    pub version: u32,
    #[serde(default)]
    pub plugins: RawPlugins,
    pub defaults: RawDefaults,
    #[serde(default)]
    pub fs: Option<RawFsSection>,
    #[serde(default)]
    pub net: Option<RawNetSection>,
    #[serde(default)]
    pub exec: Option<RawExecSection>,
    #[serde(default)]
    pub anti_escape: Option<RawAntiEscape>,
    #[serde(default)]
    pub audit: Option<RawAudit>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPlugins {
    #[serde(default)]
    pub namespaces: bool,
    #[serde(default)]
    pub landlock: bool,
    #[serde(default)]
    pub seccomp: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDefaults {
    pub fs: Action,
    pub net: Action,
    pub exec: Action,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFsSection {
    #[serde(default)]
    pub rules: Vec<RawFsRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFsRule {
    pub action: Action,
    pub path: String,
    pub perms: BTreeSet<FsPerm>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNetSection {
    #[serde(default)]
    pub rules: Vec<RawNetRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNetRule {
    pub action: Action,
    pub proto: Proto,
    pub cidr: String,
    /// Comma-separated ports or `from-to` ranges, e.g. `"80,443,8000-8100"`.
    pub ports: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawExecSection {
    #[serde(default)]
    pub rules: Vec<RawExecRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawExecRule {
    pub action: Action,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAntiEscape {
    #[serde(default)]
    pub deny_syscalls: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAudit {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub events: BTreeSet<AuditEvent>,
}
