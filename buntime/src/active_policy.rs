//! Active-policy persistence (§6 "Active policy persistence").
//!
//! The composed policy currently enforced by a running Supervisor is
//! mirrored to `<workdir>/policies/active.json` with a `active.meta.json`
//! sidecar, so an out-of-process reader (the CLI, a debug tool) can inspect
//! what is enforced without holding a handle to the Supervisor itself.

use std::path::{Path, PathBuf};

use buntime_shared::errors::{BuntimeError, BuntimeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::model::Policy;

/// Where an active-policy write originated, carried into the sidecar so a
/// reader can tell a CLI `apply` from a boot-time default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicySource {
    Apply,
    Run,
    Boot,
}

/// Rule-count breakdown carried by the sidecar, one field per domain plus
/// the grand total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCounts {
    pub fs: usize,
    pub net: usize,
    pub exec: usize,
    pub anti_escape: usize,
    pub total: usize,
}

/// `active.meta.json`: everything about the composite policy except the
/// policy body itself, which lives in the sibling `active.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivePolicyMeta {
    pub policy_keys: Vec<String>,
    pub policy_count: usize,
    pub defaults: crate::policy::model::Defaults,
    pub rules: RuleCounts,
    pub audit: crate::policy::model::Audit,
    pub source: PolicySource,
    pub applied_at: DateTime<Utc>,
}

impl ActivePolicyMeta {
    pub fn describe(policy: &Policy, policy_keys: Vec<String>, source: PolicySource, applied_at: DateTime<Utc>) -> Self {
        let rules = RuleCounts {
            fs: policy.fs_rules.len(),
            net: policy.net_rules.len(),
            exec: policy.exec_rules.len(),
            anti_escape: policy.anti_escape.deny_syscalls.len(),
            total: policy.fs_rules.len() + policy.net_rules.len() + policy.exec_rules.len(),
        };
        Self {
            policy_count: policy_keys.len(),
            policy_keys,
            defaults: policy.defaults,
            rules,
            audit: policy.audit.clone(),
            source,
            applied_at,
        }
    }
}

/// Directory name under the workdir that holds `active.json`/`active.meta.json`.
pub const POLICIES_DIR: &str = "policies";

fn policy_path(workdir: &Path) -> PathBuf {
    workdir.join(POLICIES_DIR).join("active.json")
}

fn meta_path(workdir: &Path) -> PathBuf {
    workdir.join(POLICIES_DIR).join("active.meta.json")
}

/// Persist `policy` and its metadata under `workdir`, creating the
/// `policies` directory if needed.
pub fn persist(
    workdir: &Path,
    policy: &Policy,
    policy_keys: Vec<String>,
    source: PolicySource,
    applied_at: DateTime<Utc>,
) -> BuntimeResult<()> {
    let dir = workdir.join(POLICIES_DIR);
    std::fs::create_dir_all(&dir)?;

    let policy_json = serde_json::to_string_pretty(policy)?;
    std::fs::write(policy_path(workdir), policy_json)?;

    let meta = ActivePolicyMeta::describe(policy, policy_keys, source, applied_at);
    let meta_json = serde_json::to_string_pretty(&meta)?;
    std::fs::write(meta_path(workdir), meta_json)?;
    Ok(())
}

/// Read back the persisted composite policy and its sidecar.
pub fn load(workdir: &Path) -> BuntimeResult<(Policy, ActivePolicyMeta)> {
    let policy_bytes = std::fs::read(policy_path(workdir))
        .map_err(|e| BuntimeError::Config(format!("no active policy at {}: {e}", workdir.display())))?;
    let policy: Policy = serde_json::from_slice(&policy_bytes)?;

    let meta_bytes = std::fs::read(meta_path(workdir))
        .map_err(|e| BuntimeError::Config(format!("no active policy metadata at {}: {e}", workdir.display())))?;
    let meta: ActivePolicyMeta = serde_json::from_slice(&meta_bytes)?;

    Ok((policy, meta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_then_load_round_trips_policy_and_meta() {
        let dir = tempfile::tempdir().unwrap();
        let policy = Policy::open();
        let applied_at = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        persist(dir.path(), &policy, vec!["base".into()], PolicySource::Boot, applied_at).unwrap();
        let (loaded_policy, meta) = load(dir.path()).unwrap();

        assert_eq!(loaded_policy, policy);
        assert_eq!(meta.policy_keys, vec!["base".to_string()]);
        assert_eq!(meta.policy_count, 1);
        assert_eq!(meta.source, PolicySource::Boot);
    }

    #[test]
    fn rule_counts_sum_the_three_domains() {
        let dir = tempfile::tempdir().unwrap();
        let mut policy = Policy::open();
        policy.fs_rules.push(crate::policy::model::FsRule {
            action: crate::policy::model::Action::Allow,
            path: "/tmp".into(),
            perms: Default::default(),
        });
        policy.exec_rules.push(crate::policy::model::ExecRule {
            action: crate::policy::model::Action::Deny,
            path: "/bin/sh".into(),
            sha256: None,
        });
        persist(dir.path(), &policy, vec!["a".into(), "b".into()], PolicySource::Apply, Utc::now()).unwrap();
        let (_, meta) = load(dir.path()).unwrap();
        assert_eq!(meta.rules.fs, 1);
        assert_eq!(meta.rules.exec, 1);
        assert_eq!(meta.rules.total, 2);
    }

    #[test]
    fn load_without_prior_persist_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path()).is_err());
    }
}
