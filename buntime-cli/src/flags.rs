//! Flag-to-policy derivation for `run --allow-*`/`--deny-*` and
//! `init-policy`. A pure function: the same flags always produce the same
//! [`Policy`], independent of any on-disk document.

use std::collections::BTreeSet;

use buntime::policy::model::{Action, ExecRule, FsPerm, FsRule, NetRule, Policy, PortRange, Proto};
use buntime_shared::errors::{BuntimeError, BuntimeResult};
use clap::Args;

const READ_PERMS: &[FsPerm] = &[FsPerm::ReadFile, FsPerm::ReadDir];
const WRITE_PERMS: &[FsPerm] = &[
    FsPerm::WriteFile,
    FsPerm::WriteDir,
    FsPerm::MakeFile,
    FsPerm::MakeDir,
    FsPerm::RemoveFile,
    FsPerm::RemoveDir,
];

/// Repeatable, comma-separated allow/deny flags shared by `run` and
/// `init-policy`. `--allow-net` etc. may be given with no value (meaning
/// "all") or a comma-separated list of scopes.
///
/// `--allow-env`, `--allow-ffi`, and `--allow-sys` are accepted for
/// compatibility with the wider flag surface but have no corresponding
/// domain in the normalized policy schema (§3 only models `fs`/`net`/
/// `exec`) — they are parsed, never silently rejected, but do not affect
/// the derived policy.
#[derive(Args, Debug, Default, Clone)]
pub struct PolicyFlags {
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub allow_net: Option<String>,
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub deny_net: Option<String>,

    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub allow_read: Option<String>,
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub deny_read: Option<String>,

    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub allow_write: Option<String>,
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub deny_write: Option<String>,

    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub allow_run: Option<String>,
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub deny_run: Option<String>,

    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub allow_env: Option<String>,
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub deny_env: Option<String>,

    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub allow_ffi: Option<String>,
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub deny_ffi: Option<String>,

    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub allow_sys: Option<String>,
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub deny_sys: Option<String>,

    #[arg(long)]
    pub allow_all: bool,
}

/// Derive a normalized [`Policy`] from `flags`. Domain defaults start
/// `deny`; `--allow-all` sets every default to `allow` before the
/// individual flags are applied, so a later `--deny-*` still takes effect
/// through its rule (deny-wins at evaluation time, §4.6).
pub fn policy_from_flags(flags: &PolicyFlags) -> BuntimeResult<Policy> {
    let mut policy = Policy::open();
    policy.defaults.fs = Action::Deny;
    policy.defaults.net = Action::Deny;
    policy.defaults.exec = Action::Deny;

    if flags.allow_all {
        policy.defaults.fs = Action::Allow;
        policy.defaults.net = Action::Allow;
        policy.defaults.exec = Action::Allow;
    }

    apply_net(&mut policy, flags.allow_net.as_deref(), Action::Allow)?;
    apply_net(&mut policy, flags.deny_net.as_deref(), Action::Deny)?;

    apply_fs(&mut policy, flags.allow_read.as_deref(), Action::Allow, READ_PERMS);
    apply_fs(&mut policy, flags.deny_read.as_deref(), Action::Deny, READ_PERMS);

    apply_fs(&mut policy, flags.allow_write.as_deref(), Action::Allow, WRITE_PERMS);
    apply_fs(&mut policy, flags.deny_write.as_deref(), Action::Deny, WRITE_PERMS);

    apply_exec(&mut policy, flags.allow_run.as_deref(), Action::Allow);
    apply_exec(&mut policy, flags.deny_run.as_deref(), Action::Deny);

    Ok(policy)
}

/// Split a comma-separated flag value, dropping empty entries produced by
/// trailing/doubled commas. `Some("")` (flag given with no value) is
/// handled by the caller before this is reached.
fn scopes(value: &str) -> Vec<&str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
}

fn apply_fs(policy: &mut Policy, value: Option<&str>, action: Action, perms: &[FsPerm]) {
    let Some(value) = value else { return };
    let perm_set: BTreeSet<FsPerm> = perms.iter().copied().collect();
    if value.is_empty() {
        policy.fs_rules.push(FsRule { action, path: "/".into(), perms: perm_set });
        return;
    }
    for path in scopes(value) {
        policy.fs_rules.push(FsRule { action, path: path.to_string(), perms: perm_set.clone() });
    }
}

fn apply_exec(policy: &mut Policy, value: Option<&str>, action: Action) {
    let Some(value) = value else { return };
    if value.is_empty() {
        match action {
            Action::Allow => policy.defaults.exec = Action::Allow,
            Action::Deny => policy.defaults.exec = Action::Deny,
            Action::Warn => {}
        }
        return;
    }
    for path in scopes(value) {
        policy.exec_rules.push(ExecRule { action, path: path.to_string(), sha256: None });
    }
}

fn apply_net(policy: &mut Policy, value: Option<&str>, action: Action) -> BuntimeResult<()> {
    let Some(value) = value else { return Ok(()) };
    if value.is_empty() {
        for proto in [Proto::Tcp, Proto::Udp] {
            policy.net_rules.push(NetRule {
                action,
                proto,
                cidr: "0.0.0.0/0".into(),
                ports: vec![PortRange { from: 0, to: 65535 }],
            });
        }
        return Ok(());
    }
    for scope in scopes(value) {
        let (host, port) = match scope.rsplit_once(':') {
            Some((host, port)) => (host, Some(parse_port(port)?)),
            None => (scope, None),
        };
        let cidr = if host.contains('/') { host.to_string() } else { format!("{host}/32") };
        let ports = match port {
            Some(p) => vec![PortRange { from: p, to: p }],
            None => vec![PortRange { from: 0, to: 65535 }],
        };
        for proto in [Proto::Tcp, Proto::Udp] {
            policy.net_rules.push(NetRule { action, proto, cidr: cidr.clone(), ports: ports.clone() });
        }
    }
    Ok(())
}

fn parse_port(raw: &str) -> BuntimeResult<u16> {
    raw.parse()
        .map_err(|_| BuntimeError::Config(format!("invalid port in --allow-net/--deny-net scope: {raw}")))
}

/// Parse a `--shm-size` value like `64kb`, `16mb`, `1gb`, or a bare byte
/// count.
pub fn parse_shm_size(raw: &str) -> BuntimeResult<usize> {
    let raw = raw.trim();
    let lower = raw.to_ascii_lowercase();
    let (digits, multiplier) = if let Some(prefix) = lower.strip_suffix("gb") {
        (prefix, 1024 * 1024 * 1024)
    } else if let Some(prefix) = lower.strip_suffix("mb") {
        (prefix, 1024 * 1024)
    } else if let Some(prefix) = lower.strip_suffix("kb") {
        (prefix, 1024)
    } else {
        (lower.as_str(), 1)
    };
    let value: usize = digits
        .trim()
        .parse()
        .map_err(|_| BuntimeError::Config(format!("invalid --shm-size: {raw}")))?;
    Ok(value * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags() -> PolicyFlags {
        PolicyFlags::default()
    }

    #[test]
    fn no_flags_denies_everything_by_default() {
        let policy = policy_from_flags(&flags()).unwrap();
        assert_eq!(policy.defaults.fs, Action::Deny);
        assert_eq!(policy.defaults.net, Action::Deny);
        assert_eq!(policy.defaults.exec, Action::Deny);
    }

    #[test]
    fn allow_all_sets_every_default_to_allow() {
        let mut f = flags();
        f.allow_all = true;
        let policy = policy_from_flags(&f).unwrap();
        assert_eq!(policy.defaults.fs, Action::Allow);
        assert_eq!(policy.defaults.net, Action::Allow);
        assert_eq!(policy.defaults.exec, Action::Allow);
    }

    #[test]
    fn empty_allow_read_grants_root_prefix() {
        let mut f = flags();
        f.allow_read = Some(String::new());
        let policy = policy_from_flags(&f).unwrap();
        assert_eq!(policy.fs_rules.len(), 1);
        assert_eq!(policy.fs_rules[0].path, "/");
        assert!(policy.fs_rules[0].perms.contains(&FsPerm::ReadFile));
    }

    #[test]
    fn scoped_allow_write_produces_one_rule_per_path() {
        let mut f = flags();
        f.allow_write = Some("/tmp,/var/scratch".into());
        let policy = policy_from_flags(&f).unwrap();
        assert_eq!(policy.fs_rules.len(), 2);
        assert_eq!(policy.fs_rules[0].path, "/tmp");
        assert_eq!(policy.fs_rules[1].path, "/var/scratch");
    }

    #[test]
    fn empty_allow_run_sets_exec_default_since_exec_rules_match_exactly() {
        let mut f = flags();
        f.allow_run = Some(String::new());
        let policy = policy_from_flags(&f).unwrap();
        assert!(policy.exec_rules.is_empty());
        assert_eq!(policy.defaults.exec, Action::Allow);
    }

    #[test]
    fn scoped_deny_net_with_port_produces_tcp_and_udp_rules() {
        let mut f = flags();
        f.deny_net = Some("10.0.0.0/8:443".into());
        let policy = policy_from_flags(&f).unwrap();
        assert_eq!(policy.net_rules.len(), 2);
        assert!(policy.net_rules.iter().all(|r| r.action == Action::Deny && r.cidr == "10.0.0.0/8"));
        assert!(policy.net_rules.iter().all(|r| r.ports == vec![PortRange { from: 443, to: 443 }]));
    }

    #[test]
    fn bare_host_without_cidr_suffix_is_treated_as_single_address() {
        let mut f = flags();
        f.allow_net = Some("93.184.216.34".into());
        let policy = policy_from_flags(&f).unwrap();
        assert_eq!(policy.net_rules[0].cidr, "93.184.216.34/32");
    }

    #[test]
    fn shm_size_suffixes_are_parsed() {
        assert_eq!(parse_shm_size("64kb").unwrap(), 64 * 1024);
        assert_eq!(parse_shm_size("16MB").unwrap(), 16 * 1024 * 1024);
        assert_eq!(parse_shm_size("1gb").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_shm_size("4096").unwrap(), 4096);
    }

    #[test]
    fn shm_size_rejects_garbage() {
        assert!(parse_shm_size("big").is_err());
    }
}
