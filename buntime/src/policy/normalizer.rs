//! Produces a canonical [`Policy`](crate::policy::model::Policy) from a
//! [`RawPolicy`] (§4.4 "Normalizer").

use buntime_shared::errors::BuntimeResult;

use crate::policy::model::{
    AntiEscape, Audit, Defaults, ExecRule, FsRule, NetRule, Plugins, Policy,
};
use crate::policy::raw::RawPolicy;
use crate::policy::validator::{parse_ports, validate};

/// Validate then normalize. Absent optional sections become empty
/// collections; fs paths are trimmed and have any trailing separator
/// stripped (except at root); port specs become ordered `[from,to]` lists.
pub fn normalize(raw: RawPolicy) -> BuntimeResult<Policy> {
    validate(&raw)?;

    let fs_rules = raw
        .fs
        .map(|section| {
            section
                .rules
                .into_iter()
                .map(|r| FsRule {
                    action: r.action,
                    path: normalize_path(&r.path),
                    perms: r.perms,
                })
                .collect()
        })
        .unwrap_or_default();

    let net_rules = raw
        .net
        .map(|section| {
            section
                .rules
                .into_iter()
                .map(|r| {
                    Ok(NetRule {
                        action: r.action,
                        proto: r.proto,
                        cidr: r.cidr,
                        ports: parse_ports(&r.ports)?,
                    })
                })
                .collect::<BuntimeResult<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();

    let exec_rules = raw
        .exec
        .map(|section| {
            section
                .rules
                .into_iter()
                .map(|r| ExecRule {
                    action: r.action,
                    path: normalize_path(&r.path),
                    sha256: r.sha256,
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Policy {
        version: 1,
        plugins: Plugins {
            namespaces: raw.plugins.namespaces,
            landlock: raw.plugins.landlock,
            seccomp: raw.plugins.seccomp,
        },
        defaults: Defaults {
            fs: raw.defaults.fs,
            net: raw.defaults.net,
            exec: raw.defaults.exec,
        },
        fs_rules,
        net_rules,
        exec_rules,
        anti_escape: raw
            .anti_escape
            .map(|a| AntiEscape {
                deny_syscalls: a.deny_syscalls,
            })
            .unwrap_or_default(),
        audit: raw
            .audit
            .map(|a| Audit {
                enabled: a.enabled,
                events: a.events,
            })
            .unwrap_or_default(),
    })
}

/// Trim whitespace and strip a trailing separator, preserving root (`/`)
/// as-is. Does not touch the filesystem — "canonical" here means
/// string-canonical, not symlink-resolved (§9 "path-segment granularity is
/// not enforced beyond string-prefix").
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed == "/" || trimmed.len() <= 1 {
        return trimmed.to_string();
    }
    trimmed.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::model::Action;
    use crate::policy::raw::RawDefaults;

    fn base_raw() -> RawPolicy {
        RawPolicy {
            version: 1,
            plugins: Default::default(),
            defaults: RawDefaults {
                fs: Action::Deny,
                net: Action::Deny,
                exec: Action::Deny,
            },
            fs: None,
            net: None,
            exec: None,
            anti_escape: None,
            audit: None,
        }
    }

    #[test]
    fn absent_sections_become_empty_collections() {
        let policy = normalize(base_raw()).unwrap();
        assert!(policy.fs_rules.is_empty());
        assert!(policy.net_rules.is_empty());
        assert!(policy.exec_rules.is_empty());
        assert!(policy.anti_escape.deny_syscalls.is_empty());
        assert!(!policy.audit.enabled);
    }

    #[test]
    fn trailing_separator_is_stripped_except_at_root() {
        assert_eq!(normalize_path("/tmp/work/"), "/tmp/work");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("  /tmp/work  "), "/tmp/work");
    }

    #[test]
    fn rejects_invalid_document_before_normalizing() {
        let mut raw = base_raw();
        raw.version = 99;
        assert!(normalize(raw).is_err());
    }
}
